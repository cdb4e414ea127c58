// Logging and verbosity control

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "BENCHTRAIL_LOG";

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    /// Quiet mode - errors only
    Quiet,
    /// Normal mode - warnings and errors
    Normal,
    /// Verbose mode - progress
    Verbose,
    /// Very verbose mode - debug output
    VeryVerbose,
}

impl VerbosityLevel {
    /// Level selected by `-v` occurrences and `-q`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return VerbosityLevel::Quiet;
        }
        match verbose {
            0 => VerbosityLevel::Normal,
            1 => VerbosityLevel::Verbose,
            _ => VerbosityLevel::VeryVerbose,
        }
    }

    /// Default filter directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "benchtrail=info,warn",
            VerbosityLevel::VeryVerbose => "benchtrail=debug,info",
        }
    }
}

/// Install the stderr subscriber; `BENCHTRAIL_LOG` wins over the flags
pub fn init_logging(level: VerbosityLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let debug = level >= VerbosityLevel::VeryVerbose;
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_file(debug)
        .with_line_number(debug)
        .with_writer(std::io::stderr)
        .try_init();
}
