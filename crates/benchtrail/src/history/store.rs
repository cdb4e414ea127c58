//! History store: load, append and optimistic persist

use chrono::Utc;
use tracing::{debug, info, warn};

use super::backend::StorageBackend;
use super::document::{AppendReceipt, HistoryDocument};
use super::wire::DocumentCodec;
use super::RevisionToken;
use crate::error::{AppendError, PersistError, StorageResult};
use crate::models::MeasurementBatch;

/// Owner of the persisted [`HistoryDocument`]
///
/// Holds no state between calls besides its backend handle; concurrency is
/// handled entirely through the revision token passed back to `persist`.
pub struct HistoryStore<B> {
    backend: B,
    codec: DocumentCodec,
    max_items: Option<usize>,
}

impl<B: StorageBackend> HistoryStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            codec: DocumentCodec::default(),
            max_items: None,
        }
    }

    pub fn with_codec(mut self, codec: DocumentCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Keep at most `max_items` runs per suite after each append
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    /// Read the current document and the revision it was read at
    ///
    /// A store that was never written yields an empty document.
    pub async fn load(&self) -> StorageResult<(HistoryDocument, RevisionToken)> {
        let snapshot = self.backend.read().await?;
        let doc = match &snapshot.content {
            Some(content) => self.codec.decode(content)?,
            None => {
                info!(location = %self.backend.describe(), "No history yet, starting a new document");
                HistoryDocument::default()
            }
        };
        debug!(
            location = %self.backend.describe(),
            token = %snapshot.token,
            suites = doc.entries.len(),
            "Loaded history"
        );
        Ok((doc, snapshot.token))
    }

    /// Fold one run into the in-memory document
    pub fn append(
        &self,
        doc: &mut HistoryDocument,
        batch: MeasurementBatch,
    ) -> Result<AppendReceipt, AppendError> {
        let commit = batch.commit.short_id().to_string();
        let receipt = doc.append(batch)?;

        for change in &receipt.unit_changes {
            warn!(
                suite = %receipt.suite,
                bench = %change.name,
                previous = %change.previous,
                current = %change.current,
                "Benchmark unit changed"
            );
        }
        if let Some(max_items) = self.max_items {
            let dropped = doc.truncate(&receipt.suite, max_items);
            if dropped > 0 {
                debug!(suite = %receipt.suite, dropped, "Trimmed oldest runs");
            }
        }
        doc.last_update = Utc::now().timestamp_millis();

        info!(suite = %receipt.suite, commit = %commit, runs = receipt.runs, "Appended run");
        Ok(receipt)
    }

    /// Write the document if the store is still at `expected`
    pub async fn persist(
        &self,
        doc: &HistoryDocument,
        expected: &RevisionToken,
    ) -> Result<RevisionToken, PersistError> {
        let content = self.codec.encode(doc)?;
        let token = self.backend.write(content, expected).await?;
        info!(location = %self.backend.describe(), token = %token, "Persisted history");
        Ok(token)
    }
}
