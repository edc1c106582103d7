//! Chunked bulk writes into the destination index.
//!
//! Documents are buffered up to `chunk_size` and sent as one bulk
//! request of `create` actions. Rejected items are collected in the
//! [`WriteReport`]; a failed request aborts the write.

use tracing::{debug, warn};

use reindex_backend::SearchBackend;
use reindex_types::Document;

use crate::error::WriteError;

/// A document rejected inside an otherwise successful bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    /// Zero-based ordinal of the document in the whole stream
    pub position: u64,
    pub reason: String,
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Documents the engine accepted
    pub documents_written: u64,
    /// Bulk requests sent
    pub chunks: u64,
    pub failures: Vec<BulkItemFailure>,
}

impl WriteReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents sent, accepted or not.
    pub fn documents_sent(&self) -> u64 {
        self.documents_written + self.failures.len() as u64
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct BulkWriter<'a> {
    backend: &'a dyn SearchBackend,
    index: String,
    chunk_size: usize,
    buffer: Vec<Document>,
    /// Stream ordinal of the first buffered document
    position: u64,
    report: WriteReport,
}

impl<'a> BulkWriter<'a> {
    /// A `chunk_size` of 0 is treated as 1.
    pub fn new(backend: &'a dyn SearchBackend, index: impl Into<String>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            backend,
            index: index.into(),
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            position: 0,
            report: WriteReport::new(),
        }
    }

    /// Buffer a document, sending the chunk once it is full.
    pub async fn push(&mut self, document: Document) -> Result<(), WriteError> {
        self.buffer.push(document);
        if self.buffer.len() >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send whatever is buffered as one chunk.
    pub async fn flush(&mut self) -> Result<(), WriteError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let documents = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        let count = documents.len() as u64;
        let chunk = self.report.chunks;

        let response = self
            .backend
            .bulk_create(&self.index, documents)
            .await
            .map_err(|source| WriteError::Chunk { chunk, source })?;

        let mut rejected = 0u64;
        for (offset, reason) in response.failures() {
            let position = self.position + offset as u64;
            warn!(index = %self.index, position, reason = %reason, "Bulk item rejected");
            self.report.failures.push(BulkItemFailure {
                position,
                reason: reason.to_string(),
            });
            rejected += 1;
        }

        self.report.chunks += 1;
        self.report.documents_written += count.saturating_sub(rejected);
        self.position += count;
        debug!(
            index = %self.index,
            chunk,
            documents = count,
            rejected,
            "Bulk chunk written"
        );
        Ok(())
    }

    /// Documents waiting for the next chunk.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn report(&self) -> &WriteReport {
        &self.report
    }

    /// Flush the remainder and return the report.
    pub async fn finish(mut self) -> Result<WriteReport, WriteError> {
        self.flush().await?;
        Ok(self.report)
    }

    /// Write every document of `documents`, then finish.
    pub async fn write_all<I>(mut self, documents: I) -> Result<WriteReport, WriteError>
    where
        I: IntoIterator<Item = Document>,
    {
        for document in documents {
            self.push(document).await?;
        }
        self.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_backend::{BackendError, InMemoryBackend};
    use serde_json::json;

    fn documents(values: Vec<serde_json::Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|value| Document::Nested(value.as_object().cloned().unwrap_or_default()))
            .collect()
    }

    async fn destination() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend
            .create_index(
                "dest",
                json!({"mappings": {"properties": {"n": {"type": "long"}}}}),
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_chunk_count() {
        let backend = destination().await;
        let docs = documents((0..10).map(|n| json!({"n": n})).collect());
        let report = BulkWriter::new(&backend, "dest", 4)
            .write_all(docs)
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.documents_written, 10);
        assert_eq!(backend.bulk_call_sizes(), vec![4, 4, 2]);
        assert!(backend.bulk_call_sizes().iter().all(|size| *size <= 4));
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort() {
        let backend = destination().await;
        let docs = documents(vec![
            json!({"n": 1}),
            json!({"n": 2}),
            json!({"n": 3}),
            json!({"n": "bad"}),
            json!({"n": 5}),
        ]);
        let report = BulkWriter::new(&backend, "dest", 2)
            .write_all(docs)
            .await
            .unwrap();

        assert_eq!(report.documents_written, 4);
        assert_eq!(report.documents_sent(), 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].position, 3);
        assert!(report.failures[0].reason.contains("mapper_parsing_exception"));
        assert_eq!(backend.documents("dest").len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let backend = destination().await;
        backend.fail_next_bulk();
        let mut writer = BulkWriter::new(&backend, "dest", 2);
        writer.push(documents(vec![json!({"n": 1})]).remove(0)).await.unwrap();
        assert_eq!(writer.buffered(), 1);

        let result = writer.push(documents(vec![json!({"n": 2})]).remove(0)).await;
        assert!(matches!(
            result,
            Err(WriteError::Chunk {
                chunk: 0,
                source: BackendError::Transport(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let backend = destination().await;
        let report = BulkWriter::new(&backend, "dest", 3)
            .write_all(Vec::new())
            .await
            .unwrap();
        assert_eq!(report, WriteReport::default());
        assert!(backend.bulk_call_sizes().is_empty());
    }

    mod proptest_chunking {
        use super::*;
        use proptest::prelude::*;

        fn write_numbers(total: usize, chunk_size: usize) -> (WriteReport, Vec<usize>) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let backend = destination().await;
                let docs = documents((0..total).map(|n| json!({"n": n})).collect());
                let report = BulkWriter::new(&backend, "dest", chunk_size)
                    .write_all(docs)
                    .await
                    .unwrap();
                (report, backend.bulk_call_sizes())
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_chunks_are_bounded(total in 0usize..=60, chunk_size in 1usize..=12) {
                let (report, sizes) = write_numbers(total, chunk_size);

                prop_assert_eq!(report.chunks as usize, total.div_ceil(chunk_size));
                prop_assert_eq!(report.documents_written as usize, total);
                prop_assert_eq!(sizes.len(), total.div_ceil(chunk_size));
                prop_assert!(sizes.iter().all(|size| *size <= chunk_size));
                prop_assert_eq!(sizes.iter().sum::<usize>(), total);
            }
        }
    }
}
