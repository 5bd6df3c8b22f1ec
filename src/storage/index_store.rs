//! Search-index document store backend
//!
//! Every object becomes one Tantivy document in one of two logical
//! collections (`blobs`, `manifests`). Documents are keyed by
//! `<collection>/<digest>` and carry the content wrapped in a JSON envelope:
//!
//! ```text
//! {"content": "<base64 bytes>"}
//! ```
//!
//! Writes are serialized on the index writer: look the key up, add the
//! document only when it is missing, commit, reload the reader. Because the
//! reader is reloaded before the writer lock is released, the lookup always
//! sees every earlier commit, which gives create-if-absent semantics.

use crate::error::{RegistryError, Result};
use crate::storage::{Digest, ObjectBackend, ObjectKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tantivy::{
    collector::TopDocs,
    doc,
    query::TermQuery,
    schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tracing::{debug, info, warn};

/// Smallest writer budget Tantivy accepts per indexing thread.
pub const MIN_WRITER_HEAP_SIZE: usize = 15_000_000;

/// JSON envelope around stored bytes.
#[derive(Debug, Serialize, Deserialize)]
struct ContentEnvelope {
    #[serde(with = "base64_content")]
    content: Vec<u8>,
}

mod base64_content {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy)]
struct ObjectFields {
    key: Field,
    collection: Field,
    envelope: Field,
}

impl ObjectFields {
    fn schema() -> (Schema, Self) {
        let mut builder = Schema::builder();
        // raw (untokenized) fields for exact key matching
        let key = builder.add_text_field("key", STRING | STORED);
        let collection = builder.add_text_field("collection", STRING | STORED);
        let envelope = builder.add_text_field("envelope", STORED);
        (
            builder.build(),
            Self {
                key,
                collection,
                envelope,
            },
        )
    }
}

struct IndexInner {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: ObjectFields,
}

impl IndexInner {
    fn document_key(kind: ObjectKind, digest: &Digest) -> String {
        format!("{}/{}", kind.collection(), digest)
    }

    fn find_envelope(&self, key: &str) -> Result<Option<String>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.key, key),
            IndexRecordOption::Basic,
        );
        let hits = searcher.search(&query, &TopDocs::with_limit(1).order_by_score())?;

        let Some((_, address)) = hits.into_iter().next() else {
            return Ok(None);
        };
        let document: TantivyDocument = searcher.doc(address)?;
        let envelope = document
            .get_first(self.fields.envelope)
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                RegistryError::internal(format!("index document {} has no envelope", key))
            })?;
        Ok(Some(envelope.to_string()))
    }

    fn create_if_absent(&self, kind: ObjectKind, digest: &Digest, content: Vec<u8>) -> Result<bool> {
        let key = Self::document_key(kind, digest);
        let mut writer = self.writer.lock();

        if self.find_envelope(&key)?.is_some() {
            return Ok(false);
        }

        let envelope = serde_json::to_string(&ContentEnvelope { content }).map_err(|e| {
            RegistryError::internal(format!("failed to encode envelope for {}: {}", key, e))
        })?;
        writer.add_document(doc!(
            self.fields.key => key.as_str(),
            self.fields.collection => kind.collection(),
            self.fields.envelope => envelope
        ))?;
        commit_or_rollback(&mut writer)?;
        self.reader.reload()?;

        debug!(key = %key, "Indexed object document");
        Ok(true)
    }

    fn read(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<Vec<u8>>> {
        let key = Self::document_key(kind, digest);
        let Some(envelope) = self.find_envelope(&key)? else {
            return Ok(None);
        };

        let envelope: ContentEnvelope = serde_json::from_str(&envelope).map_err(|e| {
            RegistryError::decode_error(format!("malformed envelope for {}: {}", key, e))
        })?;
        Ok(Some(envelope.content))
    }
}

/// Commit pending documents, or drop them if the commit fails so a later
/// commit cannot persist them.
fn commit_or_rollback(writer: &mut IndexWriter) -> Result<()> {
    if let Err(e) = writer.commit() {
        warn!(error = %e, "Index commit failed, rolling back pending documents");
        writer.rollback()?;
        return Err(e.into());
    }
    Ok(())
}

/// Index-store backend built on a Tantivy index.
#[derive(Clone)]
pub struct IndexStoreBackend {
    inner: Arc<IndexInner>,
}

impl std::fmt::Debug for IndexStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStoreBackend").finish_non_exhaustive()
    }
}

impl IndexStoreBackend {
    /// Open the index in `path`, creating it when it does not exist yet.
    pub fn open(path: &Path, writer_heap_size: usize) -> Result<Self> {
        let (schema, fields) = ObjectFields::schema();

        // meta.json marks an existing Tantivy index
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            std::fs::create_dir_all(path).map_err(|e| {
                RegistryError::io_error(
                    format!("Failed to create index directory: {}", e),
                    Some(path.to_path_buf()),
                )
            })?;
            Index::create_in_dir(path, schema)?
        };

        info!(path = %path.display(), heap_size = writer_heap_size, "Index store opened");
        Self::from_index(index, fields, writer_heap_size)
    }

    /// Index held entirely in memory.
    pub fn in_memory() -> Result<Self> {
        let (schema, fields) = ObjectFields::schema();
        Self::from_index(Index::create_in_ram(schema), fields, MIN_WRITER_HEAP_SIZE)
    }

    fn from_index(index: Index, fields: ObjectFields, writer_heap_size: usize) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, writer_heap_size.max(MIN_WRITER_HEAP_SIZE))?;

        Ok(Self {
            inner: Arc::new(IndexInner {
                reader,
                writer: Mutex::new(writer),
                fields,
            }),
        })
    }
}

#[async_trait]
impl ObjectBackend for IndexStoreBackend {
    async fn create_if_absent(
        &self,
        kind: ObjectKind,
        digest: &Digest,
        content: &[u8],
    ) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let digest = digest.clone();
        let content = content.to_vec();
        tokio::task::spawn_blocking(move || inner.create_if_absent(kind, &digest, content)).await?
    }

    async fn read(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<Vec<u8>>> {
        let inner = Arc::clone(&self.inner);
        let digest = digest.clone();
        tokio::task::spawn_blocking(move || inner.read(kind, &digest)).await?
    }

    fn name(&self) -> &'static str {
        "index"
    }
}
