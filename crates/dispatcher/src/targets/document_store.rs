//! DocumentStoreTarget - stores records as JSON documents in sled

use std::path::PathBuf;

use tracing::{debug, instrument};
use validator::Validate;

use contracts::{ContractError, DocumentStoreConfig, LogRecord, Target};

/// Target inserting every record into a sled tree.
///
/// Documents are keyed by a big-endian id from `Db::generate_id`, so
/// iteration order is insertion order. Failures propagate, a failing store
/// gets suspended by the dispatcher.
pub struct DocumentStoreTarget {
    name: String,
    path: PathBuf,
    db: sled::Db,
    collection: sled::Tree,
}

impl DocumentStoreTarget {
    pub fn build(name: impl Into<String>, config: &DocumentStoreConfig) -> Result<Self, ContractError> {
        let name = name.into();
        config.validate()?;

        let path = PathBuf::from(&config.connection).join(&config.database);
        let db = sled::open(&path).map_err(|e| {
            ContractError::target_build(&name, format!("cannot open {}: {e}", path.display()))
        })?;
        let collection = db.open_tree(&config.collection).map_err(|e| {
            ContractError::target_build(&name, format!("cannot open collection '{}': {e}", config.collection))
        })?;

        debug!(target_name = %name, path = %path.display(), "Document store opened");
        Ok(Self {
            name,
            path,
            db,
            collection,
        })
    }

    /// The newest `n` documents, newest first
    pub fn recent(&self, n: usize) -> Result<Vec<LogRecord>, ContractError> {
        self.collection
            .iter()
            .rev()
            .take(n)
            .map(|entry| {
                let (_, doc) = entry.map_err(|e| self.write_error(e))?;
                serde_json::from_slice(&doc).map_err(|e| self.write_error(e))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    fn write_error(&self, e: impl std::fmt::Display) -> ContractError {
        ContractError::target_write(&self.name, e.to_string())
    }
}

impl Target for DocumentStoreTarget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "document_store_target_log", skip_all, fields(target_name = %self.name))]
    async fn log(&mut self, record: &LogRecord) -> Result<(), ContractError> {
        let id = self.db.generate_id().map_err(|e| self.write_error(e))?;
        let doc = serde_json::to_vec(record).map_err(|e| self.write_error(e))?;
        self.collection
            .insert(id.to_be_bytes(), doc)
            .map_err(|e| self.write_error(e))?;
        Ok(())
    }

    #[instrument(name = "document_store_target_stop", skip_all, fields(target_name = %self.name))]
    async fn stop(&mut self) -> Result<(), ContractError> {
        let db = self.db.clone();
        let flushed = tokio::task::spawn_blocking(move || db.flush())
            .await
            .map_err(|e| ContractError::target_stop(&self.name, e.to_string()))?
            .map_err(|e| ContractError::target_stop(&self.name, e.to_string()))?;
        debug!(
            target_name = %self.name,
            path = %self.path.display(),
            bytes = flushed,
            "Document store flushed"
        );
        Ok(())
    }
}
