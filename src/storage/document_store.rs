use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, sync::Mutex};

use super::StoreError;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Collection-scoped document CRUD with equality-filter queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document under a store-assigned id.
    async fn insert(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Writes `data` under `id` only if no such document exists. Returns
    /// whether the document was created.
    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<bool, StoreError>;

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// One JSON file per document: `<root>/<collection>/<id>.json`.
#[derive(Debug)]
pub struct JsonFileDocumentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileDocumentStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        check_segment(collection)?;
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_segment(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.json")))
    }

    async fn write_document(&self, path: &Path, data: &Value) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn check_segment(segment: &str) -> Result<(), StoreError> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(segment.to_string()))
    }
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn insert(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = self.document_path(collection, &id)?;
        let _guard = self.write_lock.lock().await;
        self.write_document(&path, &data).await?;
        Ok(id)
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<bool, StoreError> {
        let path = self.document_path(collection, id)?;
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.write_document(&path, &data).await?;
        Ok(true)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let path = self.document_path(collection, id)?;
        let _guard = self.write_lock.lock().await;
        self.write_document(&path, &data).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let path = self.document_path(collection, id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let data = serde_json::from_slice(&bytes)?;
        Ok(Some(Document {
            id: id.to_string(),
            data,
        }))
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let dir_path = self.collection_dir(collection)?;
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                // deleted between listing and reading
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let data: Value = match serde_json::from_slice(&bytes) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(collection, id, error = %err, "skipping unreadable document");
                    continue;
                }
            };
            if data.get(field).and_then(Value::as_str) == Some(value) {
                documents.push(Document {
                    id: id.to_string(),
                    data,
                });
            }
        }
        Ok(documents)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let path = self.document_path(collection, id)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
