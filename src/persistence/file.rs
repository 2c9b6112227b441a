//! File-backed persistence with JSON documents
//!
//! Directory layout:
//! ```text
//! ~/.docspace/projects/<project>/
//! ├── notes/
//! │   ├── revisions.json
//! │   └── baseline.json
//! ├── quiz/
//! │   └── ...
//! └── ...
//! ```
//!
//! Each `revisions.json` holds the module's full ordered list. Writes go to a
//! temporary file first and are renamed into place.

use super::PersistenceGateway;
use crate::error::{Error, Result};
use crate::revisions::{Content, ModuleKind, Revision};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const REVISIONS_FILE: &str = "revisions.json";
const BASELINE_FILE: &str = "baseline.json";

/// Revision store backed by JSON files under a project directory
pub struct FilePersistence {
    base_dir: PathBuf,
    /// Serializes read-modify-write cycles on `revisions.json`
    write_lock: Mutex<()>,
}

impl FilePersistence {
    /// Open (and create if needed) a project directory
    pub async fn new(base_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Default project directory (~/.docspace/projects/<project>/)
    pub fn default_dir(project_id: &str) -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docspace")
            .join("projects")
            .join(project_id)
    }

    /// Project directory this backend writes to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write a module's baseline content
    pub async fn set_baseline(&self, module: ModuleKind, content: &Content) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.module_dir(module).await?.join(BASELINE_FILE);
        write_json_atomic(&path, content).await
    }

    fn module_path(&self, module: ModuleKind) -> PathBuf {
        self.base_dir.join(module.to_string())
    }

    async fn module_dir(&self, module: ModuleKind) -> Result<PathBuf> {
        let dir = self.module_path(module);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn read_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        let path = self.module_path(module).join(REVISIONS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_revisions(&self, module: ModuleKind, revisions: &[Revision]) -> Result<()> {
        let path = self.module_dir(module).await?.join(REVISIONS_FILE);
        write_json_atomic(&path, &revisions).await
    }
}

#[async_trait]
impl PersistenceGateway for FilePersistence {
    async fn fetch_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        self.read_revisions(module).await
    }

    async fn create(&self, module: ModuleKind, revision: &Revision) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut revisions = self.read_revisions(module).await?;
        if revisions.iter().any(|r| r.id == revision.id) {
            return Err(Error::Validation(format!(
                "revision '{}' already exists in {}",
                revision.id, module
            )));
        }
        revisions.push(revision.clone());
        self.write_revisions(module, &revisions).await
    }

    async fn rename(&self, module: ModuleKind, id: &str, label: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut revisions = self.read_revisions(module).await?;
        let revision = revisions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, module)))?;
        revision.label = label.to_string();
        self.write_revisions(module, &revisions).await
    }

    async fn delete(&self, module: ModuleKind, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut revisions = self.read_revisions(module).await?;
        let before = revisions.len();
        revisions.retain(|r| r.id != id);
        if revisions.len() == before {
            return Err(Error::NotFound(format!("revision '{}' in {}", id, module)));
        }
        self.write_revisions(module, &revisions).await
    }

    async fn fetch_baseline(&self, module: ModuleKind) -> Result<Content> {
        let path = self.module_path(module).join(BASELINE_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("baseline for {}", module)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Serialize to `<path>.tmp`, then rename over `path`
async fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
