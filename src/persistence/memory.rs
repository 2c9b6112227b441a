//! In-memory persistence backend

use super::PersistenceGateway;
use crate::error::{Error, Result};
use crate::revisions::{Content, ModuleKind, Revision};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store, lost on exit
pub struct InMemoryPersistence {
    revisions: Arc<RwLock<HashMap<ModuleKind, Vec<Revision>>>>,
    baselines: Arc<RwLock<HashMap<ModuleKind, Content>>>,
}

impl InMemoryPersistence {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            revisions: Arc::new(RwLock::new(HashMap::new())),
            baselines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set a module's baseline content
    pub async fn set_baseline(&self, module: ModuleKind, content: Content) {
        self.baselines.write().await.insert(module, content);
    }

    /// Number of stored revisions for a module
    pub async fn count(&self, module: ModuleKind) -> usize {
        self.revisions
            .read()
            .await
            .get(&module)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryPersistence {
    async fn fetch_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        Ok(self
            .revisions
            .read()
            .await
            .get(&module)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, module: ModuleKind, revision: &Revision) -> Result<()> {
        self.revisions
            .write()
            .await
            .entry(module)
            .or_default()
            .push(revision.clone());
        Ok(())
    }

    async fn rename(&self, module: ModuleKind, id: &str, label: &str) -> Result<()> {
        let mut map = self.revisions.write().await;
        let revision = map
            .get_mut(&module)
            .and_then(|list| list.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, module)))?;
        revision.label = label.to_string();
        Ok(())
    }

    async fn delete(&self, module: ModuleKind, id: &str) -> Result<()> {
        let mut map = self.revisions.write().await;
        let list = map
            .get_mut(&module)
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, module)))?;
        let before = list.len();
        list.retain(|r| r.id != id);
        if list.len() == before {
            return Err(Error::NotFound(format!("revision '{}' in {}", id, module)));
        }
        Ok(())
    }

    async fn fetch_baseline(&self, module: ModuleKind) -> Result<Content> {
        self.baselines
            .read()
            .await
            .get(&module)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("baseline for {}", module)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
