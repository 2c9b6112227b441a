//! Durable storage for revisions and module baselines
//!
//! `PersistenceGateway` is the only seam through which revision state leaves
//! the process. Two implementations ship with the crate:
//!
//! - [`InMemoryPersistence`]: ephemeral sessions and tests
//! - [`FilePersistence`]: JSON files under a per-project directory

mod file;
mod memory;

pub use file::FilePersistence;
pub use memory::InMemoryPersistence;

use crate::error::Result;
use crate::revisions::{Content, ModuleKind, Revision};
use async_trait::async_trait;

/// Async CRUD over the remote store for revisions and baseline content.
///
/// Failures (`Error::Network`, `Error::NotFound`) are passed through to the
/// caller unchanged.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// All stored revisions of a module, oldest first
    async fn fetch_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>>;

    /// Persist a newly created revision
    async fn create(&self, module: ModuleKind, revision: &Revision) -> Result<()>;

    /// Change a stored revision's label
    async fn rename(&self, module: ModuleKind, id: &str, label: &str) -> Result<()>;

    /// Remove a stored revision
    async fn delete(&self, module: ModuleKind, id: &str) -> Result<()>;

    /// The module's non-revisioned working content
    async fn fetch_baseline(&self, module: ModuleKind) -> Result<Content>;

    /// Backend name (used in logs)
    fn name(&self) -> &str;
}
