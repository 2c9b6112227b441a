//! Module registry
//!
//! Holds one store / draft slot / orchestrator triad per [`ModuleKind`] and
//! exposes a single action surface keyed by module. Modules share nothing
//! but the persistence gateway, the generator client and the event channel.

mod events;

pub use events::RegistryEvent;

use crate::error::{Error, Result};
use crate::generation::{
    ContentGeneratorClient, GenerationOrchestrator, GenerationState, PendingGeneration,
};
use crate::persistence::PersistenceGateway;
use crate::revisions::{
    ActiveView, BaselineTicket, Content, DraftStaging, GenerationScope, LocalDraft, ModuleKind,
    Revision, RevisionOrigin, RevisionStore,
};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 256;

/// Read-only view of one module, for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    pub module: ModuleKind,
    pub active_revision_id: Option<String>,
    /// Content of the active revision, or the baseline once loaded
    pub active_content: Option<Content>,
    pub revisions: Vec<Revision>,
    pub is_generating: bool,
    pub has_draft: bool,
    pub draft_dirty: bool,
    pub generation_state: GenerationState,
    pub last_error: Option<String>,
}

/// Generation settings shared by every module
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Abandon generator calls after this long
    pub timeout: Option<Duration>,
    /// Fixed auto-label prefix instead of the module title
    pub label_prefix: Option<String>,
}

struct ModuleHandle {
    store: Arc<RevisionStore>,
    drafts: DraftStaging,
    generator: Arc<GenerationOrchestrator>,
}

/// Per-module revision, draft and generation state
pub struct ModuleRegistry {
    modules: HashMap<ModuleKind, ModuleHandle>,
    persistence: Arc<dyn PersistenceGateway>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ModuleRegistry {
    /// Create a registry with default generation options
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        client: Arc<dyn ContentGeneratorClient>,
    ) -> Self {
        Self::with_options(persistence, client, GenerationOptions::default())
    }

    pub fn with_options(
        persistence: Arc<dyn PersistenceGateway>,
        client: Arc<dyn ContentGeneratorClient>,
        options: GenerationOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let modules = ModuleKind::ALL
            .iter()
            .map(|&module| {
                let drafts = DraftStaging::new(module);
                let store = Arc::new(RevisionStore::new(
                    module,
                    persistence.clone(),
                    drafts.clone(),
                ));
                let mut generator = GenerationOrchestrator::new(store.clone(), client.clone())
                    .with_timeout(options.timeout);
                if let Some(prefix) = &options.label_prefix {
                    generator = generator.with_label_prefix(prefix.clone());
                }
                let handle = ModuleHandle {
                    store,
                    drafts,
                    generator: Arc::new(generator),
                };
                (module, handle)
            })
            .collect();

        tracing::debug!(
            persistence = persistence.name(),
            generator = client.name(),
            "Module registry created"
        );

        Self {
            modules,
            persistence,
            events,
        }
    }

    fn handle(&self, module: ModuleKind) -> Result<&ModuleHandle> {
        self.modules
            .get(&module)
            .ok_or_else(|| Error::Internal(format!("module {} is not registered", module)))
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Receive change notifications; slow receivers skip old events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceGateway> {
        &self.persistence
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load a module's stored revisions and baseline.
    ///
    /// The pointer starts at baseline. Returns the number of revisions.
    pub async fn hydrate(&self, module: ModuleKind) -> Result<usize> {
        let handle = self.handle(module)?;
        let revisions = self.persistence.fetch_revisions(module).await?;
        let count = revisions.len();

        let ticket = handle.store.load(revisions).await;
        self.reload_baseline(handle, ticket).await?;

        tracing::info!(module = %module, revisions = count, "Hydrated module");
        self.emit(RegistryEvent::ActiveChanged {
            module,
            revision_id: None,
        });
        Ok(count)
    }

    /// Hydrate every module concurrently
    pub async fn hydrate_all(&self) -> Result<usize> {
        let counts = try_join_all(ModuleKind::ALL.iter().map(|&m| self.hydrate(m))).await?;
        Ok(counts.into_iter().sum())
    }

    /// Fetch baseline content for `ticket` and apply it unless superseded.
    ///
    /// Returns the content the module displays afterwards.
    async fn reload_baseline(
        &self,
        handle: &ModuleHandle,
        ticket: BaselineTicket,
    ) -> Result<Option<Content>> {
        let module = handle.store.module();
        match self.persistence.fetch_baseline(module).await {
            Ok(content) => {
                if handle.store.apply_baseline(ticket, content.clone()).await {
                    Ok(Some(content))
                } else {
                    Ok(handle.store.active_content().await)
                }
            }
            Err(Error::NotFound(_)) => {
                tracing::debug!(module = %module, "No baseline content stored");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// Revisions of a module, oldest first
    pub async fn list_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        Ok(self.handle(module)?.store.list().await)
    }

    /// Move the active pointer and return the content to display.
    ///
    /// `None` selects the baseline, which is fetched from persistence. A
    /// baseline fetch that loses to a later switch is dropped and the later
    /// switch's content is returned instead.
    pub async fn switch_revision(
        &self,
        module: ModuleKind,
        revision_id: Option<&str>,
    ) -> Result<Option<Content>> {
        let handle = self.handle(module)?;
        let discards = handle.drafts.discard_count();

        let view = handle.store.switch_revision(revision_id).await?;
        announce_discard(&self.events, &handle.drafts, discards);

        match view {
            ActiveView::Revision(revision) => {
                self.emit(RegistryEvent::ActiveChanged {
                    module,
                    revision_id: Some(revision.id),
                });
                Ok(Some(revision.content))
            }
            ActiveView::ReloadBaseline(ticket) => {
                self.emit(RegistryEvent::ActiveChanged {
                    module,
                    revision_id: None,
                });
                self.reload_baseline(handle, ticket).await
            }
        }
    }

    /// Store content as a new revision. Only `Generated` revisions become
    /// active.
    pub async fn create_revision(
        &self,
        module: ModuleKind,
        label: &str,
        content: Content,
        origin: RevisionOrigin,
    ) -> Result<Revision> {
        let handle = self.handle(module)?;
        let discards = handle.drafts.discard_count();
        let revision = handle
            .store
            .create_revision(label, content, origin, None)
            .await?;
        self.announce_created(&revision);
        announce_discard(&self.events, &handle.drafts, discards);
        Ok(revision)
    }

    /// Copy a revision into a new inactive one labelled `"<label> (copy)"`
    pub async fn duplicate_revision(&self, module: ModuleKind, revision_id: &str) -> Result<Revision> {
        let revision = self
            .handle(module)?
            .store
            .duplicate_revision(revision_id)
            .await?;
        self.announce_created(&revision);
        Ok(revision)
    }

    pub async fn rename_revision(
        &self,
        module: ModuleKind,
        revision_id: &str,
        new_label: &str,
    ) -> Result<Revision> {
        let revision = self
            .handle(module)?
            .store
            .rename_revision(revision_id, new_label)
            .await?;
        self.emit(RegistryEvent::RevisionRenamed {
            module,
            revision_id: revision.id.clone(),
            label: revision.label.clone(),
        });
        Ok(revision)
    }

    /// Delete a revision; returns `true` if it was active and the module
    /// fell back to its baseline.
    pub async fn delete_revision(&self, module: ModuleKind, revision_id: &str) -> Result<bool> {
        let handle = self.handle(module)?;
        let discards = handle.drafts.discard_count();
        let fallback = handle.store.delete_revision(revision_id).await?;
        self.emit(RegistryEvent::RevisionDeleted {
            module,
            revision_id: revision_id.to_string(),
        });
        announce_discard(&self.events, &handle.drafts, discards);

        let Some(ticket) = fallback else {
            return Ok(false);
        };
        self.emit(RegistryEvent::ActiveChanged {
            module,
            revision_id: None,
        });
        if let Err(e) = self.reload_baseline(handle, ticket).await {
            tracing::warn!(module = %module, error = %e, "Failed to reload baseline after delete");
        }
        Ok(true)
    }

    fn announce_created(&self, revision: &Revision) {
        self.emit(RegistryEvent::RevisionCreated {
            module: revision.module,
            revision_id: revision.id.clone(),
            label: revision.label.clone(),
        });
        if revision.origin.activates_on_create() {
            self.emit(RegistryEvent::ActiveChanged {
                module: revision.module,
                revision_id: Some(revision.id.clone()),
            });
        }
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    pub async fn record_edit(&self, module: ModuleKind, content: Content) -> Result<LocalDraft> {
        let handle = self.handle(module)?;
        let draft = handle.drafts.record_edit(&handle.store, content).await;
        if draft.edits == 1 {
            self.emit(RegistryEvent::DraftChanged {
                module,
                has_draft: true,
            });
        }
        Ok(draft)
    }

    /// Drop unsaved edits; returns whether there were any
    pub async fn discard_draft(&self, module: ModuleKind) -> Result<bool> {
        let discarded = self.handle(module)?.drafts.discard().await;
        if discarded {
            self.emit(RegistryEvent::DraftChanged {
                module,
                has_draft: false,
            });
        }
        Ok(discarded)
    }

    /// Save the dirty draft as a manual revision
    pub async fn promote_draft(&self, module: ModuleKind, label: &str) -> Result<Revision> {
        let handle = self.handle(module)?;
        let revision = handle.drafts.promote(&handle.store, label).await?;
        self.announce_created(&revision);
        self.emit(RegistryEvent::DraftChanged {
            module,
            has_draft: handle.drafts.has_draft().await,
        });
        Ok(revision)
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Generate new content and make it the active revision
    pub async fn generate(&self, module: ModuleKind, scope: GenerationScope) -> Result<Revision> {
        let handle = self.handle(module)?;
        let pending = handle.generator.begin(scope)?;
        run_generation(
            handle.generator.clone(),
            handle.drafts.clone(),
            self.events.clone(),
            pending,
        )
        .await
    }

    /// Start a generation in the background.
    ///
    /// The busy check runs before this returns, so a second call for the
    /// same module fails with `Busy` even if the first task has not been
    /// polled yet.
    pub fn spawn_generate(
        &self,
        module: ModuleKind,
        scope: GenerationScope,
    ) -> Result<JoinHandle<Result<Revision>>> {
        let handle = self.handle(module)?;
        let pending = handle.generator.begin(scope)?;
        Ok(tokio::spawn(run_generation(
            handle.generator.clone(),
            handle.drafts.clone(),
            self.events.clone(),
            pending,
        )))
    }

    /// Cancel a module's in-flight generation
    pub fn cancel_generation(&self, module: ModuleKind) -> Result<bool> {
        Ok(self.handle(module)?.generator.cancel())
    }

    pub fn is_generating(&self, module: ModuleKind) -> Result<bool> {
        Ok(self.handle(module)?.generator.is_generating())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release a module: cancel its pending generation and drop its draft.
    ///
    /// Returns whether a generation was cancelled.
    pub async fn teardown(&self, module: ModuleKind) -> Result<bool> {
        let handle = self.handle(module)?;
        let cancelled = handle.generator.cancel();
        if handle.drafts.discard().await {
            self.emit(RegistryEvent::DraftChanged {
                module,
                has_draft: false,
            });
        }
        tracing::debug!(module = %module, cancelled, "Module torn down");
        Ok(cancelled)
    }

    /// Tear down every module; returns how many generations were cancelled
    pub async fn teardown_all(&self) -> Result<usize> {
        let mut cancelled = 0;
        for module in ModuleKind::ALL {
            if self.teardown(module).await? {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled pending generations");
        }
        Ok(cancelled)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub async fn snapshot(&self, module: ModuleKind) -> Result<ModuleSnapshot> {
        let handle = self.handle(module)?;
        let view = handle.store.view().await;
        let draft = handle.drafts.current().await;

        Ok(ModuleSnapshot {
            module,
            active_revision_id: view.active_revision_id,
            active_content: view.active_content,
            revisions: view.revisions,
            is_generating: handle.generator.is_generating(),
            has_draft: draft.is_some(),
            draft_dirty: draft.map(|d| d.dirty).unwrap_or(false),
            generation_state: handle.generator.state(),
            last_error: handle.generator.last_error(),
        })
    }

    /// Snapshots of every module, in [`ModuleKind::ALL`] order
    pub async fn snapshots(&self) -> Result<Vec<ModuleSnapshot>> {
        let mut snapshots = Vec::with_capacity(ModuleKind::ALL.len());
        for module in ModuleKind::ALL {
            snapshots.push(self.snapshot(module).await?);
        }
        Ok(snapshots)
    }
}

/// Announce a cleared draft if the slot discarded one since `before`
fn announce_discard(
    events: &broadcast::Sender<RegistryEvent>,
    drafts: &DraftStaging,
    before: u64,
) {
    if drafts.discard_count() != before {
        let _ = events.send(RegistryEvent::DraftChanged {
            module: drafts.module(),
            has_draft: false,
        });
    }
}

/// Run an admitted generation and announce its outcome
async fn run_generation(
    generator: Arc<GenerationOrchestrator>,
    drafts: DraftStaging,
    events: broadcast::Sender<RegistryEvent>,
    pending: PendingGeneration,
) -> Result<Revision> {
    let module = generator.module();
    let request_id = pending.request().id.clone();
    let _ = events.send(RegistryEvent::GenerationStarted {
        module,
        request_id: request_id.clone(),
    });

    let discards = drafts.discard_count();
    match generator.run(pending).await {
        Ok(revision) => {
            let _ = events.send(RegistryEvent::RevisionCreated {
                module,
                revision_id: revision.id.clone(),
                label: revision.label.clone(),
            });
            let _ = events.send(RegistryEvent::ActiveChanged {
                module,
                revision_id: Some(revision.id.clone()),
            });
            announce_discard(&events, &drafts, discards);
            let _ = events.send(RegistryEvent::GenerationFinished {
                module,
                request_id,
                revision_id: revision.id.clone(),
            });
            Ok(revision)
        }
        Err(e) => {
            let _ = events.send(RegistryEvent::GenerationFailed {
                module,
                request_id,
                error: e.to_string(),
            });
            Err(e)
        }
    }
}
