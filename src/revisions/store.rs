//! Per-module revision store
//!
//! Owns the ordered revision list and the active pointer of one module. All
//! mutations take the store's write lock, so two mutations of the same module
//! never interleave; persistence is awaited under that lock and the in-memory
//! list only changes after the gateway acknowledged.
//!
//! ## Pointer ordering
//!
//! Every pointer change is issued a ticket from a per-module counter at call
//! time. A switch whose ticket is older than the last applied one is
//! superseded, and a baseline reload is only applied while its ticket is
//! still the last applied pointer change. The content shown after a switch
//! therefore always follows the most recent call, not the slowest completion.

use super::draft::DraftStaging;
use super::types::{
    normalize_label, ActiveView, BaselineTicket, Content, GenerationScope, ModuleKind, Revision,
    RevisionOrigin,
};
use crate::error::{Error, Result};
use crate::persistence::PersistenceGateway;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Mutable state of one module's timeline
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    revisions: Vec<Revision>,
    active: Option<String>,
    /// Last baseline content loaded for this module
    baseline: Option<Content>,
    /// Ticket of the last applied pointer change
    applied_ticket: u64,
}

impl StoreState {
    pub(crate) fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn find(&self, id: &str) -> Option<&Revision> {
        self.revisions.iter().find(|r| r.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.revisions.iter().position(|r| r.id == id)
    }

    fn current_view(&self) -> ActiveView {
        match self.active.as_deref().and_then(|id| self.find(id)) {
            Some(revision) => ActiveView::Revision(revision.clone()),
            None => ActiveView::ReloadBaseline(BaselineTicket(self.applied_ticket)),
        }
    }

    fn active_content(&self) -> Option<Content> {
        match self.active.as_deref() {
            Some(id) => self.find(id).map(|r| r.content.clone()),
            None => self.baseline.clone(),
        }
    }
}

/// Consistent read of a store, taken under a single lock
#[derive(Debug, Clone)]
pub struct StoreView {
    pub revisions: Vec<Revision>,
    pub active_revision_id: Option<String>,
    pub active_content: Option<Content>,
}

/// Revision timeline of a single module
pub struct RevisionStore {
    module: ModuleKind,
    gateway: Arc<dyn PersistenceGateway>,
    drafts: DraftStaging,
    state: Arc<RwLock<StoreState>>,
    tickets: AtomicU64,
}

impl RevisionStore {
    /// Create an empty store. `drafts` is the module's draft slot, cleared on
    /// every pointer change.
    pub fn new(
        module: ModuleKind,
        gateway: Arc<dyn PersistenceGateway>,
        drafts: DraftStaging,
    ) -> Self {
        Self {
            module,
            gateway,
            drafts,
            state: Arc::new(RwLock::new(StoreState::default())),
            tickets: AtomicU64::new(0),
        }
    }

    /// Module this store belongs to
    pub fn module(&self) -> ModuleKind {
        self.module
    }

    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().await
    }

    fn issue_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All revisions, oldest first
    pub async fn list(&self) -> Vec<Revision> {
        self.state.read().await.revisions.clone()
    }

    /// Look up a revision by id
    pub async fn get(&self, id: &str) -> Option<Revision> {
        self.state.read().await.find(id).cloned()
    }

    /// Number of revisions
    pub async fn len(&self) -> usize {
        self.state.read().await.revisions.len()
    }

    /// Whether the module has no revisions
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.revisions.is_empty()
    }

    /// Active revision id (`None` = baseline)
    pub async fn active_revision_id(&self) -> Option<String> {
        self.state.read().await.active.clone()
    }

    /// Content currently displayed: the active revision's, or the last loaded
    /// baseline
    pub async fn active_content(&self) -> Option<Content> {
        self.state.read().await.active_content()
    }

    /// List, pointer and content in one consistent read
    pub async fn view(&self) -> StoreView {
        let state = self.state.read().await;
        StoreView {
            revisions: state.revisions.clone(),
            active_revision_id: state.active.clone(),
            active_content: state.active_content(),
        }
    }

    /// Next unused `"<prefix> v<N>"` label, N starting at list length + 1
    pub async fn next_auto_label(&self, prefix: &str) -> String {
        let state = self.state.read().await;
        let mut n = state.revisions.len() + 1;
        loop {
            let label = format!("{} v{}", prefix, n);
            if !state.revisions.iter().any(|r| r.label == label) {
                return label;
            }
            n += 1;
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Replace the timeline with revisions loaded from persistence.
    ///
    /// Resets the pointer to baseline and drops any draft. Revisions that
    /// belong to another module are skipped.
    pub async fn load(&self, revisions: Vec<Revision>) -> BaselineTicket {
        let mut state = self.state.write().await;
        let ticket = self.issue_ticket();

        let (own, foreign): (Vec<Revision>, Vec<Revision>) =
            revisions.into_iter().partition(|r| r.module == self.module);
        if !foreign.is_empty() {
            tracing::warn!(
                module = %self.module,
                skipped = foreign.len(),
                "Skipping revisions that belong to other modules"
            );
        }

        state.revisions = own;
        state.active = None;
        state.applied_ticket = ticket;
        self.drafts.discard().await;

        tracing::debug!(
            module = %self.module,
            count = state.revisions.len(),
            "Loaded revisions"
        );
        BaselineTicket(ticket)
    }

    /// Move the active pointer.
    ///
    /// `None` selects the baseline and returns a reload signal. Any draft is
    /// discarded. Switching to the already-active target only re-returns it.
    pub async fn switch_revision(&self, id: Option<&str>) -> Result<ActiveView> {
        let ticket = self.issue_ticket();
        let mut state = self.state.write().await;

        if ticket < state.applied_ticket {
            tracing::debug!(
                module = %self.module,
                ticket,
                applied = state.applied_ticket,
                "Switch superseded by a later pointer change"
            );
            return Ok(state.current_view());
        }

        let view = match id {
            Some(id) => {
                let revision = state.find(id).cloned().ok_or_else(|| {
                    Error::NotFound(format!("revision '{}' in {}", id, self.module))
                })?;
                state.active = Some(revision.id.clone());
                ActiveView::Revision(revision)
            }
            None => {
                state.active = None;
                ActiveView::ReloadBaseline(BaselineTicket(ticket))
            }
        };
        state.applied_ticket = ticket;
        self.drafts.discard().await;

        tracing::info!(
            module = %self.module,
            active = state.active.as_deref().unwrap_or("baseline"),
            "Switched active revision"
        );
        Ok(view)
    }

    /// Cache baseline content fetched for `ticket`.
    ///
    /// Returns `false` (and drops the content) if a later pointer change has
    /// been applied since the ticket was issued.
    pub async fn apply_baseline(&self, ticket: BaselineTicket, content: Content) -> bool {
        let mut state = self.state.write().await;
        if state.applied_ticket != ticket.0 || state.active.is_some() {
            tracing::debug!(
                module = %self.module,
                ticket = ticket.0,
                applied = state.applied_ticket,
                "Discarding stale baseline"
            );
            return false;
        }
        state.baseline = Some(content);
        true
    }

    /// Create, persist and append a revision.
    ///
    /// Generated revisions become active immediately (dropping any draft);
    /// other origins leave the pointer alone.
    pub async fn create_revision(
        &self,
        label: &str,
        content: Content,
        origin: RevisionOrigin,
        scope: Option<GenerationScope>,
    ) -> Result<Revision> {
        let label = normalize_label(label)?;
        let mut revision = Revision::new(self.module, label, content, origin);
        revision.scope = scope;

        let mut state = self.state.write().await;
        self.gateway.create(self.module, &revision).await?;
        state.revisions.push(revision.clone());

        if origin.activates_on_create() {
            state.active = Some(revision.id.clone());
            state.applied_ticket = self.issue_ticket();
            self.drafts.discard().await;
        }

        tracing::info!(
            module = %self.module,
            revision = %revision.id,
            origin = %origin,
            "Created revision '{}'",
            revision.label
        );
        Ok(revision)
    }

    /// Copy a revision's content into a new, inactive revision
    pub async fn duplicate_revision(&self, id: &str) -> Result<Revision> {
        let source = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, self.module)))?;

        let label = format!("{} (copy)", source.label);
        self.create_revision(
            &label,
            source.content,
            RevisionOrigin::Duplicated,
            source.scope,
        )
        .await
    }

    /// Change a revision's label. Id, position and content are untouched.
    pub async fn rename_revision(&self, id: &str, new_label: &str) -> Result<Revision> {
        let label = normalize_label(new_label)?;

        let mut state = self.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, self.module)))?;

        self.gateway.rename(self.module, id, &label).await?;
        state.revisions[index].label = label;

        let renamed = state.revisions[index].clone();
        tracing::info!(
            module = %self.module,
            revision = %renamed.id,
            "Renamed revision to '{}'",
            renamed.label
        );
        Ok(renamed)
    }

    /// Remove a revision.
    ///
    /// Deleting the active revision resets the pointer to baseline and
    /// returns the ticket the caller must reload baseline content with.
    pub async fn delete_revision(&self, id: &str) -> Result<Option<BaselineTicket>> {
        let mut state = self.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("revision '{}' in {}", id, self.module)))?;

        self.gateway.delete(self.module, id).await?;
        state.revisions.remove(index);

        let fallback = if state.active.as_deref() == Some(id) {
            let ticket = self.issue_ticket();
            state.active = None;
            state.applied_ticket = ticket;
            self.drafts.discard().await;
            tracing::info!(
                module = %self.module,
                revision = %id,
                "Deleted active revision, falling back to baseline"
            );
            Some(BaselineTicket(ticket))
        } else {
            tracing::info!(module = %self.module, revision = %id, "Deleted revision");
            None
        };

        Ok(fallback)
    }
}
