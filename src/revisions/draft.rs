//! Local draft staging
//!
//! Each module carries at most one unsaved draft. The draft is anchored to
//! the module's active pointer at the moment of the edit; the revision store
//! discards it whenever the pointer moves, so edits never leak across
//! revisions.

use super::store::RevisionStore;
use super::types::{Content, ModuleKind, Revision, RevisionOrigin};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Unsaved edits on top of a revision (or the baseline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDraft {
    pub id: String,
    /// Active pointer the edits diverge from (`None` = baseline)
    pub base_revision_id: Option<String>,
    pub content: Content,
    pub dirty: bool,
    /// Number of edits recorded on this draft
    pub edits: u64,
    /// Last edit time in unix milliseconds
    pub updated_at: i64,
}

impl LocalDraft {
    fn new(base_revision_id: Option<String>, content: Content) -> Self {
        Self {
            id: format!("draft-{}", uuid::Uuid::new_v4()),
            base_revision_id,
            content,
            dirty: true,
            edits: 1,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Per-module draft slot
///
/// Cloning yields another handle to the same slot; the revision store keeps
/// one so pointer changes can clear it.
#[derive(Clone)]
pub struct DraftStaging {
    module: ModuleKind,
    slot: Arc<RwLock<Option<LocalDraft>>>,
    /// Drafts dropped so far, by any handle
    discarded: Arc<AtomicU64>,
}

impl DraftStaging {
    /// Create an empty slot for a module
    pub fn new(module: ModuleKind) -> Self {
        Self {
            module,
            slot: Arc::new(RwLock::new(None)),
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Module this slot belongs to
    pub fn module(&self) -> ModuleKind {
        self.module
    }

    /// Current draft, if any
    pub async fn current(&self) -> Option<LocalDraft> {
        self.slot.read().await.clone()
    }

    /// Whether a draft exists
    pub async fn has_draft(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Record an edit against the module's current pointer.
    ///
    /// Holds the store's state lock while writing so a concurrent switch
    /// cannot slip between reading the pointer and anchoring the draft.
    pub async fn record_edit(&self, store: &RevisionStore, content: Content) -> LocalDraft {
        let state = store.read_state().await;
        let base = state.active_id().map(str::to_string);
        let mut slot = self.slot.write().await;

        let draft = match slot.as_mut() {
            Some(draft) if draft.base_revision_id == base => {
                draft.content = content;
                draft.dirty = true;
                draft.edits += 1;
                draft.updated_at = chrono::Utc::now().timestamp_millis();
                draft.clone()
            }
            existing => {
                if let Some(stale) = existing {
                    tracing::warn!(
                        module = %self.module,
                        draft = %stale.id,
                        "Replacing draft anchored to a different pointer"
                    );
                }
                let draft = LocalDraft::new(base, content);
                *slot = Some(draft.clone());
                draft
            }
        };
        drop(slot);
        drop(state);

        tracing::debug!(module = %self.module, draft = %draft.id, edits = draft.edits, "Recorded edit");
        draft
    }

    /// Drop the draft; returns whether one existed
    pub async fn discard(&self) -> bool {
        let discarded = self.slot.write().await.take();
        if let Some(draft) = &discarded {
            self.discarded.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(module = %self.module, draft = %draft.id, "Discarded draft");
        }
        discarded.is_some()
    }

    /// Number of drafts discarded through this slot.
    ///
    /// Compared before and after an operation to tell whether it dropped
    /// unsaved edits.
    pub(crate) fn discard_count(&self) -> u64 {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Persist the dirty draft as a manual revision, then clear it.
    ///
    /// If further edits land while the revision is being persisted, the
    /// draft is kept with those edits instead of being cleared.
    pub async fn promote(&self, store: &RevisionStore, label: &str) -> Result<Revision> {
        let snapshot = match self.slot.read().await.as_ref() {
            Some(draft) if draft.dirty => draft.clone(),
            _ => {
                return Err(Error::InvalidState(format!(
                    "no unsaved draft to promote in {}",
                    self.module
                )))
            }
        };

        let revision = store
            .create_revision(label, snapshot.content.clone(), RevisionOrigin::Manual, None)
            .await?;

        let mut slot = self.slot.write().await;
        let unchanged = slot
            .as_ref()
            .map(|d| d.id == snapshot.id && d.edits == snapshot.edits)
            .unwrap_or(false);
        if unchanged {
            *slot = None;
        } else {
            tracing::debug!(
                module = %self.module,
                revision = %revision.id,
                "Draft changed during promotion, keeping newer edits"
            );
        }

        tracing::info!(
            module = %self.module,
            revision = %revision.id,
            "Promoted draft to revision '{}'",
            revision.label
        );
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use serde_json::json;

    fn make_store(module: ModuleKind) -> (RevisionStore, DraftStaging, Arc<InMemoryPersistence>) {
        let gateway = Arc::new(InMemoryPersistence::new());
        let drafts = DraftStaging::new(module);
        let store = RevisionStore::new(module, gateway.clone(), drafts.clone());
        (store, drafts, gateway)
    }

    #[tokio::test]
    async fn test_first_edit_creates_draft_anchored_to_pointer() {
        let (store, drafts, _gw) = make_store(ModuleKind::Notes);
        assert!(!drafts.has_draft().await);

        let draft = drafts.record_edit(&store, json!({"text": "hello"})).await;
        assert!(draft.dirty);
        assert_eq!(draft.base_revision_id, None);
        assert_eq!(draft.edits, 1);
        assert!(draft.id.starts_with("draft-"));
    }

    #[tokio::test]
    async fn test_subsequent_edits_update_same_draft() {
        let (store, drafts, _gw) = make_store(ModuleKind::Notes);
        let first = drafts.record_edit(&store, json!({"text": "a"})).await;
        let second = drafts.record_edit(&store, json!({"text": "ab"})).await;

        assert_eq!(first.id, second.id);
        assert_eq!(second.edits, 2);
        assert_eq!(drafts.current().await.unwrap().content, json!({"text": "ab"}));
    }

    #[tokio::test]
    async fn test_edit_after_switch_anchors_to_new_pointer() {
        let (store, drafts, _gw) = make_store(ModuleKind::Quiz);
        let rev = store
            .create_revision("v1", json!({"q": 1}), RevisionOrigin::Imported, None)
            .await
            .unwrap();

        drafts.record_edit(&store, json!({"q": 2})).await;
        store.switch_revision(Some(&rev.id)).await.unwrap();
        assert!(!drafts.has_draft().await);

        let draft = drafts.record_edit(&store, json!({"q": 3})).await;
        assert_eq!(draft.base_revision_id.as_deref(), Some(rev.id.as_str()));
    }

    #[tokio::test]
    async fn test_promote_without_draft_is_invalid_state() {
        let (store, drafts, _gw) = make_store(ModuleKind::Summary);
        let result = drafts.promote(&store, "nothing").await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_promote_creates_manual_revision_and_clears_draft() {
        let (store, drafts, gateway) = make_store(ModuleKind::Summary);
        drafts.record_edit(&store, json!({"text": "edited"})).await;

        let revision = drafts.promote(&store, "  My edit ").await.unwrap();
        assert_eq!(revision.origin, RevisionOrigin::Manual);
        assert_eq!(revision.label, "My edit");
        assert_eq!(revision.content, json!({"text": "edited"}));
        assert!(!drafts.has_draft().await);
        assert_eq!(gateway.count(ModuleKind::Summary).await, 1);
        // Manual revisions do not move the pointer
        assert_eq!(store.active_revision_id().await, None);
    }

    #[tokio::test]
    async fn test_promote_with_blank_label_keeps_draft() {
        let (store, drafts, _gw) = make_store(ModuleKind::Summary);
        drafts.record_edit(&store, json!({"text": "keep me"})).await;

        let result = drafts.promote(&store, "   ").await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(drafts.has_draft().await);
    }

    #[tokio::test]
    async fn test_discard_reports_presence() {
        let (store, drafts, _gw) = make_store(ModuleKind::Insights);
        assert!(!drafts.discard().await);
        drafts.record_edit(&store, json!(["insight"])).await;
        assert!(drafts.discard().await);
        assert!(drafts.current().await.is_none());
    }
}
