use async_trait::async_trait;
use docspace::generation::GenerationState;
use docspace::{
    Content, ContentGeneratorClient, Error, FilePersistence, GenerationScope, InMemoryPersistence,
    ModuleKind, ModuleRegistry, PersistenceGateway, Result, Revision, RevisionOrigin,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Returns queued results in order, then fails
struct ScriptedGenerator {
    results: Mutex<VecDeque<Result<Content>>>,
}

impl ScriptedGenerator {
    fn new(results: Vec<Result<Content>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl ContentGeneratorClient for ScriptedGenerator {
    async fn generate(&self, _module: ModuleKind, _scope: &GenerationScope) -> Result<Content> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Generation("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Holds every call until the test opens the gate
struct GatedGenerator {
    gate: Mutex<Option<oneshot::Receiver<Result<Content>>>>,
}

impl GatedGenerator {
    fn new() -> (Self, oneshot::Sender<Result<Content>>) {
        let (tx, rx) = oneshot::channel();
        let generator = Self {
            gate: Mutex::new(Some(rx)),
        };
        (generator, tx)
    }
}

#[async_trait]
impl ContentGeneratorClient for GatedGenerator {
    async fn generate(&self, _module: ModuleKind, _scope: &GenerationScope) -> Result<Content> {
        let rx = self.gate.lock().unwrap().take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(Error::Internal("gate dropped".to_string()))),
            None => Err(Error::Internal("gate already used".to_string())),
        }
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// In-memory persistence whose next baseline fetch blocks until released
struct SlowBaselinePersistence {
    inner: InMemoryPersistence,
    entered: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl PersistenceGateway for SlowBaselinePersistence {
    async fn fetch_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        self.inner.fetch_revisions(module).await
    }

    async fn create(&self, module: ModuleKind, revision: &Revision) -> Result<()> {
        self.inner.create(module, revision).await
    }

    async fn rename(&self, module: ModuleKind, id: &str, label: &str) -> Result<()> {
        self.inner.rename(module, id, label).await
    }

    async fn delete(&self, module: ModuleKind, id: &str) -> Result<()> {
        self.inner.delete(module, id).await
    }

    async fn fetch_baseline(&self, module: ModuleKind) -> Result<Content> {
        let entered = self.entered.lock().unwrap().take();
        let release = self.release.lock().unwrap().take();
        if let (Some(entered), Some(release)) = (entered, release) {
            let _ = entered.send(());
            let _ = release.await;
        }
        self.inner.fetch_baseline(module).await
    }

    fn name(&self) -> &str {
        "slow-baseline"
    }
}

/// In-memory persistence whose first `create` signals entry and never returns
struct StalledCreatePersistence {
    inner: InMemoryPersistence,
    entered: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl PersistenceGateway for StalledCreatePersistence {
    async fn fetch_revisions(&self, module: ModuleKind) -> Result<Vec<Revision>> {
        self.inner.fetch_revisions(module).await
    }

    async fn create(&self, module: ModuleKind, revision: &Revision) -> Result<()> {
        let entered = self.entered.lock().unwrap().take();
        if let Some(entered) = entered {
            let _ = entered.send(());
            std::future::pending::<()>().await;
        }
        self.inner.create(module, revision).await
    }

    async fn rename(&self, module: ModuleKind, id: &str, label: &str) -> Result<()> {
        self.inner.rename(module, id, label).await
    }

    async fn delete(&self, module: ModuleKind, id: &str) -> Result<()> {
        self.inner.delete(module, id).await
    }

    async fn fetch_baseline(&self, module: ModuleKind) -> Result<Content> {
        self.inner.fetch_baseline(module).await
    }

    fn name(&self) -> &str {
        "stalled-create"
    }
}

fn memory_registry(client: impl ContentGeneratorClient + 'static) -> ModuleRegistry {
    ModuleRegistry::new(Arc::new(InMemoryPersistence::new()), Arc::new(client))
}

#[tokio::test]
async fn notes_create_switch_delete_scenario() {
    let registry = memory_registry(ScriptedGenerator::new(vec![]));
    let notes = ModuleKind::Notes;
    assert_eq!(registry.snapshot(notes).await.unwrap().active_revision_id, None);

    let r1 = registry
        .create_revision(notes, "v1", json!({"text": "A"}), RevisionOrigin::Generated)
        .await
        .unwrap();
    assert_eq!(
        registry.snapshot(notes).await.unwrap().active_revision_id,
        Some(r1.id.clone())
    );

    let r2 = registry
        .create_revision(notes, "v2", json!({"text": "B"}), RevisionOrigin::Generated)
        .await
        .unwrap();
    let ids: Vec<String> = registry
        .list_revisions(notes)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![r1.id.clone(), r2.id.clone()]);
    assert_eq!(
        registry.snapshot(notes).await.unwrap().active_revision_id,
        Some(r2.id.clone())
    );

    let content = registry.switch_revision(notes, Some(&r1.id)).await.unwrap();
    assert_eq!(content, Some(json!({"text": "A"})));

    assert!(registry.delete_revision(notes, &r1.id).await.unwrap());
    let snapshot = registry.snapshot(notes).await.unwrap();
    assert_eq!(snapshot.active_revision_id, None);
    assert_eq!(snapshot.revisions, vec![r2]);
}

#[tokio::test]
async fn back_to_back_generate_is_busy() {
    let (generator, gate) = GatedGenerator::new();
    let registry = memory_registry(generator);

    let first = registry
        .spawn_generate(ModuleKind::Quiz, GenerationScope::All)
        .unwrap();
    let second = registry.spawn_generate(ModuleKind::Quiz, GenerationScope::All);
    assert!(matches!(second, Err(Error::Busy(_))));
    assert!(registry.is_generating(ModuleKind::Quiz).unwrap());

    gate.send(Ok(json!({"questions": []}))).unwrap();
    let revision = first.await.unwrap().unwrap();

    let revisions = registry.list_revisions(ModuleKind::Quiz).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].id, revision.id);
    assert_eq!(revision.label, "Quiz v1");
    assert!(!registry.is_generating(ModuleKind::Quiz).unwrap());
}

#[tokio::test]
async fn late_baseline_does_not_override_later_switch() {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    let persistence = Arc::new(SlowBaselinePersistence {
        inner: InMemoryPersistence::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });
    persistence
        .inner
        .set_baseline(ModuleKind::Notes, json!({"text": "baseline"}))
        .await;

    let registry = Arc::new(ModuleRegistry::new(
        persistence.clone(),
        Arc::new(ScriptedGenerator::new(vec![])),
    ));
    let r1 = registry
        .create_revision(
            ModuleKind::Notes,
            "imported",
            json!({"text": "A"}),
            RevisionOrigin::Imported,
        )
        .await
        .unwrap();

    let slow = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.switch_revision(ModuleKind::Notes, None).await })
    };
    entered_rx.await.unwrap();

    let content = registry
        .switch_revision(ModuleKind::Notes, Some(&r1.id))
        .await
        .unwrap();
    assert_eq!(content, Some(json!({"text": "A"})));

    release_tx.send(()).unwrap();
    let late = slow.await.unwrap().unwrap();
    assert_eq!(late, Some(json!({"text": "A"})));

    let snapshot = registry.snapshot(ModuleKind::Notes).await.unwrap();
    assert_eq!(snapshot.active_revision_id, Some(r1.id));
    assert_eq!(snapshot.active_content, Some(json!({"text": "A"})));
}

#[tokio::test]
async fn teardown_discards_pending_generation() {
    let (generator, gate) = GatedGenerator::new();
    let registry = memory_registry(generator);

    let task = registry
        .spawn_generate(ModuleKind::Flashcards, GenerationScope::Pages(1, 3))
        .unwrap();
    registry
        .record_edit(ModuleKind::Flashcards, json!(["unsaved"]))
        .await
        .unwrap();

    assert_eq!(registry.teardown_all().await.unwrap(), 1);
    let snapshot = registry.snapshot(ModuleKind::Flashcards).await.unwrap();
    assert!(!snapshot.is_generating);
    assert!(!snapshot.has_draft);

    let _ = gate.send(Ok(json!(["late"])));
    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled(_))));
    assert!(registry
        .list_revisions(ModuleKind::Flashcards)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failed_generation_keeps_displayed_content() {
    let registry = memory_registry(ScriptedGenerator::new(vec![
        Ok(json!({"text": "first"})),
        Err(Error::Generation("quota exceeded".to_string())),
    ]));

    let first = registry
        .generate(ModuleKind::Summary, GenerationScope::All)
        .await
        .unwrap();

    let err = registry
        .generate(ModuleKind::Summary, GenerationScope::All)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Generation(_)));

    let snapshot = registry.snapshot(ModuleKind::Summary).await.unwrap();
    assert_eq!(snapshot.active_revision_id, Some(first.id));
    assert_eq!(snapshot.active_content, Some(json!({"text": "first"})));
    assert_eq!(snapshot.revisions.len(), 1);
    assert_eq!(snapshot.generation_state, GenerationState::Idle);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn modules_do_not_share_state() {
    let registry = memory_registry(ScriptedGenerator::new(vec![Ok(json!({"text": "n"}))]));

    registry
        .record_edit(ModuleKind::Quiz, json!({"draft": true}))
        .await
        .unwrap();
    let notes = registry
        .generate(ModuleKind::Notes, GenerationScope::All)
        .await
        .unwrap();
    registry
        .switch_revision(ModuleKind::Notes, Some(&notes.id))
        .await
        .unwrap();

    let quiz = registry.snapshot(ModuleKind::Quiz).await.unwrap();
    assert!(quiz.revisions.is_empty());
    assert_eq!(quiz.active_revision_id, None);
    assert!(quiz.has_draft);

    let switch_across = registry
        .switch_revision(ModuleKind::Quiz, Some(&notes.id))
        .await;
    assert!(matches!(switch_across, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn file_backed_revisions_survive_restart() {
    let dir = TempDir::new().unwrap();

    let saved = {
        let persistence = Arc::new(FilePersistence::new(dir.path().to_path_buf()).await.unwrap());
        let registry = ModuleRegistry::new(persistence, Arc::new(ScriptedGenerator::new(vec![])));
        registry
            .record_edit(ModuleKind::Editor, json!({"doc": "chapter one"}))
            .await
            .unwrap();
        registry
            .promote_draft(ModuleKind::Editor, "Chapter 1")
            .await
            .unwrap()
    };

    let persistence = Arc::new(FilePersistence::new(dir.path().to_path_buf()).await.unwrap());
    let registry = ModuleRegistry::new(persistence, Arc::new(ScriptedGenerator::new(vec![])));
    assert_eq!(registry.hydrate_all().await.unwrap(), 1);

    let revisions = registry.list_revisions(ModuleKind::Editor).await.unwrap();
    assert_eq!(revisions, vec![saved]);
    assert_eq!(
        registry.snapshot(ModuleKind::Editor).await.unwrap().active_revision_id,
        None
    );
}

#[tokio::test]
async fn aborted_generation_releases_module() {
    let (entered_tx, entered_rx) = oneshot::channel();
    let persistence = Arc::new(StalledCreatePersistence {
        inner: InMemoryPersistence::new(),
        entered: Mutex::new(Some(entered_tx)),
    });
    let registry = ModuleRegistry::new(
        persistence,
        Arc::new(ScriptedGenerator::new(vec![
            Ok(json!({"text": "lost"})),
            Ok(json!({"text": "kept"})),
        ])),
    );
    let notes = ModuleKind::Notes;

    let task = registry.spawn_generate(notes, GenerationScope::All).unwrap();
    entered_rx.await.unwrap();
    // The result is being stored; cancel no longer applies
    assert!(!registry.cancel_generation(notes).unwrap());
    assert!(registry.is_generating(notes).unwrap());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(!registry.is_generating(notes).unwrap());
    assert!(!registry.teardown(notes).await.unwrap());

    let revision = registry
        .spawn_generate(notes, GenerationScope::All)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(revision.content, json!({"text": "kept"}));
    assert_eq!(revision.label, "Notes v1");

    let snapshot = registry.snapshot(notes).await.unwrap();
    assert_eq!(snapshot.revisions, vec![revision.clone()]);
    assert_eq!(snapshot.active_revision_id, Some(revision.id));
    assert_eq!(snapshot.generation_state, GenerationState::Idle);
}

#[tokio::test]
async fn revision_actions_proceed_during_generation() {
    let (generator, gate) = GatedGenerator::new();
    let registry = memory_registry(generator);
    let mindmap = ModuleKind::Mindmap;

    let first = registry
        .create_revision(mindmap, "first", json!({"root": "a"}), RevisionOrigin::Imported)
        .await
        .unwrap();
    let second = registry
        .create_revision(mindmap, "second", json!({"root": "b"}), RevisionOrigin::Imported)
        .await
        .unwrap();

    let task = registry.spawn_generate(mindmap, GenerationScope::All).unwrap();

    let content = registry
        .switch_revision(mindmap, Some(&first.id))
        .await
        .unwrap();
    assert_eq!(content, Some(json!({"root": "a"})));
    registry
        .rename_revision(mindmap, &second.id, "Mindmap v2")
        .await
        .unwrap();
    assert!(registry.delete_revision(mindmap, &first.id).await.unwrap());

    let snapshot = registry.snapshot(mindmap).await.unwrap();
    assert!(snapshot.is_generating);
    assert_eq!(snapshot.active_revision_id, None);

    gate.send(Ok(json!({"root": "generated"}))).unwrap();
    let generated = task.await.unwrap().unwrap();
    // "Mindmap v2" is taken by the renamed revision
    assert_eq!(generated.label, "Mindmap v3");

    let snapshot = registry.snapshot(mindmap).await.unwrap();
    assert_eq!(snapshot.active_revision_id, Some(generated.id.clone()));
    assert_eq!(snapshot.active_content, Some(json!({"root": "generated"})));
    let ids: Vec<String> = snapshot.revisions.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![second.id, generated.id]);
    assert_eq!(snapshot.revisions[0].label, "Mindmap v2");
    assert!(!snapshot.is_generating);
}
