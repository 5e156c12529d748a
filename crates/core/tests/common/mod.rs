//! Shared integration-test scaffolding: a scripted `GenerationSource` and a
//! harness that wires up a store, registry, and registered root dialog the
//! same way the driver's own unit tests do, but through the crate's public
//! surface since these tests compile as a separate crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dominds_core::dialog::{Dialog, DialogCore, RootExtra};
use dominds_core::driver::{DriveExecutor, EmittedCall, GenerationOutcome, GenerationSource};
use dominds_core::error::CoreResult;
use dominds_core::fanout::PubChan;
use dominds_core::ids::DialogId;
use dominds_core::registry::DialogRegistry;
use dominds_core::run_state::{PersistenceStatus, RunState};
use dominds_core::special_call::ParsedCall;
use dominds_core::store::records::{DialogLatest, DialogMetadata};
use dominds_core::store::{EventStore, FsEventStore};
use time::OffsetDateTime;

/// A `GenerationSource` whose outcomes are scripted per `dialog_id`, popped
/// in push order. A dialog with no script left (or none ever pushed) gets a
/// silent "ack" with no special calls, so recursive subdialog rounds spawned
/// incidentally by a scripted call don't need their own script.
pub struct ScriptedGeneration {
    scripts: Mutex<HashMap<String, VecDeque<GenerationOutcome>>>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, dialog_id: &str, outcome: GenerationOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(dialog_id.to_string())
            .or_default()
            .push_back(outcome);
    }
}

fn silent_ack() -> GenerationOutcome {
    GenerationOutcome {
        last_assistant_saying: Some("ack".into()),
        interrupted: false,
        special_calls: Vec::new(),
    }
}

#[async_trait]
impl GenerationSource for ScriptedGeneration {
    async fn generate(&self, dialog_id: &str, _effective_prompt: Option<&str>) -> CoreResult<GenerationOutcome> {
        let mut scripts = self.scripts.lock().unwrap();
        let next = scripts.get_mut(dialog_id).and_then(|q| q.pop_front());
        Ok(next.unwrap_or_else(silent_ack))
    }
}

pub fn emitted(call_id: &str, parsed: ParsedCall) -> EmittedCall {
    EmittedCall {
        call_id: call_id.to_string(),
        parsed,
    }
}

pub fn outcome(special_calls: Vec<EmittedCall>) -> GenerationOutcome {
    GenerationOutcome {
        last_assistant_saying: None,
        interrupted: false,
        special_calls,
    }
}

pub fn saying_outcome(saying: &str) -> GenerationOutcome {
    GenerationOutcome {
        last_assistant_saying: Some(saying.to_string()),
        interrupted: false,
        special_calls: Vec::new(),
    }
}

/// Builds a `DriveExecutor` over a fresh on-disk store with one registered,
/// persisted root dialog (`r1`, agent `alice`), and the shared handles
/// needed to construct a `Runtime` over the same state if a test needs one.
pub async fn harness() -> (Arc<dyn EventStore>, Arc<DialogRegistry>, Arc<ScriptedGeneration>, DriveExecutor, tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(FsEventStore::new(dir.path()));
    let registry = Arc::new(DialogRegistry::new());
    let root_id = "r1".to_string();

    store
        .save_dialog_metadata(
            PersistenceStatus::Running,
            &DialogMetadata {
                self_id: root_id.clone(),
                root_id: root_id.clone(),
                agent_id: "alice".into(),
                task_doc_path: "/t.tsk".into(),
                created_at: OffsetDateTime::UNIX_EPOCH,
                supdialog_self_id: None,
                session_slug: None,
            },
        )
        .await
        .unwrap();
    store
        .save_dialog_latest(
            &root_id,
            &root_id,
            PersistenceStatus::Running,
            &DialogLatest {
                current_course: 1,
                last_modified: OffsetDateTime::UNIX_EPOCH,
                status: PersistenceStatus::Running,
                message_count: 0,
                function_call_count: 0,
                subdialog_count: 0,
                run_state: RunState::Proceeding,
                disable_diligence_push: None,
                diligence_push_remaining_budget: None,
            },
        )
        .await
        .unwrap();
    registry
        .register(Dialog::Root {
            core: DialogCore::new(DialogId::root(&root_id), "alice".into(), "/t.tsk".into(), OffsetDateTime::UNIX_EPOCH),
            root: RootExtra::default(),
        })
        .await;

    let generation = Arc::new(ScriptedGeneration::new());
    let executor = DriveExecutor::new(store.clone(), registry.clone(), generation.clone(), Arc::new(PubChan::new()));
    (store, registry, generation, executor, dir, root_id)
}
