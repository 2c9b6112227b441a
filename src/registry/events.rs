//! Registry change notifications

use crate::revisions::ModuleKind;
use serde::{Deserialize, Serialize};

/// Change announced by a [`super::ModuleRegistry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    RevisionCreated {
        module: ModuleKind,
        revision_id: String,
        label: String,
    },
    RevisionRenamed {
        module: ModuleKind,
        revision_id: String,
        label: String,
    },
    RevisionDeleted {
        module: ModuleKind,
        revision_id: String,
    },
    /// The active pointer moved (`None` = baseline)
    ActiveChanged {
        module: ModuleKind,
        revision_id: Option<String>,
    },
    DraftChanged {
        module: ModuleKind,
        has_draft: bool,
    },
    GenerationStarted {
        module: ModuleKind,
        request_id: String,
    },
    GenerationFinished {
        module: ModuleKind,
        request_id: String,
        revision_id: String,
    },
    GenerationFailed {
        module: ModuleKind,
        request_id: String,
        error: String,
    },
}

impl RegistryEvent {
    /// Module the event concerns
    pub fn module(&self) -> ModuleKind {
        match self {
            Self::RevisionCreated { module, .. }
            | Self::RevisionRenamed { module, .. }
            | Self::RevisionDeleted { module, .. }
            | Self::ActiveChanged { module, .. }
            | Self::DraftChanged { module, .. }
            | Self::GenerationStarted { module, .. }
            | Self::GenerationFinished { module, .. }
            | Self::GenerationFailed { module, .. } => *module,
        }
    }
}
