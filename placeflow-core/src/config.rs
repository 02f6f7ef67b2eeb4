//! Workflow files.
//!
//! A workflow file describes one workflow in YAML (or JSON, by `.json`
//! extension):
//!
//! ```yaml
//! name: article
//! type: workflow            # or state_machine
//! single_place: false
//! events_to_dispatch: [entered, completed]   # omit for all, [] for none
//! places: [draft, review, published]
//! initial_places: draft
//! transitions:
//!   - name: approve
//!     from: draft
//!     to: review
//! ```

use crate::definition::{Definition, DefinitionRaw};
use crate::error::CoreError;
use crate::event::EventKind;
use crate::store::{MarkingStore, Subject};
use crate::workflow::{DispatchPolicy, Workflow, WorkflowKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A workflow as written in a workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: WorkflowKind,

    /// Whether the marking store keeps a single place per subject.
    #[serde(default)]
    pub single_place: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_to_dispatch: Option<Vec<EventKind>>,

    #[serde(flatten)]
    pub raw: DefinitionRaw,
}

impl WorkflowConfig {
    /// Loads a workflow file. Files ending in `.json` are read as JSON,
    /// everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        tracing::debug!("loaded workflow {} from {}", config.name, path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Builds the definition without structural validation.
    pub fn definition(&self) -> Result<Definition, CoreError> {
        Definition::from_raw(self.raw.clone())
    }

    /// Builds the definition and runs the validator for the workflow's kind.
    pub fn validate(&self) -> Result<Definition, CoreError> {
        let definition = self.definition()?;
        self.kind
            .validator(self.single_place)
            .validate(&definition, &self.name)?;
        Ok(definition)
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy::from_events(self.events_to_dispatch.clone())
    }

    /// Validates the file and builds a workflow over `store`.
    pub fn into_workflow<S: Subject>(
        self,
        store: Arc<dyn MarkingStore<S>>,
    ) -> Result<Workflow<S>, CoreError> {
        let definition = self.validate()?;
        let policy = self.dispatch_policy();

        let workflow = match self.kind {
            WorkflowKind::Workflow => Workflow::new(definition, store, self.name),
            WorkflowKind::StateMachine => Workflow::state_machine(definition, store, self.name),
        };
        Ok(workflow.with_dispatch_policy(policy))
    }
}
