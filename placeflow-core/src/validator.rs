//! Structural validation of definitions.
//!
//! Validators are run once, explicitly, against a finished [`Definition`]. The
//! engine never runs them on its own.

use crate::definition::Definition;
use crate::error::CoreError;
use std::collections::{HashMap, HashSet};

/// Checks that a definition is legal for one workflow flavor.
pub trait DefinitionValidator {
    fn validate(&self, definition: &Definition, name: &str) -> Result<(), CoreError>;
}

/// Single-active-place semantics: one input, one output, one initial place.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMachineValidator;

impl DefinitionValidator for StateMachineValidator {
    fn validate(&self, definition: &Definition, name: &str) -> Result<(), CoreError> {
        let mut names_by_place: HashMap<&str, HashSet<&str>> = HashMap::new();

        for t in definition.transitions() {
            if t.tos().len() != 1 {
                return Err(CoreError::invalid_definition(format!(
                    "a transition in state machine '{}' must have exactly one output, but transition '{}' has {}",
                    name,
                    t.name(),
                    t.tos().len()
                )));
            }

            if t.froms().len() != 1 {
                return Err(CoreError::invalid_definition(format!(
                    "a transition in state machine '{}' must have exactly one input, but transition '{}' has {}",
                    name,
                    t.name(),
                    t.froms().len()
                )));
            }

            let from = t.froms()[0].as_str();
            if !names_by_place.entry(from).or_default().insert(t.name()) {
                return Err(CoreError::invalid_definition(format!(
                    "multiple transitions named '{}' from place '{}' in state machine '{}'",
                    t.name(),
                    from,
                    name
                )));
            }
        }

        let initial = definition.initial_places().len();
        if initial > 1 {
            return Err(CoreError::invalid_definition(format!(
                "state machine '{}' supports one initial place, but the definition has {}",
                name, initial
            )));
        }

        Ok(())
    }
}

/// Multi-active-place semantics.
///
/// In single-place mode the marking store can only hold one place, so every
/// transition may produce at most one place and only one initial place is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowValidator {
    single_place: bool,
}

impl WorkflowValidator {
    pub fn new(single_place: bool) -> Self {
        Self { single_place }
    }

    pub fn single_place() -> Self {
        Self::new(true)
    }

    pub fn is_single_place(&self) -> bool {
        self.single_place
    }
}

impl DefinitionValidator for WorkflowValidator {
    fn validate(&self, definition: &Definition, name: &str) -> Result<(), CoreError> {
        let mut names_by_place: HashMap<&str, HashSet<&str>> = HashMap::new();

        for t in definition.transitions() {
            for from in t.froms() {
                if !names_by_place
                    .entry(from.as_str())
                    .or_default()
                    .insert(t.name())
                {
                    return Err(CoreError::invalid_definition(format!(
                        "multiple transitions named '{}' from place '{}' in workflow '{}'",
                        t.name(),
                        from,
                        name
                    )));
                }
            }
        }

        if !self.single_place {
            return Ok(());
        }

        if let Some(t) = definition.transitions().iter().find(|t| t.tos().len() > 1) {
            return Err(CoreError::invalid_definition(format!(
                "the marking store of workflow '{}' holds a single place, but transition '{}' has {} outputs ({})",
                name,
                t.name(),
                t.tos().len(),
                t.tos().join(", ")
            )));
        }

        let initial = definition.initial_places().len();
        if initial > 1 {
            return Err(CoreError::invalid_definition(format!(
                "the marking store of workflow '{}' holds a single place, but the definition has {} initial places",
                name, initial
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::Transition;

    fn definition(transitions: Vec<Transition>, initial: Option<Vec<&str>>) -> Definition {
        Definition::new(
            ["a", "b", "c", "d"],
            transitions,
            initial.map(|v| v.into_iter().map(str::to_string).collect()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_state_machine_accepts_simple_graph() {
        let def = definition(
            vec![
                Transition::new("go", "a", "b"),
                Transition::new("go", "b", "c"),
                Transition::new("back", "b", "a"),
            ],
            None,
        );
        assert!(StateMachineValidator.validate(&def, "sm").is_ok());
    }

    #[test]
    fn test_state_machine_rejects_multiple_outputs() {
        let def = definition(vec![Transition::new("fork", "a", ["b", "c"])], None);
        let err = StateMachineValidator.validate(&def, "sm").unwrap_err();
        assert!(matches!(err, CoreError::InvalidDefinition { .. }));
        assert!(err.to_string().contains("'fork'"));
    }

    #[test]
    fn test_state_machine_rejects_multiple_inputs() {
        let def = definition(vec![Transition::new("join", ["a", "b"], "c")], None);
        let err = StateMachineValidator.validate(&def, "sm").unwrap_err();
        assert!(err.to_string().contains("one input"));
    }

    #[test]
    fn test_state_machine_rejects_duplicate_name_from_place() {
        let def = definition(
            vec![Transition::new("go", "a", "b"), Transition::new("go", "a", "c")],
            None,
        );
        let err = StateMachineValidator.validate(&def, "sm").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'go'"));
        assert!(message.contains("'a'"));
        assert!(message.contains("'sm'"));
    }

    #[test]
    fn test_state_machine_rejects_many_initial_places() {
        let def = definition(vec![], Some(vec!["a", "b"]));
        assert!(StateMachineValidator.validate(&def, "sm").is_err());
    }

    #[test]
    fn test_workflow_allows_forks_and_joins() {
        let def = definition(
            vec![
                Transition::new("fork", "a", ["b", "c"]),
                Transition::new("join", ["b", "c"], "d"),
            ],
            Some(vec!["a", "b"]),
        );
        assert!(WorkflowValidator::default().validate(&def, "wf").is_ok());
    }

    #[test]
    fn test_workflow_rejects_duplicate_name_from_place() {
        let def = definition(
            vec![
                Transition::new("go", ["a", "b"], "c"),
                Transition::new("go", "b", "d"),
            ],
            None,
        );
        let err = WorkflowValidator::default().validate(&def, "wf").unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_workflow_allows_distinct_names_from_place() {
        let def = definition(
            vec![Transition::new("left", "a", "b"), Transition::new("right", "a", "c")],
            None,
        );
        assert!(WorkflowValidator::default().validate(&def, "wf").is_ok());
    }

    #[test]
    fn test_single_place_rejects_multiple_outputs() {
        let def = definition(vec![Transition::new("fork", "a", ["b", "c"])], None);
        assert!(WorkflowValidator::default().validate(&def, "wf").is_ok());
        assert!(WorkflowValidator::single_place().validate(&def, "wf").is_err());
    }

    #[test]
    fn test_single_place_rejects_many_initial_places() {
        let def = definition(vec![], Some(vec!["a", "c"]));
        assert!(WorkflowValidator::new(false).validate(&def, "wf").is_ok());
        assert!(WorkflowValidator::new(true).validate(&def, "wf").is_err());
    }

    #[test]
    fn test_repeated_initial_place_counts_once() {
        let def = definition(vec![], Some(vec!["a", "a"]));
        assert!(StateMachineValidator.validate(&def, "sm").is_ok());
        assert!(WorkflowValidator::new(true).validate(&def, "wf").is_ok());
    }
}
