//! Workflow lookup by subject.

use crate::error::CoreError;
use crate::store::Subject;
use crate::workflow::Workflow;
use parking_lot::RwLock;
use std::sync::Arc;

/// Decides whether a workflow handles a subject.
pub trait SupportStrategy<S>: Send + Sync {
    fn supports(&self, workflow: &Workflow<S>, subject: &S) -> bool;
}

impl<S, F> SupportStrategy<S> for F
where
    F: Fn(&Workflow<S>, &S) -> bool + Send + Sync,
{
    fn supports(&self, workflow: &Workflow<S>, subject: &S) -> bool {
        self(workflow, subject)
    }
}

/// Supports every subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSupports;

impl<S> SupportStrategy<S> for AlwaysSupports {
    fn supports(&self, _workflow: &Workflow<S>, _subject: &S) -> bool {
        true
    }
}

struct Entry<S> {
    workflow: Arc<Workflow<S>>,
    strategy: Box<dyn SupportStrategy<S>>,
}

/// Workflows registered with the strategy that selects their subjects.
pub struct Registry<S> {
    entries: RwLock<Vec<Entry<S>>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<S: Subject> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workflow<T>(&self, workflow: Arc<Workflow<S>>, strategy: T)
    where
        T: SupportStrategy<S> + 'static,
    {
        tracing::debug!("registered workflow {}", workflow.name());
        self.entries.write().push(Entry {
            workflow,
            strategy: Box::new(strategy),
        });
    }

    /// Whether a workflow supports the subject, optionally restricted by name.
    pub fn has(&self, subject: &S, name: Option<&str>) -> bool {
        !self.matching(subject, name).is_empty()
    }

    /// The single workflow supporting the subject.
    ///
    /// Fails when no workflow or more than one workflow matches.
    pub fn get(&self, subject: &S, name: Option<&str>) -> Result<Arc<Workflow<S>>, CoreError> {
        let mut matched = self.matching(subject, name);

        match matched.len() {
            0 => Err(CoreError::InvalidArgument {
                reason: match name {
                    Some(name) => format!(
                        "unable to find workflow '{}' for subject '{}'",
                        name,
                        subject.subject_id()
                    ),
                    None => format!(
                        "unable to find a workflow for subject '{}'",
                        subject.subject_id()
                    ),
                },
            }),
            1 => Ok(matched.remove(0)),
            _ => {
                let names: Vec<&str> = matched.iter().map(|w| w.name()).collect();
                Err(CoreError::InvalidArgument {
                    reason: format!(
                        "too many workflows ({}) match subject '{}'; give each a distinct name and select one by name",
                        names.join(", "),
                        subject.subject_id()
                    ),
                })
            }
        }
    }

    /// Every workflow supporting the subject, in registration order.
    pub fn all(&self, subject: &S) -> Vec<Arc<Workflow<S>>> {
        self.matching(subject, None)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn matching(&self, subject: &S, name: Option<&str>) -> Vec<Arc<Workflow<S>>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| name.map_or(true, |name| entry.workflow.name() == name))
            .filter(|entry| entry.strategy.supports(&entry.workflow, subject))
            .map(|entry| Arc::clone(&entry.workflow))
            .collect()
    }
}
