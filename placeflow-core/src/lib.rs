//! # placeflow-core
//!
//! Workflow engine for placeflow.
//!
//! This crate provides:
//! - Workflow definitions (places, transitions, initial places, metadata)
//! - Markings and the engine that fires transitions on subjects
//! - Guard and lifecycle notifications through a typed dispatcher
//! - Structural validators for workflows and state machines
//! - Marking stores, a workflow registry, and workflow files

pub mod blocker;
pub mod config;
pub mod definition;
pub mod error;
pub mod event;
pub mod marking;
pub mod metadata;
pub mod registry;
pub mod store;
pub mod transition;
pub mod validator;
pub mod workflow;

pub use blocker::{BlockerCode, TransitionBlocker, TransitionBlockerList};
pub use config::WorkflowConfig;
pub use definition::{Definition, DefinitionBuilder, DefinitionRaw, TransitionRaw};
pub use error::CoreError;
pub use event::{Channel, EventDispatcher, EventKind, GuardEvent, Scope, Topic, WorkflowEvent};
pub use marking::Marking;
pub use metadata::{InMemoryMetadataStore, Metadata, MetadataStore, MetadataTarget};
pub use registry::{AlwaysSupports, Registry, SupportStrategy};
pub use store::{FieldMarkingStore, InMemoryMarkingStore, MarkedSubject, MarkingStore, Subject};
pub use transition::{Places, Transition};
pub use validator::{DefinitionValidator, StateMachineValidator, WorkflowValidator};
pub use workflow::{DisabledEvents, DispatchPolicy, TransitionOptions, Workflow, WorkflowKind};
