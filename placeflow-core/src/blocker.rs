//! Transition blockers: the reasons a transition is not enabled.

use crate::marking::Marking;
use serde_json::{Map, Value};
use std::fmt;

/// Machine-readable blocker code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockerCode {
    /// The subject is not in every input place of the transition.
    Marking,
    /// An expression guard evaluated outside the engine rejected the transition.
    ExpressionGuard,
    /// A guard listener blocked the transition without a specific code.
    Unknown,
    /// Application-defined code.
    Custom(String),
}

impl BlockerCode {
    pub const MARKING: &'static str = "e0ff04a9-eba7-4208-a974-d48e38c0cb27";
    pub const EXPRESSION_GUARD: &'static str = "52c00b18-3743-4266-9986-3d695328dff0";
    pub const UNKNOWN: &'static str = "e2cca226-0fdd-4cf2-8d06-e86e3d4def5a";

    /// Stable identifier of this code.
    pub fn as_str(&self) -> &str {
        match self {
            BlockerCode::Marking => Self::MARKING,
            BlockerCode::ExpressionGuard => Self::EXPRESSION_GUARD,
            BlockerCode::Unknown => Self::UNKNOWN,
            BlockerCode::Custom(code) => code,
        }
    }

    /// Maps a stable identifier back to a code. Unrecognized strings become `Custom`.
    pub fn from_code(code: &str) -> Self {
        match code {
            Self::MARKING => BlockerCode::Marking,
            Self::EXPRESSION_GUARD => BlockerCode::ExpressionGuard,
            Self::UNKNOWN => BlockerCode::Unknown,
            other => BlockerCode::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for BlockerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason a transition is blocked.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBlocker {
    message: String,
    code: BlockerCode,
    parameters: Map<String, Value>,
}

impl TransitionBlocker {
    pub fn new(message: impl Into<String>, code: BlockerCode) -> Self {
        Self {
            message: message.into(),
            code,
            parameters: Map::new(),
        }
    }

    /// Attaches a parameter, e.g. the threshold a guard compared against.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// The subject is not in every input place of the transition.
    pub fn blocked_by_marking(marking: &Marking) -> Self {
        Self::new(
            "The marking does not enable the transition.",
            BlockerCode::Marking,
        )
        .with_parameter("marking", marking.to_json())
    }

    /// An expression guard rejected the transition.
    pub fn blocked_by_expression_guard(expression: impl Into<String>) -> Self {
        Self::new(
            "The expression blocks the transition.",
            BlockerCode::ExpressionGuard,
        )
        .with_parameter("expression", Value::String(expression.into()))
    }

    /// A guard blocked the transition for an unspecified reason.
    ///
    /// Without a message, the source location of the caller is recorded.
    #[track_caller]
    pub fn unknown(message: Option<&str>) -> Self {
        match message {
            Some(message) => Self::new(message, BlockerCode::Unknown),
            None => {
                let caller = std::panic::Location::caller();
                Self::new(
                    format!("The transition has been blocked by a guard ({}).", caller),
                    BlockerCode::Unknown,
                )
            }
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &BlockerCode {
        &self.code
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }
}

/// Blockers collected for one transition during one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionBlockerList {
    blockers: Vec<TransitionBlocker>,
}

impl TransitionBlockerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, blocker: TransitionBlocker) {
        self.blockers.push(blocker);
    }

    /// Returns true if any blocker carries `code`.
    pub fn has(&self, code: &BlockerCode) -> bool {
        self.blockers.iter().any(|b| b.code() == code)
    }

    pub fn clear(&mut self) {
        self.blockers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.blockers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blockers.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransitionBlocker> {
        self.blockers.iter()
    }

    pub(crate) fn is_blocked_by_marking(&self) -> bool {
        self.has(&BlockerCode::Marking)
    }
}

impl From<Vec<TransitionBlocker>> for TransitionBlockerList {
    fn from(blockers: Vec<TransitionBlocker>) -> Self {
        Self { blockers }
    }
}

impl IntoIterator for TransitionBlockerList {
    type Item = TransitionBlocker;
    type IntoIter = std::vec::IntoIter<TransitionBlocker>;

    fn into_iter(self) -> Self::IntoIter {
        self.blockers.into_iter()
    }
}

impl<'a> IntoIterator for &'a TransitionBlockerList {
    type Item = &'a TransitionBlocker;
    type IntoIter = std::slice::Iter<'a, TransitionBlocker>;

    fn into_iter(self) -> Self::IntoIter {
        self.blockers.iter()
    }
}
