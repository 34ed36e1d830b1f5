//! Instance lifecycle states

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Where an instance is in the reconcile protocol
///
/// Any state may move to any other; the usual flow is
/// `READY -> UPDATING -> {READY, DELETING}` and `DELETING -> removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    #[default]
    Ready,
    Updating,
    Deleting,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Ready => "READY",
            State::Updating => "UPDATING",
            State::Deleting => "DELETING",
        }
    }

    /// Whether watch queues deliver instances in this state
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Updating | State::Deleting)
    }

    /// Human readable meaning of the state
    pub fn description(&self) -> &'static str {
        match self {
            State::Ready => {
                "The configuration has been absorbed and propagated and the \
                 object is reconciled as configured."
            }
            State::Updating => {
                "The configuration has changed and the changes are still being \
                 absorbed and propagated."
            }
            State::Deleting => {
                "Deletion of the object has been requested and is being processed \
                 but is not complete yet."
            }
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(State::Ready),
            "UPDATING" => Ok(State::Updating),
            "DELETING" => Ok(State::Deleting),
            other => Err(Error::Codec(format!("unknown state {:?}", other))),
        }
    }
}

/// Meaning of the `messages` attribute
///
/// ```
/// use etcd3_model::model::MESSAGES_DESCRIPTION;
///
/// assert!(MESSAGES_DESCRIPTION.contains("READY"));
/// ```
pub const MESSAGES_DESCRIPTION: &str = "Messages describing an object's progress toward \
     the READY state or its removal, or problems that need intervention. Cleared on \
     every state assignment.";
