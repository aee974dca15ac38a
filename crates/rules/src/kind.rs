//! Rule type tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The finite set of rule kinds a route can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Compositing,
    Volume,
    Scansun,
    Alert,
    Copy,
    Script,
}

impl RuleKind {
    /// Whether instances of this kind hold accumulation state between messages.
    pub fn is_stateful(self) -> bool {
        matches!(self, RuleKind::Compositing | RuleKind::Volume)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Compositing => write!(f, "compositing"),
            RuleKind::Volume => write!(f, "volume"),
            RuleKind::Scansun => write!(f, "scansun"),
            RuleKind::Alert => write!(f, "alert"),
            RuleKind::Copy => write!(f, "copy"),
            RuleKind::Script => write!(f, "script"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "compositing" => Ok(RuleKind::Compositing),
            "volume" => Ok(RuleKind::Volume),
            "scansun" => Ok(RuleKind::Scansun),
            "alert" => Ok(RuleKind::Alert),
            "copy" => Ok(RuleKind::Copy),
            "script" => Ok(RuleKind::Script),
            other => Err(format!("unknown rule kind: '{}'", other)),
        }
    }
}
