//! Rule engine for the beast message router.
//!
//! This crate provides:
//! - A cancellable timeout service shared by all rule instances
//! - Stateful correlation rules (compositing, volume) with per-key slots
//! - Stateless rules (scansun, alert, copy) and plugin-backed script rules
//! - [`RuleConfig`] / [`Rule`] as the serde-tagged and live forms of a rule

pub mod alert;
pub mod collector;
pub mod compositing;
pub mod context;
pub mod copy;
pub mod error;
pub mod kind;
pub mod nominal;
pub mod rule;
pub mod scansun;
pub mod script;
pub mod timeout;
pub mod volume;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use collector::SlotState;
pub use context::RuleContext;
pub use error::RuleError;
pub use kind::RuleKind;
pub use rule::{Rule, RuleConfig, RuleId};
pub use script::{ScriptRegistry, ScriptedRule};
pub use timeout::{TimeoutCallback, TimeoutId, TimeoutManager, TimeoutReason};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
