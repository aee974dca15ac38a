//! Shared services handed to every rule at construction.

use std::sync::Arc;

use beast_core::{Message, Route};

use crate::script::ScriptRegistry;
use crate::timeout::TimeoutManager;

/// Process-wide services a rule may need, passed explicitly instead of
/// through a global.
#[derive(Clone)]
pub struct RuleContext {
    pub timeouts: Arc<TimeoutManager>,
    pub scripts: Arc<ScriptRegistry>,
    /// Name of the route the rule is built for, if any.
    pub route: Option<String>,
}

impl RuleContext {
    pub fn new(timeouts: Arc<TimeoutManager>, scripts: Arc<ScriptRegistry>) -> Self {
        Self {
            timeouts,
            scripts,
            route: None,
        }
    }

    /// Context with an empty script registry.
    pub fn with_timeouts(timeouts: Arc<TimeoutManager>) -> Self {
        Self::new(timeouts, Arc::new(ScriptRegistry::new()))
    }

    /// The same services, scoped to the route named `name`.
    pub fn for_route(&self, name: impl Into<String>) -> Self {
        Self {
            route: Some(name.into()),
            ..self.clone()
        }
    }

    /// Address a message produced outside `handle` (a timeout flush) back to
    /// the owning route, so the router delivers it to that route's recipients.
    pub fn address(route: Option<&str>, message: Message) -> Message {
        match route {
            Some(name) => Route::new(name, message).into(),
            None => message,
        }
    }
}
