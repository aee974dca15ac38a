//! User-extensible rules.
//!
//! A script rule names a plugin registered at startup. The plugin factory
//! receives the rule's free-form parameters and builds a [`ScriptedRule`]
//! instance, so new matching logic can be added without touching the router.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use beast_core::Message;

use crate::error::{Result, RuleError};
use crate::kind::RuleKind;
use crate::rule::RuleId;

/// Behaviour supplied by a script plugin.
pub trait ScriptedRule: Send + Sync {
    fn handle(&self, message: &Message) -> Result<Option<Message>>;

    /// Release any state before the rule is replaced. Default: nothing.
    fn dispose(&self) {}
}

/// Builds a plugin instance from the rule's parameters.
pub type ScriptFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn ScriptedRule>> + Send + Sync>;

/// Named script plugins available to script rules.
#[derive(Default)]
pub struct ScriptRegistry {
    factories: RwLock<HashMap<String, ScriptFactory>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any earlier registration.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn ScriptedRule>> + Send + Sync + 'static,
    {
        let name = name.into();
        info!(script = %name, "registered script plugin");
        self.factories
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name, Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn build(&self, config: &ScriptConfig) -> Result<Box<dyn ScriptedRule>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&config.script)
            .cloned()
            .ok_or_else(|| RuleError::UnknownScript(config.script.clone()))?;
        factory(&config.params)
    }
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("scripts", &self.names())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Registered plugin name.
    pub script: String,
    /// Passed verbatim to the plugin factory.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ScriptConfig {
    pub fn validate(&self) -> Result<()> {
        if self.script.trim().is_empty() {
            return Err(RuleError::invalid(RuleKind::Script, "script name must not be empty"));
        }
        Ok(())
    }
}

pub struct ScriptRule {
    id: RuleId,
    config: ScriptConfig,
    plugin: Box<dyn ScriptedRule>,
}

impl ScriptRule {
    pub fn new(id: RuleId, config: ScriptConfig, registry: &ScriptRegistry) -> Result<Self> {
        config.validate()?;
        let plugin = registry.build(&config)?;
        Ok(Self { id, config, plugin })
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn handle(&self, message: &Message) -> Result<Option<Message>> {
        self.plugin.handle(message)
    }

    pub fn dispose(&self) {
        self.plugin.dispose();
    }
}
