//! Alert rule: logs alerts from selected modules and forwards the serious ones.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use beast_core::{Message, Severity};

use crate::rule::RuleId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Modules whose alerts are handled. Empty handles every module.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Alerts at or above this severity are forwarded to the recipients.
    #[serde(default = "default_forward_severity")]
    pub forward_severity: Severity,
}

fn default_forward_severity() -> Severity {
    Severity::Error
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            forward_severity: default_forward_severity(),
        }
    }
}

pub struct AlertRule {
    id: RuleId,
    config: AlertConfig,
}

impl AlertRule {
    pub fn new(id: RuleId, config: AlertConfig) -> Self {
        Self { id, config }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn handle(&self, message: &Message) -> Option<Message> {
        let Message::Alert {
            code,
            severity,
            message: text,
            module,
        } = message
        else {
            return None;
        };
        if !self.config.modules.is_empty() && !self.config.modules.contains(module) {
            return None;
        }

        match severity {
            Severity::Debug => debug!(rule_id = self.id, %code, %module, "{text}"),
            Severity::Info => info!(rule_id = self.id, %code, %module, "{text}"),
            Severity::Warning => warn!(rule_id = self.id, %code, %module, "{text}"),
            Severity::Error => error!(rule_id = self.id, %code, %module, "{text}"),
        }

        (*severity >= self.config.forward_severity).then(|| message.clone())
    }
}
