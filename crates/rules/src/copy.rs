//! Copy rule: forwards matching file arrivals unchanged to the recipients.

use serde::{Deserialize, Serialize};

use beast_core::{Message, ObjectType};

use crate::rule::RuleId;

/// Empty filter lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub objects: Vec<ObjectType>,
    #[serde(default)]
    pub sources: Vec<String>,
}

pub struct CopyRule {
    id: RuleId,
    config: CopyConfig,
}

impl CopyRule {
    pub fn new(id: RuleId, config: CopyConfig) -> Self {
        Self { id, config }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    pub fn handle(&self, message: &Message) -> Option<Message> {
        let file = message.file()?;
        let object_ok = self.config.objects.is_empty() || self.config.objects.contains(&file.object);
        let source_ok = self.config.sources.is_empty() || self.config.sources.contains(&file.source);
        (object_ok && source_ok).then(|| message.clone())
    }
}
