//! Scansun rule: requests sun-hit analysis for every scan or volume of the
//! configured radars. Stateless.

use serde::{Deserialize, Serialize};

use beast_core::{Message, ObjectType};

use crate::error::{Result, RuleError};
use crate::kind::RuleKind;
use crate::rule::RuleId;

/// Algorithm name of scansun requests.
pub const GENERATE_SCANSUN: &str = "eu.baltrad.beast.GenerateScansun";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScansunConfig {
    pub sources: Vec<String>,
}

impl ScansunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(RuleError::invalid(
                RuleKind::Scansun,
                "at least one source is required",
            ));
        }
        Ok(())
    }
}

pub struct ScansunRule {
    id: RuleId,
    config: ScansunConfig,
}

impl ScansunRule {
    pub fn new(id: RuleId, config: ScansunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { id, config })
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn config(&self) -> &ScansunConfig {
        &self.config
    }

    pub fn handle(&self, message: &Message) -> Option<Message> {
        let file = message.file()?;
        if !matches!(file.object, ObjectType::Scan | ObjectType::Pvol) {
            return None;
        }
        if !self.config.sources.contains(&file.source) {
            return None;
        }
        Some(Message::generate(
            GENERATE_SCANSUN,
            vec![file.uuid.clone()],
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beast_core::FileEntry;
    use chrono::NaiveDate;

    fn arrival(object: ObjectType, source: &str) -> Message {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Message::data_arrival(FileEntry::new("f1", object, source, dt))
    }

    #[test]
    fn emits_one_request_per_matching_file() {
        let rule = ScansunRule::new(
            1,
            ScansunConfig {
                sources: vec!["seang".into()],
            },
        )
        .unwrap();

        for object in [ObjectType::Scan, ObjectType::Pvol] {
            assert_eq!(
                rule.handle(&arrival(object, "seang")),
                Some(Message::generate(GENERATE_SCANSUN, vec!["f1".into()], vec![]))
            );
        }
        assert!(rule.handle(&arrival(ObjectType::Comp, "seang")).is_none());
        assert!(rule.handle(&arrival(ObjectType::Scan, "searl")).is_none());
        assert!(rule.handle(&Message::trigger("x", "y")).is_none());
    }

    #[test]
    fn requires_sources() {
        assert!(ScansunRule::new(1, ScansunConfig { sources: vec![] }).is_err());
    }
}
