//! Persisted route definition.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use beast_rules::RuleConfig;

use crate::error::{Result, RoutingError};

/// Binds a rule to its recipient adaptors.
///
/// ```yaml
/// name: swegmaps-composite
/// author: ops
/// description: 2 km Swedish composite
/// recipients: [dex]
/// rule:
///   type: compositing
///   area: swegmaps_2000
///   sources: [seang, searl, sehud]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Unique route name. Also the target of `Trigger { job }` messages.
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Inactive routes are kept but never evaluated.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Adaptor names that receive the rule's output.
    #[serde(default)]
    pub recipients: Vec<String>,
    pub rule: RuleConfig,
}

fn default_active() -> bool {
    true
}

impl RouteDefinition {
    pub fn new(name: impl Into<String>, recipients: Vec<String>, rule: RuleConfig) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            description: String::new(),
            active: true,
            recipients,
            rule,
        }
    }

    /// Names become file names in the YAML store, so only
    /// `[A-Za-z0-9_.-]` is allowed and a leading dot is rejected.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RoutingError::InvalidRoute("route name must not be empty".into()));
        }
        let name_ok = !self.name.starts_with('.')
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !name_ok {
            return Err(RoutingError::InvalidRoute(format!(
                "route name '{}' may only contain letters, digits, '_', '-' and '.'",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for recipient in &self.recipients {
            if recipient.trim().is_empty() {
                return Err(RoutingError::InvalidRoute(format!(
                    "route '{}' has an empty recipient",
                    self.name
                )));
            }
            if !seen.insert(recipient) {
                return Err(RoutingError::InvalidRoute(format!(
                    "route '{}' lists recipient '{recipient}' twice",
                    self.name
                )));
            }
        }
        self.rule.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beast_rules::RuleKind;

    fn parse(yaml: &str) -> RouteDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parse_with_defaults() {
        let def = parse(
            r#"
name: swegmaps-composite
recipients: [dex]
rule:
  type: compositing
  area: swegmaps_2000
  sources: [seang, searl, sehud]
"#,
        );
        assert!(def.active);
        assert!(def.author.is_empty());
        assert_eq!(def.rule.kind(), RuleKind::Compositing);
        def.validate().unwrap();
    }

    #[test]
    fn rejects_unsafe_names() {
        for name in ["", ".hidden", "a/b", "with space"] {
            let mut def = parse("name: x\nrule:\n  type: copy\n");
            def.name = name.into();
            assert!(
                matches!(def.validate(), Err(RoutingError::InvalidRoute(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicate_recipients() {
        let def = parse("name: x\nrecipients: [a, a]\nrule:\n  type: copy\n");
        assert!(matches!(def.validate(), Err(RoutingError::InvalidRoute(_))));
    }

    #[test]
    fn rule_errors_surface() {
        let def = parse("name: x\nrule:\n  type: scansun\n  sources: []\n");
        assert!(matches!(def.validate(), Err(RoutingError::Rule(_))));
    }
}
