//! Rule configuration and the rule sum type.
//!
//! [`RuleConfig`] is what routes persist; [`Rule`] is the live instance built
//! from it, owning whatever accumulation state its kind needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use beast_core::Message;

use crate::alert::{AlertConfig, AlertRule};
use crate::compositing::{CompositingConfig, CompositingRule};
use crate::context::RuleContext;
use crate::copy::{CopyConfig, CopyRule};
use crate::error::Result;
use crate::kind::RuleKind;
use crate::scansun::{ScansunConfig, ScansunRule};
use crate::script::{ScriptConfig, ScriptRule};
use crate::volume::{VolumeConfig, VolumeRule};

/// Stable numeric identity of a live rule instance.
pub type RuleId = u64;

/// Rule parameters, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    Compositing(CompositingConfig),
    Volume(VolumeConfig),
    Scansun(ScansunConfig),
    Alert(AlertConfig),
    Copy(CopyConfig),
    Script(ScriptConfig),
}

impl RuleConfig {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleConfig::Compositing(_) => RuleKind::Compositing,
            RuleConfig::Volume(_) => RuleKind::Volume,
            RuleConfig::Scansun(_) => RuleKind::Scansun,
            RuleConfig::Alert(_) => RuleKind::Alert,
            RuleConfig::Copy(_) => RuleKind::Copy,
            RuleConfig::Script(_) => RuleKind::Script,
        }
    }

    /// Check parameters without building an instance.
    pub fn validate(&self) -> Result<()> {
        match self {
            RuleConfig::Compositing(c) => c.validate(),
            RuleConfig::Volume(c) => c.validate(),
            RuleConfig::Scansun(c) => c.validate(),
            RuleConfig::Script(c) => c.validate(),
            RuleConfig::Alert(_) | RuleConfig::Copy(_) => Ok(()),
        }
    }
}

/// A live rule. Each variant carries its own state.
pub enum Rule {
    Compositing(CompositingRule),
    Volume(VolumeRule),
    Scansun(ScansunRule),
    Alert(AlertRule),
    Copy(CopyRule),
    Script(ScriptRule),
}

impl Rule {
    pub fn build(id: RuleId, config: &RuleConfig, ctx: &RuleContext) -> Result<Self> {
        Ok(match config {
            RuleConfig::Compositing(c) => Rule::Compositing(CompositingRule::new(id, c.clone(), ctx)?),
            RuleConfig::Volume(c) => Rule::Volume(VolumeRule::new(id, c.clone(), ctx)?),
            RuleConfig::Scansun(c) => Rule::Scansun(ScansunRule::new(id, c.clone())?),
            RuleConfig::Alert(c) => Rule::Alert(AlertRule::new(id, c.clone())),
            RuleConfig::Copy(c) => Rule::Copy(CopyRule::new(id, c.clone())),
            RuleConfig::Script(c) => Rule::Script(ScriptRule::new(id, c.clone(), &ctx.scripts)?),
        })
    }

    pub fn id(&self) -> RuleId {
        match self {
            Rule::Compositing(r) => r.id(),
            Rule::Volume(r) => r.id(),
            Rule::Scansun(r) => r.id(),
            Rule::Alert(r) => r.id(),
            Rule::Copy(r) => r.id(),
            Rule::Script(r) => r.id(),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Compositing(_) => RuleKind::Compositing,
            Rule::Volume(_) => RuleKind::Volume,
            Rule::Scansun(_) => RuleKind::Scansun,
            Rule::Alert(_) => RuleKind::Alert,
            Rule::Copy(_) => RuleKind::Copy,
            Rule::Script(_) => RuleKind::Script,
        }
    }

    /// Feed one message. `Ok(None)` means nothing to route.
    pub fn handle(&self, message: &Message) -> Result<Option<Message>> {
        match self {
            Rule::Compositing(r) => r.handle(message),
            Rule::Volume(r) => r.handle(message),
            Rule::Scansun(r) => Ok(r.handle(message)),
            Rule::Alert(r) => Ok(r.handle(message)),
            Rule::Copy(r) => Ok(r.handle(message)),
            Rule::Script(r) => r.handle(message),
        }
    }

    /// Release accumulation state and pending timers. Called when the rule
    /// is unregistered or replaced.
    pub fn dispose(&self) {
        match self {
            Rule::Compositing(r) => r.dispose(),
            Rule::Volume(r) => r.dispose(),
            Rule::Script(r) => r.dispose(),
            Rule::Scansun(_) | Rule::Alert(_) | Rule::Copy(_) => {}
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use beast_core::{FileEntry, ObjectType, Severity};
    use chrono::NaiveDate;

    use crate::error::RuleError;
    use crate::timeout::TimeoutManager;

    const ROUTES: &str = r#"
- type: compositing
  area: swegmaps_2000
  sources: [seang, searl, sehud]
  timeout: 0
- type: volume
  elevation_max: 24.0
- type: scansun
  sources: [seang]
- type: alert
  forward_severity: warning
- type: copy
  objects: [PVOL]
- type: script
  script: echo
"#;

    #[test]
    fn parses_every_kind() {
        let configs: Vec<RuleConfig> = serde_yaml::from_str(ROUTES).unwrap();
        let kinds: Vec<RuleKind> = configs.iter().map(RuleConfig::kind).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::Compositing,
                RuleKind::Volume,
                RuleKind::Scansun,
                RuleKind::Alert,
                RuleKind::Copy,
                RuleKind::Script,
            ]
        );
        match &configs[3] {
            RuleConfig::Alert(a) => assert_eq!(a.forward_severity, Severity::Warning),
            other => panic!("unexpected {other:?}"),
        }
        for config in &configs {
            config.validate().unwrap();
        }
    }

    #[test]
    fn invalid_config_is_reported_with_kind() {
        let config: RuleConfig =
            serde_yaml::from_str("type: scansun\nsources: []\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(RuleError::InvalidConfig { kind: RuleKind::Scansun, .. })
        ));
    }

    #[tokio::test]
    async fn builds_and_dispatches() {
        let ctx = RuleContext::with_timeouts(TimeoutManager::current());
        let config: RuleConfig = serde_yaml::from_str("type: copy\n").unwrap();
        let rule = Rule::build(42, &config, &ctx).unwrap();
        assert_eq!(rule.id(), 42);
        assert_eq!(rule.kind(), RuleKind::Copy);

        let dt = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let msg = Message::data_arrival(FileEntry::new("u", ObjectType::Pvol, "seang", dt));
        assert_eq!(rule.handle(&msg).unwrap(), Some(msg));
        rule.dispose();
    }

    #[tokio::test]
    async fn script_build_needs_registered_plugin() {
        let ctx = RuleContext::new(TimeoutManager::current(), Arc::default());
        let config: RuleConfig = serde_yaml::from_str("type: script\nscript: echo\n").unwrap();
        assert!(matches!(
            Rule::build(1, &config, &ctx),
            Err(RuleError::UnknownScript(_))
        ));
    }
}
