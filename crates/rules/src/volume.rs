//! Volume rule: assembles individual scans of one radar into a polar volume.
//!
//! Scans are grouped by `(source, nominal time)`. A slot completes when the
//! elevation sequence reaches the end of the configured window (the top for
//! ascending sequences, the bottom for descending ones) or, when an explicit
//! list of elevation angles is configured, when each listed angle has a scan.
//! Only scans inside `[elevation_min, elevation_max]` are included.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use beast_core::{FileEntry, Message, ObjectType};

use crate::collector::{SlotCollector, SlotState, DEFAULT_CLOSED_MEMORY, DEFAULT_OPEN_LIMIT};
use crate::context::RuleContext;
use crate::error::{Result, RuleError};
use crate::kind::RuleKind;
use crate::lock;
use crate::nominal::{date_arg, is_valid_interval, nominal_time, time_arg};
use crate::rule::RuleId;
use crate::timeout::{TimeoutCallback, TimeoutData, TimeoutId, TimeoutManager, TimeoutReason};

/// Algorithm name of volume generation requests.
pub const GENERATE_VOLUME: &str = "eu.baltrad.beast.GenerateVolume";

/// Angles closer than this (degrees) are treated as the same elevation.
pub const DEFAULT_ELANGLE_EPSILON: f64 = 0.05;

/// Which scan to keep when two scans share an elevation within epsilon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the scan that arrived first.
    #[default]
    FirstSeen,
    /// Keep the scan with the lowest angle.
    Lowest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Radars to assemble volumes for. Empty accepts every source.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Seconds to wait for the sequence to finish. 0 means never time out.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Scans arrive from the lowest elevation upwards.
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    #[serde(default)]
    pub elevation_min: f64,
    #[serde(default = "default_elevation_max")]
    pub elevation_max: f64,
    /// Exact elevations that make up a volume. Overrides sequence detection.
    #[serde(default)]
    pub elangles: Vec<f64>,
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_interval() -> u32 {
    15
}

fn default_timeout() -> u64 {
    900
}

fn default_ascending() -> bool {
    true
}

fn default_elevation_max() -> f64 {
    90.0
}

fn default_epsilon() -> f64 {
    DEFAULT_ELANGLE_EPSILON
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            interval: default_interval(),
            timeout: default_timeout(),
            ascending: default_ascending(),
            elevation_min: 0.0,
            elevation_max: default_elevation_max(),
            elangles: Vec::new(),
            tie_break: TieBreak::default(),
            epsilon: default_epsilon(),
        }
    }
}

impl VolumeConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(RuleError::invalid(RuleKind::Volume, reason));
        if !is_valid_interval(self.interval) {
            return invalid(format!("interval {} does not divide an hour", self.interval));
        }
        if !self.elevation_min.is_finite() || !self.elevation_max.is_finite() {
            return invalid("elevation bounds must be finite".into());
        }
        if self.elevation_min > self.elevation_max {
            return invalid(format!(
                "elevation_min {} exceeds elevation_max {}",
                self.elevation_min, self.elevation_max
            ));
        }
        if !(self.epsilon >= 0.0 && self.epsilon < 1.0) {
            return invalid(format!("epsilon {} must be in [0, 1)", self.epsilon));
        }
        if let Some(outside) = self.elangles.iter().find(|a| !self.in_range(**a)) {
            return invalid(format!("elangle {outside} lies outside the elevation window"));
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return invalid("source names must not be empty".into());
        }
        Ok(())
    }

    fn same_angle(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.epsilon
    }

    fn in_range(&self, angle: f64) -> bool {
        angle >= self.elevation_min - self.epsilon && angle <= self.elevation_max + self.epsilon
    }
}

/// Accumulation key: one volume per source and nominal time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    pub source: String,
    pub nominal: NaiveDateTime,
}

#[derive(Debug, Default)]
struct VolumeSlot {
    scans: Vec<FileEntry>,
}

impl VolumeSlot {
    fn angle(scan: &FileEntry) -> f64 {
        scan.elangle.unwrap_or(f64::NAN)
    }
}

pub struct VolumeRule {
    inner: Arc<VolumeInner>,
}

struct VolumeInner {
    id: RuleId,
    config: VolumeConfig,
    route: Option<String>,
    timeouts: Arc<TimeoutManager>,
    collector: SlotCollector<VolumeKey, VolumeSlot>,
}

impl VolumeRule {
    pub fn new(id: RuleId, config: VolumeConfig, ctx: &RuleContext) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(VolumeInner {
                id,
                config,
                route: ctx.route.clone(),
                timeouts: Arc::clone(&ctx.timeouts),
                collector: SlotCollector::new(DEFAULT_CLOSED_MEMORY, DEFAULT_OPEN_LIMIT),
            }),
        })
    }

    pub fn id(&self) -> RuleId {
        self.inner.id
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.inner.config
    }

    pub fn slot_state(&self, source: &str, nominal: NaiveDateTime) -> Option<SlotState> {
        self.inner.collector.state(&VolumeKey {
            source: source.to_string(),
            nominal,
        })
    }

    /// Number of slots still collecting.
    pub fn open_slots(&self) -> usize {
        self.inner.collector.open_count()
    }

    pub fn handle(&self, message: &Message) -> Result<Option<Message>> {
        let inner = &self.inner;
        let Some((file, angle)) = message.file().and_then(|f| inner.accepts(f)) else {
            return Ok(None);
        };

        let key = VolumeKey {
            source: file.source.clone(),
            nominal: nominal_time(file.datetime, inner.config.interval),
        };
        let in_range = inner.config.in_range(angle);
        // Out-of-window scans may end a sequence but never start one.
        let opened = if in_range {
            inner.collector.open(&key)
        } else {
            inner.collector.get(&key).map(|slot| (slot, None))
        };
        let Some((slot, evicted)) = opened else {
            debug!(rule_id = inner.id, source = %key.source, elangle = angle, "scan not collected");
            return Ok(None);
        };
        if let Some(timer) = evicted {
            inner.timeouts.cancel(timer);
        }

        let mut guard = lock(&slot);
        if guard.state != SlotState::Collecting {
            return Ok(None);
        }
        if in_range {
            inner.add(&mut guard.data, file, angle);
        }

        if inner.is_complete(&guard.data, angle) {
            let (data, timer) = inner
                .collector
                .close(&key, &slot, &mut guard, SlotState::Complete);
            drop(guard);
            if let Some(timer) = timer {
                inner.timeouts.cancel(timer);
            }
            info!(
                rule_id = inner.id,
                source = %key.source,
                nominal = %key.nominal,
                scans = data.scans.len(),
                "volume complete"
            );
            return Ok(Some(inner.generate(&key, data)));
        }

        if in_range && guard.timer.is_none() && inner.config.timeout > 0 {
            let callback = Arc::clone(inner) as Arc<dyn TimeoutCallback>;
            guard.timer = Some(inner.timeouts.register(
                callback,
                Duration::from_secs(inner.config.timeout),
                Some(Box::new(key.clone())),
            ));
        }
        Ok(None)
    }

    /// Abandon all open slots and cancel their timers.
    pub fn dispose(&self) {
        for timer in self.inner.collector.supersede_all() {
            self.inner.timeouts.cancel(timer);
        }
    }
}

impl VolumeInner {
    fn accepts<'a>(&self, file: &'a FileEntry) -> Option<(&'a FileEntry, f64)> {
        if file.object != ObjectType::Scan {
            return None;
        }
        if !self.config.sources.is_empty() && !self.config.sources.contains(&file.source) {
            return None;
        }
        let angle = file.elangle.filter(|a| a.is_finite())?;
        Some((file, angle))
    }

    fn add(&self, slot: &mut VolumeSlot, file: &FileEntry, angle: f64) {
        let existing = slot
            .scans
            .iter()
            .position(|s| self.config.same_angle(VolumeSlot::angle(s), angle));
        match (existing, self.config.tie_break) {
            (None, _) => slot.scans.push(file.clone()),
            (Some(_), TieBreak::FirstSeen) => {
                debug!(rule_id = self.id, uuid = %file.uuid, elangle = angle, "duplicate elevation, keeping first");
            }
            (Some(i), TieBreak::Lowest) => {
                if angle < VolumeSlot::angle(&slot.scans[i]) {
                    slot.scans[i] = file.clone();
                }
            }
        }
    }

    fn is_complete(&self, slot: &VolumeSlot, arriving: f64) -> bool {
        let c = &self.config;
        if slot.scans.is_empty() {
            return false;
        }
        if !c.elangles.is_empty() {
            return c.elangles.iter().all(|expected| {
                slot.scans
                    .iter()
                    .any(|s| c.same_angle(VolumeSlot::angle(s), *expected))
            });
        }
        if c.ascending {
            arriving >= c.elevation_max - c.epsilon
        } else {
            arriving <= c.elevation_min + c.epsilon
        }
    }

    fn generate(&self, key: &VolumeKey, mut slot: VolumeSlot) -> Message {
        slot.scans
            .sort_by(|a, b| VolumeSlot::angle(a).total_cmp(&VolumeSlot::angle(b)));
        if !self.config.ascending {
            slot.scans.reverse();
        }
        let files = slot.scans.into_iter().map(|s| s.uuid).collect();
        Message::generate(
            GENERATE_VOLUME,
            files,
            vec![
                format!("--source={}", key.source),
                format!("--date={}", date_arg(key.nominal)),
                format!("--time={}", time_arg(key.nominal)),
            ],
        )
    }
}

impl TimeoutCallback for VolumeInner {
    fn timeout(&self, id: TimeoutId, reason: TimeoutReason, data: Option<TimeoutData>) -> Option<Message> {
        if reason == TimeoutReason::Cancelled {
            return None;
        }
        let key = data?.downcast::<VolumeKey>().ok()?;
        let slot = self.collector.expire(&key)?;
        if slot.scans.is_empty() {
            return None;
        }
        info!(
            rule_id = self.id,
            timeout_id = id,
            source = %key.source,
            nominal = %key.nominal,
            scans = slot.scans.len(),
            "volume timed out, generating from collected scans"
        );
        Some(RuleContext::address(self.route.as_deref(), self.generate(&key, slot)))
    }
}
