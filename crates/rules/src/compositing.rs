//! Compositing rule: waits until every configured radar has delivered data
//! for a nominal time slot, then requests a composite over the area.
//!
//! Files are grouped by `(area, nominal time)`. The first file of a slot
//! starts a timeout (unless `timeout` is 0); if the timeout fires before all
//! sources are present, the composite is generated from what has arrived.

use std::collections::HashMap;
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
use crate::volume::DEFAULT_ELANGLE_EPSILON;

/// Algorithm name of composite generation requests.
pub const GENERATE_COMPOSITE: &str = "eu.baltrad.beast.GenerateComposite";

// ── Configuration ───────────────────────────────────────────────────

/// Compositing method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMethod {
    #[default]
    Ppi,
    Cappi,
    Pcappi,
    Pmax,
    Max,
}

impl CompositeMethod {
    fn as_arg(self) -> &'static str {
        match self {
            CompositeMethod::Ppi => "ppi",
            CompositeMethod::Cappi => "cappi",
            CompositeMethod::Pcappi => "pcappi",
            CompositeMethod::Pmax => "pmax",
            CompositeMethod::Max => "max",
        }
    }

    /// CAPPI-style products need a height in `prodpar`.
    fn needs_prodpar(self) -> bool {
        matches!(self, CompositeMethod::Cappi | CompositeMethod::Pcappi)
    }
}

/// How overlapping radars are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    #[default]
    NearestRadar,
    HeightAboveSealevel,
}

impl SelectionMethod {
    fn as_arg(self) -> &'static str {
        match self {
            SelectionMethod::NearestRadar => "NEAREST_RADAR",
            SelectionMethod::HeightAboveSealevel => "HEIGHT_ABOVE_SEALEVEL",
        }
    }
}

/// What the quality detectors do with their findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcMode {
    Analyze,
    #[default]
    AnalyzeAndApply,
}

impl QcMode {
    fn as_arg(self) -> &'static str {
        match self {
            QcMode::Analyze => "ANALYZE",
            QcMode::AnalyzeAndApply => "ANALYZE_AND_APPLY",
        }
    }
}

/// Gauge radar adjustment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraConfig {
    #[serde(default = "default_zr_a")]
    pub zr_a: f64,
    #[serde(default = "default_zr_b")]
    pub zr_b: f64,
}

fn default_zr_a() -> f64 {
    200.0
}

fn default_zr_b() -> f64 {
    1.6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositingConfig {
    /// Target area identifier.
    pub area: String,
    /// Slot length in minutes.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Seconds to wait for missing sources. 0 means never time out.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Radars that make up a complete composite.
    pub sources: Vec<String>,
    #[serde(default = "default_quantity")]
    pub quantity: String,
    /// Composite from scans instead of polar volumes.
    #[serde(default)]
    pub scan_based: bool,
    #[serde(default)]
    pub method: CompositeMethod,
    #[serde(default)]
    pub prodpar: Option<String>,
    #[serde(default)]
    pub selection: SelectionMethod,
    /// Quality detectors to run before compositing.
    #[serde(default)]
    pub detectors: Vec<String>,
    #[serde(default)]
    pub qc_mode: QcMode,
    #[serde(default)]
    pub ignore_malfunc: bool,
    #[serde(default)]
    pub ctfilter: bool,
    #[serde(default)]
    pub qitotal_field: Option<String>,
    #[serde(default)]
    pub gra: Option<GraConfig>,
}

fn default_interval() -> u32 {
    15
}

fn default_timeout() -> u64 {
    900
}

fn default_quantity() -> String {
    "DBZH".into()
}

impl CompositingConfig {
    /// Minimal config for `area` over `sources`, everything else defaulted.
    pub fn new(area: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            area: area.into(),
            interval: default_interval(),
            timeout: default_timeout(),
            sources,
            quantity: default_quantity(),
            scan_based: false,
            method: CompositeMethod::default(),
            prodpar: None,
            selection: SelectionMethod::default(),
            detectors: Vec::new(),
            qc_mode: QcMode::default(),
            ignore_malfunc: false,
            ctfilter: false,
            qitotal_field: None,
            gra: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(RuleError::invalid(RuleKind::Compositing, reason));
        if self.area.trim().is_empty() {
            return invalid("area must not be empty".into());
        }
        if self.sources.is_empty() {
            return invalid("at least one source is required".into());
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if source.trim().is_empty() {
                return invalid("source names must not be empty".into());
            }
            if !seen.insert(source.as_str()) {
                return invalid(format!("source '{source}' listed twice"));
            }
        }
        if !is_valid_interval(self.interval) {
            return invalid(format!("interval {} does not divide an hour", self.interval));
        }
        if self.quantity.trim().is_empty() {
            return invalid("quantity must not be empty".into());
        }
        if self.method.needs_prodpar() && self.prodpar.as_deref().map_or(true, str::is_empty) {
            return invalid(format!("method {} requires prodpar", self.method.as_arg()));
        }
        Ok(())
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// Accumulation key: one composite per area and nominal time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub area: String,
    pub nominal: NaiveDateTime,
}

/// Best file per source collected for one slot.
#[derive(Debug, Default)]
struct CompositeSlot {
    files: HashMap<String, FileEntry>,
}

pub struct CompositingRule {
    inner: Arc<CompositingInner>,
}

struct CompositingInner {
    id: RuleId,
    config: CompositingConfig,
    route: Option<String>,
    timeouts: Arc<TimeoutManager>,
    collector: SlotCollector<CompositeKey, CompositeSlot>,
}

impl CompositingRule {
    pub fn new(id: RuleId, config: CompositingConfig, ctx: &RuleContext) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(CompositingInner {
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

    pub fn config(&self) -> &CompositingConfig {
        &self.inner.config
    }

    /// State of the slot for `nominal`, if any.
    pub fn slot_state(&self, nominal: NaiveDateTime) -> Option<SlotState> {
        self.inner.collector.state(&CompositeKey {
            area: self.inner.config.area.clone(),
            nominal,
        })
    }

    /// Number of slots still collecting.
    pub fn open_slots(&self) -> usize {
        self.inner.collector.open_count()
    }

    pub fn handle(&self, message: &Message) -> Result<Option<Message>> {
        let inner = &self.inner;
        let Some(file) = message.file() else {
            return Ok(None);
        };
        if !inner.accepts(file) {
            return Ok(None);
        }

        let key = CompositeKey {
            area: inner.config.area.clone(),
            nominal: nominal_time(file.datetime, inner.config.interval),
        };
        let Some((slot, evicted)) = inner.collector.open(&key) else {
            debug!(rule_id = inner.id, source = %file.source, nominal = %key.nominal, "composite already generated, ignoring file");
            return Ok(None);
        };
        if let Some(timer) = evicted {
            inner.timeouts.cancel(timer);
        }

        let mut guard = lock(&slot);
        if guard.state != SlotState::Collecting {
            return Ok(None);
        }
        inner.add(&mut guard.data, file);

        if inner.is_complete(&guard.data) {
            let (data, timer) = inner
                .collector
                .close(&key, &slot, &mut guard, SlotState::Complete);
            drop(guard);
            if let Some(timer) = timer {
                inner.timeouts.cancel(timer);
            }
            info!(rule_id = inner.id, area = %key.area, nominal = %key.nominal, "composite complete");
            return Ok(Some(inner.generate(&key, &data)));
        }

        if guard.timer.is_none() && inner.config.timeout > 0 {
            let callback: Arc<dyn TimeoutCallback> = Arc::clone(inner) as Arc<dyn TimeoutCallback>;
            guard.timer = Some(inner.timeouts.register(
                callback,
                Duration::from_secs(inner.config.timeout),
                Some(Box::new(key.clone())),
            ));
        }
        debug!(
            rule_id = inner.id,
            source = %file.source,
            nominal = %key.nominal,
            collected = guard.data.files.len(),
            expected = inner.config.sources.len(),
            "collecting composite inputs"
        );
        Ok(None)
    }

    /// Abandon all open slots and cancel their timers.
    pub fn dispose(&self) {
        for timer in self.inner.collector.supersede_all() {
            self.inner.timeouts.cancel(timer);
        }
    }
}

impl CompositingInner {
    fn accepts(&self, file: &FileEntry) -> bool {
        let wanted = if self.config.scan_based {
            ObjectType::Scan
        } else {
            ObjectType::Pvol
        };
        if file.object != wanted || !self.config.sources.contains(&file.source) {
            return false;
        }
        if self.config.scan_based && file.elangle.is_none() {
            return false;
        }
        file.quantity
            .as_deref()
            .map_or(true, |q| q == self.config.quantity)
    }

    /// Keep the newest volume per source, or for scan composites the lowest scan.
    /// Arrival order does not matter.
    fn add(&self, slot: &mut CompositeSlot, file: &FileEntry) {
        if let Some(existing) = slot.files.get(&file.source) {
            let keep_existing = if self.config.scan_based {
                let new = file.elangle.unwrap_or(f64::INFINITY);
                let old = existing.elangle.unwrap_or(f64::INFINITY);
                new >= old - DEFAULT_ELANGLE_EPSILON
            } else {
                file.datetime < existing.datetime
            };
            if keep_existing {
                return;
            }
        }
        slot.files.insert(file.source.clone(), file.clone());
    }

    fn is_complete(&self, slot: &CompositeSlot) -> bool {
        self.config
            .sources
            .iter()
            .all(|s| slot.files.contains_key(s))
    }

    fn generate(&self, key: &CompositeKey, slot: &CompositeSlot) -> Message {
        let c = &self.config;
        let files = c
            .sources
            .iter()
            .filter_map(|s| slot.files.get(s))
            .map(|f| f.uuid.clone())
            .collect();

        let mut args = vec![
            format!("--area={}", c.area),
            format!("--date={}", date_arg(key.nominal)),
            format!("--time={}", time_arg(key.nominal)),
            format!("--selection={}", c.selection.as_arg()),
            format!("--method={}", c.method.as_arg()),
        ];
        if let Some(prodpar) = &c.prodpar {
            args.push(format!("--prodpar={prodpar}"));
        }
        if !c.detectors.is_empty() {
            args.push(format!("--anomaly-qc={}", c.detectors.join(",")));
            args.push(format!("--qc-mode={}", c.qc_mode.as_arg()));
        }
        if c.ignore_malfunc {
            args.push("--ignore-malfunc=true".into());
        }
        if c.ctfilter {
            args.push("--ctfilter=True".into());
        }
        if let Some(field) = &c.qitotal_field {
            args.push(format!("--qitotal_field={field}"));
        }
        if let Some(gra) = &c.gra {
            args.push("--applygra=true".into());
            args.push(format!("--zrA={}", gra.zr_a));
            args.push(format!("--zrb={}", gra.zr_b));
        }
        args.push(format!("--quantity={}", c.quantity));

        Message::generate(GENERATE_COMPOSITE, files, args)
    }
}

impl TimeoutCallback for CompositingInner {
    fn timeout(&self, id: TimeoutId, reason: TimeoutReason, data: Option<TimeoutData>) -> Option<Message> {
        if reason == TimeoutReason::Cancelled {
            return None;
        }
        let key = data?.downcast::<CompositeKey>().ok()?;
        let slot = self.collector.expire(&key)?;
        if slot.files.is_empty() {
            return None;
        }
        info!(
            rule_id = self.id,
            timeout_id = id,
            area = %key.area,
            nominal = %key.nominal,
            collected = slot.files.len(),
            expected = self.config.sources.len(),
            "composite timed out, generating from partial set"
        );
        Some(RuleContext::address(self.route.as_deref(), self.generate(&key, &slot)))
    }
}
