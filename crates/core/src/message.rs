//! Message model shared by every stage of the routing pipeline.
//!
//! Messages are immutable once built. Producers (catalog ingestion, the cron
//! scheduler, rule timeouts) create them, the router fans them out, and
//! adaptors consume the per-recipient [`Route`] copies.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── File metadata ───────────────────────────────────────────────────

/// Object type of a cataloged file (ODIM `what/object`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    /// Polar volume.
    Pvol,
    /// Single polar scan.
    Scan,
    /// Cartesian composite.
    Comp,
    /// Cartesian image.
    Image,
    /// Vertical profile.
    Vp,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Pvol => write!(f, "PVOL"),
            ObjectType::Scan => write!(f, "SCAN"),
            ObjectType::Comp => write!(f, "COMP"),
            ObjectType::Image => write!(f, "IMAGE"),
            ObjectType::Vp => write!(f, "VP"),
        }
    }
}

/// Scalar metadata the catalog exposes for a single file.
///
/// Stateful rules depend only on these fields, never on file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Catalog identifier of the file.
    pub uuid: String,
    /// Storage path, when the catalog exposes one.
    #[serde(default)]
    pub path: Option<String>,
    pub object: ObjectType,
    /// Node (source) name, e.g. `seang`.
    pub source: String,
    /// Nominal date/time of the data (UTC).
    pub datetime: NaiveDateTime,
    /// Elevation angle in degrees (scans only).
    #[serde(default)]
    pub elangle: Option<f64>,
    /// Primary quantity, e.g. `DBZH`.
    #[serde(default)]
    pub quantity: Option<String>,
}

impl FileEntry {
    /// Build an entry with the mandatory fields; optional fields start empty.
    pub fn new(
        uuid: impl Into<String>,
        object: ObjectType,
        source: impl Into<String>,
        datetime: NaiveDateTime,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            path: None,
            object,
            source: source.into(),
            datetime,
            elangle: None,
            quantity: None,
        }
    }

    pub fn with_elangle(mut self, elangle: f64) -> Self {
        self.elangle = Some(elangle);
        self
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// ── Alert severity ──────────────────────────────────────────────────

/// Severity carried by alert messages, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ── Message union ───────────────────────────────────────────────────

/// Every event kind that flows through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A new file was cataloged.
    DataArrival { file: FileEntry },
    /// Free-form command text from an operator or external system.
    Command { text: String },
    /// Request to run a product generation algorithm.
    Generate {
        algorithm: String,
        files: Vec<String>,
        #[serde(default)]
        arguments: Vec<String>,
    },
    /// Operational alert raised by some module.
    Alert {
        code: String,
        severity: Severity,
        message: String,
        module: String,
    },
    /// Scheduler or operator trigger. `job` names the route it targets.
    Trigger {
        #[serde(default)]
        job: String,
        reason: String,
    },
    /// A payload addressed to exactly one recipient adaptor.
    MultiRouted {
        destination: String,
        payload: Box<Message>,
    },
}

impl Message {
    pub fn data_arrival(file: FileEntry) -> Self {
        Message::DataArrival { file }
    }

    pub fn generate(algorithm: impl Into<String>, files: Vec<String>, arguments: Vec<String>) -> Self {
        Message::Generate {
            algorithm: algorithm.into(),
            files,
            arguments,
        }
    }

    pub fn trigger(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Message::Trigger {
            job: job.into(),
            reason: reason.into(),
        }
    }

    /// Short tag used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::DataArrival { .. } => "data_arrival",
            Message::Command { .. } => "command",
            Message::Generate { .. } => "generate",
            Message::Alert { .. } => "alert",
            Message::Trigger { .. } => "trigger",
            Message::MultiRouted { .. } => "multi_routed",
        }
    }

    /// The file carried by a data-arrival message.
    pub fn file(&self) -> Option<&FileEntry> {
        match self {
            Message::DataArrival { file } => Some(file),
            _ => None,
        }
    }
}

// ── Routed copies ───────────────────────────────────────────────────

/// One outbound delivery: a payload bound to a single recipient adaptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Adaptor name the payload is addressed to.
    pub destination: String,
    pub payload: Message,
}

impl Route {
    pub fn new(destination: impl Into<String>, payload: Message) -> Self {
        Self {
            destination: destination.into(),
            payload,
        }
    }
}

impl From<Route> for Message {
    fn from(route: Route) -> Self {
        Message::MultiRouted {
            destination: route.destination,
            payload: Box::new(route.payload),
        }
    }
}
