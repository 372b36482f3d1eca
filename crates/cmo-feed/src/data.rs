use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use cmo_runtime::StopSignal;
use cmo_widgets::{
    FieldValue, Filterable, ListItem, LiveEvent, LiveSource, LoadError, LoadRequest, Page,
    PageSource,
};
use serde::Deserialize;
use tracing::{debug, info};

// --- Alert record, matching the monitoring service JSON ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn rank(self) -> f64 {
        f64::from(self as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alert {
    pub id: u64,
    #[serde(default)]
    pub severity: Severity,
    /// tamper, door_open, gps_loss, low_battery, route_deviation, ...
    pub kind: String,
    pub transit: String,
    #[serde(default)]
    pub precinto: Option<String>,
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
}

impl ListItem for Alert {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

impl Filterable for Alert {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "severity" => Some(self.severity.as_str().into()),
            "severity_rank" => Some(self.severity.rank().into()),
            "kind" => Some(self.kind.as_str().into()),
            "transit" => Some(self.transit.as_str().into()),
            "precinto" => self.precinto.as_deref().map(FieldValue::from),
            "timestamp" => Some((self.timestamp as f64).into()),
            "acknowledged" => Some(self.acknowledged.into()),
            _ => None,
        }
    }

    fn search_text(&self) -> Cow<'_, str> {
        let precinto = self.precinto.as_deref().unwrap_or("");
        Cow::Owned(format!("{} {} {} {}", self.transit, precinto, self.kind, self.message))
    }
}

/// Failure reading a fixture file.
#[derive(Debug)]
pub enum SeedError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for SeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read seed file: {err}"),
            Self::Parse(err) => write!(f, "invalid seed JSON: {err}"),
        }
    }
}

impl std::error::Error for SeedError {}

/// Read a JSON array of alerts.
pub fn load_seed(path: &Path) -> Result<Vec<Alert>, SeedError> {
    let text = std::fs::read_to_string(path).map_err(SeedError::Io)?;
    let alerts: Vec<Alert> = serde_json::from_str(&text).map_err(SeedError::Parse)?;
    info!(count = alerts.len(), path = %path.display(), "seed alerts loaded");
    Ok(alerts)
}

// --- Deterministic mock data ---

const KINDS: [(&str, &str); 5] = [
    ("tamper", "Precinto seal tampered"),
    ("door_open", "Container door opened outside a checkpoint"),
    ("gps_loss", "GPS signal lost"),
    ("low_battery", "Precinto battery below 15%"),
    ("route_deviation", "Transit left its authorized corridor near the border crossing"),
];

const BASE_TIME: u64 = 1_767_225_600;

/// Mock alert number `n`, stable across runs.
pub fn mock_alert(n: u64) -> Alert {
    let mix = n.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    let (kind, message) = KINDS[(mix % KINDS.len() as u64) as usize];
    let severity = Severity::ALL[((mix >> 8) % 5) as usize];
    Alert {
        id: n,
        severity,
        kind: kind.to_owned(),
        transit: format!("TR-{:05}", 10_000 + (mix >> 16) % 5_000),
        precinto: (kind != "gps_loss").then(|| format!("PR-{:04}", (mix >> 32) % 9_000)),
        timestamp: BASE_TIME.saturating_sub(n * 45),
        message: message.to_owned(),
        acknowledged: (mix >> 40) % 4 == 0,
    }
}

/// Paged mock source with optional latency and injected failures.
#[derive(Debug)]
pub struct MockAlertSource {
    page_size: u32,
    pages: u32,
    latency: Duration,
    fail_every: Option<u32>,
    calls: AtomicU32,
}

impl MockAlertSource {
    pub fn new(page_size: u32, pages: u32) -> Self {
        Self {
            page_size,
            pages,
            latency: Duration::ZERO,
            fail_every: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every `n`th request fails with a timeout.
    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }
}

impl PageSource<Alert> for MockAlertSource {
    fn load_page(&self, request: &LoadRequest) -> Result<Page<Alert>, LoadError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(LoadError::Timeout);
        }
        let start = u64::from(request.page) * u64::from(self.page_size);
        let items: Vec<Alert> = (start..start + u64::from(self.page_size))
            .map(mock_alert)
            .collect();
        debug!(page = request.page, count = items.len(), "mock page served");
        let page = if request.page + 1 >= self.pages {
            Page::last(items)
        } else {
            Page::more(items)
        };
        Ok(page.with_cursor(format!("p{}", request.page + 1)))
    }
}

/// Emits a new alert, an acknowledgement or a removal on a fixed cadence.
#[derive(Debug)]
pub struct MockLiveStream {
    interval: Duration,
    first_id: u64,
}

impl MockLiveStream {
    pub fn new(interval: Duration, first_id: u64) -> Self {
        Self { interval, first_id }
    }
}

impl LiveSource<Alert> for MockLiveStream {
    fn stream(&self, emit: &mut dyn FnMut(LiveEvent<Alert>) -> bool, stop: &StopSignal) {
        let mut tick = 0u64;
        while !stop.wait_timeout(self.interval) {
            let event = match tick % 3 {
                0 => {
                    let mut alert = mock_alert(self.first_id + tick);
                    alert.timestamp = BASE_TIME + tick;
                    LiveEvent::Added(vec![alert])
                }
                1 => {
                    let mut alert = mock_alert(tick);
                    alert.acknowledged = true;
                    LiveEvent::Updated(alert)
                }
                _ => LiveEvent::Removed(tick * 7),
            };
            if !emit(event) {
                return;
            }
            tick += 1;
        }
    }
}
