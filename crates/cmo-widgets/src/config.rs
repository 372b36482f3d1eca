#![forbid(unsafe_code)]

//! List configuration with environment overrides.
//!
//! # Environment Variables
//! - `CMO_LIST_ITEM_HEIGHT` (px)
//! - `CMO_LIST_CONTAINER_HEIGHT` (px)
//! - `CMO_LIST_OVERSCAN` (items)
//! - `CMO_LIST_LOAD_THRESHOLD` (px from the content end)
//! - `CMO_LIST_FILTER_DEBOUNCE_MS`
//! - `CMO_LIST_SCROLL_QUIET_MS`
//! - `CMO_LIST_FPS_WINDOW_MS`
//! - `CMO_LIST_PAGE_STEP` (rows per PageUp/PageDown)

use std::env;
use std::fmt;
use std::time::Duration;

const ENV_ITEM_HEIGHT: &str = "CMO_LIST_ITEM_HEIGHT";
const ENV_CONTAINER_HEIGHT: &str = "CMO_LIST_CONTAINER_HEIGHT";
const ENV_OVERSCAN: &str = "CMO_LIST_OVERSCAN";
const ENV_LOAD_THRESHOLD: &str = "CMO_LIST_LOAD_THRESHOLD";
const ENV_FILTER_DEBOUNCE_MS: &str = "CMO_LIST_FILTER_DEBOUNCE_MS";
const ENV_SCROLL_QUIET_MS: &str = "CMO_LIST_SCROLL_QUIET_MS";
const ENV_FPS_WINDOW_MS: &str = "CMO_LIST_FPS_WINDOW_MS";
const ENV_PAGE_STEP: &str = "CMO_LIST_PAGE_STEP";

/// Container height used when none is configured.
pub const DEFAULT_CONTAINER_HEIGHT: u32 = 600;

/// Alert list settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    /// Estimated row height before measurement.
    pub item_height: u32,
    /// Viewport height.
    pub container_height: u32,
    /// Rows rendered past each viewport edge.
    pub overscan: usize,
    /// Distance from the content end that triggers a page load.
    pub load_threshold_px: u32,
    pub filter_debounce: Duration,
    pub scroll_quiet_period: Duration,
    pub fps_window: Duration,
    /// Rows moved by PageUp/PageDown.
    pub page_step: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            item_height: 80,
            container_height: DEFAULT_CONTAINER_HEIGHT,
            overscan: 5,
            load_threshold_px: 200,
            filter_debounce: Duration::from_millis(100),
            scroll_quiet_period: Duration::from_millis(150),
            fps_window: Duration::from_secs(1),
            page_step: 10,
        }
    }
}

/// Parse result with every rejected variable.
#[derive(Debug, Clone)]
pub struct ListConfigParse {
    pub config: ListConfig,
    pub errors: Vec<ListConfigError>,
}

/// A rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ListConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ListConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ListConfigError {}

impl ListConfig {
    /// Defaults with the given viewport height.
    #[must_use]
    pub fn new(container_height: u32) -> Self {
        Self {
            container_height,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_item_height(mut self, px: u32) -> Self {
        self.item_height = px;
        self
    }

    #[must_use]
    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    #[must_use]
    pub fn with_load_threshold(mut self, px: u32) -> Self {
        self.load_threshold_px = px;
        self
    }

    #[must_use]
    pub fn with_filter_debounce(mut self, delay: Duration) -> Self {
        self.filter_debounce = delay;
        self
    }

    #[must_use]
    pub fn with_page_step(mut self, rows: usize) -> Self {
        self.page_step = rows;
        self
    }

    /// Parse config from environment variables.
    #[must_use]
    pub fn from_env() -> ListConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ListConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ListConfigError>> {
        let mut errors = Vec::new();
        if self.item_height == 0 {
            errors.push(ListConfigError::new("item_height", "0", "must be positive"));
        }
        if self.container_height == 0 {
            errors.push(ListConfigError::new(
                "container_height",
                "0",
                "must be positive",
            ));
        }
        if self.page_step == 0 {
            errors.push(ListConfigError::new("page_step", "0", "must be positive"));
        }
        if self.fps_window.is_zero() {
            errors.push(ListConfigError::new("fps_window", "0", "must be positive"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Short summary for startup logs.
    #[must_use]
    pub fn summary_short(&self) -> String {
        format!(
            "list: {}px rows · {}px view · overscan {} · load at {}px",
            self.item_height, self.container_height, self.overscan, self.load_threshold_px
        )
    }
}

/// Parse from an arbitrary lookup.
pub fn from_env_with<F>(mut get: F) -> ListConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = ListConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_ITEM_HEIGHT) {
        match parse_positive_u32(&value) {
            Some(parsed) => config.item_height = parsed,
            None => errors.push(ListConfigError::new(
                "item_height",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Some(value) = get(ENV_CONTAINER_HEIGHT) {
        match parse_positive_u32(&value) {
            Some(parsed) => config.container_height = parsed,
            None => errors.push(ListConfigError::new(
                "container_height",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Some(value) = get(ENV_OVERSCAN) {
        match parse_usize(&value) {
            Some(parsed) => config.overscan = parsed,
            None => errors.push(ListConfigError::new(
                "overscan",
                value,
                "expected non-negative integer",
            )),
        }
    }

    if let Some(value) = get(ENV_LOAD_THRESHOLD) {
        match value.trim().parse::<u32>() {
            Ok(parsed) => config.load_threshold_px = parsed,
            Err(_) => errors.push(ListConfigError::new(
                "load_threshold_px",
                value,
                "expected non-negative integer",
            )),
        }
    }

    for (key, field, slot) in [
        (
            ENV_FILTER_DEBOUNCE_MS,
            "filter_debounce",
            &mut config.filter_debounce,
        ),
        (
            ENV_SCROLL_QUIET_MS,
            "scroll_quiet_period",
            &mut config.scroll_quiet_period,
        ),
        (ENV_FPS_WINDOW_MS, "fps_window", &mut config.fps_window),
    ] {
        if let Some(value) = get(key) {
            match parse_millis(&value) {
                Some(parsed) => *slot = parsed,
                None => errors.push(ListConfigError::new(field, value, "expected milliseconds")),
            }
        }
    }

    if let Some(value) = get(ENV_PAGE_STEP) {
        match parse_usize(&value).filter(|&n| n > 0) {
            Some(parsed) => config.page_step = parsed,
            None => errors.push(ListConfigError::new(
                "page_step",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Err(mut invalid) = config.validate() {
        errors.append(&mut invalid);
    }

    ListConfigParse { config, errors }
}

#[inline]
fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

#[inline]
fn parse_positive_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|&n| n > 0)
}

#[inline]
fn parse_millis(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(vars: &[(&str, &str)]) -> ListConfigParse {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        from_env_with(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = ListConfig::default();
        assert_eq!(config.item_height, 80);
        assert_eq!(config.overscan, 5);
        assert_eq!(config.load_threshold_px, 200);
        assert_eq!(config.filter_debounce, Duration::from_millis(100));
        assert_eq!(config.scroll_quiet_period, Duration::from_millis(150));
        assert_eq!(config.page_step, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let parsed = parse(&[
            ("CMO_LIST_ITEM_HEIGHT", "64"),
            ("CMO_LIST_CONTAINER_HEIGHT", " 900 "),
            ("CMO_LIST_OVERSCAN", "0"),
            ("CMO_LIST_FILTER_DEBOUNCE_MS", "250"),
            ("CMO_LIST_PAGE_STEP", "20"),
        ]);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.config.item_height, 64);
        assert_eq!(parsed.config.container_height, 900);
        assert_eq!(parsed.config.overscan, 0);
        assert_eq!(parsed.config.filter_debounce, Duration::from_millis(250));
        assert_eq!(parsed.config.page_step, 20);
    }

    #[test]
    fn invalid_values_keep_defaults_and_report() {
        let parsed = parse(&[
            ("CMO_LIST_ITEM_HEIGHT", "0"),
            ("CMO_LIST_OVERSCAN", "lots"),
            ("CMO_LIST_SCROLL_QUIET_MS", "-5"),
        ]);
        assert_eq!(parsed.config.item_height, 80);
        assert_eq!(parsed.config.overscan, 5);
        let fields: Vec<&str> = parsed.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["item_height", "overscan", "scroll_quiet_period"]);
        assert_eq!(
            parsed.errors[1].to_string(),
            "overscan=lots (expected non-negative integer)"
        );
    }

    #[test]
    fn validate_collects_all_violations() {
        let config = ListConfig {
            item_height: 0,
            container_height: 0,
            page_step: 0,
            ..ListConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
