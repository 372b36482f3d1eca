#![forbid(unsafe_code)]

//! Operator feed demo: a scripted scroll through mock CMO alerts.
//!
//! ```text
//! cmo-feed [--frames N] [--step PX] [--severity LEVEL] [--search TEXT]
//!          [--seed FILE] [--fail-every N] [--no-live]
//! ```

mod app;
mod data;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueHint};
use cmo_core::logging::{LogSettings, init_subscriber};
use cmo_widgets::{AlertList, FilterSet, HighlightRule, ListConfig, ListMsg, Predicate};
use tracing::{info, warn};
use web_time::Instant;

use crate::app::FeedApp;
use crate::data::{Alert, MockAlertSource, MockLiveStream, load_seed};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Scripted operator session over mock CMO alerts.
#[derive(Debug, Parser)]
#[command(name = "cmo-feed", version, about)]
struct Args {
    /// Frames to render before exiting.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Pixels scrolled per frame.
    #[arg(long, value_name = "PX", default_value_t = 45)]
    step: u32,

    /// Only show alerts of this severity.
    #[arg(long, value_name = "LEVEL")]
    severity: Option<String>,

    /// Free-text search over transit, precinto, kind and message.
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,

    /// JSON array of alerts shown before the first page.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    seed: Option<PathBuf>,

    /// Make every Nth page request time out (0 disables).
    #[arg(long, value_name = "N", default_value_t = 0)]
    fail_every: u32,

    /// Disable the mock live stream.
    #[arg(long = "no-live", action = ArgAction::SetFalse)]
    live: bool,
}

fn build_list(args: &Args) -> Result<AlertList<Alert>, Box<dyn Error>> {
    let parse = ListConfig::from_env_with_diagnostics();
    for err in &parse.errors {
        warn!(%err, "ignoring list setting");
    }
    let config = parse.config;
    if let Err(errors) = config.validate() {
        for err in &errors {
            warn!(%err, "invalid list setting");
        }
        return Err(format!("{} invalid list setting(s)", errors.len()).into());
    }

    let mut filters = FilterSet::new();
    if let Some(severity) = &args.severity {
        filters = filters.with(Predicate::equals("severity", severity.as_str()));
    }
    if let Some(search) = &args.search {
        filters = filters.with_search(search.as_str());
    }

    let seed = match &args.seed {
        Some(path) => load_seed(path)?,
        None => Vec::new(),
    };

    let source = MockAlertSource::new(25, 40)
        .with_latency(Duration::from_millis(30))
        .failing_every(args.fail_every);
    let mut list = AlertList::new(config)
        .with_items(seed)
        .with_filters(filters)
        .with_highlight(HighlightRule::new(vec![
            Predicate::equals("severity", "critical"),
            Predicate::equals("acknowledged", false),
        ]))
        .with_page_source(Arc::new(source))
        .on_item_click(|alert: &Alert, index| info!(id = alert.id, index, "alert opened"));
    if args.live {
        let stream = MockLiveStream::new(Duration::from_millis(250), 1_000_000);
        list = list.with_live_source(1, Arc::new(stream));
    }
    Ok(list)
}

fn main() -> Result<(), Box<dyn Error>> {
    let settings = LogSettings::from_env()?;
    init_subscriber(&settings)?;

    let args = Args::parse();
    info!(?args, "starting feed");
    let mut app = FeedApp::new(build_list(&args)?, args.step);

    for _ in 0..args.frames {
        let frame = app.step(Instant::now());
        println!("{frame}");
        if app.list().loader().error().is_some() {
            app.dispatch(ListMsg::Retry);
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    let list = app.into_list();
    let metrics = list.virtualizer().metrics();
    info!(
        loaded = list.loader().store().len(),
        visible = list.filtered_len(),
        pages = list.loader().pages_loaded(),
        fps = metrics.fps,
        flushes = metrics.flushes,
        "feed finished"
    );
    Ok(())
}
