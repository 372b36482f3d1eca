use std::fmt::Write as _;

use cmo_runtime::Runtime;
use cmo_widgets::{AlertList, ListFrame, ListMsg, ListView};
use tracing::info_span;
use web_time::Instant;

use crate::data::{Alert, Severity};

/// Messages longer than this wrap to a second line in the operator view.
const WRAP_AT: usize = 40;
const TALL_ROW_PX: f64 = 120.0;

/// Scripted operator session: scrolls the feed and prints text frames.
pub struct FeedApp {
    runtime: Runtime<AlertList<Alert>>,
    scroll_step: u32,
    scroll_top: u32,
    frame: u64,
}

impl FeedApp {
    pub fn new(list: AlertList<Alert>, scroll_step: u32) -> Self {
        let mut runtime = Runtime::new(list);
        runtime.start();
        Self {
            runtime,
            scroll_step,
            scroll_top: 0,
            frame: 0,
        }
    }

    pub fn list(&self) -> &AlertList<Alert> {
        self.runtime.model()
    }

    /// Advance one frame and return its rendering.
    pub fn step(&mut self, now: Instant) -> String {
        let _span = info_span!("feed_frame", frame = self.frame).entered();
        self.frame += 1;
        self.runtime.pump_at(now);

        if let Some(top) = self.runtime.model_mut().take_scroll_request() {
            self.scroll_top = top;
        }
        self.scroll_top = self.scroll_top.saturating_add(self.scroll_step);
        self.runtime.dispatch(ListMsg::Scroll(self.scroll_top));
        // Scroll input is clamped by the list; stay in sync with it.
        self.scroll_top = self.list().virtualizer().scroll_state().scroll_top;

        for msg in self.measure_visible() {
            self.runtime.dispatch(msg);
        }
        render(&self.list().view())
    }

    /// Report rows whose wrapped message needs more than the estimate.
    fn measure_visible(&self) -> Vec<ListMsg<Alert>> {
        let ListView::List(frame) = self.list().view() else {
            return Vec::new();
        };
        frame
            .rows
            .iter()
            .filter(|row| row.item.message.len() > WRAP_AT && f64::from(row.height) < TALL_ROW_PX)
            .map(|row| ListMsg::Measure {
                index: row.index,
                height: TALL_ROW_PX,
            })
            .collect()
    }

    pub fn dispatch(&mut self, msg: ListMsg<Alert>) {
        self.runtime.dispatch(msg);
    }

    pub fn into_list(self) -> AlertList<Alert> {
        self.runtime.into_model()
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Low => "LOW ",
        Severity::Medium => "MED ",
        Severity::High => "HIGH",
        Severity::Critical => "CRIT",
    }
}

/// Render a list view as plain text.
pub fn render(view: &ListView<'_, Alert>) -> String {
    match view {
        ListView::Loading => "loading alerts...\n".to_owned(),
        ListView::Error { error, can_retry } => {
            let hint = if *can_retry { " [r] retry" } else { "" };
            format!("could not load alerts: {error}{hint}\n")
        }
        ListView::Empty {
            offer_clear_filters: true,
            filter_count,
        } => format!("no alerts match {filter_count} active filter(s) [c] clear filters\n"),
        ListView::Empty { .. } => "no alerts\n".to_owned(),
        ListView::List(frame) => render_frame(frame),
    }
}

fn render_frame(frame: &ListFrame<'_, Alert>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "rows {}..={}  top {}px of {}px",
        frame.range.start, frame.range.end, frame.scroll_top, frame.total_height
    );
    if let Some(error) = frame.error_banner {
        let _ = writeln!(out, "! load failed: {error} [r] retry");
    }
    for row in &frame.rows {
        let cursor = if row.selected { '>' } else { ' ' };
        let mark = if row.highlighted { '*' } else { ' ' };
        let alert = row.item;
        let _ = writeln!(
            out,
            "{cursor}{mark}{:>6} [{}] {} {:<8} {:<16} {}",
            row.offset,
            severity_tag(alert.severity),
            alert.transit,
            alert.precinto.as_deref().unwrap_or("-"),
            alert.kind,
            alert.message,
        );
    }
    if frame.footer.loading_more {
        out.push_str("  loading more...\n");
    } else if frame.footer.end_of_list {
        out.push_str("  end of alerts\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock_alert;
    use cmo_widgets::{FilterSet, ListConfig, LoadError, Predicate};

    fn list(count: u64) -> AlertList<Alert> {
        AlertList::new(ListConfig::new(400)).with_items((0..count).map(mock_alert).collect())
    }

    #[test]
    fn renders_states() {
        assert_eq!(render(&ListView::Loading), "loading alerts...\n");
        let error = LoadError::Timeout;
        let text = render(&ListView::Error {
            error: &error,
            can_retry: true,
        });
        assert!(text.contains("[r] retry"));
        let empty = AlertList::<Alert>::new(ListConfig::new(400))
            .with_items((0..5).map(mock_alert).collect())
            .with_filters(FilterSet::new().with(Predicate::equals("kind", "nothing")));
        assert!(render(&empty.view()).contains("[c] clear filters"));
    }

    #[test]
    fn frame_lists_rows_and_end_marker() {
        let text = render(&list(3).view());
        assert_eq!(text.lines().filter(|l| l.contains("TR-")).count(), 3);
        assert!(text.ends_with("end of alerts\n"));
    }

    #[test]
    fn long_messages_are_measured_taller() {
        let mut app = FeedApp::new(list(20), 0);
        app.step(Instant::now());
        app.step(Instant::now());
        let list = app.into_list();
        for index in 0..list.filtered_len().min(5) {
            let Some(alert) = list.item(index) else {
                continue;
            };
            if alert.message.len() > WRAP_AT {
                assert_eq!(list.measured_height(&alert.id), Some(120));
            }
        }
    }
}
