//! End-to-end scenarios for [`AlertList`] driven through the runtime.

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cmo_core::event::{Event, KeyCode, KeyEvent};
use cmo_runtime::{Model, Runtime, StopSignal};
use cmo_widgets::{
    AlertList, FieldValue, FilterSet, Filterable, ListConfig, ListItem, ListMsg, ListView,
    LiveEvent, LiveSource, LoadError, LoadRequest, Page, PageSource, Predicate,
};
use web_time::Instant;

#[derive(Debug, Clone, PartialEq)]
struct Alert {
    id: u32,
    severity: &'static str,
}

impl ListItem for Alert {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }
}

impl Filterable for Alert {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        (name == "severity").then(|| FieldValue::Text(Cow::Borrowed(self.severity)))
    }
}

fn alert(id: u32) -> Alert {
    Alert {
        id,
        severity: if id % 2 == 0 { "high" } else { "low" },
    }
}

/// Serves `pages` pages of `page_size` rows; page indices in `fail_pages` fail.
struct Pages {
    page_size: u32,
    pages: u32,
    fail_pages: Mutex<Vec<u32>>,
    calls: AtomicUsize,
}

impl Pages {
    fn new(page_size: u32, pages: u32) -> Self {
        Self {
            page_size,
            pages,
            fail_pages: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(self, page: u32) -> Self {
        self.fail_pages.lock().unwrap().push(page);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageSource<Alert> for Pages {
    fn load_page(&self, request: &LoadRequest) -> Result<Page<Alert>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut fail = self.fail_pages.lock().unwrap();
        if let Some(pos) = fail.iter().position(|&p| p == request.page) {
            fail.remove(pos);
            return Err(LoadError::Network("connection reset".into()));
        }
        let base = request.page * self.page_size;
        let items = (base..base + self.page_size).map(alert).collect();
        if request.page + 1 >= self.pages {
            Ok(Page::last(items))
        } else {
            Ok(Page::more(items))
        }
    }
}

fn config() -> ListConfig {
    ListConfig::new(400).with_overscan(2)
}

fn drain_tasks<M: Model>(rt: &mut Runtime<M>) {
    while rt.wait_for_task(Duration::from_millis(500)) {}
}

#[test]
fn empty_list_without_source_shows_plain_empty_state() {
    let mut rt = Runtime::new(AlertList::<Alert>::new(config()));
    rt.start();
    assert_eq!(rt.pending_tasks(), 0);
    assert_eq!(
        rt.model().view(),
        ListView::Empty {
            offer_clear_filters: false,
            filter_count: 0
        }
    );
}

#[test]
fn initial_load_shows_loading_then_fills_viewport() {
    let source = Arc::new(Pages::new(3, 10));
    let list = AlertList::<Alert>::new(config()).with_page_source(source.clone());
    let mut rt = Runtime::new(list);
    rt.start();
    assert_eq!(rt.model().view(), ListView::Loading);
    drain_tasks(&mut rt);
    // Short pages keep loading until the end zone is left.
    let model = rt.model();
    let total = model.virtualizer().total_height();
    assert!(total >= 400 + 200, "total {total}");
    assert!(!model.loader().is_loading());
    assert_eq!(source.calls(), model.loader().pages_loaded() as usize);
}

#[test]
fn double_trigger_issues_one_fetch() {
    let source = Arc::new(Pages::new(20, 10));
    let mut list = AlertList::<Alert>::new(config())
        .with_items((0..20).map(alert).collect())
        .with_page_source(source.clone());
    let now = Instant::now();
    let first = list.update_at(ListMsg::Scroll(1_400), now);
    let second = list.update_at(ListMsg::Scroll(1_405), now);
    let third = list.update_at(ListMsg::LoadMore, now);
    assert_eq!(first.task_count(), 1);
    assert_eq!(second.task_count(), 0);
    assert_eq!(third.task_count(), 0);
    assert!(list.loader().is_loading());
}

#[test]
fn trigger_rearms_after_leaving_zone() {
    let source = Arc::new(Pages::new(20, 10));
    let mut rt = Runtime::new(
        AlertList::<Alert>::new(config())
            .with_items((1_000..1_020).map(alert).collect())
            .with_page_source(source.clone()),
    );
    rt.start();
    assert_eq!(rt.pending_tasks(), 0);
    rt.dispatch(ListMsg::Scroll(1_200));
    assert!(rt.wait_for_task(Duration::from_secs(2)));
    assert_eq!(rt.model().loader().store().len(), 40);
    // Now 800px from the end: out of the zone.
    rt.dispatch(ListMsg::Scroll(1_200));
    assert!(!rt.model().loader().is_loading());
    rt.dispatch(ListMsg::Scroll(2_800));
    assert!(rt.model().loader().is_loading());
    assert!(rt.wait_for_task(Duration::from_secs(2)));
    assert_eq!(source.calls(), 2);
}

#[test]
fn failed_load_keeps_rows_and_shows_banner() {
    let source = Arc::new(Pages::new(20, 10).failing(0));
    let mut rt = Runtime::new(
        AlertList::<Alert>::new(config())
            .with_items((100..120).map(alert).collect())
            .with_page_source(source.clone()),
    );
    rt.start();
    rt.dispatch(ListMsg::Scroll(1_400));
    assert!(rt.wait_for_task(Duration::from_secs(2)));

    let model = rt.model();
    assert_eq!(model.loader().store().len(), 20);
    assert!(model.has_more());
    let ListView::List(frame) = model.view() else {
        panic!("rows must stay visible");
    };
    assert!(matches!(frame.error_banner, Some(LoadError::Network(_))));
    assert!(!frame.footer.loading_more);

    // No automatic retry while in the zone.
    rt.dispatch(ListMsg::Scroll(1_390));
    assert!(!rt.model().loader().is_loading());
    assert_eq!(source.calls(), 1);
    rt.dispatch(ListMsg::Retry);
    assert!(rt.wait_for_task(Duration::from_secs(2)));
    assert_eq!(rt.model().loader().store().len(), 40);
    assert!(rt.model().loader().error().is_none());
}

#[test]
fn first_page_failure_shows_error_state() {
    let source = Arc::new(Pages::new(5, 2).failing(0));
    let mut rt = Runtime::new(AlertList::<Alert>::new(config()).with_page_source(source));
    rt.start();
    assert!(rt.wait_for_task(Duration::from_secs(2)));
    assert!(matches!(
        rt.model().view(),
        ListView::Error {
            can_retry: true,
            ..
        }
    ));
}

#[test]
fn exhausted_source_shows_end_footer() {
    let source = Arc::new(Pages::new(4, 1));
    let mut rt = Runtime::new(AlertList::<Alert>::new(config()).with_page_source(source.clone()));
    rt.start();
    drain_tasks(&mut rt);
    let ListView::List(frame) = rt.model().view() else {
        panic!("expected rows");
    };
    assert!(frame.footer.end_of_list);
    assert_eq!(frame.rows.len(), 4);
    rt.dispatch(ListMsg::Scroll(0));
    assert_eq!(source.calls(), 1);
}

#[test]
fn end_key_with_fifty_filtered_rows() {
    let mut rt = Runtime::new(
        AlertList::<Alert>::new(config())
            .with_items((0..100).map(alert).collect())
            .with_filters(FilterSet::new().with(Predicate::equals("severity", "high"))),
    );
    rt.start();
    assert_eq!(rt.model().filtered_len(), 50);
    for start in [KeyCode::Home, KeyCode::Down, KeyCode::PageDown] {
        rt.dispatch(ListMsg::Key(KeyEvent::new(start)));
        rt.dispatch(Event::Key(KeyEvent::new(KeyCode::End)).into());
        let model = rt.model();
        assert_eq!(model.selected_index(), Some(49));
        assert_eq!(model.selected_item().map(|a| a.id), Some(98));
        assert!(model.virtualizer().visible_range().contains(49));
        assert!(model.virtualizer().is_item_fully_visible(49));
    }
}

#[test]
fn height_override_shifts_later_rows() {
    let mut list = AlertList::new(ListConfig::new(2_000)).with_items((0..10).map(alert).collect());
    let now = Instant::now();
    let before: Vec<u64> = (0..10).map(|i| list.virtualizer().offset_of_item(i)).collect();
    list.update_at(
        ListMsg::Measure {
            index: 3,
            height: 120.0,
        },
        now,
    );
    list.begin_frame_at(now);
    let ListView::List(frame) = list.view() else {
        panic!("expected rows");
    };
    for row in &frame.rows {
        let expected = if row.index <= 3 {
            before[row.index]
        } else {
            before[row.index] + 40
        };
        assert_eq!(row.offset, expected, "row {}", row.index);
    }
    assert_eq!(frame.rows[3].height, 120);
}

#[test]
fn filter_burst_applies_once_through_ticks() {
    let mut list = AlertList::<Alert>::new(config()).with_items((0..30).map(alert).collect());
    let t0 = Instant::now();
    for (i, sev) in ["low", "high", "low", "high"].into_iter().enumerate() {
        list.update_at(
            ListMsg::SetFilters(FilterSet::new().with(Predicate::equals("severity", sev))),
            t0 + Duration::from_millis(20 * i as u64),
        );
        list.on_tick(t0 + Duration::from_millis(20 * i as u64 + 10));
    }
    assert_eq!(list.filtered_len(), 30);
    list.on_tick(t0 + Duration::from_millis(160));
    assert_eq!(list.filtered_len(), 15);
    assert_eq!(list.item(0).map(|a| a.id), Some(0));
    // Initial build plus exactly one debounced pass.
    assert_eq!(list.filter().stats().recomputes, 2);
}

struct Burst(Vec<LiveEvent<Alert>>);

impl LiveSource<Alert> for Burst {
    fn stream(&self, emit: &mut dyn FnMut(LiveEvent<Alert>) -> bool, stop: &StopSignal) {
        for event in &self.0 {
            if stop.is_stopped() || !emit(event.clone()) {
                return;
            }
        }
        while !stop.wait_timeout(Duration::from_millis(10)) {}
    }
}

#[test]
fn live_subscription_merges_into_list() {
    let events = vec![
        LiveEvent::Added(vec![alert(50), alert(51)]),
        LiveEvent::Updated(Alert {
            id: 1,
            severity: "high",
        }),
        LiveEvent::Removed(0),
    ];
    let mut rt = Runtime::new(
        AlertList::<Alert>::new(config())
            .with_items((0..3).map(alert).collect())
            .with_filters(FilterSet::new().with(Predicate::equals("severity", "high")))
            .with_live_source(7, Arc::new(Burst(events))),
    );
    rt.start();
    assert_eq!(rt.active_subscriptions(), 1);
    for _ in 0..3 {
        assert!(rt.wait_for_subscription(Duration::from_secs(2)));
    }
    let ids: Vec<u32> = (0..rt.model().filtered_len())
        .filter_map(|i| rt.model().item(i).map(|a| a.id))
        .collect();
    assert_eq!(ids, vec![1, 2, 50]);
    assert_eq!(rt.model().virtualizer().len(), 3);
    let model = rt.into_model();
    assert_eq!(model.loader().store().len(), 4);
}
