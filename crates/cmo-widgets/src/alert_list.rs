#![forbid(unsafe_code)]

//! Virtualized alert list.
//!
//! [`AlertList`] composes the pieces of this crate into one runtime
//! [`Model`]:
//!
//! ```text
//!   ItemStore ── FilterEngine ── Virtualizer ── ListView
//!       ▲             ▲               ▲
//!   loader/live   SetFilters     Scroll / Key / Measure
//! ```
//!
//! The filtered view is what gets virtualized: row `index` always means a
//! position in the filtered sequence. Page fetches run as `Cmd::task` and
//! come back as [`ListMsg::Loaded`]; live events arrive from a
//! [`LiveSubscription`]. Heights measured for an item are remembered by id,
//! so they survive filter changes.
//!
//! Hosts drive one frame as: dispatch input, `pump`, [`AlertList::begin_frame_at`],
//! then [`AlertList::view`].

use std::sync::Arc;
use std::sync::mpsc;

use ahash::AHashMap;
use cmo_core::event::{Event, KeyCode, KeyEvent, Modifiers};
use cmo_runtime::{Cmd, Model, StopSignal, SubId, Subscription};
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::ListConfig;
use crate::filter::{FilterEngine, FilterSet, Filterable, HighlightRule, ViewChange};
use crate::loader::{InfiniteLoader, LoadError, LoadOutcome, LoadRequest, Page, PageSource};
use crate::store::{ListItem, LiveEvent, StoreChange};
use crate::virtualized::{Align, VisibleRange, Virtualizer};

/// Push-based source of live events.
pub trait LiveSource<T: ListItem>: Send + Sync {
    /// Deliver events until `stop` fires or `emit` returns `false`.
    fn stream(&self, emit: &mut dyn FnMut(LiveEvent<T>) -> bool, stop: &StopSignal);
}

/// Runtime subscription wrapping a [`LiveSource`].
pub struct LiveSubscription<T: ListItem> {
    id: SubId,
    source: Arc<dyn LiveSource<T>>,
}

impl<T: ListItem> LiveSubscription<T> {
    #[must_use]
    pub fn new(id: SubId, source: Arc<dyn LiveSource<T>>) -> Self {
        Self { id, source }
    }
}

impl<T> Subscription<ListMsg<T>> for LiveSubscription<T>
where
    T: ListItem + Send + 'static,
{
    fn id(&self) -> SubId {
        self.id
    }

    fn run(&self, sender: mpsc::Sender<ListMsg<T>>, stop: StopSignal) {
        let mut emit = |event: LiveEvent<T>| sender.send(ListMsg::Live(event)).is_ok();
        self.source.stream(&mut emit, &stop);
    }
}

/// Messages understood by [`AlertList`].
#[derive(Debug)]
pub enum ListMsg<T: ListItem> {
    /// Raw input event.
    Event(Event),
    /// Container scrolled to `offset` px.
    Scroll(u32),
    /// Container resized to `height` px.
    Resize(u32),
    Key(KeyEvent),
    /// Row at filtered position `index` was clicked.
    Click(usize),
    /// Row at filtered position `index` measured `height` px.
    Measure { index: usize, height: f64 },
    /// Load the next page now, ignoring the scroll trigger.
    LoadMore,
    /// Retry the failed page.
    Retry,
    Loaded {
        request: LoadRequest,
        result: Result<Page<T>, LoadError>,
    },
    Live(LiveEvent<T>),
    /// Debounced filter change.
    SetFilters(FilterSet),
    /// Immediate return to the empty filter set.
    ResetFilters,
    SetHighlight(HighlightRule),
    /// Drop every item and start loading from the first page.
    Reset,
}

impl<T: ListItem> From<Event> for ListMsg<T> {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

/// Footer flags for the list state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footer {
    /// A subsequent page is in flight.
    pub loading_more: bool,
    /// Source exhausted and at least one row shown.
    pub end_of_list: bool,
}

/// One mounted row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row<'a, T> {
    /// Position in the filtered sequence.
    pub index: usize,
    pub item: &'a T,
    /// Absolute top offset in px.
    pub offset: u64,
    pub height: u32,
    pub selected: bool,
    pub highlighted: bool,
}

/// Mounted rows and scroll geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFrame<'a, T> {
    pub rows: Vec<Row<'a, T>>,
    pub range: VisibleRange,
    pub total_height: u64,
    pub scroll_top: u32,
    pub footer: Footer,
    /// Last load failed while rows are still shown.
    pub error_banner: Option<&'a LoadError>,
}

/// What the host should render.
#[derive(Debug, Clone, PartialEq)]
pub enum ListView<'a, T> {
    /// First load with nothing to show yet.
    Loading,
    /// Load failed with nothing to show.
    Error { error: &'a LoadError, can_retry: bool },
    /// No rows after filtering.
    Empty {
        offer_clear_filters: bool,
        filter_count: usize,
    },
    List(ListFrame<'a, T>),
}

type ClickHandler<T> = Box<dyn FnMut(&T, usize)>;
type HeightHandler = Box<dyn FnMut(usize, u32)>;

/// Virtualized, filterable, infinitely loading alert list.
pub struct AlertList<T: ListItem + Filterable> {
    config: ListConfig,
    loader: InfiniteLoader<T>,
    filter: FilterEngine,
    virt: Virtualizer,
    measured: AHashMap<T::Id, u32>,
    selected: Option<T::Id>,
    source: Option<Arc<dyn PageSource<T>>>,
    live: Option<(SubId, Arc<dyn LiveSource<T>>)>,
    on_item_click: Option<ClickHandler<T>>,
    on_height_change: Option<HeightHandler>,
    load_armed: bool,
}

impl<T: ListItem + Filterable + Send + 'static> AlertList<T> {
    /// Empty list without a page source.
    #[must_use]
    pub fn new(config: ListConfig) -> Self {
        if let Err(errors) = config.validate() {
            for err in &errors {
                warn!(%err, "list setting out of range, clamping");
            }
        }
        let virt = Virtualizer::new(config.item_height, config.container_height)
            .with_overscan(config.overscan)
            .with_quiet_period(config.scroll_quiet_period)
            .with_fps_window(config.fps_window);
        let filter = FilterEngine::new(config.filter_debounce, FilterSet::default());
        Self {
            config,
            loader: InfiniteLoader::new(),
            filter,
            virt,
            measured: AHashMap::new(),
            selected: None,
            source: None,
            live: None,
            on_item_click: None,
            on_height_change: None,
            load_armed: true,
        }
    }

    /// Start from already-known items.
    #[must_use]
    pub fn with_items(mut self, items: Vec<T>) -> Self {
        self.loader = InfiniteLoader::with_items(items);
        self.refresh_view();
        self
    }

    /// Initial filters, applied without debounce.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filter = FilterEngine::new(self.config.filter_debounce, filters)
            .with_highlight(self.filter.highlight().clone());
        self.refresh_view();
        self
    }

    #[must_use]
    pub fn with_highlight(mut self, rule: HighlightRule) -> Self {
        self.filter.set_highlight(rule, self.loader.store());
        self
    }

    #[must_use]
    pub fn with_page_source(mut self, source: Arc<dyn PageSource<T>>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_live_source(mut self, id: SubId, source: Arc<dyn LiveSource<T>>) -> Self {
        self.live = Some((id, source));
        self
    }

    /// Called with the item and its filtered position on click or Enter.
    #[must_use]
    pub fn on_item_click(mut self, handler: impl FnMut(&T, usize) + 'static) -> Self {
        self.on_item_click = Some(Box::new(handler));
        self
    }

    /// Called with `(index, px)` for every applied height change.
    #[must_use]
    pub fn on_height_change(mut self, handler: impl FnMut(usize, u32) + 'static) -> Self {
        self.on_height_change = Some(Box::new(handler));
        self
    }

    // --- accessors ---

    #[must_use]
    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    #[must_use]
    pub fn loader(&self) -> &InfiniteLoader<T> {
        &self.loader
    }

    #[must_use]
    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    #[must_use]
    pub fn virtualizer(&self) -> &Virtualizer {
        &self.virt
    }

    /// Rows after filtering.
    #[must_use]
    pub fn filtered_len(&self) -> usize {
        self.filter.len()
    }

    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.filter.filter_count()
    }

    /// Whether the source can still produce pages.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.source.is_some() && self.loader.has_more()
    }

    /// Item at filtered position `index`.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&T> {
        self.filter
            .slot_at(index)
            .and_then(|slot| self.loader.store().get(slot))
    }

    /// Filtered position of the selected item, if it is in the view.
    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        let id = self.selected.as_ref()?;
        let slot = self.loader.store().slot_of(id)?;
        self.filter.position_of_slot(slot)
    }

    #[must_use]
    pub fn selected_item(&self) -> Option<&T> {
        self.selected_index().and_then(|index| self.item(index))
    }

    /// Measured height remembered for `id`.
    #[must_use]
    pub fn measured_height(&self, id: &T::Id) -> Option<u32> {
        self.measured.get(id).copied()
    }

    /// Offset the host should apply to its scroll container.
    pub fn take_scroll_request(&mut self) -> Option<u32> {
        self.virt.take_scroll_request()
    }

    // --- frame ---

    /// Apply queued measurements and record the frame.
    pub fn begin_frame_at(&mut self, now: Instant) {
        let applied = self.virt.begin_frame_at(now);
        self.finish_measurements(&applied);
    }

    /// Render state, first match wins.
    #[must_use]
    pub fn view(&self) -> ListView<'_, T> {
        let store_empty = self.loader.store().is_empty();
        if store_empty && self.loader.is_loading() {
            return ListView::Loading;
        }
        if store_empty && let Some(error) = self.loader.error() {
            return ListView::Error {
                error,
                can_retry: self.source.is_some(),
            };
        }
        if self.filter.is_empty() {
            let filter_count = self.filter.filter_count();
            return ListView::Empty {
                offer_clear_filters: filter_count > 0,
                filter_count,
            };
        }

        let range = self.virt.visible_range();
        let selected = self.selected_index();
        let rows = range
            .as_range()
            .filter_map(|index| {
                let slot = self.filter.slot_at(index)?;
                let item = self.loader.store().get(slot)?;
                Some(Row {
                    index,
                    item,
                    offset: self.virt.offset_of_item(index),
                    height: self.virt.item_height(index),
                    selected: selected == Some(index),
                    highlighted: self.filter.is_highlighted(slot),
                })
            })
            .collect();
        let state = self.virt.scroll_state();
        ListView::List(ListFrame {
            rows,
            range,
            total_height: state.total_height,
            scroll_top: state.scroll_top,
            footer: Footer {
                loading_more: self.loader.is_loading(),
                end_of_list: !self.has_more(),
            },
            error_banner: self.loader.error(),
        })
    }

    // --- message handling ---

    /// Apply one message at `now`.
    pub fn update_at(&mut self, msg: ListMsg<T>, now: Instant) -> Cmd<ListMsg<T>> {
        match msg {
            ListMsg::Event(event) => self.handle_event(event, now),
            ListMsg::Scroll(offset) => self.scroll_to_offset(offset, now),
            ListMsg::Resize(height) => self.resize(height),
            ListMsg::Key(key) => self.handle_key(key),
            ListMsg::Click(index) => {
                self.click(index);
                Cmd::none()
            }
            ListMsg::Measure { index, height } => {
                if let Err(err) = self.virt.update_item_height(index, height) {
                    debug!(error = %err, "measurement ignored");
                }
                Cmd::none()
            }
            ListMsg::LoadMore | ListMsg::Retry if self.source.is_none() => Cmd::none(),
            ListMsg::LoadMore => {
                let request = self.loader.load_more();
                self.issue_load(request)
            }
            ListMsg::Retry => {
                let request = self.loader.retry();
                self.issue_load(request)
            }
            ListMsg::Loaded { request, result } => self.on_loaded(&request, result),
            ListMsg::Live(event) => self.on_live(event),
            ListMsg::SetFilters(filters) => {
                self.filter.set_filters_at(filters, now);
                Cmd::none()
            }
            ListMsg::ResetFilters => {
                self.filter.reset_filters(self.loader.store());
                self.after_filter_change()
            }
            ListMsg::SetHighlight(rule) => {
                self.filter.set_highlight(rule, self.loader.store());
                Cmd::none()
            }
            ListMsg::Reset => {
                self.loader.reset();
                self.measured.clear();
                self.selected = None;
                self.virt.clear();
                self.refresh_view();
                self.load_armed = true;
                self.check_load_trigger()
            }
        }
    }

    /// Timers: filter debounce and the scroll quiet period.
    pub fn tick_at(&mut self, now: Instant) -> Cmd<ListMsg<T>> {
        if self.virt.tick_at(now) {
            let metrics = self.virt.metrics();
            debug!(
                fps = metrics.fps,
                visible = metrics.visible_items,
                total = metrics.total_items,
                "scroll metrics"
            );
        }
        if self.filter.poll_at(now, self.loader.store()) {
            return self.after_filter_change();
        }
        Cmd::none()
    }

    fn handle_event(&mut self, event: Event, now: Instant) -> Cmd<ListMsg<T>> {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Scroll { offset } => self.scroll_to_offset(offset, now),
            Event::Resize { height } => self.resize(height),
            Event::Focus(_) => Cmd::none(),
        }
    }

    fn scroll_to_offset(&mut self, offset: u32, now: Instant) -> Cmd<ListMsg<T>> {
        self.virt.on_scroll_at(offset, now);
        self.check_load_trigger()
    }

    fn resize(&mut self, height: u32) -> Cmd<ListMsg<T>> {
        self.config.container_height = height;
        self.virt.set_container_height(height);
        self.check_load_trigger()
    }

    fn handle_key(&mut self, key: KeyEvent) -> Cmd<ListMsg<T>> {
        // Chorded keys belong to the host.
        if key
            .modifiers
            .intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::SUPER)
        {
            return Cmd::none();
        }
        let len = self.filter.len();
        let step = self.config.page_step;
        let current = self.selected_index();
        let target = match key.code {
            KeyCode::Up => current.map_or(0, |i| i.saturating_sub(1)),
            KeyCode::Down => current.map_or(0, |i| i + 1),
            KeyCode::PageUp => current.map_or(0, |i| i.saturating_sub(step)),
            KeyCode::PageDown => current.map_or(0, |i| i + step),
            KeyCode::Home => 0,
            KeyCode::End => len.saturating_sub(1),
            KeyCode::Enter => {
                if let Some(index) = current {
                    self.click(index);
                }
                return Cmd::none();
            }
            KeyCode::Escape => {
                self.selected = None;
                return Cmd::none();
            }
            _ => return Cmd::none(),
        };
        if len == 0 {
            return Cmd::none();
        }
        self.select(target.min(len - 1));
        self.check_load_trigger()
    }

    fn select(&mut self, index: usize) {
        let Some(id) = self.item(index).map(ListItem::id) else {
            return;
        };
        self.selected = Some(id);
        self.virt.scroll_to_item(index, Align::Auto);
    }

    fn click(&mut self, index: usize) {
        let Some(slot) = self.filter.slot_at(index) else {
            debug!(index, "click outside the filtered range");
            return;
        };
        let Some(item) = self.loader.store().get(slot) else {
            return;
        };
        self.selected = Some(item.id());
        if let Some(handler) = self.on_item_click.as_mut() {
            handler(item, index);
        }
    }

    fn finish_measurements(&mut self, applied: &[(usize, u32)]) {
        for &(index, px) in applied {
            if let Some(id) = self.item(index).map(ListItem::id) {
                self.measured.insert(id, px);
            }
            if let Some(handler) = self.on_height_change.as_mut() {
                handler(index, px);
            }
        }
    }

    /// Re-derive heights for the whole filtered view.
    fn rebuild_heights(&mut self) {
        let default = self.virt.default_height();
        let store = self.loader.store();
        let measured = &self.measured;
        let heights = self.filter.view().iter().map(|&slot| {
            store
                .get(slot)
                .and_then(|item| measured.get(&item.id()).copied())
                .unwrap_or(default)
        });
        self.virt.rebuild_heights(heights);
    }

    fn refresh_view(&mut self) {
        self.filter.recompute(self.loader.store());
        self.rebuild_heights();
    }

    fn after_filter_change(&mut self) -> Cmd<ListMsg<T>> {
        self.rebuild_heights();
        match self.selected_index() {
            Some(index) => {
                self.virt.scroll_to_item(index, Align::Auto);
            }
            None => {
                self.virt.scroll_to_item(0, Align::Start);
            }
        }
        self.check_load_trigger()
    }

    /// Remembered height for the item in `slot`, else the default.
    fn height_for_slot(&self, slot: usize) -> u32 {
        self.loader
            .store()
            .get(slot)
            .and_then(|item| self.measured.get(&item.id()).copied())
            .unwrap_or_else(|| self.virt.default_height())
    }

    /// Mirror one filtered-view change into the virtualizer.
    fn apply_view_change(&mut self, change: ViewChange, slot: usize) {
        match change {
            ViewChange::Inserted(pos) => {
                let height = self.height_for_slot(slot);
                self.virt.insert_item(pos, height);
            }
            ViewChange::Removed(pos) => {
                self.virt.remove_item(pos);
            }
            ViewChange::Updated(_) | ViewChange::Unchanged => {}
        }
    }

    fn track_insert(&mut self, slot: usize) {
        let Some(item) = self.loader.store().get(slot) else {
            return;
        };
        let change = self.filter.on_inserted(slot, item);
        self.apply_view_change(change, slot);
    }

    fn on_loaded(
        &mut self,
        request: &LoadRequest,
        result: Result<Page<T>, LoadError>,
    ) -> Cmd<ListMsg<T>> {
        match self.loader.complete(request, result) {
            LoadOutcome::Appended { slots, skipped, .. } => {
                for slot in slots {
                    self.track_insert(slot);
                }
                if skipped > 0 {
                    debug!(skipped, "page rows already present");
                }
                self.load_armed = true;
                self.check_load_trigger()
            }
            LoadOutcome::Failed(err) => Cmd::log(format!("alert page failed: {err}")),
            LoadOutcome::Stale => Cmd::none(),
        }
    }

    fn on_live(&mut self, event: LiveEvent<T>) -> Cmd<ListMsg<T>> {
        let removed_id = match &event {
            LiveEvent::Removed(id) => Some(id.clone()),
            _ => None,
        };
        let changes = self.loader.store_mut().apply(event);
        let mut compacted = false;
        for change in changes {
            match change {
                StoreChange::Inserted(slot) => self.track_insert(slot),
                StoreChange::Replaced(slot) => {
                    if let Some(item) = self.loader.store().get(slot) {
                        let change = self.filter.on_replaced(slot, item);
                        self.apply_view_change(change, slot);
                    }
                }
                StoreChange::Removed(slot) => {
                    let change = self.filter.on_removed(slot);
                    self.apply_view_change(change, slot);
                }
                // Slots renumbered: rederive the view once.
                StoreChange::Compacted => compacted = true,
                StoreChange::Ignored => {}
            }
        }
        if let Some(id) = removed_id {
            self.measured.remove(&id);
            if self.selected.as_ref() == Some(&id) {
                self.selected = None;
            }
        }
        if compacted {
            self.refresh_view();
        }
        self.check_load_trigger()
    }

    fn issue_load(&mut self, request: Option<LoadRequest>) -> Cmd<ListMsg<T>> {
        let (Some(request), Some(source)) = (request, self.source.clone()) else {
            return Cmd::none();
        };
        Cmd::task(move || {
            let result = source.load_page(&request);
            ListMsg::Loaded { request, result }
        })
    }

    /// Fire one load per entry into the end zone.
    fn check_load_trigger(&mut self) -> Cmd<ListMsg<T>> {
        if self.source.is_none() {
            return Cmd::none();
        }
        let in_zone = self.virt.distance_to_end() <= u64::from(self.config.load_threshold_px);
        if !in_zone {
            self.load_armed = true;
            return Cmd::none();
        }
        // Failures wait for an explicit retry.
        if !self.load_armed || self.loader.error().is_some() {
            return Cmd::none();
        }
        let Some(request) = self.loader.load_more() else {
            return Cmd::none();
        };
        self.load_armed = false;
        debug!(page = request.page, "end zone reached");
        self.issue_load(Some(request))
    }
}

impl<T: ListItem + Filterable + Send + 'static> Model for AlertList<T> {
    type Message = ListMsg<T>;

    fn init(&mut self) -> Cmd<ListMsg<T>> {
        info!(
            items = self.loader.store().len(),
            paged = self.source.is_some(),
            live = self.live.is_some(),
            "{}",
            self.config.summary_short()
        );
        self.check_load_trigger()
    }

    fn update(&mut self, msg: ListMsg<T>) -> Cmd<ListMsg<T>> {
        self.update_at(msg, Instant::now())
    }

    fn on_tick(&mut self, now: Instant) -> Cmd<ListMsg<T>> {
        self.begin_frame_at(now);
        self.tick_at(now)
    }

    fn subscriptions(&self) -> Vec<Box<dyn Subscription<ListMsg<T>>>> {
        match &self.live {
            Some((id, source)) => vec![Box::new(LiveSubscription::new(*id, Arc::clone(source)))],
            None => vec![],
        }
    }
}
