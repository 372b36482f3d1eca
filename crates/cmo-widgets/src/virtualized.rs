#![forbid(unsafe_code)]

//! Virtualization engine for pixel-addressed scroll containers.
//!
//! Given an item count, per-item heights, a container height and an overscan
//! count, the engine decides which items must be mounted and where each one
//! sits. Only the items in the [`VisibleRange`] are ever handed to the host.
//!
//! # Core Types
//!
//! - [`Virtualizer`] - scroll state, heights, pending measurements, metrics
//! - [`VariableHeights`] - Fenwick-backed per-item heights with O(log n) offsets
//! - [`VisibleRange`] - inclusive mounted range including overscan
//! - [`compute_visible_range`] - the same range computation over a plain slice
//!
//! # Measurement batching
//!
//! `update_item_height` only queues. Queued heights are applied together by
//! [`Virtualizer::flush_measurements`] (called from `begin_frame_at`), so a
//! render pass that measures fifty rows recomputes offsets once, not fifty
//! times.
//!
//! # Example
//!
//! ```ignore
//! use cmo_widgets::virtualized::Virtualizer;
//!
//! let mut virt = Virtualizer::new(80, 600).with_overscan(5);
//! virt.set_item_count(10_000);
//! virt.on_scroll_at(4_000, web_time::Instant::now());
//! let range = virt.visible_range();
//! println!("mount {}..={}", range.start, range.end);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

use tracing::{debug, trace};
use web_time::Instant;

use crate::fenwick::FenwickTree;

/// Default quiet period after the last scroll event before `is_scrolling` clears.
pub const DEFAULT_SCROLL_QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Default trailing window for the FPS estimate.
pub const DEFAULT_FPS_WINDOW: Duration = Duration::from_secs(1);

/// Inclusive range of mounted item indices.
///
/// An empty range reports `start == end == 0` and `is_empty() == true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
    empty: bool,
}

impl VisibleRange {
    /// The range for an empty list.
    pub const EMPTY: Self = Self {
        start: 0,
        end: 0,
        empty: true,
    };

    /// Inclusive range `start..=end`.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            start,
            end,
            empty: false,
        }
    }

    /// Whether nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of mounted items.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Whether `index` is mounted.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        !self.empty && (self.start..=self.end).contains(&index)
    }

    /// Half-open equivalent.
    #[must_use]
    pub fn as_range(&self) -> Range<usize> {
        if self.empty {
            0..0
        } else {
            self.start..self.end + 1
        }
    }
}

/// Scroll movement since the previous scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    Up,
    Down,
    #[default]
    Idle,
}

impl ScrollDirection {
    /// Stable lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Idle => "idle",
        }
    }
}

/// Target alignment for [`Virtualizer::scroll_to_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// Item top at viewport top.
    #[default]
    Start,
    /// Item centered in the viewport.
    Center,
    /// Item bottom at viewport bottom.
    End,
    /// Scroll the minimum distance that makes the item fully visible.
    Auto,
}

/// Scroll state owned by a single engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollState {
    pub scroll_top: u32,
    pub container_height: u32,
    pub total_height: u64,
    pub direction: ScrollDirection,
    pub is_scrolling: bool,
    /// Signed velocity in px/s (positive = down).
    pub velocity: f32,
}

/// A rejected measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementError {
    /// Height was zero, negative, or not finite.
    NonPositive { index: usize, height: f64 },
    /// Index past the current item count.
    OutOfRange { index: usize, len: usize },
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositive { index, height } => {
                write!(f, "item {index}: non-positive height {height}")
            }
            Self::OutOfRange { index, len } => {
                write!(f, "item {index}: out of range (len {len})")
            }
        }
    }
}

impl std::error::Error for MeasurementError {}

/// Diagnostic counters. Never read by the range computation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceMetrics {
    pub fps: f32,
    pub frames_in_window: usize,
    pub visible_items: usize,
    pub total_items: usize,
    pub measurements_applied: u64,
    pub measurements_rejected: u64,
    pub flushes: u64,
}

// ============================================================================
// VariableHeights - Fenwick-backed heights
// ============================================================================

/// Per-item heights with O(log n) offset queries.
///
/// # Invariants
///
/// 1. `offset_of_item(i)` == sum of heights `[0..i)`.
/// 2. `find_item_at_offset(p)` is the item whose span `[offset, offset + h)`
///    contains `p`, clamped to the last item.
#[derive(Debug, Clone)]
pub struct VariableHeights {
    tree: FenwickTree,
    default_height: u32,
}

impl VariableHeights {
    /// Create `len` items of `default_height`.
    #[must_use]
    pub fn new(default_height: u32, len: usize) -> Self {
        Self {
            tree: FenwickTree::from_values(&vec![default_height; len]),
            default_height,
        }
    }

    /// Create from explicit heights.
    #[must_use]
    pub fn from_heights(heights: &[u32], default_height: u32) -> Self {
        Self {
            tree: FenwickTree::from_values(heights),
            default_height,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    #[must_use]
    pub fn default_height(&self) -> u32 {
        self.default_height
    }

    /// Height of item `idx` (default when out of range).
    #[must_use]
    pub fn get(&self, idx: usize) -> u32 {
        if idx >= self.len() {
            return self.default_height;
        }
        self.tree.get(idx)
    }

    /// Overwrite one height. Returns the previous value.
    pub fn set(&mut self, idx: usize, height: u32) -> Option<u32> {
        if idx >= self.len() {
            return None;
        }
        let old = self.tree.get(idx);
        self.tree.set(idx, height);
        Some(old)
    }

    /// Insert one height before `idx` (clamped to `len()`).
    pub fn insert(&mut self, idx: usize, height: u32) {
        self.tree.insert(idx, height);
    }

    /// Remove the height at `idx`, returning it.
    pub fn remove(&mut self, idx: usize) -> Option<u32> {
        self.tree.remove(idx)
    }

    /// Top edge of item `idx`. `offset_of_item(len)` is the total height.
    #[must_use]
    pub fn offset_of_item(&self, idx: usize) -> u64 {
        if idx == 0 || self.is_empty() {
            return 0;
        }
        self.tree.prefix(idx.min(self.len()) - 1)
    }

    /// Item occupying pixel `offset`.
    #[must_use]
    pub fn find_item_at_offset(&self, offset: u64) -> usize {
        if self.is_empty() {
            return 0;
        }
        match self.tree.find_prefix(offset) {
            Some(i) => (i + 1).min(self.len() - 1),
            None => 0,
        }
    }

    /// Sum of all heights.
    #[must_use]
    pub fn total_height(&self) -> u64 {
        self.tree.total()
    }

    /// Average height (default when empty).
    #[must_use]
    pub fn average_height(&self) -> f64 {
        if self.is_empty() {
            f64::from(self.default_height)
        } else {
            self.total_height() as f64 / self.len() as f64
        }
    }

    /// Grow with default heights or shrink.
    pub fn resize(&mut self, len: usize) {
        self.tree.resize(len, self.default_height);
    }

    /// Replace all heights.
    pub fn rebuild<I: IntoIterator<Item = u32>>(&mut self, heights: I) {
        let values: Vec<u32> = heights.into_iter().collect();
        self.tree = FenwickTree::from_values(&values);
    }

    pub fn clear(&mut self) {
        self.tree = FenwickTree::new(0);
    }
}

// ============================================================================
// Range computation
// ============================================================================

fn range_for(
    count: usize,
    total: u64,
    scroll_top: u32,
    container_height: u32,
    overscan: usize,
    item_at: impl Fn(u64) -> usize,
) -> VisibleRange {
    if count == 0 {
        return VisibleRange::EMPTY;
    }
    let container = u64::from(container_height);
    if container >= total {
        return VisibleRange::new(0, count - 1);
    }
    let top = u64::from(scroll_top).min(total - container);
    let average = total as f64 / count as f64;
    let pad = (overscan as f64 * average).ceil() as u64;

    let lo = top.saturating_sub(pad);
    let hi = (top + container + pad).min(total).max(lo + 1);
    let start = item_at(lo).min(count - 1);
    let end = item_at(hi - 1).min(count - 1).max(start);
    VisibleRange::new(start, end)
}

/// Visible range over explicit heights.
///
/// The scroll offset is clamped to `[0, total - container_height]` first.
/// An empty slice yields [`VisibleRange::EMPTY`]; a container at least as
/// tall as the content yields the full range.
#[must_use]
pub fn compute_visible_range(
    scroll_top: u32,
    container_height: u32,
    heights: &[u32],
    overscan: usize,
) -> VisibleRange {
    let mut bottoms = Vec::with_capacity(heights.len());
    let mut acc = 0u64;
    for &h in heights {
        acc += u64::from(h);
        bottoms.push(acc);
    }
    range_for(
        heights.len(),
        acc,
        scroll_top,
        container_height,
        overscan,
        |offset| bottoms.partition_point(|&bottom| bottom <= offset),
    )
}

// ============================================================================
// Virtualizer
// ============================================================================

/// Windowing engine: heights, scroll state, measurements and metrics.
#[derive(Debug, Clone)]
pub struct Virtualizer {
    heights: VariableHeights,
    overscan: usize,
    scroll: ScrollState,
    last_scroll_at: Option<Instant>,
    quiet_period: Duration,
    pending: Vec<(usize, u32)>,
    scroll_request: Option<u32>,
    frames: VecDeque<Instant>,
    fps_window: Duration,
    metrics: PerformanceMetrics,
}

impl Virtualizer {
    /// Create an empty engine.
    #[must_use]
    pub fn new(default_height: u32, container_height: u32) -> Self {
        Self {
            heights: VariableHeights::new(default_height.max(1), 0),
            overscan: 5,
            scroll: ScrollState {
                container_height,
                ..ScrollState::default()
            },
            last_scroll_at: None,
            quiet_period: DEFAULT_SCROLL_QUIET_PERIOD,
            pending: Vec::new(),
            scroll_request: None,
            frames: VecDeque::new(),
            fps_window: DEFAULT_FPS_WINDOW,
            metrics: PerformanceMetrics::default(),
        }
    }

    /// Set overscan (items padded on each side).
    #[must_use]
    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    /// Set the quiet period that ends a scroll gesture.
    #[must_use]
    pub fn with_quiet_period(mut self, quiet: Duration) -> Self {
        self.quiet_period = quiet;
        self
    }

    /// Set the FPS trailing window.
    #[must_use]
    pub fn with_fps_window(mut self, window: Duration) -> Self {
        self.fps_window = window;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    #[must_use]
    pub fn overscan(&self) -> usize {
        self.overscan
    }

    #[must_use]
    pub fn default_height(&self) -> u32 {
        self.heights.default_height()
    }

    #[must_use]
    pub fn scroll_state(&self) -> &ScrollState {
        &self.scroll
    }

    /// Heights tracker.
    #[must_use]
    pub fn heights(&self) -> &VariableHeights {
        &self.heights
    }

    #[must_use]
    pub fn item_height(&self, index: usize) -> u32 {
        self.heights.get(index)
    }

    /// Absolute top offset of `index`.
    #[must_use]
    pub fn offset_of_item(&self, index: usize) -> u64 {
        self.heights.offset_of_item(index)
    }

    #[must_use]
    pub fn total_height(&self) -> u64 {
        self.scroll.total_height
    }

    fn max_scroll(&self) -> u32 {
        let max = self
            .scroll
            .total_height
            .saturating_sub(u64::from(self.scroll.container_height));
        u32::try_from(max).unwrap_or(u32::MAX)
    }

    fn sync_total(&mut self) {
        self.scroll.total_height = self.heights.total_height();
        let max = self.max_scroll();
        if self.scroll.scroll_top > max {
            self.scroll.scroll_top = max;
        }
    }

    /// Grow (new items at default height) or shrink the item count.
    pub fn set_item_count(&mut self, len: usize) {
        if len == self.heights.len() {
            return;
        }
        self.heights.resize(len);
        self.pending.retain(|&(idx, _)| idx < len);
        self.sync_total();
    }

    /// Replace every height after a structural change (filter, removal).
    ///
    /// Pending measurements refer to old positions and are dropped.
    pub fn rebuild_heights<I: IntoIterator<Item = u32>>(&mut self, heights: I) {
        self.heights.rebuild(heights);
        self.pending.clear();
        self.sync_total();
    }

    /// Insert a row of `height` px at `index`, shifting later rows down.
    ///
    /// A row inserted above the viewport moves the scroll offset by its
    /// height so visible content stays put. Pending measurements follow
    /// their rows.
    pub fn insert_item(&mut self, index: usize, height: u32) {
        let index = index.min(self.len());
        let height = height.max(1);
        let top = self.heights.offset_of_item(index);
        self.heights.insert(index, height);
        for entry in &mut self.pending {
            if entry.0 >= index {
                entry.0 += 1;
            }
        }
        self.scroll.total_height = self.heights.total_height();
        if top < u64::from(self.scroll.scroll_top) {
            self.shift_scroll(i64::from(height));
        }
        self.sync_total();
    }

    /// Remove the row at `index`, shifting later rows up.
    ///
    /// Returns the removed height. A row wholly above the viewport moves
    /// the scroll offset back by its height.
    pub fn remove_item(&mut self, index: usize) -> Option<u32> {
        let top = self.heights.offset_of_item(index);
        let height = self.heights.remove(index)?;
        self.pending.retain(|&(idx, _)| idx != index);
        for entry in &mut self.pending {
            if entry.0 > index {
                entry.0 -= 1;
            }
        }
        self.scroll.total_height = self.heights.total_height();
        if top + u64::from(height) <= u64::from(self.scroll.scroll_top) {
            self.shift_scroll(-i64::from(height));
        }
        self.sync_total();
        Some(height)
    }

    fn shift_scroll(&mut self, delta: i64) {
        let adjusted = (i64::from(self.scroll.scroll_top) + delta).max(0);
        self.scroll.scroll_top = u32::try_from(adjusted).unwrap_or(u32::MAX);
        self.scroll_request = Some(self.scroll.scroll_top);
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.heights.clear();
        self.pending.clear();
        self.scroll_request = None;
        self.scroll.scroll_top = 0;
        self.sync_total();
    }

    pub fn set_container_height(&mut self, height: u32) {
        self.scroll.container_height = height;
        self.sync_total();
    }

    /// Visible range for the current scroll state.
    #[must_use]
    pub fn visible_range(&self) -> VisibleRange {
        self.compute_visible_range(self.scroll.scroll_top, self.scroll.container_height)
    }

    /// Visible range for an arbitrary scroll offset and container height.
    #[must_use]
    pub fn compute_visible_range(&self, scroll_top: u32, container_height: u32) -> VisibleRange {
        range_for(
            self.heights.len(),
            self.heights.total_height(),
            scroll_top,
            container_height,
            self.overscan,
            |offset| self.heights.find_item_at_offset(offset),
        )
    }

    /// Pixels between the viewport bottom and the content end.
    #[must_use]
    pub fn distance_to_end(&self) -> u64 {
        self.scroll.total_height.saturating_sub(
            u64::from(self.scroll.scroll_top) + u64::from(self.scroll.container_height),
        )
    }

    /// Whether `index` is entirely inside the viewport.
    #[must_use]
    pub fn is_item_fully_visible(&self, index: usize) -> bool {
        if index >= self.len() {
            return false;
        }
        let top = self.offset_of_item(index);
        let bottom = top + u64::from(self.item_height(index));
        let view_top = u64::from(self.scroll.scroll_top);
        top >= view_top && bottom <= view_top + u64::from(self.scroll.container_height)
    }

    /// Record a scroll event from the container.
    pub fn on_scroll_at(&mut self, scroll_top: u32, now: Instant) {
        let top = scroll_top.min(self.max_scroll());
        let previous = self.scroll.scroll_top;
        self.scroll.direction = match top.cmp(&previous) {
            std::cmp::Ordering::Greater => ScrollDirection::Down,
            std::cmp::Ordering::Less => ScrollDirection::Up,
            std::cmp::Ordering::Equal => self.scroll.direction,
        };
        if let Some(last) = self.last_scroll_at {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            if dt > 0.0 {
                self.scroll.velocity = (top as f32 - previous as f32) / dt;
            }
        }
        self.scroll.scroll_top = top;
        self.scroll.is_scrolling = true;
        self.last_scroll_at = Some(now);
        trace!(
            scroll_top = top,
            direction = self.scroll.direction.as_str(),
            velocity = self.scroll.velocity,
            "scroll"
        );
    }

    /// End the scroll gesture after the quiet period. Returns `true` when it ended now.
    pub fn tick_at(&mut self, now: Instant) -> bool {
        if !self.scroll.is_scrolling {
            return false;
        }
        let Some(last) = self.last_scroll_at else {
            return false;
        };
        if now.saturating_duration_since(last) < self.quiet_period {
            return false;
        }
        self.scroll.is_scrolling = false;
        self.scroll.direction = ScrollDirection::Idle;
        self.scroll.velocity = 0.0;
        debug!(scroll_top = self.scroll.scroll_top, "scroll settled");
        true
    }

    /// Scroll so `index` (clamped) is positioned per `align`.
    ///
    /// Returns the requested offset, or `None` when the list is empty or
    /// `Align::Auto` needs no movement. The request is also queued for
    /// [`take_scroll_request`](Self::take_scroll_request).
    pub fn scroll_to_item(&mut self, index: usize, align: Align) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let idx = index.min(self.len() - 1);
        let item_top = self.offset_of_item(idx);
        let item_height = u64::from(self.item_height(idx));
        let view = u64::from(self.scroll.container_height);
        let current = u64::from(self.scroll.scroll_top);
        let bottom_aligned = (item_top + item_height).saturating_sub(view);

        let target = match align {
            Align::Start => item_top,
            Align::End => bottom_aligned,
            Align::Center => (item_top + item_height / 2).saturating_sub(view / 2),
            Align::Auto => {
                if item_top < current {
                    item_top
                } else if item_top + item_height > current + view {
                    bottom_aligned.max(current).min(item_top)
                } else {
                    return None;
                }
            }
        };
        let target = u32::try_from(target).unwrap_or(u32::MAX).min(self.max_scroll());
        self.scroll.direction = match target.cmp(&self.scroll.scroll_top) {
            std::cmp::Ordering::Greater => ScrollDirection::Down,
            std::cmp::Ordering::Less => ScrollDirection::Up,
            std::cmp::Ordering::Equal => self.scroll.direction,
        };
        self.scroll.scroll_top = target;
        self.scroll_request = Some(target);
        Some(target)
    }

    /// Take the offset the host should apply to its scroll container.
    pub fn take_scroll_request(&mut self) -> Option<u32> {
        self.scroll_request.take()
    }

    /// Queue a measured height. Applied on the next flush.
    pub fn update_item_height(&mut self, index: usize, height: f64) -> Result<(), MeasurementError> {
        if !height.is_finite() || height <= 0.0 {
            self.metrics.measurements_rejected += 1;
            return Err(MeasurementError::NonPositive { index, height });
        }
        if index >= self.len() {
            self.metrics.measurements_rejected += 1;
            return Err(MeasurementError::OutOfRange {
                index,
                len: self.len(),
            });
        }
        let px = height.ceil().min(f64::from(u32::MAX)) as u32;
        self.pending.push((index, px));
        Ok(())
    }

    #[must_use]
    pub fn has_pending_measurements(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply every queued measurement at once.
    ///
    /// Returns the `(index, height)` pairs that changed. When an item wholly
    /// above the viewport changes height, the scroll offset moves by the same
    /// delta so visible content stays put.
    pub fn flush_measurements(&mut self) -> Vec<(usize, u32)> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.metrics.flushes += 1;
        let pending = std::mem::take(&mut self.pending);
        let mut applied: Vec<(usize, u32)> = Vec::with_capacity(pending.len());
        let mut anchor_delta: i64 = 0;
        let view_top = u64::from(self.scroll.scroll_top);
        for (idx, height) in pending {
            let top = self.heights.offset_of_item(idx);
            let Some(old) = self.heights.set(idx, height) else {
                continue;
            };
            if old == height {
                continue;
            }
            if top + u64::from(old) <= view_top {
                anchor_delta += i64::from(height) - i64::from(old);
            }
            match applied.iter_mut().find(|(i, _)| *i == idx) {
                Some(entry) => entry.1 = height,
                None => applied.push((idx, height)),
            }
        }
        self.metrics.measurements_applied += applied.len() as u64;
        self.scroll.total_height = self.heights.total_height();
        if anchor_delta != 0 {
            self.shift_scroll(anchor_delta);
        }
        self.sync_total();
        if !applied.is_empty() {
            debug!(changed = applied.len(), anchor_delta, "measurements flushed");
        }
        applied
    }

    /// Record a rendered frame for the FPS estimate.
    pub fn record_frame(&mut self, now: Instant) {
        self.frames.push_back(now);
        while let Some(&front) = self.frames.front() {
            if now.saturating_duration_since(front) > self.fps_window {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    /// Start a frame: apply measurements, then record the frame.
    pub fn begin_frame_at(&mut self, now: Instant) -> Vec<(usize, u32)> {
        let applied = self.flush_measurements();
        self.record_frame(now);
        applied
    }

    /// Frames per second over the trailing window.
    #[must_use]
    pub fn fps(&self) -> f32 {
        let (Some(first), Some(last)) = (self.frames.front(), self.frames.back()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first).as_secs_f32();
        if self.frames.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        (self.frames.len() - 1) as f32 / span
    }

    /// Diagnostic snapshot.
    #[must_use]
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            fps: self.fps(),
            frames_in_window: self.frames.len(),
            visible_items: self.visible_range().len(),
            total_items: self.len(),
            ..self.metrics
        }
    }
}
