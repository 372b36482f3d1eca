#![forbid(unsafe_code)]

//! Predicate filtering with debounced recomputation.
//!
//! [`apply_filters`] is the pure core: a stable pass over `(slot, item)`
//! pairs that keeps the items matching every active predicate and marks the
//! ones that also match a [`HighlightRule`]. [`FilterEngine`] owns the
//! applied [`FilterSet`], coalesces edits through a debounce timer and keeps
//! the filtered slot list current as items arrive, change or disappear.
//!
//! # Invariants
//! 1. The filtered slot list is strictly ascending (input order is kept).
//! 2. A predicate with an empty value is inactive and matches everything.
//! 3. A missing field never satisfies an active predicate.
//! 4. `reset_filters` applies immediately and cancels any pending edit.

use std::borrow::Cow;
use std::time::Duration;

use ahash::AHashSet;
use cmo_runtime::Debounced;
use tracing::{debug, debug_span};
use web_time::Instant;

use crate::store::{ItemStore, ListItem};

/// A field value exposed by an item.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    Bool(bool),
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(Cow::Borrowed(value))
    }
}

impl From<String> for FieldValue<'_> {
    fn from(value: String) -> Self {
        Self::Text(Cow::Owned(value))
    }
}

impl From<f64> for FieldValue<'_> {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Items that can be filtered by named field.
pub trait Filterable {
    /// Value of `name`, or `None` when the item has no such field.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;

    /// Text matched by the free-text search.
    fn search_text(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FilterOp {
    Eq,
    Ne,
    /// Case-insensitive substring.
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field equals any listed value.
    OneOf,
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FilterValue {
    /// Empty text or an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(values) => values.iter().all(|v| v.trim().is_empty()),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<&[&str]> for FilterValue {
    fn from(values: &[&str]) -> Self {
        Self::List(values.iter().map(|v| (*v).to_owned()).collect())
    }
}

/// `field op value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Predicate {
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Contains, FilterValue::Text(value.into()))
    }

    #[must_use]
    pub fn one_of<S: Into<String>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let list = values.into_iter().map(Into::into).collect::<Vec<String>>();
        Self::new(field, FilterOp::OneOf, FilterValue::List(list))
    }

    /// Whether this predicate constrains anything.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.value.is_empty()
    }

    /// Test one item. Inactive predicates match everything.
    #[must_use]
    pub fn matches<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        if !self.is_active() {
            return true;
        }
        match item.field(&self.field) {
            Some(field) => compare(&field, self.op, &self.value),
            None => false,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn compare(field: &FieldValue<'_>, op: FilterOp, value: &FilterValue) -> bool {
    use std::cmp::Ordering;

    let ordering = match (field, value) {
        (FieldValue::Text(a), FilterValue::Text(b)) => Some(a.as_ref().cmp(b.as_str())),
        (FieldValue::Number(a), FilterValue::Number(b)) => a.partial_cmp(b),
        (FieldValue::Bool(a), FilterValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match op {
        FilterOp::Eq => ordering == Some(Ordering::Equal),
        FilterOp::Ne => matches!(ordering, Some(Ordering::Less | Ordering::Greater)),
        FilterOp::Gt => ordering == Some(Ordering::Greater),
        FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => ordering == Some(Ordering::Less),
        FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Contains => match (field, value) {
            (FieldValue::Text(a), FilterValue::Text(b)) => contains_ci(a, b),
            _ => false,
        },
        FilterOp::OneOf => {
            let FilterValue::List(options) = value else {
                return false;
            };
            match field {
                FieldValue::Text(a) => options.iter().any(|o| o == a.as_ref()),
                FieldValue::Number(a) => options
                    .iter()
                    .filter_map(|o| o.trim().parse::<f64>().ok())
                    .any(|o| o == *a),
                FieldValue::Bool(a) => options.iter().any(|o| o.parse::<bool>() == Ok(*a)),
            }
        }
    }
}

/// Active filter configuration.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FilterSet {
    pub predicates: Vec<Predicate>,
    /// Free-text query over `Filterable::search_text`.
    pub search: String,
}

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = query.into();
        self
    }

    /// Whether this is the empty configuration.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.predicates.is_empty() && self.search.is_empty()
    }

    /// Active predicates, plus one for a non-blank search.
    #[must_use]
    pub fn active_count(&self) -> usize {
        let search = usize::from(!self.search.trim().is_empty());
        self.predicates.iter().filter(|p| p.is_active()).count() + search
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_count() > 0
    }

    #[must_use]
    pub fn matches<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        Compiled::new(self).matches(item)
    }
}

/// Secondary criterion marking rows for emphasis (severity, recency).
///
/// Every active predicate must match. A rule with no active predicate
/// highlights nothing.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HighlightRule {
    pub predicates: Vec<Predicate>,
}

impl HighlightRule {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    #[must_use]
    pub fn matches<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        let mut active = self.predicates.iter().filter(|p| p.is_active()).peekable();
        active.peek().is_some() && active.all(|p| p.matches(item))
    }
}

/// Filter set with the search query lowercased once.
struct Compiled<'f> {
    predicates: Vec<&'f Predicate>,
    search: Option<String>,
}

impl<'f> Compiled<'f> {
    fn new(filters: &'f FilterSet) -> Self {
        let query = filters.search.trim();
        Self {
            predicates: filters.predicates.iter().filter(|p| p.is_active()).collect(),
            search: (!query.is_empty()).then(|| query.to_lowercase()),
        }
    }

    fn matches<T: Filterable + ?Sized>(&self, item: &T) -> bool {
        if !self.predicates.iter().all(|p| p.matches(item)) {
            return false;
        }
        match &self.search {
            Some(query) => item.search_text().to_lowercase().contains(query.as_str()),
            None => true,
        }
    }
}

/// Output of [`apply_filters`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterOutput {
    /// Slots of matching items, in input order.
    pub indices: Vec<usize>,
    /// Positions into `indices` that match the highlight rule.
    pub highlighted: Vec<usize>,
}

/// Stable filter over `(slot, item)` pairs.
pub fn apply_filters<'a, T, I>(items: I, filters: &FilterSet, highlight: &HighlightRule) -> FilterOutput
where
    T: Filterable + 'a,
    I: IntoIterator<Item = (usize, &'a T)>,
{
    let compiled = Compiled::new(filters);
    let mut out = FilterOutput::default();
    for (slot, item) in items {
        if compiled.matches(item) {
            if highlight.matches(item) {
                out.highlighted.push(out.indices.len());
            }
            out.indices.push(slot);
        }
    }
    out
}

/// How an incremental update changed the filtered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    Unchanged,
    /// Row entered the view at this position.
    Inserted(usize),
    /// Row left the view from this position.
    Removed(usize),
    /// Row at this position was replaced in place.
    Updated(usize),
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Full passes over the store.
    pub recomputes: u64,
    /// Incremental single-item adjustments.
    pub incremental: u64,
}

/// Filtered view over an [`ItemStore`].
#[derive(Debug, Clone)]
pub struct FilterEngine {
    applied: FilterSet,
    highlight: HighlightRule,
    pending: Debounced<FilterSet>,
    view: Vec<usize>,
    highlighted: AHashSet<usize>,
    stats: FilterStats,
}

impl FilterEngine {
    #[must_use]
    pub fn new(debounce: Duration, initial: FilterSet) -> Self {
        Self {
            applied: initial,
            highlight: HighlightRule::none(),
            pending: Debounced::new(debounce),
            view: Vec::new(),
            highlighted: AHashSet::new(),
            stats: FilterStats::default(),
        }
    }

    #[must_use]
    pub fn with_highlight(mut self, rule: HighlightRule) -> Self {
        self.highlight = rule;
        self
    }

    /// The configuration the view reflects.
    #[must_use]
    pub fn applied(&self) -> &FilterSet {
        &self.applied
    }

    /// A configuration waiting for its quiet period.
    #[must_use]
    pub fn pending(&self) -> Option<&FilterSet> {
        self.pending.pending()
    }

    #[must_use]
    pub fn highlight(&self) -> &HighlightRule {
        &self.highlight
    }

    #[must_use]
    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Active predicates in the applied configuration.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.applied.active_count()
    }

    /// Filtered slots in order.
    #[must_use]
    pub fn view(&self) -> &[usize] {
        &self.view
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.view.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Store slot at filtered position `pos`.
    #[must_use]
    pub fn slot_at(&self, pos: usize) -> Option<usize> {
        self.view.get(pos).copied()
    }

    /// Filtered position of `slot`.
    #[must_use]
    pub fn position_of_slot(&self, slot: usize) -> Option<usize> {
        self.view.binary_search(&slot).ok()
    }

    #[must_use]
    pub fn is_highlighted(&self, slot: usize) -> bool {
        self.highlighted.contains(&slot)
    }

    /// Highlighted filtered positions, ascending.
    #[must_use]
    pub fn highlighted_positions(&self) -> Vec<usize> {
        self.view
            .iter()
            .enumerate()
            .filter(|(_, slot)| self.highlighted.contains(slot))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Queue a configuration; it applies after the quiet period.
    pub fn set_filters_at(&mut self, filters: FilterSet, now: Instant) {
        self.pending.push_at(filters, now);
    }

    /// Apply the pending configuration if its quiet period elapsed.
    ///
    /// Returns `true` when the view was recomputed.
    pub fn poll_at<T: ListItem + Filterable>(&mut self, now: Instant, store: &ItemStore<T>) -> bool {
        match self.pending.poll_at(now) {
            Some(filters) => {
                self.applied = filters;
                self.recompute(store);
                true
            }
            None => false,
        }
    }

    /// Restore the empty configuration now, dropping any pending edit.
    pub fn reset_filters<T: ListItem + Filterable>(&mut self, store: &ItemStore<T>) {
        if self.pending.cancel().is_some() {
            debug!("pending filter change cancelled by reset");
        }
        self.applied = FilterSet::default();
        self.recompute(store);
    }

    /// Replace the highlight rule and re-mark the current view.
    pub fn set_highlight<T: ListItem + Filterable>(&mut self, rule: HighlightRule, store: &ItemStore<T>) {
        self.highlight = rule;
        self.highlighted = self
            .view
            .iter()
            .copied()
            .filter(|&slot| store.get(slot).is_some_and(|item| self.highlight.matches(item)))
            .collect();
    }

    /// Full pass with the applied configuration.
    pub fn recompute<T: ListItem + Filterable>(&mut self, store: &ItemStore<T>) {
        let _span = debug_span!("filter_recompute", items = store.len()).entered();
        let output = apply_filters(store.iter(), &self.applied, &self.highlight);
        self.highlighted = output
            .highlighted
            .iter()
            .map(|&pos| output.indices[pos])
            .collect();
        self.view = output.indices;
        self.stats.recomputes += 1;
        debug!(
            matched = self.view.len(),
            highlighted = self.highlighted.len(),
            active = self.filter_count(),
            "filters applied"
        );
    }

    fn insert_slot(&mut self, slot: usize) -> usize {
        match self.view.last() {
            Some(&last) if last >= slot => match self.view.binary_search(&slot) {
                Ok(pos) => pos,
                Err(pos) => {
                    self.view.insert(pos, slot);
                    pos
                }
            },
            _ => {
                self.view.push(slot);
                self.view.len() - 1
            }
        }
    }

    fn mark<T: Filterable>(&mut self, slot: usize, item: &T) {
        if self.highlight.matches(item) {
            self.highlighted.insert(slot);
        } else {
            self.highlighted.remove(&slot);
        }
    }

    /// A new item landed in `slot`.
    pub fn on_inserted<T: Filterable>(&mut self, slot: usize, item: &T) -> ViewChange {
        self.stats.incremental += 1;
        if !self.applied.matches(item) {
            return ViewChange::Unchanged;
        }
        self.mark(slot, item);
        ViewChange::Inserted(self.insert_slot(slot))
    }

    /// The item in `slot` was replaced.
    pub fn on_replaced<T: Filterable>(&mut self, slot: usize, item: &T) -> ViewChange {
        self.stats.incremental += 1;
        let matches = self.applied.matches(item);
        match (self.view.binary_search(&slot), matches) {
            (Ok(pos), true) => {
                self.mark(slot, item);
                ViewChange::Updated(pos)
            }
            (Ok(pos), false) => {
                self.view.remove(pos);
                self.highlighted.remove(&slot);
                ViewChange::Removed(pos)
            }
            (Err(_), true) => {
                self.mark(slot, item);
                ViewChange::Inserted(self.insert_slot(slot))
            }
            (Err(_), false) => ViewChange::Unchanged,
        }
    }

    /// The item in `slot` was removed.
    pub fn on_removed(&mut self, slot: usize) -> ViewChange {
        self.stats.incremental += 1;
        self.highlighted.remove(&slot);
        match self.view.binary_search(&slot) {
            Ok(pos) => {
                self.view.remove(pos);
                ViewChange::Removed(pos)
            }
            Err(_) => ViewChange::Unchanged,
        }
    }
}
