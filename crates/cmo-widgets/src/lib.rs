#![forbid(unsafe_code)]

//! Headless building blocks for the CMO alert feed.
//!
//! - [`virtualized`] windowing over variable row heights
//! - [`loader`] page-by-page accumulation with one request in flight
//! - [`store`] identity-keyed storage and the live-event reducer
//! - [`filter`] predicates, highlight rules and the debounced filter engine
//! - [`alert_list`] the list container that composes them as a runtime model

pub mod alert_list;
pub mod config;
pub mod fenwick;
pub mod filter;
pub mod loader;
pub mod store;
pub mod virtualized;

pub use alert_list::{
    AlertList, Footer, ListFrame, ListMsg, ListView, LiveSource, LiveSubscription, Row,
};
pub use config::{ListConfig, ListConfigError, ListConfigParse};
pub use filter::{
    FieldValue, FilterEngine, FilterOp, FilterOutput, FilterSet, FilterValue, Filterable,
    HighlightRule, Predicate, ViewChange, apply_filters,
};
pub use loader::{
    InfiniteLoader, LoadCursor, LoadError, LoadOutcome, LoadRequest, LoadState, Page, PageSource,
};
pub use store::{ItemStore, ListItem, LiveEvent, StoreChange};
pub use virtualized::{
    Align, MeasurementError, PerformanceMetrics, ScrollDirection, ScrollState, Virtualizer,
    VisibleRange, compute_visible_range,
};
