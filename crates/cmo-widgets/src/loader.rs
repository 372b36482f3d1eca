#![forbid(unsafe_code)]

//! Page-by-page loading with at most one request in flight.
//!
//! The loader never performs I/O itself. [`InfiniteLoader::load_more`] hands
//! out a [`LoadRequest`] ticket; the caller runs it against a [`PageSource`]
//! (usually inside `Cmd::task`) and feeds the result back through
//! [`InfiniteLoader::complete`].
//!
//! # State machine
//!
//! ```text
//!   Idle ──load_more──▶ Loading ──Ok──▶ Idle
//!                          │
//!                          └─Err──▶ Error ──retry──▶ Loading
//! ```
//!
//! # Invariants
//! 1. At most one ticket is outstanding.
//! 2. Once `has_more` is `false` only [`reset`](InfiniteLoader::reset) sets it back.
//! 3. A failed load keeps every loaded item and leaves `has_more` alone.
//! 4. Tickets issued before a reset complete as [`LoadOutcome::Stale`].

use std::fmt;

use tracing::{debug, info_span, warn};

use crate::store::{ItemStore, ListItem, StoreChange};

/// One fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `false` means the source is exhausted.
    pub has_more: bool,
    /// Opaque token for the next request, when the source is cursor based.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A page with more to follow.
    #[must_use]
    pub fn more(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: true,
            next_cursor: None,
        }
    }

    /// The final page.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
            next_cursor: None,
        }
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }
}

/// A failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Transport failure.
    Network(String),
    /// The source did not answer in time.
    Timeout,
    /// The source answered with an error status.
    Rejected { status: u16, message: String },
    Other(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Rejected { status, message } => write!(f, "rejected ({status}): {message}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Ticket for one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Monotonic request number.
    pub id: u64,
    /// Loader generation at issue time.
    pub generation: u64,
    /// Zero-based page index.
    pub page: u32,
    /// Cursor returned with the previous page, if any.
    pub cursor: Option<String>,
}

/// Supplier of pages.
///
/// "No more data" is `Ok` with `has_more == false`; transient failures are `Err`.
pub trait PageSource<T>: Send + Sync {
    fn load_page(&self, request: &LoadRequest) -> Result<Page<T>, LoadError>;
}

impl<T, F> PageSource<T> for F
where
    F: Fn(&LoadRequest) -> Result<Page<T>, LoadError> + Send + Sync,
{
    fn load_page(&self, request: &LoadRequest) -> Result<Page<T>, LoadError> {
        self(request)
    }
}

/// Loader status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Error(LoadError),
}

/// Pagination position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCursor {
    pub page: u32,
    pub token: Option<String>,
    pub has_more: bool,
    pub in_flight: Option<u64>,
    pub generation: u64,
}

impl Default for LoadCursor {
    fn default() -> Self {
        Self {
            page: 0,
            token: None,
            has_more: true,
            in_flight: None,
            generation: 0,
        }
    }
}

/// Result of [`InfiniteLoader::complete`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Items were appended. `slots` lists the new store slots in order.
    Appended {
        slots: Vec<usize>,
        skipped: usize,
        has_more: bool,
    },
    Failed(LoadError),
    /// The ticket is not the outstanding one.
    Stale,
}

/// Accumulates pages into an [`ItemStore`].
#[derive(Debug)]
pub struct InfiniteLoader<T: ListItem> {
    store: ItemStore<T>,
    cursor: LoadCursor,
    state: LoadState,
    next_request: u64,
    pages_loaded: u32,
}

impl<T: ListItem> Default for InfiniteLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ListItem> InfiniteLoader<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Start from items that are already known.
    #[must_use]
    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            store: ItemStore::from_items(items),
            cursor: LoadCursor::default(),
            state: LoadState::Idle,
            next_request: 0,
            pages_loaded: 0,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ItemStore<T> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ItemStore<T> {
        &mut self.store
    }

    #[must_use]
    pub fn state(&self) -> &LoadState {
        &self.state
    }

    #[must_use]
    pub fn cursor(&self) -> &LoadCursor {
        &self.cursor
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.cursor.has_more
    }

    #[must_use]
    pub fn error(&self) -> Option<&LoadError> {
        match &self.state {
            LoadState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Pages that completed successfully since the last reset.
    #[must_use]
    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    /// Issue a ticket for the next page.
    ///
    /// Returns `None` while a load is in flight or once the source is exhausted.
    pub fn load_more(&mut self) -> Option<LoadRequest> {
        if self.is_loading() || !self.cursor.has_more {
            return None;
        }
        let request = LoadRequest {
            id: self.next_request,
            generation: self.cursor.generation,
            page: self.cursor.page,
            cursor: self.cursor.token.clone(),
        };
        self.next_request += 1;
        self.cursor.in_flight = Some(request.id);
        self.state = LoadState::Loading;
        debug!(request = request.id, page = request.page, "load issued");
        Some(request)
    }

    /// Issue a new ticket for the same cursor after a failure.
    pub fn retry(&mut self) -> Option<LoadRequest> {
        if !matches!(self.state, LoadState::Error(_)) {
            return None;
        }
        self.state = LoadState::Idle;
        self.load_more()
    }

    /// Apply the result of a ticket.
    pub fn complete(
        &mut self,
        request: &LoadRequest,
        result: Result<Page<T>, LoadError>,
    ) -> LoadOutcome {
        let _span = info_span!("load_complete", request = request.id, page = request.page).entered();
        if request.generation != self.cursor.generation || self.cursor.in_flight != Some(request.id)
        {
            debug!("stale load result discarded");
            return LoadOutcome::Stale;
        }
        self.cursor.in_flight = None;
        match result {
            Ok(page) => {
                let mut slots = Vec::with_capacity(page.items.len());
                let mut skipped = 0;
                for item in page.items {
                    match self.store.insert(item) {
                        StoreChange::Inserted(slot) => slots.push(slot),
                        _ => skipped += 1,
                    }
                }
                self.cursor.page += 1;
                self.cursor.token = page.next_cursor;
                // Exhaustion is one-way.
                self.cursor.has_more = self.cursor.has_more && page.has_more;
                self.pages_loaded += 1;
                self.state = LoadState::Idle;
                debug!(
                    appended = slots.len(),
                    skipped,
                    has_more = self.cursor.has_more,
                    "page appended"
                );
                LoadOutcome::Appended {
                    slots,
                    skipped,
                    has_more: self.cursor.has_more,
                }
            }
            Err(err) => {
                warn!(error = %err, "page load failed");
                self.state = LoadState::Error(err.clone());
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Fetch the next page synchronously from `source`.
    pub fn fetch_with(&mut self, source: &dyn PageSource<T>) -> Option<LoadOutcome> {
        let request = self.load_more()?;
        let result = source.load_page(&request);
        Some(self.complete(&request, result))
    }

    /// Forget every item and start from the first page.
    pub fn reset(&mut self) {
        let generation = self.cursor.generation + 1;
        self.store.clear();
        self.cursor = LoadCursor {
            generation,
            ..LoadCursor::default()
        };
        self.state = LoadState::Idle;
        self.pages_loaded = 0;
        debug!(generation, "loader reset");
    }
}
