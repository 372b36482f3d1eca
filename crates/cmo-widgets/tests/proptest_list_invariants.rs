//! Property-based invariant tests for the alert list building blocks.
//!
//! These hold for **any** item count, heights, scroll offset and filter
//! combination:
//!
//! 1. Coverage: with uniform height `h`, the mounted range covers at least
//!    `min(H, N*h)` pixels and stays inside `[0, N-1]`.
//! 2. Range computation is idempotent and matches the slice-based function.
//! 3. Mounted ranges cover the viewport for variable heights.
//! 4. Filtering is stable: matching items keep their relative order.
//! 5. Incremental filter maintenance agrees with a full recompute.
//! 6. A burst of filter edits inside the quiet window recomputes once, with
//!    the last configuration.
//! 7. `has_more` never returns to `true` without a reset.

use std::borrow::Cow;
use std::time::Duration;

use cmo_widgets::{
    FieldValue, FilterEngine, FilterOp, FilterSet, Filterable, HighlightRule, InfiniteLoader,
    ItemStore, ListItem, LoadError, Page, Predicate, StoreChange, Virtualizer, apply_filters,
    compute_visible_range,
};
use proptest::prelude::*;
use web_time::Instant;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Alert {
    id: u32,
    severity: String,
    score: f64,
}

impl ListItem for Alert {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }
}

impl Filterable for Alert {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "severity" => Some(FieldValue::Text(Cow::Borrowed(&self.severity))),
            "score" => Some(FieldValue::Number(self.score)),
            _ => None,
        }
    }

    fn search_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.severity)
    }
}

const SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

fn alerts_strategy(max: usize) -> impl Strategy<Value = Vec<Alert>> {
    proptest::collection::vec((0usize..4, 0.0f64..10.0), 0..max).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (sev, score))| Alert {
                id: i as u32,
                severity: SEVERITIES[sev].to_owned(),
                score,
            })
            .collect()
    })
}

fn predicate_strategy() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        (0usize..4).prop_map(|s| Predicate::equals("severity", SEVERITIES[s])),
        (0usize..4).prop_map(|s| Predicate::new("severity", FilterOp::Ne, SEVERITIES[s])),
        (0.0f64..10.0).prop_map(|v| Predicate::new("score", FilterOp::Gte, v)),
        (0.0f64..10.0).prop_map(|v| Predicate::new("score", FilterOp::Lt, v)),
        Just(Predicate::contains("severity", "i")),
        Just(Predicate::one_of("severity", ["low", "critical"])),
        Just(Predicate::equals("severity", "")),
        Just(Predicate::equals("region", "north")),
    ]
}

fn filter_strategy() -> impl Strategy<Value = FilterSet> {
    (
        proptest::collection::vec(predicate_strategy(), 0..3),
        prop_oneof![Just(""), Just("HIGH"), Just("med")],
    )
        .prop_map(|(predicates, search)| FilterSet {
            predicates,
            search: search.to_owned(),
        })
}

fn uniform(count: usize, height: u32, container: u32, overscan: usize) -> Virtualizer {
    let mut v = Virtualizer::new(height, container).with_overscan(overscan);
    v.set_item_count(count);
    v
}

// ── Virtualization ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn uniform_range_covers_viewport(
        count in 0usize..2_000,
        height in 1u32..200,
        container in 1u32..2_000,
        overscan in 0usize..10,
        top in 0u32..400_000,
    ) {
        let mut v = uniform(count, height, container, overscan);
        v.on_scroll_at(top, Instant::now());
        let range = v.visible_range();
        if count == 0 {
            prop_assert!(range.is_empty());
        } else {
            prop_assert!(range.start <= range.end);
            prop_assert!(range.end < count);
            let covered = range.len() as u64 * u64::from(height);
            let needed = u64::from(container).min(count as u64 * u64::from(height));
            prop_assert!(covered >= needed, "covered {covered} < needed {needed}");
        }
    }

    #[test]
    fn range_is_idempotent_and_matches_pure_fn(
        heights in proptest::collection::vec(1u32..300, 0..300),
        container in 1u32..1_500,
        overscan in 0usize..8,
        top in 0u32..100_000,
    ) {
        let mut v = Virtualizer::new(80, container).with_overscan(overscan);
        v.rebuild_heights(heights.iter().copied());
        v.on_scroll_at(top, Instant::now());
        let first = v.visible_range();
        prop_assert_eq!(first, v.visible_range());
        let clamped = v.scroll_state().scroll_top;
        prop_assert_eq!(first, compute_visible_range(clamped, container, &heights, overscan));
        prop_assert_eq!(
            compute_visible_range(top, container, &heights, overscan),
            compute_visible_range(top, container, &heights, overscan)
        );
    }

    #[test]
    fn variable_range_touches_viewport_edges(
        heights in proptest::collection::vec(1u32..300, 1..300),
        container in 1u32..1_500,
        top in 0u32..100_000,
    ) {
        let mut v = Virtualizer::new(80, container).with_overscan(0);
        v.rebuild_heights(heights.iter().copied());
        v.on_scroll_at(top, Instant::now());
        let range = v.visible_range();
        let top = u64::from(v.scroll_state().scroll_top);
        let bottom = (top + u64::from(container)).min(v.total_height());
        let first_top = v.offset_of_item(range.start);
        let last_bottom = v.offset_of_item(range.end) + u64::from(v.item_height(range.end));
        prop_assert!(first_top <= top);
        prop_assert!(last_bottom >= bottom);
    }
}

// ── Filtering ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn filtering_is_stable(items in alerts_strategy(200), filters in filter_strategy()) {
        let store = ItemStore::from_items(items.clone());
        let out = apply_filters(store.iter(), &filters, &HighlightRule::none());
        prop_assert!(out.indices.windows(2).all(|w| w[0] < w[1]));
        let expected: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| filters.matches(*item))
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(out.indices, expected);
    }

    #[test]
    fn incremental_matches_full_recompute(
        initial in alerts_strategy(60),
        added in alerts_strategy(30),
        removals in proptest::collection::vec(0u32..90, 0..20),
        filters in filter_strategy(),
    ) {
        let mut store = ItemStore::from_items(initial);
        let mut engine = FilterEngine::new(Duration::from_millis(100), filters.clone());
        engine.recompute(&store);
        for (offset, mut item) in added.into_iter().enumerate() {
            item.id = 1_000 + offset as u32;
            if let StoreChange::Inserted(slot) = store.insert(item) {
                let stored = store.get(slot).cloned();
                if let Some(stored) = stored {
                    engine.on_inserted(slot, &stored);
                }
            }
        }
        for id in removals {
            if let StoreChange::Removed(slot) = store.remove(&id) {
                engine.on_removed(slot);
            }
        }
        let mut fresh = FilterEngine::new(Duration::from_millis(100), filters);
        fresh.recompute(&store);
        prop_assert_eq!(engine.view(), fresh.view());
    }

    #[test]
    fn debounce_burst_recomputes_once(
        items in alerts_strategy(50),
        burst in proptest::collection::vec(filter_strategy(), 1..10),
        gaps in proptest::collection::vec(0u64..99, 10),
    ) {
        let store = ItemStore::from_items(items);
        let t0 = Instant::now();
        let mut engine = FilterEngine::new(Duration::from_millis(100), FilterSet::default());
        engine.recompute(&store);
        let mut now = t0;
        let mut recomputes = 0;
        for (filters, gap) in burst.iter().zip(&gaps) {
            engine.set_filters_at(filters.clone(), now);
            now += Duration::from_millis(*gap);
            if engine.poll_at(now, &store) {
                recomputes += 1;
            }
        }
        if engine.poll_at(now + Duration::from_millis(100), &store) {
            recomputes += 1;
        }
        prop_assert_eq!(recomputes, 1);
        prop_assert_eq!(engine.applied(), burst.last().unwrap());
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn has_more_is_monotonic(outcomes in proptest::collection::vec(0u8..3, 1..30)) {
        let mut loader: InfiniteLoader<Alert> = InfiniteLoader::new();
        let mut exhausted = false;
        let mut next_id = 0u32;
        for outcome in outcomes {
            let Some(request) = loader.load_more().or_else(|| loader.retry()) else {
                prop_assert!(exhausted);
                continue;
            };
            let item = Alert { id: next_id, severity: "low".into(), score: 0.0 };
            next_id += 1;
            let result = match outcome {
                0 => Ok(Page::more(vec![item])),
                1 => Ok(Page::last(vec![item])),
                _ => Err(LoadError::Timeout),
            };
            loader.complete(&request, result);
            exhausted |= outcome == 1;
            prop_assert_eq!(loader.has_more(), !exhausted);
        }
    }
}
