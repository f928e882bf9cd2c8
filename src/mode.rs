// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Mode: a named partition of a run-loop's sources, timers, and observers
//! (spec §2/§3 Mode, §4.2 "mode-partitioned registries").
//!
//! A source or timer scheduled into mode "A" is invisible to a run invocation
//! processing mode "B" — modes are a flat namespace, not a tree (spec §9,
//! resolved in the expanded spec as "no submode inheritance").

use crate::observer::Observer;
use crate::source::{Source, SourceId};
use indexmap::{IndexMap, IndexSet};

/// The mode every run-loop starts with and the one `run()` defaults to when
/// no mode is named explicitly (spec §6.2 `default_mode_name`).
pub const DEFAULT_MODE_NAME: &str = "default";

/// One mode's bookkeeping: an insertion-ordered set of non-timer sources, an
/// insertion-ordered set of timer sources, and a priority-ordered list of
/// observers.
///
/// `IndexSet`/`IndexMap` preserve insertion order so that same-priority
/// sources keep a deterministic, stable dispatch order across iterations
/// (spec §4.2 "ties broken by insertion order").
pub struct Mode {
    name: String,
    sources: IndexSet<Source>,
    timers: IndexSet<Source>,
    observers: IndexMap<crate::observer::ObserverId, Observer>,
}

impl Mode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Mode {
            name: name.into(),
            sources: IndexSet::new(),
            timers: IndexSet::new(),
            observers: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.timers.is_empty() && self.observers.is_empty()
    }

    pub fn insert_source(&mut self, source: Source) {
        if source.kind_snapshot().is_timer() {
            self.timers.insert(source);
        } else {
            self.sources.insert(source);
        }
    }

    pub fn remove_source(&mut self, source: &Source) -> bool {
        self.sources.shift_remove(source) || self.timers.shift_remove(source)
    }

    pub fn contains_source(&self, source: &Source) -> bool {
        self.sources.contains(source) || self.timers.contains(source)
    }

    pub fn insert_observer(&mut self, observer: Observer) {
        self.observers.insert(observer.id(), observer);
    }

    pub fn remove_observer_id(&mut self, id: crate::observer::ObserverId) -> bool {
        self.observers.shift_remove(id).is_some()
    }

    /// Non-timer sources in insertion order (spec §4.2 step d iterates these
    /// sorted by ascending priority, ties by this order).
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Timer sources in insertion order (spec §4.2 step b/g).
    pub fn timers(&self) -> impl Iterator<Item = &Source> {
        self.timers.iter()
    }

    /// Observers in insertion order; the engine sorts a local copy by
    /// priority before firing (spec §4.2 "Observers... ascending priority").
    pub fn observers(&self) -> impl Iterator<Item = &Observer> {
        self.observers.values()
    }

    pub fn source_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.iter().map(Source::id).chain(self.timers.iter().map(Source::id))
    }
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mode")
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("timers", &self.timers.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_preserved_for_same_priority_ties() {
        let mut mode = Mode::new(DEFAULT_MODE_NAME);
        let a = Source::create_custom(0, None);
        let b = Source::create_custom(0, None);
        mode.insert_source(a.clone());
        mode.insert_source(b.clone());
        let order: Vec<SourceId> = mode.sources().map(Source::id).collect();
        assert_eq!(order, vec![a.id(), b.id()]);
    }

    #[test]
    fn remove_source_detaches_from_either_bucket() {
        let mut mode = Mode::new(DEFAULT_MODE_NAME);
        let timer = Source::create_timer(1000, 0, 0);
        mode.insert_source(timer.clone());
        assert!(mode.contains_source(&timer));
        assert!(mode.remove_source(&timer));
        assert!(!mode.contains_source(&timer));
    }
}
