//! Stable worker identities.
//!
//! Every completion report names the execution unit that produced it with a
//! small integer. Units identify themselves differently per strategy (rayon
//! thread index, OS pid, supervisor slot), so each runner owns a resolver
//! that maps whatever key its units use onto ids assigned in first-seen
//! order starting at 0. The mapping is scoped to one `start` call and reset
//! at its end, so ids never leak across batches.

use std::hash::Hash;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

/// Identifies which execution unit produced a result.
///
/// Non-negative ids are assigned in first-seen order within one batch.
/// [`WorkerId::UNASSIGNED`] marks a result whose unit could not be
/// determined, e.g. an isolate transfer that failed before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(i32);

impl WorkerId {
    /// Sentinel for "no unit ever ran this job".
    pub const UNASSIGNED: WorkerId = WorkerId(-1);

    /// Raw id value; `-1` when unassigned.
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Whether this id names an actual execution unit.
    pub fn is_assigned(&self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// First-seen-order assignment of [`WorkerId`]s to execution-unit keys.
///
/// Check-then-insert is done under one lock so two units racing on the same
/// key cannot both register it.
#[derive(Debug, Default)]
pub struct WorkerIdResolver<K> {
    seen: Mutex<FxHashMap<K, i32>>,
}

impl<K: Eq + Hash> WorkerIdResolver<K> {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(FxHashMap::default()),
        }
    }

    /// Id for the unit identified by `key`, assigning the next free id on
    /// first sight. The same key always resolves to the same id until
    /// [`reset`](Self::reset).
    pub fn resolve(&self, key: K) -> WorkerId {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let next = seen.len() as i32;
        WorkerId(*seen.entry(key).or_insert(next))
    }

    /// Number of distinct units seen so far.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no unit has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the mapping so the next batch starts assigning at 0 again.
    pub fn reset(&self) {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
