//! Incremental tri-color mark-sweep collector

use super::heap::{GcHeap, GcRef};
use crate::value::Value;
use std::collections::VecDeque;

/// Default per-step work budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 1024;

/// Collector statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Completed collection cycles
    pub collections: usize,
    /// Total objects destructed
    pub objects_freed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Mark,
    Sweep,
}

/// Root-marking interface handed to the root enumeration callback.
pub struct Marker<'a> {
    heap: &'a mut GcHeap,
    pending: &'a mut VecDeque<GcRef>,
}

impl Marker<'_> {
    /// Mark a composite value as reachable. Primitives are ignored; already
    /// marked objects are skipped, so marking is idempotent.
    pub fn mark_value(&mut self, value: Value) {
        if let Some(r) = value.gc_ref() {
            self.mark_ref(r);
        }
    }

    /// Mark a heap object as reachable and queue its children for discovery.
    pub fn mark_ref(&mut self, r: GcRef) {
        if let Some(slot) = self.heap.slot_mut(r.index() as usize) {
            if !slot.marked {
                slot.marked = true;
                self.pending.push_back(r);
            }
        }
    }
}

/// Incremental mark-sweep collector over a [`GcHeap`].
///
/// A cycle has three phases: clear every mark to white and discover roots,
/// drain the pending queue marking children, then sweep whites. Each call to
/// [`Collector::step`] performs up to `max_iterations` units of work and saves
/// a cursor where it stopped; a cycle therefore spans as many steps as the
/// budget requires.
pub struct Collector {
    phase: Phase,
    pending: VecDeque<GcRef>,
    sweep_cursor: usize,
    max_iterations: usize,
    stats: GcStats,
    child_scratch: Vec<GcRef>,
}

impl Collector {
    /// Create a collector with the given per-step budget. A budget of zero
    /// means unbounded steps.
    pub fn new(max_iterations: usize) -> Self {
        Self {
            phase: Phase::Idle,
            pending: VecDeque::new(),
            sweep_cursor: 0,
            max_iterations,
            stats: GcStats::default(),
            child_scratch: Vec::new(),
        }
    }

    /// Change the per-step budget.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    /// Collector statistics.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Whether a collection cycle is currently in flight.
    pub fn cycle_in_progress(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Run one bounded collection step. `roots` is invoked once at the start
    /// of each cycle to mark every root.
    pub fn step(&mut self, heap: &mut GcHeap, roots: &mut dyn FnMut(&mut Marker<'_>)) {
        let mut budget = if self.max_iterations == 0 {
            usize::MAX
        } else {
            self.max_iterations
        };

        loop {
            match self.phase {
                Phase::Idle => {
                    // Whiten the heap, then discover roots. Root discovery is
                    // not preemptible; the budget bounds the mark and sweep
                    // work that follows.
                    let slot_count = heap.slot_count();
                    for index in 0..slot_count {
                        if let Some(slot) = heap.slot_mut(index) {
                            slot.marked = false;
                        }
                    }
                    heap.allocate_marked = true;

                    self.pending.clear();
                    let mut marker = Marker {
                        heap: &mut *heap,
                        pending: &mut self.pending,
                    };
                    roots(&mut marker);

                    // Every auto-marked object roots itself.
                    for index in 0..slot_count {
                        let is_auto = heap.slot(index).is_some_and(|slot| slot.auto_mark);
                        if is_auto {
                            let mut marker = Marker {
                                heap: &mut *heap,
                                pending: &mut self.pending,
                            };
                            marker.mark_ref(GcRef::from_index(index as u32));
                        }
                    }

                    budget = budget.saturating_sub(slot_count.max(1));
                    self.phase = Phase::Mark;
                }
                Phase::Mark => {
                    while budget > 0 {
                        let Some(r) = self.pending.pop_front() else {
                            break;
                        };
                        budget -= 1;

                        self.child_scratch.clear();
                        heap.children_of(r.index() as usize, &mut self.child_scratch);
                        let mut marker = Marker {
                            heap: &mut *heap,
                            pending: &mut self.pending,
                        };
                        for child in self.child_scratch.drain(..) {
                            marker.mark_ref(child);
                        }
                    }
                    if !self.pending.is_empty() {
                        return; // budget exhausted, resume here next step
                    }
                    self.phase = Phase::Sweep;
                    self.sweep_cursor = 0;
                }
                Phase::Sweep => {
                    let slot_count = heap.slot_count();
                    while self.sweep_cursor < slot_count && budget > 0 {
                        let index = self.sweep_cursor;
                        self.sweep_cursor += 1;
                        budget -= 1;

                        let is_white = heap.slot(index).is_some_and(|slot| !slot.marked);
                        if is_white {
                            heap.free_slot(index);
                            self.stats.objects_freed += 1;
                        }
                    }
                    if self.sweep_cursor < slot_count {
                        return; // budget exhausted, resume here next step
                    }
                    heap.allocate_marked = false;
                    self.stats.collections += 1;
                    self.phase = Phase::Idle;
                    return; // cycle complete; the next step starts a new one
                }
            }
        }
    }

    /// Run collection to a cycle boundary: finish any in-flight cycle, then
    /// run one complete cycle. Used for teardown and tests.
    pub fn collect_full(&mut self, heap: &mut GcHeap, roots: &mut dyn FnMut(&mut Marker<'_>)) {
        let saved = self.max_iterations;
        self.max_iterations = 0;
        if self.cycle_in_progress() {
            self.step(heap, roots);
        }
        self.step(heap, roots);
        self.max_iterations = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::heap::GcObject;

    fn no_roots(_: &mut Marker<'_>) {}

    #[test]
    fn test_unrooted_object_is_collected() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(0);

        let r = heap.alloc(GcObject::Array(Vec::new()));
        heap.set_auto_mark(r, false);

        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 0);
        assert_eq!(collector.stats().objects_freed, 1);
    }

    #[test]
    fn test_auto_marked_object_survives() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(0);

        let _r = heap.alloc(GcObject::Array(Vec::new())); // auto-mark stays set
        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_rooted_object_survives_and_children_are_discovered() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(0);

        let inner = heap.alloc(GcObject::Array(Vec::new()));
        heap.set_auto_mark(inner, false);
        let outer = heap.alloc(GcObject::Array(vec![Value::Array(inner)]));
        heap.set_auto_mark(outer, false);

        let root = Value::Array(outer);
        collector.collect_full(&mut heap, &mut |marker| marker.mark_value(root));
        assert_eq!(heap.live_count(), 2);

        // Dropping the root releases the whole chain.
        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_cyclic_garbage_is_collected() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(0);

        let a = heap.alloc(GcObject::Array(Vec::new()));
        let b = heap.alloc(GcObject::Array(vec![Value::Array(a)]));
        heap.array_mut(a).unwrap().push(Value::Array(b));
        heap.set_auto_mark(a, false);
        heap.set_auto_mark(b, false);

        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_bounded_step_completes_within_two_invocations() {
        let mut heap = GcHeap::new();
        // Budget large enough that a small heap's cycle spans at most two
        // steps even counting the whiten/root scan.
        let mut collector = Collector::new(64);

        for _ in 0..16 {
            let r = heap.alloc(GcObject::Array(Vec::new()));
            heap.set_auto_mark(r, false);
        }

        collector.step(&mut heap, &mut no_roots);
        collector.step(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_object_allocated_mid_cycle_survives_that_cycle() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(1); // force multi-step cycles

        let r = heap.alloc(GcObject::Array(Vec::new()));
        heap.set_auto_mark(r, false);

        collector.step(&mut heap, &mut no_roots); // cycle begins
        assert!(collector.cycle_in_progress());

        let fresh = heap.alloc(GcObject::Array(Vec::new()));
        heap.set_auto_mark(fresh, false);

        while collector.cycle_in_progress() {
            collector.step(&mut heap, &mut no_roots);
        }

        // The pre-cycle object was white and is gone; the mid-cycle one was
        // born marked and survives until the next cycle.
        assert!(heap.get(fresh).is_some());
        assert_eq!(heap.live_count(), 1);

        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut heap = GcHeap::new();
        let mut collector = Collector::new(0);
        for _ in 0..3 {
            let r = heap.alloc(GcObject::Array(Vec::new()));
            heap.set_auto_mark(r, false);
        }
        collector.collect_full(&mut heap, &mut no_roots);
        assert_eq!(collector.stats().collections, 1);
        assert_eq!(collector.stats().objects_freed, 3);
    }
}
