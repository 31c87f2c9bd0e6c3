//! Scripted walks over [`SmartPtr`] that record counts and releases.
//!
//! Used by the demo binary and as fixtures by the tests.

use std::cell::Cell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::ptr_kind::{Kind, Shared};
use crate::smart_ptr::{make_shared_ptr, make_unique_ptr, SmartPtr};

/// Counts how many [`Tracked`] values have been dropped.
#[derive(Clone, Debug, Default)]
pub struct DropTally(Rc<Cell<usize>>);

impl DropTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> usize {
        self.0.get()
    }
}

/// A value that bumps its [`DropTally`] when dropped.
#[derive(Debug)]
pub struct Tracked {
    value: i32,
    tally: DropTally,
}

impl Tracked {
    pub fn new(value: i32, tally: &DropTally) -> Self {
        Self {
            value,
            tally: tally.clone(),
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let n = &self.tally.0;
        n.set(n.get() + 1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub action: String,
    /// Reference count seen by the observed handle; `None` for unique.
    pub count: Option<usize>,
    /// Handles alive after the step that still own the value.
    pub live_handles: usize,
    pub released: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub kind: Kind,
    pub steps: Vec<Step>,
}

impl ScenarioReport {
    fn new(name: &str, kind: Kind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            steps: Vec::new(),
        }
    }

    fn record(
        &mut self,
        action: impl Into<String>,
        count: Option<usize>,
        live: usize,
        tally: &DropTally,
    ) {
        let step = Step {
            action: action.into(),
            count,
            live_handles: live,
            released: tally.released(),
        };
        tracing::debug!(scenario = %self.name, ?step, "step");
        self.steps.push(step);
    }

    /// For shared walks: every recorded count equals the number of live
    /// handles, and the value is released exactly when none are left.
    pub fn invariant_held(&self) -> bool {
        self.steps.iter().all(|s| match s.count {
            Some(c) => c == s.live_handles && (s.released == 1) == (s.live_handles == 0),
            None => true,
        })
    }
}

/// Copy, then drop both copies of a shared value.
pub fn run_shared() -> ScenarioReport {
    let tally = DropTally::new();
    let mut report = ScenarioReport::new("shared", Kind::Shared);

    let p1 = make_shared_ptr(Tracked::new(5, &tally));
    report.record("make_shared_ptr(5)", Some(p1.count()), 1, &tally);

    let p2 = p1.clone();
    report.record("p2 = p1.clone()", Some(p2.count()), 2, &tally);

    drop(p2);
    report.record("drop(p2)", Some(p1.count()), 1, &tally);

    drop(p1);
    report.record("drop(p1)", Some(0), 0, &tally);

    report
}

/// Move a unique value out of one handle into another.
pub fn run_unique() -> ScenarioReport {
    let tally = DropTally::new();
    let mut report = ScenarioReport::new("unique", Kind::Unique);

    let mut u1 = make_unique_ptr(Tracked::new(5, &tally));
    report.record("make_unique_ptr(5)", None, 1, &tally);

    let u2 = u1.take();
    report.record(
        format!("u2 = u1.take(), u1 null: {}, u2 = {}", u1.is_null(), u2.value()),
        None,
        1,
        &tally,
    );

    drop(u1);
    report.record("drop(u1)", None, 1, &tally);

    drop(u2);
    report.record("drop(u2)", None, 0, &tally);

    report
}

/// Reset a shared handle to its own address, then to nothing.
pub fn run_reset() -> ScenarioReport {
    let tally = DropTally::new();
    let mut report = ScenarioReport::new("reset", Kind::Shared);

    let mut p = make_shared_ptr(Tracked::new(5, &tally));
    let q = p.clone();
    report.record("q = p.clone()", Some(p.count()), 2, &tally);

    let same = p.get();
    // SAFETY: `same` is already owned by `p`, so this is the no-op path.
    unsafe { p.reset_with(same) };
    report.record("p.reset_with(p.get())", Some(p.count()), 2, &tally);

    p.reset();
    report.record("p.reset()", Some(q.count()), 1, &tally);

    drop(q);
    report.record("drop(q)", Some(0), 0, &tally);

    report
}

/// A seeded random walk of clone, clone_from, take and drop over a pool of
/// at most `copies` shared handles, followed by dropping whatever is left.
pub fn run_stress(copies: usize, seed: u64) -> ScenarioReport {
    let tally = DropTally::new();
    let mut report = ScenarioReport::new("stress", Kind::Shared);
    let mut rng = StdRng::seed_from_u64(seed);
    let copies = copies.max(1);

    let mut pool: Vec<SmartPtr<Tracked, Shared>> =
        vec![make_shared_ptr(Tracked::new(0, &tally))];
    report.record("make_shared_ptr(0)", Some(pool[0].count()), 1, &tally);

    let mut walk = copies * 4;
    while let Some(first) = pool.first() {
        let observed = first.clone();
        let live = pool.len();
        let i = rng.gen_range(0..live);
        let op = if walk > 0 { rng.gen_range(0..4) } else { 3 };
        walk = walk.saturating_sub(1);

        let action = match op {
            0 if live < copies => {
                let copy = pool[i].clone();
                pool.push(copy);
                format!("clone handle {}", i)
            }
            1 if live < copies => {
                let mut fresh: SmartPtr<Tracked, Shared> = SmartPtr::new();
                fresh.clone_from(&pool[i]);
                pool.push(fresh);
                format!("clone_from handle {}", i)
            }
            2 => {
                let moved = pool[i].take();
                pool[i] = moved;
                format!("take handle {}", i)
            }
            _ => {
                pool.swap_remove(i);
                format!("drop handle {}", i)
            }
        };

        // `observed` is one extra owner while it lives.
        let count = observed.count() - 1;
        drop(observed);
        report.record(action, Some(count), pool.len(), &tally);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn drop_tally_counts_drops() {
        let tally = DropTally::new();
        drop(Tracked::new(1, &tally));
        drop(Tracked::new(2, &tally));
        assert_eq!(tally.released(), 2);
    }

    #[test]
    fn shared_scenario_matches_expected_counts() {
        let report = run_shared();
        let counts: Vec<_> = report.steps.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![Some(1), Some(2), Some(1), Some(0)]);
        let released: Vec<_> = report.steps.iter().map(|s| s.released).collect();
        assert_eq!(released, vec![0, 0, 0, 1]);
        assert!(report.invariant_held());
    }

    #[test]
    fn unique_scenario_releases_once_at_the_end() {
        let report = run_unique();
        assert_eq!(report.kind, Kind::Unique);
        assert!(report.steps[1].action.contains("u1 null: true, u2 = 5"));
        let released: Vec<_> = report.steps.iter().map(|s| s.released).collect();
        assert_eq!(released, vec![0, 0, 0, 1]);
    }

    #[test]
    fn reset_scenario_keeps_count_on_same_address() {
        let report = run_reset();
        assert_eq!(report.steps[1].count, Some(2));
        assert_eq!(report.steps[1].released, 0);
        assert_eq!(report.steps[2].count, Some(1));
        assert_eq!(report.steps[3].released, 1);
        assert!(report.invariant_held());
    }

    #[test_case(1, 0)]
    #[test_case(4, 7)]
    #[test_case(32, 1234)]
    #[test_case(64, 99)]
    fn stress_walk_keeps_count_equal_to_live_handles(copies: usize, seed: u64) {
        let report = run_stress(copies, seed);
        assert!(report.invariant_held());
        let last = report.steps.last().unwrap();
        assert_eq!(last.live_handles, 0);
        assert_eq!(last.released, 1);
        assert!(report.steps.iter().all(|s| s.live_handles <= copies.max(1)));
    }

    #[test]
    fn stress_walk_is_deterministic_per_seed() {
        assert_eq!(run_stress(8, 42), run_stress(8, 42));
    }

    #[test]
    fn report_serializes_to_json() {
        let json = serde_json::to_value(run_shared()).unwrap();
        assert_eq!(json["kind"], "shared");
        assert_eq!(json["steps"][1]["count"], 2);
        assert_eq!(json["steps"][3]["released"], 1);
    }
}
