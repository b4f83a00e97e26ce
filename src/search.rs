//! Binary search for the highest quality that fits a byte budget.
//!
//! Precondition: output size is monotonically non-decreasing in quality.
//! The search does not verify this; with a non-monotone encoder it still
//! terminates and returns a feasible trial, but not necessarily the best.

use std::ops::RangeInclusive;

use crate::error::Result;

/// A feasible trial held by the search.
#[derive(Debug)]
pub struct Candidate<A> {
    pub quality: u8,
    pub size: u64,
    pub artifact: A,
}

/// Bounds and best trial of one search.
#[derive(Debug)]
pub struct SearchState<A> {
    low: i32,
    high: i32,
    best: Option<Candidate<A>>,
    trials: usize,
}

impl<A> SearchState<A> {
    pub fn new(range: RangeInclusive<u8>) -> Self {
        Self {
            low: *range.start() as i32,
            high: *range.end() as i32,
            best: None,
            trials: 0,
        }
    }

    /// Next quality to try, or `None` once the bounds have crossed.
    fn next_quality(&self) -> Option<u8> {
        if self.low > self.high {
            return None;
        }
        Some((self.low + (self.high - self.low) / 2) as u8)
    }

    fn record(&mut self, quality: u8, size: u64, artifact: A, target: u64) {
        self.trials += 1;
        if size <= target {
            // Feasible sizes only grow as the search moves up, so ties go to
            // the later, higher-quality trial.
            let closer = self.best.as_ref().map_or(true, |b| size >= b.size);
            if closer {
                // Replacing drops the previous best and its artifact.
                self.best = Some(Candidate {
                    quality,
                    size,
                    artifact,
                });
            }
            self.low = quality as i32 + 1;
        } else {
            self.high = quality as i32 - 1;
        }
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn into_best(self) -> Option<Candidate<A>> {
        self.best
    }
}

/// Outcome of [`search_quality`].
#[derive(Debug)]
pub struct SearchOutcome<A> {
    pub best: Option<Candidate<A>>,
    pub trials: usize,
}

/// Search `range` for the highest quality whose trial fits in `target` bytes.
///
/// `trial` encodes at the given quality and returns the measured size along
/// with the artifact to keep if it wins. Losing artifacts are dropped as soon
/// as they are superseded or found infeasible; an error from `trial` drops
/// the state, including the best artifact so far.
pub fn search_quality<A, F>(
    range: RangeInclusive<u8>,
    target: u64,
    mut trial: F,
) -> Result<SearchOutcome<A>>
where
    F: FnMut(u8) -> Result<(u64, A)>,
{
    let mut state = SearchState::new(range);
    while let Some(quality) = state.next_quality() {
        let (size, artifact) = trial(quality)?;
        log::debug!(
            "Quality {} -> {} bytes ({})",
            quality,
            size,
            if size <= target { "fits" } else { "too large" }
        );
        state.record(quality, size, artifact, target);
    }
    let trials = state.trials();
    Ok(SearchOutcome {
        best: state.into_best(),
        trials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompressError;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn linear(q: u8) -> Result<(u64, u8)> {
        Ok((q as u64 * 100, q))
    }

    #[test]
    fn finds_highest_fitting_quality() {
        let outcome = search_quality(30..=99, 5_050, linear).unwrap();
        let best = outcome.best.unwrap();
        assert_eq!(best.quality, 50);
        assert_eq!(best.size, 5_000);
        assert!(outcome.trials <= 7);
    }

    #[test]
    fn upper_bound_is_reachable() {
        let best = search_quality(30..=99, u64::MAX, linear)
            .unwrap()
            .best
            .unwrap();
        assert_eq!(best.quality, 99);
    }

    #[test]
    fn floor_too_large_yields_none() {
        let outcome = search_quality(30..=99, 2_999, linear).unwrap();
        assert!(outcome.best.is_none());
        assert!(outcome.trials > 0);
    }

    #[test]
    fn exact_floor_fits() {
        let best = search_quality(30..=99, 3_000, linear)
            .unwrap()
            .best
            .unwrap();
        assert_eq!(best.quality, 30);
    }

    #[test]
    fn plateau_prefers_higher_quality() {
        // Sizes are flat from 40 to 70.
        let f = |q: u8| Ok((q.clamp(40, 70) as u64, q));
        let best = search_quality(30..=99, 70, f).unwrap().best.unwrap();
        assert_eq!(best.quality, 99);
        let best = search_quality(30..=99, 69, f).unwrap().best.unwrap();
        assert_eq!(best.quality, 69);
    }

    #[test]
    fn trial_error_aborts_and_drops_artifacts() {
        struct Tracked<'a>(&'a RefCell<usize>);
        impl Drop for Tracked<'_> {
            fn drop(&mut self) {
                *self.0.borrow_mut() += 1;
            }
        }

        let dropped = RefCell::new(0);
        let mut calls = 0;
        let result = search_quality(30..=99, 10_000, |q| {
            calls += 1;
            if calls == 3 {
                return Err(CompressError::Encode("boom".into()));
            }
            Ok((q as u64, Tracked(&dropped)))
        });
        assert!(result.is_err());
        assert_eq!(*dropped.borrow(), 2);
    }

    #[test]
    fn panicking_trial_still_drops_artifacts() {
        struct Tracked<'a>(&'a AtomicUsize);
        impl Drop for Tracked<'_> {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = AtomicUsize::new(0);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut calls = 0;
            search_quality(30..=99, 10_000, |q| {
                calls += 1;
                if calls == 3 {
                    panic!("encoder panicked");
                }
                Ok((q as u64, Tracked(&dropped)))
            })
        }));
        assert!(result.is_err());
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_point_range() {
        let outcome = search_quality(42..=42, 4_200, linear).unwrap();
        assert_eq!(outcome.trials, 1);
        assert_eq!(outcome.best.unwrap().quality, 42);
    }

    proptest! {
        #[test]
        fn matches_linear_scan_for_monotone_sizes(
            steps in proptest::collection::vec(0u64..500, 70),
            target in 0u64..40_000,
        ) {
            // Cumulative sums give a non-decreasing size per quality.
            let mut sizes = Vec::with_capacity(70);
            let mut acc = 0u64;
            for s in steps {
                acc += s;
                sizes.push(acc);
            }
            let size_of = |q: u8| sizes[(q - 30) as usize];

            let expected = (30u8..=99).rev().find(|&q| size_of(q) <= target);
            let outcome = search_quality(30..=99, target, |q| Ok((size_of(q), ()))).unwrap();

            prop_assert_eq!(outcome.best.map(|c| c.quality), expected);
            prop_assert!(outcome.trials <= 7);
        }
    }
}
