//! Merge phase.
//!
//! Reduces an ordered sequence of duplicate-free units to a single
//! duplicate-free unit by pairwise streaming merges, round after round:
//!
//! ```text
//! round 1:  [c0 c1] [c2 c3] c4      ->  m0 m1 c4
//! round 2:  [m0 m1] c4              ->  m0' c4
//! round 3:  [m0' c4]                ->  final
//! ```
//!
//! A merge of `(A, B)` writes all of A in A's order, then B's lines not seen
//! in A in B's order. Peak memory per merge is the membership set of the
//! pair, never the whole input.

use crate::cancel::CancelToken;
use linedup_core::{merge_key, DedupError, FailureSite, Result, Unit, Workspace};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::io;
use tracing::{debug, info, warn};

/// Statistics from the merge phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceStats {
    /// Merge rounds executed.
    pub rounds: usize,
    /// Pair merges performed.
    pub merges: usize,
    /// Lines dropped because they already appeared in the other unit of a pair.
    pub cross_duplicates: usize,
}

/// Final unit plus merge statistics.
#[derive(Debug)]
pub struct Reduction {
    /// The single surviving unit.
    pub unit: Unit,
    /// Merge statistics.
    pub stats: ReduceStats,
}

enum PairOutcome {
    Merged { unit: Unit, dropped: usize },
    Failed { error: DedupError, survivors: Vec<Unit> },
}

/// Pairwise merge-dedup reducer.
#[derive(Debug, Clone, Default)]
pub struct MergeReducer {
    parallel: bool,
    threads: Option<usize>,
    completed_rounds: usize,
}

impl MergeReducer {
    /// Create a sequential reducer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the pairs of each round concurrently.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Worker threads for parallel merging (`None` = rayon default).
    #[must_use]
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Continue numbering after `round`, for resuming from the units kept by
    /// a failed run. Keeps new merge keys from colliding with adopted ones.
    #[must_use]
    pub fn resume_after_round(mut self, round: usize) -> Self {
        self.completed_rounds = round;
        self
    }

    /// Streaming merge-dedup of `a` and `b` into a new unit.
    ///
    /// The inputs are left untouched. A failed merge discards its partial
    /// output.
    pub fn merge_pair(
        &self,
        workspace: &Workspace,
        a: &Unit,
        b: &Unit,
        round: usize,
        pair: usize,
    ) -> Result<Unit> {
        let site = || FailureSite::Merge {
            round,
            pair,
            left: a.key().to_string(),
            right: b.key().to_string(),
        };
        let storage_err = |e: io::Error| DedupError::storage(site(), e);

        let mut writer = workspace
            .create_unit(merge_key(round, pair), pair)
            .map_err(storage_err)?;
        let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(a.len());

        for unit in [a, b] {
            for line in unit.lines().map_err(storage_err)? {
                let line = line.map_err(storage_err)?;
                if !seen.contains(&line) {
                    writer.write_line(&line).map_err(storage_err)?;
                    seen.insert(line);
                }
            }
        }

        writer.commit().map_err(storage_err)
    }

    /// Reduce `units` to a single unit.
    ///
    /// A single unit is returned as is. An empty sequence is an
    /// [`DedupError::InvalidState`]: callers handle empty input before
    /// reducing.
    pub fn reduce(
        &self,
        units: Vec<Unit>,
        workspace: &Workspace,
        cancel: &CancelToken,
    ) -> Result<Reduction> {
        if units.is_empty() {
            return Err(DedupError::InvalidState(
                "reduce called on an empty unit sequence".into(),
            ));
        }

        let pool = if self.parallel && units.len() > 2 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.threads.unwrap_or(0))
                    .thread_name(|i| format!("linedup-merge-{i}"))
                    .build()
                    .map_err(|e| {
                        DedupError::InvalidConfiguration(format!("merge thread pool: {e}"))
                    })?,
            )
        } else {
            None
        };

        let mut stats = ReduceStats::default();
        let mut current = units;

        while current.len() > 1 {
            let round = self.completed_rounds + stats.rounds + 1;
            info!(round, units = current.len(), "starting merge round");
            current = self.run_round(current, round, workspace, cancel, pool.as_ref(), &mut stats)?;
            stats.rounds += 1;
        }

        let unit = current
            .pop()
            .ok_or_else(|| DedupError::InvalidState("merge produced no unit".into()))?;

        info!(
            rounds = stats.rounds,
            merges = stats.merges,
            lines = unit.len(),
            "merge complete"
        );
        Ok(Reduction { unit, stats })
    }

    fn run_round(
        &self,
        units: Vec<Unit>,
        round: usize,
        workspace: &Workspace,
        cancel: &CancelToken,
        pool: Option<&ThreadPool>,
        stats: &mut ReduceStats,
    ) -> Result<Vec<Unit>> {
        let mut pairs = Vec::with_capacity(units.len() / 2);
        let mut carry = None;
        let mut iter = units.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => pairs.push((a, b)),
                None => carry = Some(a),
            }
        }

        let merge = |(pair, (a, b)): (usize, (Unit, Unit))| {
            self.merge_and_consume(workspace, a, b, round, pair, cancel)
        };
        let outcomes: Vec<PairOutcome> = match pool {
            Some(pool) => pool.install(|| pairs.into_par_iter().enumerate().map(merge).collect()),
            None => pairs.into_iter().enumerate().map(merge).collect(),
        };

        let mut next = Vec::with_capacity(outcomes.len() + 1);
        let mut survivors = Vec::new();
        let mut failure: Option<DedupError> = None;

        for outcome in outcomes {
            match outcome {
                PairOutcome::Merged { unit, dropped } => {
                    stats.merges += 1;
                    stats.cross_duplicates += dropped;
                    next.push(unit);
                }
                PairOutcome::Failed {
                    error,
                    survivors: units,
                } => {
                    survivors.extend(units);
                    failure = Some(match failure {
                        Some(DedupError::Cancelled)
                            if matches!(error, DedupError::StorageFailure { .. }) =>
                        {
                            error
                        }
                        Some(first) => first,
                        None => error,
                    });
                }
            }
        }

        if let Some(unit) = carry {
            debug!(round, key = %unit.key(), "carrying unpaired unit");
            next.push(unit);
        }

        match failure {
            None => Ok(next),
            Some(error @ DedupError::StorageFailure { .. }) => {
                warn!(
                    round,
                    error = %error,
                    "merge round aborted, leaving surviving units in workspace"
                );
                for unit in next.into_iter().chain(survivors) {
                    let path = unit.keep();
                    debug!(path = %path.display(), "kept unit");
                }
                Err(error)
            }
            // Dropping the armed handles cleans up every unconsumed unit.
            Some(error) => Err(error),
        }
    }

    fn merge_and_consume(
        &self,
        workspace: &Workspace,
        a: Unit,
        b: Unit,
        round: usize,
        pair: usize,
        cancel: &CancelToken,
    ) -> PairOutcome {
        if cancel.is_cancelled() {
            return PairOutcome::Failed {
                error: DedupError::Cancelled,
                survivors: vec![a, b],
            };
        }

        let merged = match self.merge_pair(workspace, &a, &b, round, pair) {
            Ok(unit) => unit,
            Err(error) => {
                warn!(round, pair, error = %error, "pair merge failed");
                return PairOutcome::Failed {
                    error,
                    survivors: vec![a, b],
                };
            }
        };

        let dropped = (a.len() + b.len()).saturating_sub(merged.len());
        debug!(
            round,
            pair,
            left = %a.key(),
            right = %b.key(),
            lines = merged.len(),
            dropped,
            "merged pair"
        );

        for input in [a, b] {
            let key = input.key().to_string();
            if let Err(e) = input.delete() {
                return PairOutcome::Failed {
                    error: DedupError::storage(FailureSite::Delete { key }, e),
                    survivors: vec![merged],
                };
            }
        }

        PairOutcome::Merged {
            unit: merged,
            dropped,
        }
    }
}
