//! Reconciliation engine.
//!
//! For every local name: search the catalog with the normalized form, score
//! each candidate's "artist title" key against it, keep the first maximum and
//! classify it against the threshold.
//!
//! Items run on a bounded rayon pool. The indexed parallel collect keeps the
//! outcome vector in input order, so the aggregator and the log never see
//! completion order.

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::error::{ConfigError, Result};
use crate::match_log::LogSender;
use crate::models::{
    CandidateTrack, LocalTrackName, MatchOutcome, ReconcileRun, ReconciledTrack, ScoredCandidate,
};
use crate::normalize::fold_to_ascii;
use crate::progress::log_progress;
use crate::scoring::{SimilarityMetric, Threshold};
use crate::search::CandidateSearcher;

/// Progress lines in log-only mode every N tracks
const PROGRESS_LOG_INTERVAL: u64 = 100;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag that stops the remaining items of a run.
/// Items that already resolved keep their outcome; the rest become `Cancelled`.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Candidate Selection
// ============================================================================

/// Score every candidate and keep the best one. Ties keep the earlier
/// candidate in search order.
pub fn best_candidate<'a>(
    local: &str,
    candidates: &'a [CandidateTrack],
    metric: SimilarityMetric,
    threshold: Threshold,
    fold_ascii: bool,
) -> Option<ScoredCandidate<'a>> {
    let local: Cow<str> = if fold_ascii {
        Cow::Owned(fold_to_ascii(local))
    } else {
        Cow::Borrowed(local)
    };

    candidates
        .iter()
        .map(|candidate| {
            let mut key = candidate.comparison_key();
            if fold_ascii {
                key = fold_to_ascii(&key);
            }
            let verdict = metric.matches(&local, &key, threshold);
            ScoredCandidate {
                candidate,
                ratio: verdict.ratio,
                accepted: verdict.accepted,
            }
        })
        .fold(None, |best: Option<ScoredCandidate<'a>>, scored| match best {
            Some(best) if best.ratio >= scored.ratio => Some(best),
            _ => Some(scored),
        })
}

/// Classify one local name against an already fetched candidate list.
pub fn classify(local: &str, candidates: &[CandidateTrack], config: &ReconcileConfig) -> MatchOutcome {
    match best_candidate(
        local,
        candidates,
        config.metric,
        config.threshold,
        config.fold_ascii,
    ) {
        None => MatchOutcome::NoCandidates,
        Some(best) if best.accepted => MatchOutcome::Matched {
            id: best.candidate.id.clone(),
            score: best.ratio,
            label: best.candidate.label(),
        },
        Some(best) => MatchOutcome::NotIdentical {
            score: best.ratio,
            label: best.candidate.label(),
        },
    }
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    config: ReconcileConfig,
    cancel: CancelToken,
    progress: ProgressBar,
    log: Option<LogSender>,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            progress: ProgressBar::hidden(),
            log: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_log(mut self, log: LogSender) -> Self {
        self.log = Some(log);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Reconcile `names` in input order, one outcome each. Names beyond
    /// `max_tracks` are left out of the run entirely.
    pub fn run<S>(&self, names: &[LocalTrackName], searcher: &S) -> Result<ReconcileRun>
    where
        S: CandidateSearcher + ?Sized,
    {
        self.config.validate()?;

        let limit = self.config.candidate_limit.min(searcher.max_limit()).max(1);
        let processed = names.len().min(self.config.max_tracks);
        let excluded_over_cap = names.len() - processed;
        if excluded_over_cap > 0 {
            warn!(
                excluded_over_cap,
                max_tracks = self.config.max_tracks,
                "track cap reached, remaining files are skipped"
            );
        }

        info!(
            tracks = processed,
            threshold = %self.config.threshold,
            limit,
            "starting reconciliation"
        );

        let done = AtomicU64::new(0);
        let total = processed as u64;
        let job = || {
            names[..processed]
                .par_iter()
                .enumerate()
                .map(|(index, name)| {
                    let record = ReconciledTrack {
                        index,
                        name: name.clone(),
                        outcome: self.reconcile_one(name, searcher, limit),
                    };
                    if let Some(log) = &self.log {
                        log.record(&record);
                    }
                    self.progress.inc(1);
                    let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                    log_progress("Search", current, total, PROGRESS_LOG_INTERVAL);
                    record
                })
                .collect::<Vec<_>>()
        };

        let records = if self.config.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
                .map_err(ConfigError::from)?;
            pool.install(job)
        } else {
            job()
        };

        Ok(ReconcileRun {
            records,
            excluded_over_cap,
        })
    }

    /// Search, score and classify a single name. Never fails: search errors
    /// become `SearchFailed` so the rest of the batch keeps going.
    pub fn reconcile_one<S>(&self, name: &LocalTrackName, searcher: &S, limit: usize) -> MatchOutcome
    where
        S: CandidateSearcher + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return MatchOutcome::Cancelled;
        }

        let mut candidates = match searcher.search(&name.normalized, limit) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(track = %name.raw, error = %e, "search failed");
                return MatchOutcome::SearchFailed {
                    reason: e.to_string(),
                };
            }
        };
        candidates.truncate(limit);

        let outcome = classify(&name.normalized, &candidates, &self.config);
        debug!(track = %name.normalized, candidates = candidates.len(), ?outcome, "classified");
        outcome
    }
}
