//! Batch resolution of raw tracks against the catalog.
//!
//! Per track: compose a query, search (throttled), score every candidate,
//! pick the best one and apply the thresholds. Borderline matches go through
//! the ordered confirmation queue. Exactly one `Resolution` comes back per
//! input track, in input order.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use crate::catalog::{compose_query, CatalogSearch};
use crate::config::ResolveConfig;
use crate::confirm::{with_confirmation_queue, ConfirmDecision, ConfirmHandle, Confirmer};
use crate::coordinator::Coordinator;
use crate::error::{ConfigError, SyncError};
use crate::models::{DecidedBy, Outcome, RawTrack, Resolution, ResolveStats, ScoredCandidate};
use crate::progress::{Phase, PhaseProgress};
use crate::resolver::{select_best, Decision, Thresholds};
use crate::scoring::{score_candidates, Scorer};
use crate::throttle::Throttle;

/// Why a batch stopped before resolving every track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// User ended the confirmation session at this batch index.
    UserQuit { at: usize },
    /// Too many consecutive searches failed.
    CatalogOutage { failures: usize },
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub resolutions: Vec<Resolution>,
    pub halt: Option<Halt>,
    pub stats: ResolveStats,
}

impl BatchReport {
    pub fn unresolved_count(&self) -> usize {
        self.resolutions.iter().filter(|r| !r.is_matched()).count()
    }

    /// Escalate a catalog outage. Partial results stay valid and should be
    /// persisted before surfacing the error.
    pub fn check_outage(&self) -> Result<(), SyncError> {
        match self.halt {
            Some(Halt::CatalogOutage { failures }) => Err(SyncError::CatalogUnavailable {
                failures,
                unresolved: self.unresolved_count(),
            }),
            _ => Ok(()),
        }
    }
}

/// How a single track ended up, for the batch statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AutoMatch,
    HumanMatch,
    AutoReject,
    HumanReject,
    NoCandidates,
    SearchFailed,
    Quit,
    Cancelled,
}

struct ItemResult {
    resolution: Resolution,
    step: Step,
    scoring_failures: usize,
}

/// Shared state of one `resolve_batch` call.
struct BatchState<'a> {
    queue: &'a ConfirmHandle,
    cancel: &'a AtomicBool,
    outage: &'a AtomicBool,
    consecutive_failures: &'a AtomicUsize,
    progress: &'a PhaseProgress,
}

pub struct Pipeline<'a> {
    catalog: &'a dyn CatalogSearch,
    scorer: &'a dyn Scorer,
    throttle: &'a Throttle,
    thresholds: Thresholds,
    coordinator: Coordinator,
    search_limit: usize,
    max_search_failures: usize,
    show_progress: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        catalog: &'a dyn CatalogSearch,
        scorer: &'a dyn Scorer,
        throttle: &'a Throttle,
        config: &ResolveConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog,
            scorer,
            throttle,
            thresholds: config.thresholds()?,
            coordinator: Coordinator::new(config.max_workers),
            search_limit: config.search_limit.max(1),
            max_search_failures: config.max_search_failures.max(1),
            show_progress: false,
        })
    }

    /// Draw a progress bar (or log progress in log-only mode) during batches.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn resolve_batch(&self, tracks: Vec<RawTrack>, confirmer: &dyn Confirmer) -> BatchReport {
        let start = Instant::now();
        let total = tracks.len();

        let progress = PhaseProgress::new(Phase::Search, total as u64, self.show_progress);

        let cancel = AtomicBool::new(false);
        let outage = AtomicBool::new(false);
        let consecutive_failures = AtomicUsize::new(0);

        let (results, summary) = with_confirmation_queue(confirmer, &cancel, Some(progress.bar()), |queue| {
            let state = BatchState {
                queue,
                cancel: &cancel,
                outage: &outage,
                consecutive_failures: &consecutive_failures,
                progress: &progress,
            };
            self.coordinator
                .run(tracks.clone(), |index, raw| Ok::<_, Infallible>(self.resolve_one(index, raw, &state)))
        });
        progress.finish();

        let mut stats = ResolveStats {
            total_tracks: total,
            ..Default::default()
        };
        let mut resolutions = Vec::with_capacity(total);

        for (index, (result, raw)) in results.into_iter().zip(tracks).enumerate() {
            let item = match result {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(index, error = %e, "Track worker failed, leaving unresolved");
                    stats.worker_failures += 1;
                    resolutions.push(Resolution::unresolved(raw));
                    continue;
                }
            };
            stats.scoring_failures += item.scoring_failures;

            // Everything after the quit point is discarded, even if it finished.
            if let Some(quit_at) = summary.quit_at {
                if index > quit_at {
                    stats.cancelled += 1;
                    resolutions.push(Resolution::unresolved(raw));
                    continue;
                }
            }

            match item.step {
                Step::AutoMatch => stats.auto_matches += 1,
                Step::HumanMatch => stats.human_matches += 1,
                Step::AutoReject => stats.auto_rejections += 1,
                Step::HumanReject => stats.human_rejections += 1,
                Step::NoCandidates => stats.no_candidates += 1,
                Step::SearchFailed => stats.search_failures += 1,
                Step::Quit | Step::Cancelled => stats.cancelled += 1,
            }
            resolutions.push(item.resolution);
        }

        let halt = match summary.quit_at {
            Some(at) => Some(Halt::UserQuit { at }),
            None if outage.load(Ordering::SeqCst) => Some(Halt::CatalogOutage {
                failures: self.max_search_failures,
            }),
            None => None,
        };

        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        BatchReport {
            resolutions,
            halt,
            stats,
        }
    }

    fn resolve_one(&self, index: usize, raw: RawTrack, state: &BatchState<'_>) -> ItemResult {
        let ticket = state.queue.ticket(index);
        let result = self.resolve_with(raw, state, |raw, best| ticket.confirm(raw, best));

        state.progress.tick();
        result
    }

    fn resolve_with(
        &self,
        raw: RawTrack,
        state: &BatchState<'_>,
        confirm: impl FnOnce(&RawTrack, &ScoredCandidate) -> ConfirmDecision,
    ) -> ItemResult {
        let finish = |raw: RawTrack, outcome: Outcome, decided_by: DecidedBy, step: Step, scoring_failures: usize| ItemResult {
            resolution: Resolution {
                track: raw,
                outcome,
                decided_by,
            },
            step,
            scoring_failures,
        };

        if state.cancel.load(Ordering::SeqCst) {
            return finish(raw, Outcome::Unresolved, DecidedBy::None, Step::Cancelled, 0);
        }
        let mut pace = self.throttle.pace();
        pace.hold();
        if state.cancel.load(Ordering::SeqCst) {
            return finish(raw, Outcome::Unresolved, DecidedBy::None, Step::Cancelled, 0);
        }

        let query = compose_query(&raw);
        let candidates = match self.catalog.search(&query, self.search_limit, &mut pace) {
            Ok(candidates) => {
                state.consecutive_failures.store(0, Ordering::SeqCst);
                candidates
            }
            Err(e) => {
                let failures = state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(query = %query, error = %e, "Search failed");
                if failures >= self.max_search_failures && !state.outage.swap(true, Ordering::SeqCst) {
                    tracing::error!(failures, "Catalog unreachable, stopping batch");
                    state.cancel.store(true, Ordering::SeqCst);
                }
                return finish(raw, Outcome::Unresolved, DecidedBy::None, Step::SearchFailed, 0);
            }
        };

        if candidates.is_empty() {
            tracing::debug!(query = %query, "No candidates");
            return finish(raw, Outcome::Unresolved, DecidedBy::None, Step::NoCandidates, 0);
        }

        let (scored, scoring_failures) =
            score_candidates(self.scorer, &raw, candidates, self.thresholds.unscorable_distance());
        let Some(best) = select_best(scored) else {
            return finish(raw, Outcome::Unresolved, DecidedBy::None, Step::NoCandidates, scoring_failures);
        };

        match self.thresholds.decide(best.distance) {
            Decision::AutoAccept => {
                tracing::debug!(query = %query, distance = best.distance, "Auto-accepted");
                let id = best.candidate.catalog_id;
                finish(raw, Outcome::Matched(id), DecidedBy::Auto, Step::AutoMatch, scoring_failures)
            }
            Decision::AutoReject => {
                tracing::debug!(query = %query, distance = best.distance, "Auto-rejected");
                finish(raw, Outcome::Rejected, DecidedBy::Auto, Step::AutoReject, scoring_failures)
            }
            Decision::Confirm => match confirm(&raw, &best) {
                ConfirmDecision::Accept => {
                    let id = best.candidate.catalog_id;
                    finish(raw, Outcome::Matched(id), DecidedBy::Human, Step::HumanMatch, scoring_failures)
                }
                ConfirmDecision::Reject => {
                    finish(raw, Outcome::Rejected, DecidedBy::Human, Step::HumanReject, scoring_failures)
                }
                ConfirmDecision::Quit => {
                    finish(raw, Outcome::Unresolved, DecidedBy::None, Step::Quit, scoring_failures)
                }
            },
        }
    }
}
