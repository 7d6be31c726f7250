//! Candidate scoring.
//!
//! A scorer turns (raw track, catalog candidate) into a distance where lower is
//! a closer match. The resolver only relies on the threshold semantics of that
//! distance, so the strategy is swappable:
//! - `LexicalScorer`: normalized artist/title similarity (default)
//! - `RetryingScorer`: wraps a fallible strategy (e.g. an external judgment
//!   service) and retries transient failures before giving up

use std::thread;
use std::time::Duration;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::models::{Candidate, RawTrack, ScoredCandidate};
use crate::normalize::{
    core_title, has_variant_marker, normalize_title, numbering, split_artists, ArtistCredits,
};

// ============================================================================
// Distance Weights
// ============================================================================

/// Weight of artist dissimilarity in the distance
pub const ARTIST_WEIGHT: f64 = 60.0;

/// Weight of title dissimilarity in the distance
pub const TITLE_WEIGHT: f64 = 40.0;

/// Added when exactly one side is a live/remix/demo variant
pub const VARIANT_PENALTY: f64 = 8.0;

/// Below this artist similarity the candidate is a different artist
pub const ARTIST_MISMATCH_SIMILARITY: f64 = 0.3;

/// Minimum distance for a hard artist mismatch (beyond the default high threshold)
pub const ARTIST_MISMATCH_FLOOR: f64 = 45.0;

/// Title words shorter than this must match exactly ("rain" is not "pain")
pub const FUZZY_WORD_MIN_LEN: usize = 5;

/// Edit similarity at which two longer title words count as the same word
pub const FUZZY_WORD_SIMILARITY: f64 = 0.8;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("scoring service unavailable: {0}")]
    Unavailable(String),
}

/// Strategy interface for computing match distance.
pub trait Scorer: Send + Sync {
    fn score(&self, raw: &RawTrack, candidate: &Candidate) -> Result<f64, ScoreError>;
}

// ============================================================================
// Similarity
// ============================================================================

/// Jaccard similarity on word tokens (0.0 to 1.0).
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

/// Similarity between two normalized keys: best of token overlap and edit distance.
/// Empty keys carry no evidence and score 0.0.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    token_similarity(a, b).max(strsim::normalized_levenshtein(a, b))
}

/// Best similarity between any performer on each side.
pub fn artist_similarity(raw: &ArtistCredits, candidate: &ArtistCredits) -> f64 {
    let mut best: f64 = 0.0;
    for a in raw.performers() {
        for b in candidate.performers() {
            let sim = string_similarity(a, b);
            if sim >= 1.0 {
                return 1.0;
            }
            best = best.max(sim);
        }
    }
    best
}

/// Whether two title words are the same word, allowing typos in longer words.
/// Numbers and roman numerals never match fuzzily.
fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    a.len() >= FUZZY_WORD_MIN_LEN
        && b.len() >= FUZZY_WORD_MIN_LEN
        && numbering(a).is_empty()
        && numbering(b).is_empty()
        && strsim::normalized_levenshtein(a, b) >= FUZZY_WORD_SIMILARITY
}

/// Jaccard similarity on title words where a word may absorb a typo'd
/// counterpart. Each word matches at most once; exact pairs are taken first.
pub fn title_key_similarity(a: &str, b: &str) -> f64 {
    let words_a = distinct_words(a);
    let words_b = distinct_words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let exact: FxHashSet<&str> = words_a.iter().filter(|w| words_b.contains(*w)).copied().collect();
    let mut rest_b: Vec<&str> = words_b.iter().filter(|w| !exact.contains(*w)).copied().collect();

    let mut matched = exact.len();
    for wa in words_a.iter().filter(|w| !exact.contains(*w)) {
        if let Some(i) = rest_b.iter().position(|wb| words_match(wa, wb)) {
            rest_b.remove(i);
            matched += 1;
        }
    }

    matched as f64 / (words_a.len() + words_b.len() - matched) as f64
}

fn distinct_words(key: &str) -> Vec<&str> {
    let mut words: Vec<&str> = key.split_whitespace().collect();
    words.sort_unstable();
    words.dedup();
    words
}

/// Title similarity on the core title (subtitles dropped) and on the full key.
/// "Same work, different subtitle" is carried by the core comparison. Core
/// titles with different numbering ("Pattern 3" / "Pattern 5", "I" / "II")
/// are different works and score 0.0.
pub fn title_similarity(raw_title: &str, candidate_title: &str) -> f64 {
    let raw_core = core_title(raw_title);
    let candidate_core = core_title(candidate_title);
    if numbering(&raw_core) != numbering(&candidate_core) {
        return 0.0;
    }

    let core = title_key_similarity(&raw_core, &candidate_core);
    let full = title_key_similarity(&normalize_title(raw_title), &normalize_title(candidate_title));
    core.max(full)
}

// ============================================================================
// Lexical Scorer
// ============================================================================

/// Deterministic scorer over normalized artist and title strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn distance(&self, raw: &RawTrack, candidate: &Candidate) -> f64 {
        let raw_credits = split_artists(&raw.artist);
        let candidate_credits = split_artists(&candidate.artist);

        let artist_sim = artist_similarity(&raw_credits, &candidate_credits);
        let title_sim = title_similarity(&raw.title, &candidate.title);

        let mut distance = ARTIST_WEIGHT * (1.0 - artist_sim) + TITLE_WEIGHT * (1.0 - title_sim);

        let raw_is_variant = !raw_credits.remixers.is_empty() || has_variant_marker(&raw.title);
        let candidate_is_variant = has_variant_marker(&candidate.title);
        if raw_is_variant != candidate_is_variant {
            distance += VARIANT_PENALTY;
        }

        if artist_sim < ARTIST_MISMATCH_SIMILARITY {
            distance = distance.max(ARTIST_MISMATCH_FLOOR);
        }

        distance.max(0.0)
    }
}

impl Scorer for LexicalScorer {
    fn score(&self, raw: &RawTrack, candidate: &Candidate) -> Result<f64, ScoreError> {
        Ok(self.distance(raw, candidate))
    }
}

// ============================================================================
// Retrying Scorer
// ============================================================================

/// Retries a fallible strategy a bounded number of times with linear backoff.
pub struct RetryingScorer<S> {
    inner: S,
    attempts: usize,
    backoff: Duration,
}

impl<S: Scorer> RetryingScorer<S> {
    pub fn new(inner: S, attempts: usize, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }
}

impl<S: Scorer> Scorer for RetryingScorer<S> {
    fn score(&self, raw: &RawTrack, candidate: &Candidate) -> Result<f64, ScoreError> {
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match self.inner.score(raw, candidate) {
                Ok(distance) => return Ok(distance),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "scorer attempt failed");
                    last_err = Some(e);
                    if attempt < self.attempts {
                        thread::sleep(self.backoff * attempt as u32);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ScoreError::Unavailable("no attempts made".into())))
    }
}

// ============================================================================
// Batch Scoring
// ============================================================================

/// Score every candidate. A candidate the scorer cannot judge gets
/// `unscorable_distance`, which callers set beyond the reject threshold.
/// Returns the scored list and the number of scoring failures.
pub fn score_candidates(
    scorer: &dyn Scorer,
    raw: &RawTrack,
    candidates: Vec<Candidate>,
    unscorable_distance: f64,
) -> (Vec<ScoredCandidate>, usize) {
    let mut failures = 0;
    let scored = candidates
        .into_iter()
        .map(|candidate| {
            let distance = match scorer.score(raw, &candidate) {
                Ok(d) if d.is_finite() && d >= 0.0 => d,
                Ok(d) => {
                    tracing::warn!(distance = d, catalog_id = %candidate.catalog_id, "scorer returned invalid distance");
                    failures += 1;
                    unscorable_distance
                }
                Err(e) => {
                    tracing::warn!(error = %e, catalog_id = %candidate.catalog_id, "scoring unavailable, treating as rejected");
                    failures += 1;
                    unscorable_distance
                }
            };
            ScoredCandidate { candidate, distance }
        })
        .collect();
    (scored, failures)
}
