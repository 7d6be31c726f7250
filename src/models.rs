//! Core data models for tracklist resolution.
//!
//! This module contains the raw scraped shapes, catalog candidates, resolution
//! outcomes and the persisted episode/track records shared by every stage of
//! the pipeline.

use serde::{Deserialize, Serialize};

// ============================================================================
// Scraped Input
// ============================================================================

/// Track as listed on an episode page. Immutable once produced by the scraper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTrack {
    pub artist: String,
    pub title: String,
    pub episode_id: String,
}

impl RawTrack {
    pub fn new(artist: impl Into<String>, title: impl Into<String>, episode_id: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            episode_id: episode_id.into(),
        }
    }
}

/// Episode listing entry (before its tracklist is fetched).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeRef {
    pub episode_id: String,
    pub show_alias: String,
    pub broadcast: Option<String>,
    pub url: String,
}

// ============================================================================
// Catalog Models
// ============================================================================

/// One catalog search result. `raw_rank` is its position in the response (0 = best).
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub artist: String,
    pub title: String,
    pub catalog_id: String,
    pub raw_rank: usize,
}

/// Candidate with the scorer's distance attached (lower is better).
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub distance: f64,
}

// ============================================================================
// Resolution Models
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Matched(String),
    Unresolved,
    Rejected,
}

/// Who made the final call on a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidedBy {
    Auto,
    Human,
    None,
}

/// Result of attempting to match one raw track to a catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub track: RawTrack,
    pub outcome: Outcome,
    pub decided_by: DecidedBy,
}

impl Resolution {
    pub fn unresolved(track: RawTrack) -> Self {
        Self {
            track,
            outcome: Outcome::Unresolved,
            decided_by: DecidedBy::None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.outcome, Outcome::Matched(_))
    }

    pub fn catalog_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Matched(id) => Some(id),
            _ => None,
        }
    }
}

// ============================================================================
// Persisted Records
// ============================================================================

/// Persisted per-track unit.
///
/// `found` is true iff `spotify_uri` is set. Rejected and unresolved outcomes
/// are stored identically (`found: false`, `spotify_uri: null`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub offset: Option<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub spotify_uri: Option<String>,
    #[serde(default)]
    pub found: bool,
}

impl TrackRecord {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            offset: None,
            duration: None,
            uid: None,
            spotify_uri: None,
            found: false,
        }
    }

    pub fn to_raw(&self, episode_id: &str) -> RawTrack {
        RawTrack::new(self.artist.clone(), self.title.clone(), episode_id)
    }

    /// Merge a resolution into the record. Only a match changes a stored match.
    pub fn apply(&mut self, resolution: &Resolution) {
        if let Some(uri) = resolution.catalog_id() {
            self.spotify_uri = Some(uri.to_string());
            self.found = true;
        } else if !self.found {
            self.spotify_uri = None;
        }
    }
}

/// One scraped episode with its tracklist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: String,
    #[serde(default)]
    pub broadcast: Option<String>,
    #[serde(default)]
    pub broadcast_formatted: Option<String>,
    pub url: String,
    #[serde(default)]
    pub mixcloud: Option<String>,
    #[serde(default)]
    pub audio_sources: Vec<serde_json::Value>,
    pub track_count: usize,
    pub tracklist: Vec<TrackRecord>,
}

impl EpisodeRecord {
    pub fn raw_tracks(&self) -> Vec<RawTrack> {
        self.tracklist.iter().map(|t| t.to_raw(&self.episode)).collect()
    }

    pub fn matched_count(&self) -> usize {
        self.tracklist.iter().filter(|t| t.found).count()
    }

    pub fn matched_uris(&self) -> impl Iterator<Item = &str> {
        self.tracklist.iter().filter_map(|t| t.spotify_uri.as_deref())
    }
}

/// Flat playlist derivation written next to the tracklists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistUris {
    pub show_alias: String,
    pub name: String,
    pub description: String,
    pub total_tracks: usize,
    pub uris: Vec<String>,
}

impl PlaylistUris {
    /// Collect every matched URI across episodes, in episode then track order.
    pub fn from_episodes(show_alias: &str, episodes: &[EpisodeRecord]) -> Self {
        let uris: Vec<String> = episodes
            .iter()
            .flat_map(|e| e.matched_uris())
            .map(str::to_string)
            .collect();

        Self {
            show_alias: show_alias.to_string(),
            name: format!("{} Collection", show_alias.to_uppercase()),
            description: format!("All tracks from {} shows on NTS Radio", show_alias),
            total_tracks: uris.len(),
            uris,
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run resolution counters.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ResolveStats {
    pub total_tracks: usize,
    pub auto_matches: usize,
    pub human_matches: usize,
    pub auto_rejections: usize,
    pub human_rejections: usize,
    pub no_candidates: usize,
    pub search_failures: usize,
    pub scoring_failures: usize,
    pub cancelled: usize,
    pub worker_failures: usize,

    pub elapsed_seconds: f64,
}

impl ResolveStats {
    pub fn total_matches(&self) -> usize {
        self.auto_matches + self.human_matches
    }

    /// Calculate match rate as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            100.0 * self.total_matches() as f64 / self.total_tracks as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(id: &str) -> Resolution {
        Resolution {
            track: RawTrack::new("a", "t", "ep"),
            outcome: Outcome::Matched(id.to_string()),
            decided_by: DecidedBy::Auto,
        }
    }

    #[test]
    fn test_apply_match_sets_found() {
        let mut record = TrackRecord::new("a", "t");
        record.apply(&matched("spotify:track:1"));
        assert!(record.found);
        assert_eq!(record.spotify_uri.as_deref(), Some("spotify:track:1"));
    }

    #[test]
    fn test_apply_unresolved_keeps_existing_match() {
        let mut record = TrackRecord::new("a", "t");
        record.apply(&matched("spotify:track:1"));
        record.apply(&Resolution::unresolved(RawTrack::new("a", "t", "ep")));
        assert!(record.found);
        assert_eq!(record.spotify_uri.as_deref(), Some("spotify:track:1"));
    }

    #[test]
    fn test_track_record_reads_original_shape() {
        let json = r#"{
            "artist": "Pat Metheny",
            "title": "September Fifteenth",
            "offset": null,
            "duration": 312,
            "uid": "abc",
            "spotify_uri": null,
            "found": false
        }"#;
        let record: TrackRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.uid.as_deref(), Some("abc"));
        assert!(!record.found);
        assert!(record.spotify_uri.is_none());
    }

    #[test]
    fn test_playlist_uris_from_episodes() {
        let mut t1 = TrackRecord::new("a", "1");
        t1.spotify_uri = Some("spotify:track:1".into());
        t1.found = true;
        let t2 = TrackRecord::new("b", "2");
        let mut t3 = TrackRecord::new("c", "3");
        t3.spotify_uri = Some("spotify:track:3".into());
        t3.found = true;

        let episode = |id: &str, tracks: Vec<TrackRecord>| EpisodeRecord {
            episode: id.into(),
            broadcast: None,
            broadcast_formatted: None,
            url: format!("https://www.nts.live/shows/m00dtapes/episodes/{}", id),
            mixcloud: None,
            audio_sources: vec![],
            track_count: tracks.len(),
            tracklist: tracks,
        };

        let episodes = vec![episode("e1", vec![t1, t2]), episode("e2", vec![t3])];
        let playlist = PlaylistUris::from_episodes("m00dtapes", &episodes);
        assert_eq!(playlist.name, "M00DTAPES Collection");
        assert_eq!(playlist.description, "All tracks from m00dtapes shows on NTS Radio");
        assert_eq!(playlist.total_tracks, 2);
        assert_eq!(playlist.uris, vec!["spotify:track:1", "spotify:track:3"]);
    }

    #[test]
    fn test_match_rate_empty() {
        assert_eq!(ResolveStats::default().match_rate(), 0.0);
    }
}
