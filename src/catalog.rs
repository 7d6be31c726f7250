//! Interfaces to the outside world: catalog search, playlists and the
//! episode source. Concrete clients live in `spotify` and `nts`.
//!
//! Every method gets the `Pace` of its service and calls `pace.wait()`
//! right before each request it sends.

use crate::error::{PlaylistError, ScrapeError, SearchError};
use crate::models::{Candidate, EpisodeRecord, EpisodeRef, RawTrack};
use crate::normalize::{primary_artist_display, title_display};
use crate::throttle::Pace;

/// Track search against a streaming catalog.
pub trait CatalogSearch: Send + Sync {
    /// Up to `limit` candidates in provider rank order. An empty list is not an error.
    fn search(&self, query: &str, limit: usize, pace: &mut Pace<'_>) -> Result<Vec<Candidate>, SearchError>;
}

pub trait PlaylistProvider {
    /// Create a private playlist for the current user and return its id.
    fn create_playlist(&self, name: &str, description: &str, pace: &mut Pace<'_>) -> Result<String, PlaylistError>;

    fn add_tracks(&self, playlist_id: &str, catalog_ids: &[String], pace: &mut Pace<'_>) -> Result<(), PlaylistError>;
}

/// Source of show episodes and their tracklists.
pub trait EpisodeSource: Send + Sync {
    /// Every episode of the show, across all listing pages.
    fn fetch_episodes(&self, show_alias: &str, pace: &mut Pace<'_>) -> Result<Vec<EpisodeRef>, ScrapeError>;

    /// Episode metadata plus its tracklist, every track unmatched.
    fn fetch_tracklist(&self, episode: &EpisodeRef, pace: &mut Pace<'_>) -> Result<EpisodeRecord, ScrapeError>;
}

/// Catalog query for a raw track: first credited artist, then the title
/// without bracketed annotations.
pub fn compose_query(raw: &RawTrack) -> String {
    let artist = primary_artist_display(&raw.artist);
    let title = title_display(&raw.title);
    match (artist.is_empty(), title.is_empty()) {
        (true, _) => title,
        (false, true) => artist,
        (false, false) => format!("{} {}", artist, title),
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Catalog answering from a fixed table and recording every query.
    #[derive(Default)]
    pub struct FakeCatalog {
        responses: HashMap<String, Result<Vec<Candidate>, String>>,
        latency: HashMap<String, Duration>,
        pub fail_all: bool,
        queries: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, query: &str, results: Vec<(&str, &str, &str)>) -> Self {
            let candidates = results
                .into_iter()
                .enumerate()
                .map(|(rank, (artist, title, id))| Candidate {
                    artist: artist.into(),
                    title: title.into(),
                    catalog_id: id.into(),
                    raw_rank: rank,
                })
                .collect();
            self.responses.insert(query.to_string(), Ok(candidates));
            self
        }

        /// Answer `query` only after `delay`.
        pub fn slow(mut self, query: &str, delay: Duration) -> Self {
            self.latency.insert(query.to_string(), delay);
            self
        }

        pub fn failing(mut self, query: &str) -> Self {
            self.responses.insert(query.to_string(), Err("503 Service Unavailable".into()));
            self
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl CatalogSearch for FakeCatalog {
        fn search(&self, query: &str, limit: usize, pace: &mut Pace<'_>) -> Result<Vec<Candidate>, SearchError> {
            pace.wait();
            self.queries.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.latency.get(query) {
                thread::sleep(*delay);
            }
            if self.fail_all {
                return Err(SearchError::Unavailable("connection refused".into()));
            }
            match self.responses.get(query) {
                Some(Ok(candidates)) => Ok(candidates.iter().take(limit).cloned().collect()),
                Some(Err(e)) => Err(SearchError::Unavailable(e.clone())),
                None => Ok(Vec::new()),
            }
        }
    }
}
