//! Re-resolution of tracks that previous passes left unmatched.

use crate::confirm::Confirmer;
use crate::error::SyncError;
use crate::models::{EpisodeRecord, TrackRecord};
use crate::pipeline::{BatchReport, Pipeline};

#[derive(Debug, Clone)]
pub struct RetryReport {
    pub retried: usize,
    pub new_matches: usize,
    pub batch: BatchReport,
}

impl RetryReport {
    pub fn check_outage(&self) -> Result<(), SyncError> {
        self.batch.check_outage()
    }
}

pub struct RetryPass<'p, 'c> {
    pipeline: &'p Pipeline<'p>,
    confirmer: &'c dyn Confirmer,
}

impl<'p, 'c> RetryPass<'p, 'c> {
    pub fn new(pipeline: &'p Pipeline<'p>, confirmer: &'c dyn Confirmer) -> Self {
        Self { pipeline, confirmer }
    }

    /// Retry every unmatched record as one batch, in the order given.
    /// Each record comes with the id of its episode. Matched records pass
    /// through untouched.
    pub fn retry_tracks<'r>(&self, records: impl IntoIterator<Item = (&'r str, &'r mut TrackRecord)>) -> RetryReport {
        let pending: Vec<(&str, &mut TrackRecord)> = records.into_iter().filter(|(_, record)| !record.found).collect();
        if pending.is_empty() {
            tracing::info!("No failed tracks to retry");
        }

        let raw = pending.iter().map(|(episode, record)| record.to_raw(episode)).collect();
        let batch = self.pipeline.resolve_batch(raw, self.confirmer);

        let retried = pending.len();
        let mut new_matches = 0;
        for ((_, record), resolution) in pending.into_iter().zip(&batch.resolutions) {
            if resolution.is_matched() {
                new_matches += 1;
            }
            record.apply(resolution);
        }

        tracing::info!(retried, new_matches, "Retry pass complete");
        RetryReport {
            retried,
            new_matches,
            batch,
        }
    }

    /// Retry every unmatched track across all episodes, in episode then track order.
    pub fn run(&self, episodes: &mut [EpisodeRecord]) -> RetryReport {
        self.retry_tracks(episodes.iter_mut().flat_map(|episode| {
            let id: &str = &episode.episode;
            episode.tracklist.iter_mut().map(move |record| (id, record))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fakes::FakeCatalog;
    use crate::config::ResolveConfig;
    use crate::confirm::AutoRejectConfirmer;
    use crate::scoring::LexicalScorer;
    use crate::throttle::Throttle;
    use std::time::Duration;

    fn matched(artist: &str, title: &str, uri: &str) -> TrackRecord {
        let mut record = TrackRecord::new(artist, title);
        record.spotify_uri = Some(uri.into());
        record.found = true;
        record
    }

    fn episode(id: &str, tracklist: Vec<TrackRecord>) -> EpisodeRecord {
        EpisodeRecord {
            episode: id.into(),
            broadcast: Some("2024-05-01T12:00:00Z".into()),
            broadcast_formatted: None,
            url: format!("https://www.nts.live/shows/m00dtapes/episodes/{}", id),
            mixcloud: None,
            audio_sources: vec![],
            track_count: tracklist.len(),
            tracklist,
        }
    }

    fn catalog() -> FakeCatalog {
        FakeCatalog::new().with(
            "Pat Metheny September Fifteenth",
            vec![("Pat Metheny", "September Fifteenth", "spotify:track:pm")],
        )
    }

    fn config() -> ResolveConfig {
        ResolveConfig {
            max_workers: 2,
            catalog_min_interval: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_only_touches_unmatched() {
        let catalog = catalog();
        let throttle = Throttle::new("catalog", Duration::ZERO);
        let pipeline = Pipeline::new(&catalog, &LexicalScorer, &throttle, &config()).unwrap();
        let pass = RetryPass::new(&pipeline, &AutoRejectConfirmer);

        let mut records = vec![
            matched("Larry Heard", "Can You Feel It", "spotify:track:lh"),
            TrackRecord::new("Pat Metheny", "September Fifteenth (Dedicated To Bill Evans)"),
            TrackRecord::new("Unknown Artist", "Unknown Title"),
        ];
        let report = pass.retry_tracks(records.iter_mut().map(|record| ("ep1", record)));

        assert_eq!(report.retried, 2);
        assert_eq!(report.new_matches, 1);
        assert_eq!(records[0].spotify_uri.as_deref(), Some("spotify:track:lh"));
        assert_eq!(records[1].spotify_uri.as_deref(), Some("spotify:track:pm"));
        assert!(records[1].found);
        assert!(!records[2].found);
        assert!(records[2].spotify_uri.is_none());
        // the matched record was never queried
        assert_eq!(catalog.queries().len(), 2);
    }

    #[test]
    fn test_retry_is_idempotent() {
        let catalog = catalog();
        let throttle = Throttle::new("catalog", Duration::ZERO);
        let pipeline = Pipeline::new(&catalog, &LexicalScorer, &throttle, &config()).unwrap();
        let pass = RetryPass::new(&pipeline, &AutoRejectConfirmer);

        let mut episodes = vec![
            episode(
                "ep1",
                vec![
                    TrackRecord::new("Pat Metheny", "September Fifteenth (Dedicated To Bill Evans)"),
                    TrackRecord::new("Someone", "Nothing On Spotify"),
                ],
            ),
            episode("ep2", vec![matched("Björk", "Hyperballad", "spotify:track:b")]),
        ];

        let first = pass.run(&mut episodes);
        let after_first = serde_json::to_string_pretty(&episodes).unwrap();
        let second = pass.run(&mut episodes);
        let after_second = serde_json::to_string_pretty(&episodes).unwrap();

        assert_eq!(first.new_matches, 1);
        assert_eq!(second.retried, 1);
        assert_eq!(second.new_matches, 0);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_retry_nothing_pending() {
        let catalog = catalog();
        let throttle = Throttle::new("catalog", Duration::ZERO);
        let pipeline = Pipeline::new(&catalog, &LexicalScorer, &throttle, &config()).unwrap();
        let pass = RetryPass::new(&pipeline, &AutoRejectConfirmer);

        let mut episodes = vec![episode("ep1", vec![matched("A", "B", "spotify:track:ab")])];
        let report = pass.run(&mut episodes);

        assert_eq!(report.retried, 0);
        assert!(catalog.queries().is_empty());
    }
}
