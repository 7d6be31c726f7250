//! Show-level operations: scrape every episode, resolve the tracklists and
//! push the collected matches into a playlist.

use crate::catalog::{EpisodeSource, PlaylistProvider};
use crate::confirm::Confirmer;
use crate::coordinator::Coordinator;
use crate::error::{PlaylistError, ScrapeError};
use crate::models::{EpisodeRecord, PlaylistUris};
use crate::pipeline::{BatchReport, Pipeline};
use crate::progress::{Phase, PhaseProgress};
use crate::throttle::Throttle;

#[derive(Debug)]
pub struct ScrapeReport {
    /// Newest broadcast first.
    pub episodes: Vec<EpisodeRecord>,
    pub failed_episodes: usize,
}

/// Fetch the episode listing and every tracklist, all paced by `throttle`.
/// Episodes whose tracklist cannot be fetched are skipped with a warning; a
/// failed listing is fatal.
pub fn scrape_show(
    source: &dyn EpisodeSource,
    show_alias: &str,
    coordinator: &Coordinator,
    throttle: &Throttle,
    show_progress: bool,
) -> Result<ScrapeReport, ScrapeError> {
    let refs = source.fetch_episodes(show_alias, &mut throttle.pace())?;

    let progress = PhaseProgress::new(Phase::Episodes, refs.len() as u64, show_progress);
    let results = coordinator.run_throttled(refs.clone(), throttle, |_, episode, pace| {
        let result = source.fetch_tracklist(&episode, pace);
        progress.tick();
        result
    });
    progress.finish();

    let mut episodes = Vec::with_capacity(results.len());
    let mut failed_episodes = 0;
    for (episode, result) in refs.iter().zip(results) {
        match result {
            Ok(record) => episodes.push(record),
            Err(e) => {
                tracing::warn!(episode = %episode.episode_id, error = %e, "Skipping episode");
                failed_episodes += 1;
            }
        }
    }

    sort_newest_first(&mut episodes);
    Ok(ScrapeReport {
        episodes,
        failed_episodes,
    })
}

/// Order episodes by broadcast timestamp, newest first; undated episodes last.
pub fn sort_newest_first(episodes: &mut [EpisodeRecord]) {
    episodes.sort_by(|a, b| b.broadcast.cmp(&a.broadcast));
}

/// Resolve every track of every episode as one batch and write the outcomes back.
pub fn resolve_episodes(
    pipeline: &Pipeline<'_>,
    confirmer: &dyn Confirmer,
    episodes: &mut [EpisodeRecord],
) -> BatchReport {
    let raw = episodes.iter().flat_map(|e| e.raw_tracks()).collect();
    let report = pipeline.resolve_batch(raw, confirmer);

    let records = episodes.iter_mut().flat_map(|e| e.tracklist.iter_mut());
    for (record, resolution) in records.zip(&report.resolutions) {
        record.apply(resolution);
    }
    report
}

/// Create the show playlist and fill it. Returns the new playlist id.
pub fn sync_playlist(
    provider: &dyn PlaylistProvider,
    playlist: &PlaylistUris,
    throttle: &Throttle,
) -> Result<String, PlaylistError> {
    let mut pace = throttle.pace();
    let playlist_id = provider.create_playlist(&playlist.name, &playlist.description, &mut pace)?;
    if !playlist.uris.is_empty() {
        provider.add_tracks(&playlist_id, &playlist.uris, &mut pace)?;
    }
    tracing::info!(playlist_id = %playlist_id, tracks = playlist.uris.len(), "Playlist synced");
    Ok(playlist_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fakes::FakeCatalog;
    use crate::config::ResolveConfig;
    use crate::confirm::AutoRejectConfirmer;
    use crate::models::{EpisodeRef, TrackRecord};
    use crate::scoring::LexicalScorer;
    use crate::throttle::Pace;
    use std::cell::RefCell;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Two listing pages and three episodes; records when each request went out.
    #[derive(Default)]
    struct FakeSource {
        requests: Mutex<Vec<(String, Instant)>>,
    }

    impl FakeSource {
        fn request(&self, pace: &mut Pace<'_>, what: &str) {
            pace.wait();
            self.requests.lock().unwrap().push((what.to_string(), Instant::now()));
        }
    }

    impl EpisodeSource for FakeSource {
        fn fetch_episodes(&self, show_alias: &str, pace: &mut Pace<'_>) -> Result<Vec<EpisodeRef>, ScrapeError> {
            self.request(pace, "page 0");
            self.request(pace, "page 12");
            Ok(["old", "new", "broken"]
                .iter()
                .zip(["2023-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "2024-06-01T00:00:00Z"])
                .map(|(id, broadcast)| EpisodeRef {
                    episode_id: id.to_string(),
                    show_alias: show_alias.to_string(),
                    broadcast: Some(broadcast.to_string()),
                    url: format!("https://www.nts.live/shows/{}/episodes/{}", show_alias, id),
                })
                .collect())
        }

        fn fetch_tracklist(&self, episode: &EpisodeRef, pace: &mut Pace<'_>) -> Result<EpisodeRecord, ScrapeError> {
            self.request(pace, &episode.episode_id);
            if episode.episode_id == "broken" {
                return Err(ScrapeError::Status {
                    status: 500,
                    url: episode.url.clone(),
                });
            }
            let tracklist = vec![
                TrackRecord::new("Pat Metheny", "September Fifteenth (Dedicated To Bill Evans)"),
                TrackRecord::new("Charles Webster", "Ready (Presence Radio Edit)"),
            ];
            Ok(EpisodeRecord {
                episode: episode.episode_id.clone(),
                broadcast: episode.broadcast.clone(),
                broadcast_formatted: None,
                url: episode.url.clone(),
                mixcloud: None,
                audio_sources: vec![],
                track_count: tracklist.len(),
                tracklist,
            })
        }
    }

    #[derive(Default)]
    struct FakePlaylists {
        calls: RefCell<Vec<String>>,
    }

    impl PlaylistProvider for FakePlaylists {
        fn create_playlist(&self, name: &str, _description: &str, pace: &mut Pace<'_>) -> Result<String, PlaylistError> {
            // user lookup, then the create request
            pace.wait();
            pace.wait();
            self.calls.borrow_mut().push(format!("create {}", name));
            Ok("pl1".into())
        }

        fn add_tracks(&self, playlist_id: &str, catalog_ids: &[String], pace: &mut Pace<'_>) -> Result<(), PlaylistError> {
            for batch in catalog_ids.chunks(100) {
                pace.wait();
                self.calls
                    .borrow_mut()
                    .push(format!("add {} {}", playlist_id, batch.len()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_scrape_and_resolve_show() {
        let throttle = Throttle::new("scrape", Duration::ZERO);
        let source = FakeSource::default();
        let report = scrape_show(&source, "m00dtapes", &Coordinator::new(2), &throttle, false).unwrap();

        assert_eq!(report.failed_episodes, 1);
        let ids: Vec<&str> = report.episodes.iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let catalog = FakeCatalog::new()
            .with(
                "Pat Metheny September Fifteenth",
                vec![("Pat Metheny", "September Fifteenth", "spotify:track:pm")],
            )
            .with("Charles Webster Ready", vec![("Synthetix", "Ready For It", "spotify:track:syn")]);
        let catalog_throttle = Throttle::new("catalog", Duration::ZERO);
        let config = ResolveConfig {
            catalog_min_interval: 0.0,
            ..Default::default()
        };
        let pipeline = Pipeline::new(&catalog, &LexicalScorer, &catalog_throttle, &config).unwrap();

        let mut episodes = report.episodes;
        let batch = resolve_episodes(&pipeline, &AutoRejectConfirmer, &mut episodes);

        assert_eq!(batch.resolutions.len(), 4);
        for episode in &episodes {
            assert_eq!(episode.tracklist[0].spotify_uri.as_deref(), Some("spotify:track:pm"));
            assert!(!episode.tracklist[1].found);
        }
        let playlist = PlaylistUris::from_episodes("m00dtapes", &episodes);
        assert_eq!(playlist.total_tracks, 2);
    }

    #[test]
    fn test_sort_newest_first_undated_last() {
        let mut episodes: Vec<EpisodeRecord> = ["b", "a", "c"]
            .iter()
            .zip([Some("2024-01-01"), None, Some("2024-02-01")])
            .map(|(id, broadcast)| EpisodeRecord {
                episode: id.to_string(),
                broadcast: broadcast.map(String::from),
                broadcast_formatted: None,
                url: String::new(),
                mixcloud: None,
                audio_sources: vec![],
                track_count: 0,
                tracklist: vec![],
            })
            .collect();
        sort_newest_first(&mut episodes);
        let ids: Vec<&str> = episodes.iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sync_playlist() {
        let provider = FakePlaylists::default();
        let playlist = PlaylistUris {
            show_alias: "m00dtapes".into(),
            name: "M00DTAPES Collection".into(),
            description: "All tracks from m00dtapes shows on NTS Radio".into(),
            total_tracks: 2,
            uris: vec!["spotify:track:1".into(), "spotify:track:2".into()],
        };

        let throttle = Throttle::new("spotify", Duration::ZERO);
        let id = sync_playlist(&provider, &playlist, &throttle).unwrap();

        assert_eq!(id, "pl1");
        assert_eq!(
            *provider.calls.borrow(),
            vec!["create M00DTAPES Collection".to_string(), "add pl1 2".to_string()]
        );
    }

    #[test]
    fn test_scrape_spaces_every_request() {
        let throttle = Throttle::new("scrape", Duration::from_millis(30));
        let source = FakeSource::default();
        let start = Instant::now();

        scrape_show(&source, "m00dtapes", &Coordinator::new(3), &throttle, false).unwrap();

        let mut requests = source.requests.lock().unwrap().clone();
        requests.sort_by_key(|(_, at)| *at);
        let names: Vec<&str> = requests.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(&names[..2], &["page 0", "page 12"]);
        assert_eq!(requests.len(), 5);
        // five requests through one throttle span at least four intervals
        assert!(requests[1].1 - start >= Duration::from_millis(30));
        assert!(requests[4].1 - start >= Duration::from_millis(120));
    }

    #[test]
    fn test_sync_playlist_spaces_batches() {
        let provider = FakePlaylists::default();
        let playlist = PlaylistUris {
            show_alias: "m00dtapes".into(),
            name: "M00DTAPES Collection".into(),
            description: String::new(),
            total_tracks: 250,
            uris: (0..250).map(|i| format!("spotify:track:{}", i)).collect(),
        };
        let throttle = Throttle::new("spotify", Duration::from_millis(20));
        let start = Instant::now();

        sync_playlist(&provider, &playlist, &throttle).unwrap();

        // two create requests and three batches
        assert_eq!(provider.calls.borrow().len(), 4);
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
