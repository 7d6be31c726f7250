//! NTS Radio API client: episode listings and per-episode tracklists.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;

use crate::catalog::EpisodeSource;
use crate::error::ScrapeError;
use crate::models::{EpisodeRecord, EpisodeRef, TrackRecord};
use crate::throttle::Pace;

const NTS_BASE_URL: &str = "https://www.nts.live";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Page size of the episode listing endpoint
pub const EPISODE_PAGE_SIZE: usize = 12;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_TITLE: &str = "Unknown Title";

// ============================================================================
// API Shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct EpisodePage {
    #[serde(default)]
    results: Vec<EpisodeSummary>,
    #[serde(default)]
    metadata: PageMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PageMetadata {
    #[serde(default)]
    resultset: ResultSet,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSet {
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct EpisodeSummary {
    episode_alias: Option<String>,
    show_alias: Option<String>,
    broadcast: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EpisodeDetail {
    #[serde(default)]
    tracklist: Vec<NtsTrack>,
    broadcast_formatted_long: Option<String>,
    mixcloud: Option<String>,
    #[serde(default)]
    audio_sources: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NtsTrack {
    #[serde(default)]
    main_artists: Vec<NtsArtist>,
    #[serde(default)]
    featuring_artists: Vec<NtsArtist>,
    #[serde(default)]
    remix_artists: Vec<NtsArtist>,
    title: Option<String>,
    offset: Option<serde_json::Value>,
    duration: Option<serde_json::Value>,
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NtsArtist {
    name: Option<String>,
}

// ============================================================================
// Parsing
// ============================================================================

fn names(artists: &[NtsArtist]) -> Vec<&str> {
    artists.iter().filter_map(|a| a.name.as_deref()).collect()
}

/// Compose the display artist string: `Main, ft. Feat, (Remixer Remix)`.
pub fn compose_artist(main: &[&str], featuring: &[&str], remixers: &[&str]) -> String {
    let mut parts: Vec<String> = main.iter().map(|s| s.to_string()).collect();
    if !featuring.is_empty() {
        parts.push(format!("ft. {}", featuring.join(", ")));
    }
    if !remixers.is_empty() {
        parts.push(format!("({} Remix)", remixers.join(", ")));
    }
    if parts.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        parts.join(", ")
    }
}

fn track_record(track: NtsTrack) -> TrackRecord {
    let artist = compose_artist(
        &names(&track.main_artists),
        &names(&track.featuring_artists),
        &names(&track.remix_artists),
    );
    TrackRecord {
        artist,
        title: track.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        offset: track.offset,
        duration: track.duration,
        uid: track.uid,
        spotify_uri: None,
        found: false,
    }
}

fn episode_record(episode: &EpisodeRef, detail: EpisodeDetail) -> EpisodeRecord {
    let tracklist: Vec<TrackRecord> = detail.tracklist.into_iter().map(track_record).collect();
    EpisodeRecord {
        episode: episode.episode_id.clone(),
        broadcast: episode.broadcast.clone(),
        broadcast_formatted: detail.broadcast_formatted_long,
        url: episode.url.clone(),
        mixcloud: detail.mixcloud,
        audio_sources: detail.audio_sources,
        track_count: tracklist.len(),
        tracklist,
    }
}

fn episode_url(show_alias: &str, episode_alias: &str) -> String {
    format!("{}/shows/{}/episodes/{}", NTS_BASE_URL, show_alias, episode_alias)
}

fn episode_refs(page: &EpisodePage) -> Vec<EpisodeRef> {
    page.results
        .iter()
        .filter_map(|e| {
            let episode_alias = e.episode_alias.as_deref()?;
            let show_alias = e.show_alias.as_deref()?;
            Some(EpisodeRef {
                episode_id: episode_alias.to_string(),
                show_alias: show_alias.to_string(),
                broadcast: e.broadcast.clone(),
                url: episode_url(show_alias, episode_alias),
            })
        })
        .collect()
}

/// Walk the paginated listing until an empty page or the advertised count.
/// Each page request waits on `pace`.
fn collect_pages<F>(pace: &mut Pace<'_>, mut fetch_page: F) -> Result<Vec<EpisodeRef>, ScrapeError>
where
    F: FnMut(usize) -> Result<EpisodePage, ScrapeError>,
{
    let mut episodes = Vec::new();
    let mut offset = 0;
    loop {
        pace.wait();
        let page = fetch_page(offset)?;
        if page.results.is_empty() {
            break;
        }
        episodes.extend(episode_refs(&page));

        offset += EPISODE_PAGE_SIZE;
        if offset >= page.metadata.resultset.count {
            break;
        }
    }
    Ok(episodes)
}

// ============================================================================
// Client
// ============================================================================

pub struct NtsClient {
    http: Client,
    base_url: String,
}

impl NtsClient {
    pub fn new() -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("dnt", HeaderValue::from_static("1"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: NTS_BASE_URL.to_string(),
        })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, referer: Option<&str>) -> Result<T, ScrapeError> {
        let mut request = self.http.get(url);
        if let Some(referer) = referer {
            request = request.header(reqwest::header::REFERER, referer);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| ScrapeError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl EpisodeSource for NtsClient {
    fn fetch_episodes(&self, show_alias: &str, pace: &mut Pace<'_>) -> Result<Vec<EpisodeRef>, ScrapeError> {
        let episodes = collect_pages(pace, |offset| {
            let url = format!(
                "{}/api/v2/shows/{}/episodes?offset={}&limit={}",
                self.base_url, show_alias, offset, EPISODE_PAGE_SIZE
            );
            tracing::debug!(url = %url, "Fetching episode page");
            self.get_json(&url, None)
        })?;
        tracing::info!(show = %show_alias, count = episodes.len(), "Found episodes");
        Ok(episodes)
    }

    fn fetch_tracklist(&self, episode: &EpisodeRef, pace: &mut Pace<'_>) -> Result<EpisodeRecord, ScrapeError> {
        let url = format!(
            "{}/shows/{}/episodes/{}",
            self.base_url, episode.show_alias, episode.episode_id
        );
        pace.wait();
        let detail: EpisodeDetail = self.get_json(&url, Some(&episode.url))?;
        let record = episode_record(episode, detail);
        tracing::debug!(episode = %record.episode, tracks = record.track_count, "Fetched tracklist");
        Ok(record)
    }
}
