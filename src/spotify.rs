//! Spotify Web API client: track search and playlist creation.
//!
//! Search uses an app token from the client-credentials flow. Playlist calls
//! need a user token with `playlist-modify-private`, which is supplied by the
//! caller (no interactive authorization here).

use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::catalog::{CatalogSearch, PlaylistProvider};
use crate::error::{PlaylistError, SearchError};
use crate::models::Candidate;
use crate::throttle::Pace;

const API_BASE_URL: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = concat!("tracklist-sync/", env!("CARGO_PKG_VERSION"));

/// Spotify caps one add-tracks request at 100 URIs
pub const ADD_TRACKS_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
}

pub struct SpotifyClient {
    http: Client,
    client_id: String,
    client_secret: String,
    user_token: Option<String>,
    app_token: Mutex<Option<String>>,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str, user_token: Option<String>) -> Result<Self, SearchError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            user_token,
            app_token: Mutex::new(None),
            api_base: API_BASE_URL.to_string(),
        })
    }

    fn cached_token(&self) -> Option<String> {
        match self.app_token.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_token(&self, token: Option<String>) {
        match self.app_token.lock() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn app_token(&self, pace: &mut Pace<'_>) -> Result<String, SearchError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        tracing::debug!("Requesting Spotify client-credentials token");
        pace.wait();
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Auth(format!("{}: {}", status.as_u16(), body)));
        }

        let token: TokenResponse = response.json()?;
        self.store_token(Some(token.access_token.clone()));
        Ok(token.access_token)
    }

    fn send_search(&self, token: &str, query: &str, limit: usize, pace: &mut Pace<'_>) -> Result<Response, SearchError> {
        let limit = limit.clamp(1, 50).to_string();
        pace.wait();
        Ok(self
            .http
            .get(format!("{}/search", self.api_base))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()?)
    }

    fn user_token(&self) -> Result<&str, PlaylistError> {
        self.user_token.as_deref().ok_or(PlaylistError::MissingUserToken)
    }

    pub fn current_user_id(&self, pace: &mut Pace<'_>) -> Result<String, PlaylistError> {
        let token = self.user_token()?;
        pace.wait();
        let response = self
            .http
            .get(format!("{}/me", self.api_base))
            .bearer_auth(token)
            .send()?;
        let profile: UserProfile = check_playlist_status(response)?.json()?;
        Ok(profile.id)
    }
}

impl CatalogSearch for SpotifyClient {
    fn search(&self, query: &str, limit: usize, pace: &mut Pace<'_>) -> Result<Vec<Candidate>, SearchError> {
        let token = self.app_token(pace)?;
        let mut response = self.send_search(&token, query, limit, pace)?;

        // App tokens expire after an hour; refresh once
        if response.status() == StatusCode::UNAUTHORIZED {
            self.store_token(None);
            let token = self.app_token(pace)?;
            response = self.send_search(&token, query, limit, pace)?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let results: SearchResponse = response.json()?;
        let candidates = candidates_from_response(results);
        tracing::trace!(query = %query, count = candidates.len(), "Spotify search");
        Ok(candidates)
    }
}

impl PlaylistProvider for SpotifyClient {
    fn create_playlist(&self, name: &str, description: &str, pace: &mut Pace<'_>) -> Result<String, PlaylistError> {
        let user_id = self.current_user_id(pace)?;
        pace.wait();
        let response = self
            .http
            .post(format!("{}/users/{}/playlists", self.api_base, user_id))
            .bearer_auth(self.user_token()?)
            .json(&json!({
                "name": name,
                "description": description,
                "public": false,
            }))
            .send()?;
        let playlist: CreatedPlaylist = check_playlist_status(response)?.json()?;
        tracing::info!(playlist_id = %playlist.id, name = %name, "Created playlist");
        Ok(playlist.id)
    }

    fn add_tracks(&self, playlist_id: &str, catalog_ids: &[String], pace: &mut Pace<'_>) -> Result<(), PlaylistError> {
        let token = self.user_token()?;
        for (position, batch) in add_track_batches(catalog_ids) {
            pace.wait();
            let response = self
                .http
                .post(format!("{}/playlists/{}/tracks", self.api_base, playlist_id))
                .bearer_auth(token)
                .json(&json!({
                    "uris": batch,
                    "position": position,
                }))
                .send()?;
            check_playlist_status(response)?;
            tracing::debug!(position, count = batch.len(), "Added tracks to playlist");
        }
        Ok(())
    }
}

fn check_playlist_status(response: Response) -> Result<Response, PlaylistError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().unwrap_or_default();
        Err(PlaylistError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn candidates_from_response(response: SearchResponse) -> Vec<Candidate> {
    response
        .tracks
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(rank, track)| Candidate {
            artist: track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            title: track.name,
            catalog_id: track.uri,
            raw_rank: rank,
        })
        .collect()
}

/// Split URIs into request-sized batches, each with its insert position.
pub fn add_track_batches(uris: &[String]) -> impl Iterator<Item = (usize, &[String])> {
    uris.chunks(ADD_TRACKS_BATCH)
        .enumerate()
        .map(|(i, chunk)| (i * ADD_TRACKS_BATCH, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::Throttle;

    #[test]
    fn test_candidates_from_response() {
        let json = r#"{
            "tracks": {
                "items": [
                    {
                        "uri": "spotify:track:1",
                        "name": "September Fifteenth",
                        "artists": [{"name": "Pat Metheny"}, {"name": "Lyle Mays"}]
                    },
                    {
                        "uri": "spotify:track:2",
                        "name": "September Fifteenth - Live",
                        "artists": [{"name": "Pat Metheny"}]
                    }
                ]
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates = candidates_from_response(response);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].artist, "Pat Metheny, Lyle Mays");
        assert_eq!(candidates[0].catalog_id, "spotify:track:1");
        assert_eq!(candidates[0].raw_rank, 0);
        assert_eq!(candidates[1].raw_rank, 1);
    }

    #[test]
    fn test_empty_search_response() {
        let response: SearchResponse = serde_json::from_str(r#"{"tracks": {"items": []}}"#).unwrap();
        assert!(candidates_from_response(response).is_empty());

        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(candidates_from_response(response).is_empty());
    }

    #[test]
    fn test_add_track_batches() {
        let uris: Vec<String> = (0..250).map(|i| format!("spotify:track:{}", i)).collect();
        let batches: Vec<_> = add_track_batches(&uris).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0, 0);
        assert_eq!(batches[1].0, 100);
        assert_eq!(batches[2].0, 200);
        assert_eq!(batches[2].1.len(), 50);
    }

    #[test]
    fn test_playlist_calls_need_user_token() {
        let client = SpotifyClient::new("id", "secret", None).unwrap();
        let throttle = Throttle::new("spotify", Duration::from_secs(60));
        let mut pace = throttle.pace();
        pace.hold();
        // fails before sending anything, so the held slot is never spent
        assert!(matches!(client.current_user_id(&mut pace), Err(PlaylistError::MissingUserToken)));
        let ids = vec!["spotify:track:1".to_string()];
        assert!(matches!(
            client.add_tracks("pl1", &ids, &mut pace),
            Err(PlaylistError::MissingUserToken)
        ));
    }
}
