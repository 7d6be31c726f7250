//! Per-show JSON state: the resolved tracklists and the derived playlist URIs.
//!
//! Layout: `<data_dir>/<show_alias>/tracklists_with_spotify.json` and
//! `<data_dir>/<show_alias>/playlist_uris.json`.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{EpisodeRecord, PlaylistUris};

pub const TRACKLISTS_FILE: &str = "tracklists_with_spotify.json";
pub const PLAYLIST_FILE: &str = "playlist_uris.json";

#[derive(Debug, Clone)]
pub struct ShowStore {
    show_alias: String,
    dir: PathBuf,
}

impl ShowStore {
    pub fn new(data_dir: &Path, show_alias: &str) -> Self {
        Self {
            show_alias: show_alias.to_string(),
            dir: data_dir.join(show_alias),
        }
    }

    pub fn show_alias(&self) -> &str {
        &self.show_alias
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tracklists_path(&self) -> PathBuf {
        self.dir.join(TRACKLISTS_FILE)
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(PLAYLIST_FILE)
    }

    pub fn load_tracklists(&self) -> Result<Vec<EpisodeRecord>, StoreError> {
        read_json(&self.tracklists_path())
    }

    pub fn save_tracklists(&self, episodes: &[EpisodeRecord]) -> Result<(), StoreError> {
        write_json_atomic(&self.tracklists_path(), episodes)
    }

    pub fn load_playlist(&self) -> Result<PlaylistUris, StoreError> {
        read_json(&self.playlist_path())
    }

    pub fn save_playlist(&self, playlist: &PlaylistUris) -> Result<(), StoreError> {
        write_json_atomic(&self.playlist_path(), playlist)
    }

    /// Save the tracklists and regenerate the playlist file from them.
    pub fn save_all(&self, episodes: &[EpisodeRecord]) -> Result<PlaylistUris, StoreError> {
        self.save_tracklists(episodes)?;
        let playlist = PlaylistUris::from_episodes(&self.show_alias, episodes);
        self.save_playlist(&playlist)?;
        Ok(playlist)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON, written to a temp file and renamed into place.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, source }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, value).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        w.write_all(b"\n").map_err(io_err(&tmp))?;
        w.flush().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}
