//! Playlist publishing.
//!
//! Matched IDs go to the destination playlist in input order, in batches no
//! larger than the destination accepts. Afterwards the playlist is read back
//! so the report can show what actually landed.

use tracing::{debug, info};

use crate::error::PublishError;
use crate::models::PlaylistEntry;

/// Max track IDs per add request (Spotify limit)
pub const PLAYLIST_ADD_LIMIT: usize = 100;

pub trait PlaylistPublisher {
    /// Create a private playlist and return its ID.
    fn create_playlist(&self, name: &str) -> Result<String, PublishError>;

    /// Append `ids` in order. Called with at most `batch_limit()` IDs.
    fn add_tracks(&self, playlist_id: &str, ids: &[String]) -> Result<(), PublishError>;

    /// Current playlist content, in playlist order.
    fn list_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>, PublishError>;

    fn batch_limit(&self) -> usize {
        PLAYLIST_ADD_LIMIT
    }
}

/// Where matched tracks go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistTarget {
    /// Create a new playlist with this name
    Create(String),
    /// Append to an existing playlist ID
    Existing(String),
}

#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub playlist_id: String,
    pub added: usize,
    pub batches: usize,
    /// Playlist content read back after adding
    pub confirmed: Vec<PlaylistEntry>,
}

/// Add `ids` to `target` and read the playlist back. The first failing call
/// aborts; batches sent before it stay in the playlist.
pub fn publish<P>(publisher: &P, target: &PlaylistTarget, ids: &[String]) -> Result<PublishReport, PublishError>
where
    P: PlaylistPublisher + ?Sized,
{
    let playlist_id = match target {
        PlaylistTarget::Create(name) => {
            let id = publisher.create_playlist(name)?;
            info!(playlist = %id, name = %name, "created playlist");
            id
        }
        PlaylistTarget::Existing(id) => id.clone(),
    };

    let mut report = PublishReport {
        playlist_id,
        ..Default::default()
    };

    for batch in ids.chunks(publisher.batch_limit().max(1)) {
        publisher.add_tracks(&report.playlist_id, batch)?;
        report.added += batch.len();
        report.batches += 1;
        debug!(batch = report.batches, size = batch.len(), "added tracks");
    }

    report.confirmed = publisher.list_tracks(&report.playlist_id)?;
    info!(
        playlist = %report.playlist_id,
        added = report.added,
        confirmed = report.confirmed.len(),
        "playlist published"
    );
    Ok(report)
}
