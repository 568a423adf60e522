//! Core data models for local-to-catalog reconciliation.
//!
//! This module contains the struct definitions and enums that flow between
//! the normalizer, the engine, the aggregator and the log sink.

use serde::Serialize;

use crate::normalize::normalize;

// ============================================================================
// Local Side
// ============================================================================

/// A track name derived from a local audio file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTrackName {
    pub raw: String,        // File name as listed (extension included)
    pub normalized: String, // Comparison key, also used as the search query
}

impl LocalTrackName {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }
}

// ============================================================================
// Catalog Side
// ============================================================================

/// Remote search result. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateTrack {
    pub id: String, // Catalog track ID (e.g., "4u7EnebtmKWzUH433cf5Qv")
    pub title: String,
    pub artist: String, // Primary (first credited) artist
}

impl CandidateTrack {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// "artist title", lowercased. Compared against the local normalized form.
    pub fn comparison_key(&self) -> String {
        format!("{} {}", self.artist.to_lowercase(), self.title.to_lowercase())
    }

    /// Display label for logs. Same text as the comparison key.
    pub fn label(&self) -> String {
        self.comparison_key()
    }
}

/// A candidate paired with its similarity against one local name.
/// Created and discarded per comparison.
#[derive(Clone, Copy, Debug)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a CandidateTrack,
    pub ratio: f64,
    pub accepted: bool, // ratio > threshold
}

// ============================================================================
// Outcomes
// ============================================================================

/// Final classification of one local name.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchOutcome {
    /// Best candidate scored above the threshold
    Matched { id: String, score: f64, label: String },
    /// Candidates found, but the best one did not clear the threshold
    NotIdentical { score: f64, label: String },
    /// Search returned nothing
    NoCandidates,
    /// Search failed for this item; reported like NoCandidates
    SearchFailed { reason: String },
    /// Run was cancelled before this item resolved
    Cancelled,
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }

    /// Best observed score, if any candidate was scored.
    pub fn score(&self) -> Option<f64> {
        match self {
            MatchOutcome::Matched { score, .. } | MatchOutcome::NotIdentical { score, .. } => {
                Some(*score)
            }
            _ => None,
        }
    }

    pub fn best_label(&self) -> Option<&str> {
        match self {
            MatchOutcome::Matched { label, .. } | MatchOutcome::NotIdentical { label, .. } => {
                Some(label)
            }
            _ => None,
        }
    }

    /// Status column of the match log. `None` for items that are not logged.
    pub fn log_status(&self) -> Option<LogStatus> {
        match self {
            MatchOutcome::Matched { .. } => Some(LogStatus::Success),
            MatchOutcome::NotIdentical { .. } => Some(LogStatus::Failure),
            MatchOutcome::NoCandidates | MatchOutcome::SearchFailed { .. } => {
                Some(LogStatus::NoResult)
            }
            MatchOutcome::Cancelled => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStatus {
    Success,
    Failure,
    NoResult,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Success => "Success",
            LogStatus::Failure => "Failure",
            LogStatus::NoResult => "NoResult",
        }
    }
}

/// One local name with its outcome, tagged with its input position.
#[derive(Clone, Debug)]
pub struct ReconciledTrack {
    pub index: usize,
    pub name: LocalTrackName,
    pub outcome: MatchOutcome,
}

/// Everything one engine run produced, in input order.
#[derive(Clone, Debug, Default)]
pub struct ReconcileRun {
    pub records: Vec<ReconciledTrack>,
    pub excluded_over_cap: usize, // Inputs beyond max_tracks, not processed
}

// ============================================================================
// Playlist
// ============================================================================

/// Track as listed back from a destination playlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    pub artist: String,
}

impl PlaylistEntry {
    /// "Artist - Title"
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counts for one reconciliation run.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationSummary {
    pub total: usize,            // Processed names (after the max-tracks cap)
    pub matched: usize,
    pub not_identical: usize,
    pub zero_found: usize,       // NoCandidates + SearchFailed
    pub search_failures: usize,  // Subset of zero_found
    pub cancelled: usize,
    pub excluded_over_cap: usize,
    pub playlist_confirmed: Option<usize>, // None when no playlist step ran
}

impl ReconciliationSummary {
    /// Matched share of processed names, as a percentage. 0 for an empty run.
    pub fn search_success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / self.total as f64
        }
    }

    /// Confirmed playlist entries over processed names, as a percentage.
    /// Undefined (None) when no playlist step ran.
    pub fn playlist_success_rate(&self) -> Option<f64> {
        self.playlist_confirmed.map(|confirmed| {
            if self.total == 0 {
                0.0
            } else {
                100.0 * confirmed as f64 / self.total as f64
            }
        })
    }

    /// Log stats to stderr in JSON format
    pub fn log_json(&self) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS]\n{}", json);
        }
    }
}
