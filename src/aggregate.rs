//! Folds per-track outcomes into the run report.

use crate::models::{MatchOutcome, PlaylistEntry, ReconcileRun, ReconciliationSummary};

/// Outcome lists and counts for one run. Names use their normalized form.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    /// Accepted catalog IDs in input order, ready for publishing
    pub matched_ids: Vec<String>,
    pub not_identical: Vec<String>,
    pub zero_candidates: Vec<String>,
    /// Failed searches; also listed under `zero_candidates`
    pub search_failures: Vec<String>,
    pub cancelled: Vec<String>,
    /// "Artist - Title" entries read back from the playlist
    pub confirmed_in_playlist: Vec<String>,
    pub summary: ReconciliationSummary,
}

/// Partition outcomes into the report buckets. Every processed name lands in
/// exactly one of matched / not identical / zero found / cancelled.
pub fn aggregate(run: &ReconcileRun) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();

    for record in &run.records {
        let name = record.name.normalized.clone();
        match &record.outcome {
            MatchOutcome::Matched { id, .. } => report.matched_ids.push(id.clone()),
            MatchOutcome::NotIdentical { .. } => report.not_identical.push(name),
            MatchOutcome::NoCandidates => report.zero_candidates.push(name),
            MatchOutcome::SearchFailed { .. } => {
                report.search_failures.push(name.clone());
                report.zero_candidates.push(name);
            }
            MatchOutcome::Cancelled => report.cancelled.push(name),
        }
    }

    report.summary = ReconciliationSummary {
        total: run.records.len(),
        matched: report.matched_ids.len(),
        not_identical: report.not_identical.len(),
        zero_found: report.zero_candidates.len(),
        search_failures: report.search_failures.len(),
        cancelled: report.cancelled.len(),
        excluded_over_cap: run.excluded_over_cap,
        playlist_confirmed: None,
    };
    report
}

impl ReconciliationReport {
    /// Attach the playlist read-back; enables the playlist success rate.
    pub fn record_playlist(&mut self, entries: &[PlaylistEntry]) {
        self.confirmed_in_playlist = entries.iter().map(PlaylistEntry::label).collect();
        self.summary.playlist_confirmed = Some(entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocalTrackName, ReconciledTrack};

    fn run_of(outcomes: Vec<MatchOutcome>) -> ReconcileRun {
        ReconcileRun {
            records: outcomes
                .into_iter()
                .enumerate()
                .map(|(index, outcome)| ReconciledTrack {
                    index,
                    name: LocalTrackName::new(format!("track {}.mp3", index)),
                    outcome,
                })
                .collect(),
            excluded_over_cap: 0,
        }
    }

    fn matched(id: &str) -> MatchOutcome {
        MatchOutcome::Matched {
            id: id.into(),
            score: 0.9,
            label: "x".into(),
        }
    }

    #[test]
    fn test_buckets_are_disjoint_and_complete() {
        let run = run_of(vec![
            matched("a"),
            MatchOutcome::NotIdentical {
                score: 0.3,
                label: "y".into(),
            },
            MatchOutcome::NoCandidates,
            MatchOutcome::SearchFailed {
                reason: "timeout".into(),
            },
            MatchOutcome::Cancelled,
            matched("b"),
        ]);
        let report = aggregate(&run);
        let s = &report.summary;

        assert_eq!(s.total, 6);
        assert_eq!(s.matched + s.not_identical + s.zero_found + s.cancelled, s.total);
        assert_eq!(report.matched_ids, vec!["a", "b"]);
        assert_eq!(report.not_identical, vec!["track 1"]);
        assert_eq!(report.zero_candidates, vec!["track 2", "track 3"]);
        assert_eq!(report.search_failures, vec!["track 3"]);
        assert_eq!(s.search_failures, 1);
        assert_eq!(report.cancelled, vec!["track 4"]);
    }

    #[test]
    fn test_zero_found_counts_each_empty_search() {
        let before = aggregate(&run_of(vec![matched("a")]));
        let after = aggregate(&run_of(vec![matched("a"), MatchOutcome::NoCandidates]));
        assert_eq!(after.summary.zero_found, before.summary.zero_found + 1);
    }

    #[test]
    fn test_empty_run() {
        let report = aggregate(&ReconcileRun::default());
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.search_success_rate(), 0.0);
        assert!(report.matched_ids.is_empty());
    }

    #[test]
    fn test_excluded_over_cap_carried() {
        let mut run = run_of(vec![matched("a")]);
        run.excluded_over_cap = 3;
        assert_eq!(aggregate(&run).summary.excluded_over_cap, 3);
    }

    #[test]
    fn test_record_playlist() {
        let mut report = aggregate(&run_of(vec![matched("a"), MatchOutcome::NoCandidates]));
        assert_eq!(report.summary.playlist_success_rate(), None);
        report.record_playlist(&[PlaylistEntry {
            title: "Bohemian Rhapsody".into(),
            artist: "Queen".into(),
        }]);
        assert_eq!(report.confirmed_in_playlist, vec!["Queen - Bohemian Rhapsody"]);
        assert_eq!(report.summary.playlist_success_rate(), Some(50.0));
    }
}
