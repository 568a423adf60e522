//! Candidate search boundary.
//!
//! The engine only sees `CandidateSearcher`. The Spotify client implements it
//! over HTTP; tests implement it in memory.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::SearchError;
use crate::models::CandidateTrack;

/// Number of results requested per search unless configured otherwise
pub const DEFAULT_CANDIDATE_LIMIT: usize = 15;

/// Upper bound on results per search request (Spotify ceiling)
pub const SEARCH_RESULT_LIMIT: usize = 50;

pub trait CandidateSearcher: Send + Sync {
    /// Candidates for `query` in relevance order, at most `limit` of them.
    /// An empty result is `Ok(vec![])`, never an error.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateTrack>, SearchError>;

    /// Largest `limit` this searcher honours in a single call.
    fn max_limit(&self) -> usize {
        SEARCH_RESULT_LIMIT
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Retries transient failures a fixed number of times with linear backoff.
/// Rate-limit responses wait for the server's Retry-After when it is given.
pub struct RetryingSearcher<S> {
    inner: S,
    retries: usize,
    backoff: Duration,
}

impl<S: CandidateSearcher> RetryingSearcher<S> {
    pub fn new(inner: S, retries: usize, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }
}

impl<S: CandidateSearcher> CandidateSearcher for RetryingSearcher<S> {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateTrack>, SearchError> {
        let mut attempt = 0;
        loop {
            match self.inner.search(query, limit) {
                Ok(candidates) => return Ok(candidates),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let wait = match &e {
                        SearchError::RateLimited(Some(after)) => *after,
                        _ => self.backoff * attempt as u32,
                    };
                    warn!(query, attempt, error = %e, "search failed, retrying in {:?}", wait);
                    thread::sleep(wait);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn max_limit(&self) -> usize {
        self.inner.max_limit()
    }
}
