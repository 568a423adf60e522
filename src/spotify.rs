//! Spotify Web API clients.
//!
//! `SpotifyClient` searches the catalog with an app token from the
//! client-credentials flow. `SpotifyPublisher` writes playlists and needs a
//! user access token, which this tool does not obtain itself.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::{Credentials, SpotifyConfig};
use crate::error::{ConfigError, PublishError, SearchError};
use crate::models::{CandidateTrack, PlaylistEntry};
use crate::publish::{PlaylistPublisher, PLAYLIST_ADD_LIMIT};
use crate::search::{CandidateSearcher, SEARCH_RESULT_LIMIT};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Page<TrackObject>>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

/// Candidates from a search response body, in API order. Local files and
/// tracks without artists cannot be matched and are skipped.
pub fn parse_search_response(body: &str) -> Result<Vec<CandidateTrack>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    Ok(response
        .tracks
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|track| {
            let id = track.id?;
            let artist = track.artists.into_iter().next()?.name;
            Some(CandidateTrack::new(id, track.name, artist))
        })
        .collect())
}

/// One page of playlist items plus the next page URL.
fn parse_playlist_page(body: &str) -> Result<(Vec<PlaylistEntry>, Option<String>), PublishError> {
    let page: Page<PlaylistItem> =
        serde_json::from_str(body).map_err(|e| PublishError::Decode(e.to_string()))?;

    let entries = page
        .items
        .into_iter()
        .flatten()
        .filter_map(|item| item.track)
        .map(|track| PlaylistEntry {
            artist: track
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            title: track.name,
        })
        .collect();
    Ok((entries, page.next))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Error for a non-success search response. 429 carries the server's
/// Retry-After (seconds form only) so the retry layer can wait it out.
fn status_error(status: StatusCode, headers: &HeaderMap, body: String) -> SearchError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        SearchError::RateLimited(retry_after(headers))
    } else {
        SearchError::Api {
            status: status.as_u16(),
            message: body,
        }
    }
}

/// Run `call`; on a 401 refresh the token once and run it again.
fn with_token_refresh<T>(
    mut call: impl FnMut() -> Result<T, SearchError>,
    refresh: impl FnOnce() -> Result<(), SearchError>,
) -> Result<T, SearchError> {
    match call() {
        Err(SearchError::Api { status: 401, .. }) => {
            refresh()?;
            call()
        }
        other => other,
    }
}

/// Append path segments to a base URL, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn http_client(config: &SpotifyConfig) -> Result<Client, ConfigError> {
    if config.api_base.cannot_be_a_base() || config.accounts_base.cannot_be_a_base() {
        return Err(ConfigError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

// ============================================================================
// Search Client
// ============================================================================

fn search_url(api_base: &Url, query: &str, limit: usize) -> Url {
    let mut url = endpoint(api_base, &["search"]);
    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("type", "track")
        .append_pair("limit", &limit.clamp(1, SEARCH_RESULT_LIMIT).to_string());
    url
}

/// Client-credentials exchange against the accounts service.
fn request_token(http: &Client, token_url: &Url, credentials: &Credentials) -> Result<String, ConfigError> {
    debug!("Request: POST {}", token_url);
    let response = http
        .post(token_url.clone())
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .map_err(|e| ConfigError::TokenExchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .unwrap_or_else(|_| "Could not read error body".to_string());
        return Err(ConfigError::TokenExchange(format!("{}: {}", status, text)));
    }
    let token: TokenResponse = response
        .json()
        .map_err(|e| ConfigError::TokenExchange(e.to_string()))?;
    Ok(token.access_token)
}

/// App tokens expire after an hour; long runs refresh on the first 401.
pub struct SpotifyClient {
    http: Client,
    api_base: Url,
    token_url: Url,
    credentials: Credentials,
    token: RwLock<String>,
}

impl SpotifyClient {
    /// Exchange client credentials for an app token.
    pub fn connect(credentials: &Credentials, config: &SpotifyConfig) -> Result<Self, ConfigError> {
        let http = http_client(config)?;
        let token_url = endpoint(&config.accounts_base, &["api", "token"]);
        let token = request_token(&http, &token_url, credentials)?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            token_url,
            credentials: credentials.clone(),
            token: RwLock::new(token),
        })
    }

    fn current_token(&self) -> String {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn refresh_token(&self) -> Result<(), SearchError> {
        info!("app token rejected, requesting a new one");
        let fresh = request_token(&self.http, &self.token_url, &self.credentials).map_err(|e| {
            SearchError::Api {
                status: 401,
                message: e.to_string(),
            }
        })?;
        match self.token.write() {
            Ok(mut token) => *token = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }

    fn search_once(&self, url: &Url) -> Result<Vec<CandidateTrack>, SearchError> {
        debug!("Request: GET {}", url);
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(self.current_token())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response
                .text()
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(status_error(status, &headers, body));
        }
        let body = response.text()?;
        parse_search_response(&body)
    }
}

impl CandidateSearcher for SpotifyClient {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateTrack>, SearchError> {
        let url = search_url(&self.api_base, query, limit);
        with_token_refresh(|| self.search_once(&url), || self.refresh_token())
    }

    fn max_limit(&self) -> usize {
        SEARCH_RESULT_LIMIT
    }
}

// ============================================================================
// Playlist Publisher
// ============================================================================

pub struct SpotifyPublisher {
    http: Client,
    api_base: Url,
    token: String,
    /// Owner of created playlists; looked up via /me when unset
    user_id: Option<String>,
}

impl SpotifyPublisher {
    pub fn new(credentials: &Credentials, config: &SpotifyConfig) -> Result<Self, crate::Error> {
        let token = credentials
            .user_token
            .clone()
            .ok_or(PublishError::MissingUserToken)?;
        Ok(Self {
            http: http_client(config)?,
            api_base: config.api_base.clone(),
            token,
            user_id: credentials.account_name.clone(),
        })
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, PublishError> {
        let response = request.bearer_auth(&self.token).send()?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response
                .text()
                .unwrap_or_else(|_| "Could not read error body".to_string());
            Err(PublishError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PublishError> {
        let body = self.send(request)?.text()?;
        serde_json::from_str(&body).map_err(|e| PublishError::Decode(e.to_string()))
    }

    fn current_user(&self) -> Result<String, PublishError> {
        if let Some(id) = &self.user_id {
            return Ok(id.clone());
        }
        let url = endpoint(&self.api_base, &["me"]);
        debug!("Request: GET {}", url);
        let me: IdObject = self.send_json(self.http.get(url))?;
        Ok(me.id)
    }
}

impl PlaylistPublisher for SpotifyPublisher {
    fn create_playlist(&self, name: &str) -> Result<String, PublishError> {
        let user = self.current_user()?;
        let url = endpoint(&self.api_base, &["users", &user, "playlists"]);
        debug!("Request: POST {}", url);
        let created: IdObject = self.send_json(
            self.http
                .post(url)
                .json(&json!({ "name": name, "public": false })),
        )?;
        Ok(created.id)
    }

    fn add_tracks(&self, playlist_id: &str, ids: &[String]) -> Result<(), PublishError> {
        let uris: Vec<String> = ids.iter().map(|id| format!("spotify:track:{}", id)).collect();
        let url = endpoint(&self.api_base, &["playlists", playlist_id, "tracks"]);
        debug!("Request: POST {} ({} tracks)", url, uris.len());
        self.send(self.http.post(url).json(&json!({ "uris": uris })))?;
        Ok(())
    }

    fn list_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>, PublishError> {
        let mut url = endpoint(&self.api_base, &["playlists", playlist_id, "tracks"]);
        url.query_pairs_mut()
            .append_pair("limit", &PLAYLIST_ADD_LIMIT.to_string())
            .append_pair("fields", "items(track(name,artists(name))),next");

        let mut entries = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(page_url) = next {
            debug!("Request: GET {}", page_url);
            let body = self.send(self.http.get(&page_url))?.text()?;
            let (page, next_url) = parse_playlist_page(&body)?;
            entries.extend(page);
            next = next_url;
        }
        Ok(entries)
    }

    fn batch_limit(&self) -> usize {
        PLAYLIST_ADD_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const SEARCH_FIXTURE: &str = r#"{
        "tracks": {
            "href": "https://api.spotify.com/v1/search?query=queen&type=track",
            "items": [
                {
                    "id": "4u7EnebtmKWzUH433cf5Qv",
                    "name": "Bohemian Rhapsody",
                    "artists": [{"id": "1dfeR4HaWDbWqFHLkxsg1d", "name": "Queen"}],
                    "duration_ms": 354320
                },
                {
                    "id": null,
                    "name": "Local File",
                    "artists": [{"name": "Someone"}]
                },
                {
                    "id": "no-artist",
                    "name": "Orphan",
                    "artists": []
                },
                {
                    "id": "2",
                    "name": "Under Pressure",
                    "artists": [{"name": "Queen"}, {"name": "David Bowie"}]
                }
            ],
            "limit": 15,
            "next": null,
            "offset": 0,
            "total": 2
        }
    }"#;

    #[test]
    fn test_parse_search_response() {
        let candidates = parse_search_response(SEARCH_FIXTURE).unwrap();
        assert_eq!(
            candidates,
            vec![
                CandidateTrack::new("4u7EnebtmKWzUH433cf5Qv", "Bohemian Rhapsody", "Queen"),
                CandidateTrack::new("2", "Under Pressure", "Queen"),
            ]
        );
    }

    #[test]
    fn test_parse_empty_search() {
        let body = r#"{"tracks": {"items": [], "next": null}}"#;
        assert!(parse_search_response(body).unwrap().is_empty());
        assert!(parse_search_response("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_search() {
        let err = parse_search_response("not json").unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn test_parse_playlist_page() {
        let body = r#"{
            "items": [
                {"track": {"name": "Bohemian Rhapsody", "artists": [{"name": "Queen"}]}},
                {"track": null},
                {"track": {"name": "Untitled", "artists": []}}
            ],
            "next": "https://api.spotify.com/v1/playlists/p/tracks?offset=100"
        }"#;
        let (entries, next) = parse_playlist_page(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label(), "Queen - Bohemian Rhapsody");
        assert_eq!(entries[1].artist, "");
        assert!(next.unwrap().contains("offset=100"));
    }

    #[test]
    fn test_search_url() {
        let base = Url::parse(crate::config::SPOTIFY_API_BASE).unwrap();
        let url = search_url(&base, "queen bohemian rhapsody", 15);
        assert_eq!(url.path(), "/v1/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "queen bohemian rhapsody".into())));
        assert!(pairs.contains(&("type".into(), "track".into())));
        assert!(pairs.contains(&("limit".into(), "15".into())));

        let url = search_url(&base, "x", 500);
        assert!(url.query().unwrap().contains("limit=50"));
    }

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after(" 7 "),
            String::new(),
        );
        assert!(matches!(err, SearchError::RateLimited(Some(d)) if d == Duration::from_secs(7)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_rate_limit_without_usable_retry_after() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), String::new());
        assert!(matches!(err, SearchError::RateLimited(None)));

        // HTTP-date form is not interpreted
        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            String::new(),
        );
        assert!(matches!(err, SearchError::RateLimited(None)));
    }

    #[test]
    fn test_status_errors_transience() {
        let server = status_error(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "down".into());
        assert!(matches!(&server, SearchError::Api { status: 502, message } if message == "down"));
        assert!(server.is_transient());

        let client = status_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), "bad".into());
        assert!(matches!(client, SearchError::Api { status: 400, .. }));
        assert!(!client.is_transient());
    }

    #[test]
    fn test_unauthorized_refreshes_once() {
        let mut calls = 0;
        let mut refreshed = false;
        let result = with_token_refresh(
            || {
                calls += 1;
                if calls == 1 {
                    Err(SearchError::Api {
                        status: 401,
                        message: "The access token expired".into(),
                    })
                } else {
                    Ok(vec![CandidateTrack::new("1", "Song", "Band")])
                }
            },
            || {
                refreshed = true;
                Ok(())
            },
        );
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(calls, 2);
        assert!(refreshed);
    }

    #[test]
    fn test_persistent_unauthorized_is_not_looped() {
        let mut calls = 0;
        let result: Result<Vec<CandidateTrack>, SearchError> = with_token_refresh(
            || {
                calls += 1;
                Err(SearchError::Api {
                    status: 401,
                    message: "invalid client".into(),
                })
            },
            || Ok(()),
        );
        assert!(matches!(result, Err(SearchError::Api { status: 401, .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_failed_refresh_skips_second_call() {
        let mut calls = 0;
        let result: Result<Vec<CandidateTrack>, SearchError> = with_token_refresh(
            || {
                calls += 1;
                Err(SearchError::Api {
                    status: 401,
                    message: "expired".into(),
                })
            },
            || Err(SearchError::Transport("accounts unreachable".into())),
        );
        assert!(matches!(result, Err(SearchError::Transport(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_other_errors_do_not_refresh() {
        let mut refreshed = false;
        let result: Result<Vec<CandidateTrack>, SearchError> =
            with_token_refresh(|| Err(SearchError::Timeout), || {
                refreshed = true;
                Ok(())
            });
        assert!(matches!(result, Err(SearchError::Timeout)));
        assert!(!refreshed);
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://api.spotify.com/v1/").unwrap();
        let url = endpoint(&base, &["users", "some user", "playlists"]);
        assert_eq!(url.as_str(), "https://api.spotify.com/v1/users/some%20user/playlists");
    }

    #[test]
    fn test_publisher_requires_user_token() {
        let credentials = Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            account_name: None,
            user_token: None,
        };
        let config = SpotifyConfig::spotify().unwrap();
        let err = SpotifyPublisher::new(&credentials, &config).err().unwrap();
        assert!(matches!(err, crate::Error::Publish(PublishError::MissingUserToken)));
    }
}
