//! Song search clients
//!
//! Resolves a free-text keyword to an ordered list of [`SongCandidate`]s.
//! Two NetEase flavours are supported, selected by `default_api`:
//! - `netease_nodejs`: a self-hosted NeteaseCloudMusicApi instance
//! - `netease`: the public web search endpoint

use crate::models::SongCandidate;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vcover_common::config::SearchApi;
use vcover_common::BotConfig;

const NETEASE_WEB_SEARCH_URL: &str = "https://music.163.com/api/search/get/web";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) vcover/0.1.0";
const SEARCH_TIMEOUT_SECS: u64 = 30;
/// NetEase search type for single songs
const SEARCH_TYPE_SONG: u32 = 1;

/// Song search errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Song search collaborator
#[async_trait]
pub trait SongSearch: Send + Sync {
    /// Up to `limit` candidates for `keyword`, best match first
    async fn fetch_data(&self, keyword: &str, limit: usize)
        -> Result<Vec<SongCandidate>, SearchError>;
}

/// NetEase search response (shared by both endpoints)
#[derive(Debug, Deserialize)]
struct NeteaseSearchResponse {
    #[serde(default)]
    result: Option<NeteaseSearchResult>,
}

#[derive(Debug, Deserialize)]
struct NeteaseSearchResult {
    #[serde(default)]
    songs: Option<Vec<NeteaseSong>>,
}

#[derive(Debug, Deserialize)]
struct NeteaseSong {
    id: u64,
    name: String,
    /// `/search` uses `artists`, `/cloudsearch` uses `ar`
    #[serde(default, alias = "ar")]
    artists: Vec<NeteaseArtist>,
}

#[derive(Debug, Deserialize)]
struct NeteaseArtist {
    #[serde(default)]
    name: Option<String>,
}

fn into_candidates(response: NeteaseSearchResponse, limit: usize) -> Vec<SongCandidate> {
    response
        .result
        .and_then(|r| r.songs)
        .unwrap_or_default()
        .into_iter()
        .take(limit)
        .map(|song| SongCandidate {
            id: song.id.to_string(),
            name: song.name,
            artists: song
                .artists
                .into_iter()
                .filter_map(|a| a.name)
                .collect::<Vec<_>>()
                .join("/"),
        })
        .collect()
}

fn build_http_client() -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| SearchError::NetworkError(e.to_string()))
}

async fn read_search_response(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<SongCandidate>, SearchError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(SearchError::ApiError(status.as_u16(), error_text));
    }

    let parsed: NeteaseSearchResponse = response
        .json()
        .await
        .map_err(|e| SearchError::ParseError(e.to_string()))?;

    Ok(into_candidates(parsed, limit))
}

/// Client for a self-hosted NeteaseCloudMusicApi instance
pub struct NetEaseNodeJsClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl NetEaseNodeJsClient {
    pub fn new(base_url: &str) -> Result<Self, SearchError> {
        Ok(Self {
            http_client: build_http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SongSearch for NetEaseNodeJsClient {
    async fn fetch_data(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SongCandidate>, SearchError> {
        let url = format!("{}/search", self.base_url);
        tracing::debug!(keyword = %keyword, url = %url, "Querying NeteaseCloudMusicApi");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("keywords", keyword.to_string()),
                ("limit", limit.to_string()),
                ("type", SEARCH_TYPE_SONG.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::NetworkError(e.to_string()))?;

        let songs = read_search_response(response, limit).await?;
        tracing::info!(keyword = %keyword, hits = songs.len(), "Song search finished");
        Ok(songs)
    }
}

/// Client for the public NetEase web search endpoint
pub struct NetEaseClient {
    http_client: reqwest::Client,
    search_url: String,
}

impl NetEaseClient {
    pub fn new() -> Result<Self, SearchError> {
        Ok(Self {
            http_client: build_http_client()?,
            search_url: NETEASE_WEB_SEARCH_URL.to_string(),
        })
    }
}

#[async_trait]
impl SongSearch for NetEaseClient {
    async fn fetch_data(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SongCandidate>, SearchError> {
        tracing::debug!(keyword = %keyword, "Querying NetEase web search");

        let response = self
            .http_client
            .post(&self.search_url)
            .header(reqwest::header::REFERER, "https://music.163.com/")
            .form(&[
                ("s", keyword.to_string()),
                ("type", SEARCH_TYPE_SONG.to_string()),
                ("limit", limit.to_string()),
                ("offset", "0".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::NetworkError(e.to_string()))?;

        let songs = read_search_response(response, limit).await?;
        tracing::info!(keyword = %keyword, hits = songs.len(), "Song search finished");
        Ok(songs)
    }
}

/// Build the search client selected by `default_api`
pub fn build_song_search(config: &BotConfig) -> Result<Arc<dyn SongSearch>, SearchError> {
    match config.default_api {
        SearchApi::NeteaseNodejs => {
            Ok(Arc::new(NetEaseNodeJsClient::new(&config.nodejs_base_url)?))
        }
        SearchApi::Netease => Ok(Arc::new(NetEaseClient::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> NeteaseSearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_search_shape() {
        let response = parse(
            r#"{"code":200,"result":{"songCount":2,"songs":[
                {"id":186016,"name":"晴天","artists":[{"id":6452,"name":"周杰伦"}]},
                {"id":5257138,"name":"屋顶","artists":[{"name":"周杰伦"},{"name":"温岚"}]}
            ]}}"#,
        );
        let songs = into_candidates(response, 10);

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].id, "186016");
        assert_eq!(songs[0].name, "晴天");
        assert_eq!(songs[1].artists, "周杰伦/温岚");
    }

    #[test]
    fn test_cloudsearch_shape_uses_ar() {
        let response = parse(r#"{"result":{"songs":[{"id":1,"name":"x","ar":[{"name":"y"}]}]}}"#);
        assert_eq!(into_candidates(response, 10)[0].artists, "y");
    }

    #[test]
    fn test_missing_songs_is_empty() {
        assert!(into_candidates(parse(r#"{"result":{"songCount":0}}"#), 10).is_empty());
        assert!(into_candidates(parse(r#"{"code":400}"#), 10).is_empty());
    }

    #[test]
    fn test_limit_applied() {
        let response = parse(
            r#"{"result":{"songs":[{"id":1,"name":"a"},{"id":2,"name":"b"},{"id":3,"name":"c"}]}}"#,
        );
        assert_eq!(into_candidates(response, 2).len(), 2);
    }

    #[test]
    fn test_nodejs_base_url_normalized() {
        let client = NetEaseNodeJsClient::new("http://127.0.0.1:3000/").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:3000");
    }
}
