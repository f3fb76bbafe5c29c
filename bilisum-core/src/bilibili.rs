//! Bilibili content fetcher
//!
//! Turns a video URL into a title plus a plain-text transcript by walking the
//! public web API:
//! - `/x/web-interface/view` for title, description, `aid` and `cid`
//! - `/x/player/v2` for the subtitle track listing
//! - the first track's BCC JSON for the subtitle lines
//! - `/x/v2/reply` for hot comments (optional, failures degrade to empty)
//!
//! Every endpoint wraps its payload in `{code, message, data}`; a non-zero
//! `code` is surfaced as [`FetchError::Upstream`] with the upstream message.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::config::BilibiliConfig;

static BVID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BV[a-zA-Z0-9]+").expect("BV id pattern is valid"));

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Reply listing sort order: by likes, which is what the web player shows as "hot".
const HOT_SORT: &str = "1";

/// Reply listing type for ordinary video comments.
const VIDEO_REPLY_TYPE: &str = "1";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid Bilibili URL. Could not find BV ID.")]
    InvalidUrl,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch {endpoint}: HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Failed to fetch {endpoint}: {message}")]
    Upstream {
        endpoint: &'static str,
        code: i64,
        message: String,
    },

    #[error("Failed to fetch {endpoint}: response has no data")]
    MissingData { endpoint: &'static str },
}

/// Everything the summary step needs about one video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoContent {
    pub bvid: String,
    pub title: String,
    pub description: String,
    pub transcript: String,
    /// `None` when comment fetching is disabled.
    pub comments: Option<Vec<String>>,
}

// ============================================================================
// Wire structs
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    aid: i64,
    cid: i64,
    title: String,
    #[serde(default)]
    desc: String,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    #[serde(default)]
    subtitle: Option<SubtitleListing>,
}

#[derive(Debug, Deserialize)]
struct SubtitleListing {
    #[serde(default)]
    subtitles: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleTrack {
    #[serde(default)]
    pub lan: String,
    #[serde(rename = "subtitle_url", alias = "url")]
    pub url: String,
}

/// BCC subtitle document (the JSON format Bilibili serves subtitle tracks in).
#[derive(Debug, Deserialize)]
pub struct SubtitleBody {
    #[serde(default)]
    pub body: Vec<SubtitleLine>,
}

#[derive(Debug, Deserialize)]
pub struct SubtitleLine {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ReplyPage {
    #[serde(default)]
    replies: Option<Vec<Reply>>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    content: ReplyContent,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    message: String,
}

// ============================================================================
// Pure helpers
// ============================================================================

/// First `BV...` token in the URL, if any.
pub fn extract_bvid(url: &str) -> Option<&str> {
    BVID_RE.find(url).map(|m| m.as_str())
}

/// Subtitle listings hand out protocol-relative URLs (`//aisubtitle.hdslb.com/...`).
pub fn absolute_subtitle_url(raw: &str) -> String {
    if raw.starts_with("//") {
        format!("https:{}", raw)
    } else {
        raw.to_string()
    }
}

/// Subtitle lines in listed order, one per line.
pub fn join_subtitle_lines(body: &SubtitleBody) -> String {
    body.body
        .iter()
        .map(|line| line.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript used when a video has no usable subtitle track.
pub fn description_fallback(description: &str) -> String {
    format!("No subtitles found. Description: {}", description)
}

// ============================================================================
// BilibiliClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct BilibiliClient {
    client: Client,
    config: BilibiliConfig,
    base_url: String,
}

impl BilibiliClient {
    pub fn new(config: BilibiliConfig) -> Result<Self, FetchError> {
        let base_url = config.api_base.clone();
        Self::with_base_url(config, base_url)
    }

    /// Create a client against a custom API base (for testing against a mock server)
    pub fn with_base_url(config: BilibiliConfig, base_url: String) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.bilibili.com"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch title, transcript and (if enabled) hot comments for a video URL.
    ///
    /// Fails with [`FetchError::InvalidUrl`] before any request when the URL
    /// carries no BV id. A comments failure never fails the fetch.
    pub async fn fetch(&self, url: &str) -> Result<VideoContent, FetchError> {
        let bvid = extract_bvid(url).ok_or(FetchError::InvalidUrl)?.to_string();

        let view = self.fetch_view(&bvid).await?;
        tracing::debug!(bvid = %bvid, cid = view.cid, "Fetched video info");

        let tracks = self.fetch_subtitle_tracks(&bvid, view.cid).await?;
        let transcript = match tracks.first() {
            Some(track) => {
                tracing::debug!(bvid = %bvid, lan = %track.lan, tracks = tracks.len(), "Downloading subtitle track");
                self.fetch_subtitle_text(&bvid, &track.url).await?
            }
            None => String::new(),
        };

        let transcript = if transcript.is_empty() {
            description_fallback(&view.desc)
        } else {
            transcript
        };

        let comments = if self.config.include_comments {
            match self.fetch_comments(view.aid).await {
                Ok(comments) => Some(comments),
                Err(e) => {
                    tracing::warn!(bvid = %bvid, error = %e, "Comment fetch failed, continuing without comments");
                    Some(Vec::new())
                }
            }
        } else {
            None
        };

        Ok(VideoContent {
            bvid,
            title: view.title,
            description: view.desc,
            transcript,
            comments,
        })
    }

    /// Top-level comments of a video in hot order, one string per reply.
    pub async fn fetch_comments(&self, aid: i64) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/x/v2/reply", self.base_url);
        let page: ReplyPage = self
            .get_envelope(
                "comments",
                &url,
                &[
                    ("type", VIDEO_REPLY_TYPE.to_string()),
                    ("oid", aid.to_string()),
                    ("sort", HOT_SORT.to_string()),
                    ("ps", self.config.comment_page_size.to_string()),
                ],
            )
            .await?;

        Ok(page
            .replies
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.content.message)
            .filter(|m| !m.is_empty())
            .collect())
    }

    async fn fetch_view(&self, bvid: &str) -> Result<ViewData, FetchError> {
        let url = format!("{}/x/web-interface/view", self.base_url);
        self.get_envelope("video info", &url, &[("bvid", bvid.to_string())])
            .await
    }

    async fn fetch_subtitle_tracks(
        &self,
        bvid: &str,
        cid: i64,
    ) -> Result<Vec<SubtitleTrack>, FetchError> {
        let url = format!("{}/x/player/v2", self.base_url);
        let player: PlayerData = self
            .get_envelope(
                "subtitles",
                &url,
                &[("bvid", bvid.to_string()), ("cid", cid.to_string())],
            )
            .await?;

        Ok(player.subtitle.map(|s| s.subtitles).unwrap_or_default())
    }

    /// Joined lines of one subtitle track. A document that is not BCC JSON
    /// yields an empty string so the caller falls back to the description.
    async fn fetch_subtitle_text(&self, bvid: &str, raw_url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(absolute_subtitle_url(raw_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: "subtitle track",
                status: status.as_u16(),
            });
        }

        let raw = response.text().await?;
        match serde_json::from_str::<SubtitleBody>(&raw) {
            Ok(body) => Ok(join_subtitle_lines(&body)),
            Err(e) => {
                tracing::warn!(bvid = %bvid, error = %e, "Subtitle track is not BCC JSON, ignoring it");
                Ok(String::new())
            }
        }
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(endpoint, status = status.as_u16(), "Bilibili API returned HTTP error");
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != 0 {
            tracing::error!(endpoint, code = envelope.code, message = %envelope.message, "Bilibili API error");
            return Err(FetchError::Upstream {
                endpoint,
                code: envelope.code,
                message: envelope.message,
            });
        }

        envelope.data.ok_or(FetchError::MissingData { endpoint })
    }
}

// ============================================================================
// TESTS
// ============================================================================
