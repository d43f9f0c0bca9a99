use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use super::{AudioFormat, AudioHandle, MediaError, MediaResolver, VideoInfo};
use crate::utils::http_client;

/// YouTube Data API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

static RE_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Extract the 11-character video id from the URL shapes YouTube hands out:
/// watch URLs, `youtu.be` short links, and embed/shorts/live/`v` paths.
pub fn extract_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_lowercase();

    let candidate = if host == "youtu.be" || host == "www.youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
        let mut segments = url.path_segments()?;
        match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            "embed" | "v" | "shorts" | "live" => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| RE_VIDEO_ID.is_match(id))
}

/// Parse an ISO 8601 duration such as `PT1H2M3S` into seconds
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut total = 0u64;
    let mut seen_component = false;

    let mut accumulate = |part: &str, units: &[(char, u64)]| -> Option<()> {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() {
                number.push(ch);
                continue;
            }
            let (_, factor) = units.iter().find(|(unit, _)| *unit == ch)?;
            let amount: u64 = number.parse().ok()?;
            total = total.checked_add(amount.checked_mul(*factor)?)?;
            number.clear();
            seen_component = true;
        }
        number.is_empty().then_some(())
    };

    accumulate(date_part, &[('W', 604_800), ('D', 86_400)])?;
    if let Some(time) = time_part {
        if time.is_empty() {
            return None;
        }
        accumulate(time, &[('H', 3600), ('M', 60), ('S', 1)])?;
    }

    seen_component.then_some(total)
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Snippet,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

/// YouTube resolver: metadata from the Data API, audio through yt-dlp
pub struct YoutubeResolver {
    client: reqwest::Client,
    api_base_url: String,
    api_key: String,
    yt_dlp_path: String,
}

impl YoutubeResolver {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(REQUEST_TIMEOUT),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: api_key.into(),
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }

    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_yt_dlp_path(mut self, path: impl Into<String>) -> Self {
        self.yt_dlp_path = path.into();
        self
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn fetch_metadata(&self, video_id: &str, source_url: &str) -> Result<VideoInfo, MediaError> {
        tracing::debug!("Fetching video metadata for: {}", video_id);

        let response = self
            .client
            .get(format!("{}/videos", self.api_base_url))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MediaError::MetadataRequest(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "YouTube Data API refused the request");
            return Err(MediaError::QuotaOrAuthExhausted(format!("HTTP {}", status)));
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MediaError::MetadataRequest(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "YouTube Data API rejected the request");
            return Err(MediaError::MetadataRejected(format!("HTTP {}", status)));
        }

        let list: VideoListResponse = response
            .json()
            .await
            .map_err(|e| MediaError::MetadataParse(e.to_string()))?;

        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MediaError::VideoNotFound(video_id.to_string()))?;

        let duration_seconds = parse_iso8601_duration(&item.content_details.duration)
            .ok_or_else(|| {
                MediaError::MetadataParse(format!(
                    "unsupported duration '{}'",
                    item.content_details.duration
                ))
            })?;

        Ok(VideoInfo {
            id: item.id,
            title: item.snippet.title,
            duration_seconds,
            channel_title: item.snippet.channel_title,
            source_url: source_url.to_string(),
        })
    }
}

#[async_trait]
impl MediaResolver for YoutubeResolver {
    fn video_id(&self, url: &str) -> Result<String, MediaError> {
        extract_video_id(url).ok_or_else(|| MediaError::InvalidVideoReference(url.to_string()))
    }

    async fn video_info(&self, url: &str) -> Result<VideoInfo, MediaError> {
        let video_id = self.video_id(url)?;
        self.fetch_metadata(&video_id, url).await
    }

    async fn download_audio(
        &self,
        info: &VideoInfo,
        dir: &Path,
    ) -> Result<AudioHandle, MediaError> {
        if !self.check_availability().await {
            return Err(MediaError::DownloadFailed(
                "yt-dlp is not available. Please install it: https://github.com/yt-dlp/yt-dlp"
                    .to_string(),
            ));
        }

        let handle = AudioHandle::create_in(dir, AudioFormat::Mp3)?;
        // yt-dlp fills in the extension itself after converting to mp3
        let template = handle.path().with_extension("%(ext)s");
        let watch_url = format!("https://www.youtube.com/watch?v={}", info.id);

        tracing::debug!("Downloading audio for {} to {}", info.id, handle.path().display());

        let output = Command::new(&self.yt_dlp_path)
            .arg("--output")
            .arg(&template)
            .args([
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "9",
                "--format",
                "worstaudio[acodec^=mp4a]/worstaudio[ext=m4a]/worstaudio[ext=mp3]/worstaudio",
                "--no-playlist",
                "--force-overwrites",
                "--concurrent-fragments",
                "4",
                "--newline",
                &watch_url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            tracing::error!(video_id = %info.id, "yt-dlp failed: {}", error.trim());
            return Err(MediaError::DownloadFailed(format!(
                "yt-dlp exited with {}",
                output.status
            )));
        }

        let size = fs_err::metadata(handle.path())?.len();
        if size == 0 {
            return Err(MediaError::DownloadFailed("downloaded audio is empty".to_string()));
        }

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_video_id_from_supported_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "http://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ",
        ];
        for case in cases {
            assert_eq!(
                extract_video_id(case).as_deref(),
                Some("dQw4w9WgXcQ"),
                "failed for {}",
                case
            );
        }
    }

    #[test]
    fn test_extract_video_id_rejects_other_urls() {
        let cases = [
            "https://example.com/not-a-video",
            "https://www.youtube.com/channel/UC123",
            "https://www.youtube.com/watch?list=PL123",
            "https://youtu.be/short",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
            "not a url",
        ];
        for case in cases {
            assert_eq!(extract_video_id(case), None, "accepted {}", case);
        }
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT15M"), Some(900));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("1H"), None);
        assert_eq!(parse_iso8601_duration("PT5X"), None);
        assert_eq!(parse_iso8601_duration("PT12"), None);
    }

    fn video_json() -> serde_json::Value {
        serde_json::json!({
            "items": [{
                "id": "dQw4w9WgXcQ",
                "snippet": { "title": "Rust in 100 Seconds", "channelTitle": "Fireship" },
                "contentDetails": { "duration": "PT2M19S" }
            }]
        })
    }

    #[tokio::test]
    async fn test_video_info_from_data_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "dQw4w9WgXcQ"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_json()))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = YoutubeResolver::new("yt-key").with_api_base_url(server.uri());
        let info = resolver
            .video_info("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();

        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Rust in 100 Seconds");
        assert_eq!(info.channel_title, "Fireship");
        assert_eq!(info.duration_seconds, 139);
        assert_eq!(info.source_url, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_quota_or_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let resolver = YoutubeResolver::new("yt-key").with_api_base_url(server.uri());
        let err = resolver
            .video_info("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::QuotaOrAuthExhausted(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_item_list_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .mount(&server)
            .await;

        let resolver = YoutubeResolver::new("yt-key").with_api_base_url(server.uri());
        let err = resolver
            .video_info("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::VideoNotFound(id) if id == "dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_json()))
            .expect(0)
            .mount(&server)
            .await;

        let resolver = YoutubeResolver::new("yt-key").with_api_base_url(server.uri());
        let err = resolver
            .video_info("https://example.com/not-a-video")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideoReference(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolver = YoutubeResolver::new("yt-key").with_api_base_url(server.uri());
        let err = resolver
            .video_info("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_yt_dlp_fails_download() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = YoutubeResolver::new("yt-key").with_yt_dlp_path("/nonexistent/yt-dlp");
        let info = VideoInfo {
            id: "dQw4w9WgXcQ".to_string(),
            title: "t".to_string(),
            duration_seconds: 1,
            channel_title: "c".to_string(),
            source_url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
        };

        let err = resolver.download_audio(&info, dir.path()).await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed(_)));
        assert_eq!(fs_err::read_dir(dir.path()).unwrap().count(), 0);
    }
}
