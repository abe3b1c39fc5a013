use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{InputKind, MediaResolver, MediaStream, SearchResult, StreamKind};

static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://(?:(?:www|m|music)\.)?(?:youtube\.com/(?:watch\?(?:\S*&)?v=|shorts/|embed/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[?&#/]\S*)?$",
    )
    .expect("regex de video inválida")
});

static PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)/\S*[?&]list=(?:PL|UU|LL|RD|OL)[A-Za-z0-9_-]{10,}(?:&\S*)?$",
    )
    .expect("regex de playlist inválida")
});

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("regex de id inválida"));

static PLAYLIST_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:PL|UU|LL|RD|OL)[A-Za-z0-9_-]{16,41}$").expect("regex de id inválida")
});

/// Clasifica una entrada como video, playlist, búsqueda o basura.
///
/// `https` inputs must be recognisable YouTube links; anything else that is
/// not a bare video/playlist id is treated as a search query.
pub fn classify(input: &str) -> InputKind {
    let input = input.trim();
    if input.is_empty() {
        return InputKind::Invalid;
    }

    if input.starts_with("https") {
        if input.contains("list=") && PLAYLIST_URL.is_match(input) {
            InputKind::Playlist
        } else if VIDEO_URL.is_match(input) {
            InputKind::Video
        } else {
            InputKind::Invalid
        }
    } else if VIDEO_ID.is_match(input) {
        InputKind::Video
    } else if PLAYLIST_ID.is_match(input) {
        InputKind::Playlist
    } else {
        InputKind::Search
    }
}

/// Extrae el id de 11 caracteres de un enlace de video
pub fn video_id(url: &str) -> Option<&str> {
    VIDEO_URL
        .captures(url.trim())
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str())
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Entrada de `ytsearchN:` con `--flat-playlist`
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

/// Formato seleccionado por `-f bestaudio/best`
#[derive(Debug, Deserialize)]
struct SelectedFormat {
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
}

/// Convierte la salida de una búsqueda (una línea JSON por resultado).
///
/// Only entries that resolve to a single watchable video are kept.
fn parse_search_output(stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .filter_map(|entry| {
            let url = entry
                .url
                .as_deref()
                .and_then(|raw| Url::parse(raw).ok())
                .and_then(|parsed| video_id(parsed.as_str()).map(watch_url))
                .or_else(|| VIDEO_ID.is_match(&entry.id).then(|| watch_url(&entry.id)))?;

            Some(SearchResult {
                title: entry.title.unwrap_or_else(|| url.clone()),
                duration: entry
                    .duration
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64),
                url,
            })
        })
        .collect()
}

fn parse_stream_output(stdout: &str, offset: Duration) -> Result<MediaStream> {
    let format: SelectedFormat =
        serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;

    let url = format
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| anyhow::anyhow!("yt-dlp no devolvió URL de stream"))?;

    Ok(MediaStream {
        url,
        kind: StreamKind::from_format(
            format.ext.as_deref().unwrap_or_default(),
            format.acodec.as_deref(),
        ),
        start: offset,
    })
}

/// Resolver de YouTube basado en yt-dlp
pub struct YtDlpResolver {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, concurrency: usize) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    /// Verifica que yt-dlp esté disponible y devuelve su versión
    pub async fn verify_dependencies(&self) -> Result<String> {
        let version = self.run(&["--version"]).await?;
        let version = version.trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Error al ejecutar {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn classify(&self, input: &str) -> InputKind {
        classify(input)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        let mut results = parse_search_output(&stdout);
        results.truncate(limit);

        if results.is_empty() {
            warn!("📭 Sin resultados para: {}", query);
        }
        Ok(results)
    }

    async fn stream(&self, track: &str, offset: Duration) -> Result<MediaStream> {
        debug!(
            "🎵 Obteniendo stream para {} desde {}",
            track,
            humantime::format_duration(offset)
        );

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                track,
            ])
            .await?;

        let stream = parse_stream_output(&stdout, offset)?;
        info!("✅ Stream {} resuelto para {}", stream.kind.as_str(), track);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_video_url_detection() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            InputKind::Video
        );
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ?si=abc"), InputKind::Video);
        assert_eq!(
            classify("https://music.youtube.com/watch?v=dQw4w9WgXcQ&feature=share"),
            InputKind::Video
        );
        assert_eq!(
            classify("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            InputKind::Video
        );
        assert_eq!(classify("https://example.com/video"), InputKind::Invalid);
        assert_eq!(classify("https://www.youtube.com/watch?v=short"), InputKind::Invalid);
    }

    #[test]
    fn test_playlist_detection() {
        assert_eq!(
            classify("https://www.youtube.com/playlist?list=PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI"),
            InputKind::Playlist
        );
        assert_eq!(
            classify("PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI"),
            InputKind::Playlist
        );
    }

    #[test]
    fn test_plain_text_is_search() {
        assert_eq!(classify("never gonna give you up"), InputKind::Search);
        // sin https no se trata como URL
        assert_eq!(
            classify("http://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            InputKind::Search
        );
        assert_eq!(classify("dQw4w9WgXcQ"), InputKind::Video);
        assert_eq!(classify("   "), InputKind::Invalid);
        assert_eq!(classify(""), InputKind::Invalid);
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(video_id("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ"));
        assert_eq!(video_id("https://example.com"), None);
    }

    #[test]
    fn test_parse_search_output() {
        let stdout = concat!(
            r#"{"_type":"url","ie_key":"Youtube","id":"dQw4w9WgXcQ","url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","title":"Rick Astley - Never Gonna Give You Up","duration":212.0}"#,
            "\n",
            "not json\n",
            r#"{"_type":"url","id":"9bZkp7q19f0","title":"PSY - GANGNAM STYLE"}"#,
            "\n",
        );

        let results = parse_search_output(stdout);

        assert_eq!(
            results,
            vec![
                SearchResult {
                    url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                    title: "Rick Astley - Never Gonna Give You Up".to_string(),
                    duration: Some(Duration::from_secs(212)),
                },
                SearchResult {
                    url: "https://www.youtube.com/watch?v=9bZkp7q19f0".to_string(),
                    title: "PSY - GANGNAM STYLE".to_string(),
                    duration: None,
                },
            ]
        );
    }

    #[test]
    fn test_parse_search_output_normalizes_video_links() {
        let stdout = concat!(
            r#"{"_type":"url","id":"9bZkp7q19f0","url":"https://youtu.be/9bZkp7q19f0?si=share","title":"PSY - GANGNAM STYLE"}"#,
            "\n",
            r#"{"_type":"url","id":"dQw4w9WgXcQ","url":"https://www.youtube.com/shorts/dQw4w9WgXcQ","title":"Short"}"#,
        );

        let urls: Vec<String> = parse_search_output(stdout)
            .into_iter()
            .map(|result| result.url)
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=9bZkp7q19f0".to_string(),
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_search_output_skips_channels() {
        let stdout = r#"{"_type":"url","id":"UCuAXFkgsw1L7xaCfnd5JJOw","url":"https://www.youtube.com/channel/UCuAXFkgsw1L7xaCfnd5JJOw","title":"A channel"}"#;
        assert!(parse_search_output(stdout).is_empty());
    }

    #[test]
    fn test_parse_stream_output() {
        let stdout = r#"{"id":"dQw4w9WgXcQ","url":"https://rr1.googlevideo.com/videoplayback?x=1","ext":"webm","acodec":"opus"}"#;

        let stream = parse_stream_output(stdout, Duration::from_secs(90)).unwrap();

        assert_eq!(stream.url, "https://rr1.googlevideo.com/videoplayback?x=1");
        assert_eq!(stream.kind, StreamKind::WebmOpus);
        assert_eq!(stream.start, Duration::from_secs(90));
    }

    #[test]
    fn test_parse_stream_output_without_url() {
        let stdout = r#"{"id":"dQw4w9WgXcQ","ext":"m4a"}"#;
        assert!(parse_stream_output(stdout, Duration::ZERO).is_err());
    }
}
