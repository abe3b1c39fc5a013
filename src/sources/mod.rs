pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use youtube::YtDlpResolver;

/// Clasificación de lo que escribe el usuario en `/play`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Enlace (o id) a un único video reproducible
    Video,
    /// Enlace (o id) a una playlist
    Playlist,
    /// Texto libre que se resuelve con una búsqueda
    Search,
    Invalid,
}

/// Contenedor/códec del stream resuelto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    WebmOpus,
    OggOpus,
    /// Cualquier otra cosa; se deja que Symphonia lo detecte
    Arbitrary,
}

impl StreamKind {
    /// Deduce el tipo a partir de la extensión y el códec que reporta yt-dlp
    pub fn from_format(ext: &str, acodec: Option<&str>) -> Self {
        let is_opus = acodec.is_some_and(|codec| codec.eq_ignore_ascii_case("opus"));
        match (ext, is_opus) {
            ("webm", true) => StreamKind::WebmOpus,
            ("ogg" | "opus", true) => StreamKind::OggOpus,
            _ => StreamKind::Arbitrary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::WebmOpus => "webm/opus",
            StreamKind::OggOpus => "ogg/opus",
            StreamKind::Arbitrary => "arbitrary",
        }
    }
}

/// Stream de audio listo para entregar al reproductor
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStream {
    /// URL directa del audio
    pub url: String,
    pub kind: StreamKind,
    /// Posición del track en la que debe empezar la reproducción
    pub start: Duration,
}

/// Resultado de una búsqueda
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub duration: Option<Duration>,
}

/// Resuelve identificadores de tracks a streams reproducibles.
///
/// The controller only talks to this trait, so the yt-dlp backend can be
/// swapped for a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Clasifica la entrada cruda del usuario
    fn classify(&self, input: &str) -> InputKind;

    /// Busca videos; los resultados vienen ordenados por relevancia
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Obtiene el stream de audio del track empezando en `offset`
    async fn stream(&self, track: &str, offset: Duration) -> Result<MediaStream>;
}
