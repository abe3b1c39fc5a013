use thiserror::Error;

/// Errores de las operaciones de reproducción
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(#[source] anyhow::Error),

    #[error("no se pudo resolver {track}: {source}")]
    Resolve {
        track: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("la búsqueda falló: {0}")]
    Search(#[source] anyhow::Error),

    #[error("error del reproductor: {0}")]
    Player(#[source] anyhow::Error),
}

/// Motivos por los que `add_song` no encola nada.
///
/// These are user-facing, so the messages are shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("URL/Query is not valid!")]
    InvalidInput,

    #[error("Failed to find song with given query")]
    NotFound,

    #[error("Queue is full (max {0} songs)")]
    QueueFull(usize),
}
