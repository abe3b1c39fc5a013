use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::sources::{InputKind, MediaResolver, StreamKind};

use super::{
    error::{PlaybackError, Rejection},
    resource::{ResourceBuilder, ResourceId},
    voice::{
        AudioPlayer, NetworkingRebind, NoSubscriberBehavior, PlayerEvent, PlayerEventReceiver,
        PlayerEventSender, PlayerOptions, VoiceBackend, VoiceConnection, VoiceTarget,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub max_queue_size: usize,
    pub no_subscriber: NoSubscriberBehavior,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            no_subscriber: NoSubscriberBehavior::Continue,
        }
    }
}

/// De dónde salió la URL encolada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    Url,
    Search,
}

/// Resultado de `add_song`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddSong {
    Queued { url: String, origin: TrackOrigin },
    Rejected(Rejection),
}

/// Conexión y reproductor viven y mueren juntos
struct VoiceSession<C, P> {
    connection: C,
    player: P,
}

/// Lo que está sonando ahora mismo
#[derive(Debug, Clone)]
struct ActiveTrack {
    resource: ResourceId,
    track: String,
    start: Duration,
    kind: StreamKind,
}

/// Queue and playback state for one guild.
///
/// Commands and player events must be applied one at a time (the
/// [`MusicManager`](super::manager::MusicManager) wraps each controller in a
/// mutex). Idle events carry the id of the resource that finished, so events
/// from a replaced or torn-down resource never advance the queue.
pub struct QueueController<B: VoiceBackend> {
    guild_id: GuildId,
    backend: Arc<B>,
    resolver: Arc<dyn MediaResolver>,
    options: ControllerOptions,
    events: PlayerEventSender,
    session: Option<VoiceSession<B::Connection, B::Player>>,
    active: Option<ActiveTrack>,
    /// Recurso detenido por `stop`: su idle no consume la cola
    stopping: Option<ResourceId>,
    resources: ResourceBuilder,
    queue: VecDeque<String>,
}

impl<B: VoiceBackend> QueueController<B> {
    /// Crea el controlador junto con el receptor de eventos de su reproductor
    pub fn new(
        guild_id: GuildId,
        backend: Arc<B>,
        resolver: Arc<dyn MediaResolver>,
        options: ControllerOptions,
    ) -> (Self, PlayerEventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();

        let controller = Self {
            guild_id,
            backend,
            resolver,
            options,
            events,
            session: None,
            active: None,
            stopping: None,
            resources: ResourceBuilder::default(),
            queue: VecDeque::new(),
        };

        (controller, receiver)
    }

    /// Se une al canal y empieza a reproducir la cabeza de la cola.
    ///
    /// With a voice session already open this only restarts the head when
    /// nothing is playing (e.g. the head failed to resolve earlier).
    pub async fn start_playing(&mut self, target: VoiceTarget) -> Result<(), PlaybackError> {
        if self.is_connected() {
            if self.active.is_none() && !self.queue.is_empty() {
                info!("🔁 Sesión sin reproducción en guild {}, reintentando cabeza", self.guild_id);
                return self.play_song(Duration::ZERO).await;
            }
            debug!("Ya conectado en guild {}, ignorando start_playing", self.guild_id);
            return Ok(());
        }

        let mut connection = self
            .backend
            .join(target)
            .await
            .map_err(PlaybackError::Connect)?;

        connection
            .on_state_change(Arc::new(NetworkingRebind::new(self.guild_id)))
            .await;

        let player = self.backend.create_player(
            PlayerOptions {
                no_subscriber: self.options.no_subscriber,
            },
            self.events.clone(),
        );

        if let Err(e) = connection.subscribe(&player).await {
            if let Err(destroy_error) = connection.destroy().await {
                warn!("Error al cerrar conexión fallida: {:?}", destroy_error);
            }
            return Err(PlaybackError::Connect(e));
        }

        self.session = Some(VoiceSession { connection, player });
        info!(
            "🔊 Conectado al canal {} en guild {}",
            target.channel_id, self.guild_id
        );

        self.play_song(Duration::ZERO).await
    }

    pub fn player(&self) -> Option<&B::Player> {
        self.session.as_ref().map(|session| &session.player)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Suelta todo: recurso activo, cola, reproductor y conexión. Idempotente.
    pub async fn destroy_player(&mut self) {
        self.active = None;
        self.stopping = None;
        self.queue.clear();

        if let Some(VoiceSession {
            mut connection,
            player,
        }) = self.session.take()
        {
            drop(player);
            if let Err(e) = connection.destroy().await {
                warn!("Error al destruir conexión en guild {}: {:?}", self.guild_id, e);
            }
            info!("👋 Reproducción terminada en guild {}", self.guild_id);
        }
    }

    /// Reproduce la cabeza de la cola desde `offset`; sin cabeza, cierra la sesión
    pub async fn play_song(&mut self, offset: Duration) -> Result<(), PlaybackError> {
        let Some(track) = self.queue.front().cloned() else {
            info!("📭 Cola vacía en guild {}", self.guild_id);
            self.destroy_player().await;
            return Ok(());
        };

        if self.session.is_none() {
            return Err(PlaybackError::NotConnected);
        }

        let stream = self
            .resolver
            .stream(&track, offset)
            .await
            .map_err(|source| PlaybackError::Resolve {
                track: track.clone(),
                source,
            })?;
        let resource = self.resources.build(stream);
        let id = resource.id;
        let kind = resource.kind();

        let session = self.session.as_ref().ok_or(PlaybackError::NotConnected)?;
        // el reproductor informa dónde empezó realmente (el seek puede fallar)
        let start = session
            .player
            .play(resource)
            .await
            .map_err(PlaybackError::Player)?;

        let active = ActiveTrack {
            resource: id,
            track,
            start,
            kind,
        };

        info!(
            "🎵 Reproduciendo {} ({}) desde {} en guild {}",
            active.track,
            active.kind.as_str(),
            humantime::format_duration(active.start),
            self.guild_id
        );
        self.active = Some(active);
        self.stopping = None;
        Ok(())
    }

    /// Descarta la canción terminada y reproduce la siguiente
    pub async fn play_next_song(&mut self) -> Result<(), PlaybackError> {
        if let Some(finished) = self.skip_current_song() {
            debug!("Track terminado: {}", finished);
        }
        self.active = None;
        self.play_song(Duration::ZERO).await
    }

    /// Aplica un evento del reproductor
    pub async fn handle_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Idle { resource } => {
                let current = self.active.as_ref().map(|active| active.resource);
                if current != Some(resource) {
                    debug!(
                        "Idle de recurso {} ignorado en guild {} (activo: {:?})",
                        resource, self.guild_id, current
                    );
                    return;
                }

                let result = if self.stopping.take() == Some(resource) {
                    self.finish_stop().await
                } else {
                    self.play_next_song().await
                };

                if let Err(e) = result {
                    error!(
                        "Error al reproducir siguiente track en guild {}: {}",
                        self.guild_id, e
                    );
                }
            }
            PlayerEvent::Error { resource, message } => {
                error!(
                    "❌ Error del reproductor en guild {} (recurso {}): {}",
                    self.guild_id, resource, message
                );
            }
        }
    }

    /// Vacía la cola y detiene el reproductor; el idle resultante cierra la sesión
    pub async fn stop(&mut self) -> Result<(), PlaybackError> {
        self.clear_queue();

        let Some(session) = &self.session else {
            return Ok(());
        };

        // sin nada sonando no llegará ningún idle
        if session.player.stop() {
            self.stopping = self.active.as_ref().map(|active| active.resource);
        } else {
            self.destroy_player().await;
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(())
    }

    /// Idle del recurso detenido: cierra la sesión salvo que se haya encolado algo
    /// mientras tanto, en cuyo caso la cabeza se reproduce sin descartarla.
    async fn finish_stop(&mut self) -> Result<(), PlaybackError> {
        self.active = None;
        if self.queue.is_empty() {
            self.destroy_player().await;
            return Ok(());
        }

        debug!("Cola repoblada tras stop en guild {}", self.guild_id);
        self.play_song(Duration::ZERO).await
    }

    /// Discord sacó al bot del canal: cierra la sesión si la conexión ya no vive.
    ///
    /// Returns `false` for our own leaves (no session) and for a session
    /// opened after the disconnect (its connection is live).
    pub async fn handle_voice_disconnect(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let alive = match &self.session {
            Some(session) => session.connection.is_alive().await,
            None => false,
        };
        if alive {
            debug!("Desconexión de voz obsoleta ignorada en guild {}", self.guild_id);
            return false;
        }

        info!("🔌 Bot expulsado del canal de voz en guild {}", self.guild_id);
        self.destroy_player().await;
        true
    }

    /// Detiene el track actual y deja que el evento idle avance la cola
    pub async fn skip(&mut self) -> Result<(), PlaybackError> {
        let session = self.session.as_ref().ok_or(PlaybackError::NotConnected)?;

        if session.player.stop() {
            info!("⏭️ Track saltado en guild {}", self.guild_id);
            return Ok(());
        }

        // p.ej. la cabeza falló al resolverse: no hay idle que esperar
        self.play_next_song().await
    }

    pub fn pause(&self) -> Result<bool, PlaybackError> {
        let session = self.session.as_ref().ok_or(PlaybackError::NotConnected)?;
        Ok(session.player.pause())
    }

    pub fn resume(&self) -> Result<bool, PlaybackError> {
        let session = self.session.as_ref().ok_or(PlaybackError::NotConnected)?;
        Ok(session.player.unpause())
    }

    /// Posición actual dentro del track
    pub async fn playback_position(&self) -> Option<Duration> {
        let active = self.active.as_ref()?;
        let session = self.session.as_ref()?;
        let played = session.player.playback_duration().await.unwrap_or_default();
        Some(active.start + played)
    }

    /// Reinicia la cabeza `delta_secs` más adelante (o atrás); nunca antes de 0
    pub async fn fast_forward(&mut self, delta_secs: i64) -> Result<Duration, PlaybackError> {
        if self.session.is_none() {
            return Err(PlaybackError::NotConnected);
        }

        let elapsed = self.playback_position().await.unwrap_or_default();
        let target = (elapsed.as_secs_f64() + delta_secs as f64).max(0.0);
        let target = Duration::from_secs_f64(target);

        self.play_song(target).await?;
        Ok(self.active.as_ref().map_or(target, |active| active.start))
    }

    /// Salta a `minutos:segundos`. `Ok(false)` si el formato no es válido.
    pub async fn seek(&mut self, time: &str) -> Result<bool, PlaybackError> {
        let Some(offset) = parse_timestamp(time) else {
            return Ok(false);
        };

        self.play_song(offset).await?;
        Ok(true)
    }

    /// Valida y encola una URL de video o el primer resultado de una búsqueda
    pub async fn add_song(&mut self, input: &str) -> Result<AddSong, PlaybackError> {
        let input = input.trim();
        let is_https = input.starts_with("https");

        let kind = self.resolver.classify(input);
        let searchable = match kind {
            InputKind::Video if is_https => false,
            InputKind::Search if !is_https => true,
            _ => return Ok(AddSong::Rejected(Rejection::InvalidInput)),
        };

        if self.queue.len() >= self.options.max_queue_size {
            return Ok(AddSong::Rejected(Rejection::QueueFull(
                self.options.max_queue_size,
            )));
        }

        let (url, origin) = if searchable {
            let found = self
                .resolver
                .search(input, 1)
                .await
                .map_err(PlaybackError::Search)?
                .into_iter()
                .next();

            match found {
                Some(result) => (result.url, TrackOrigin::Search),
                None => return Ok(AddSong::Rejected(Rejection::NotFound)),
            }
        } else {
            (input.to_string(), TrackOrigin::Url)
        };

        self.queue.push_back(url.clone());
        info!("➕ Agregado a la cola en guild {}: {}", self.guild_id, url);

        Ok(AddSong::Queued { url, origin })
    }

    pub fn skip_current_song(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn current_song(&self) -> Option<&str> {
        self.queue.front().map(String::as_str)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Una URL por línea, en orden de reproducción
    pub fn serialize_queue(&self) -> String {
        self.queue
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parsea `minutos:segundos` (ambas partes numéricas, no negativas)
pub fn parse_timestamp(time: &str) -> Option<Duration> {
    let parts: Vec<&str> = time.split(':').collect();
    let [minutes, seconds] = parts.as_slice() else {
        return None;
    };

    let minutes: f64 = minutes.trim().parse().ok()?;
    let seconds: f64 = seconds.trim().parse().ok()?;
    if !minutes.is_finite() || !seconds.is_finite() || minutes < 0.0 || seconds < 0.0 {
        return None;
    }

    Duration::try_from_secs_f64(minutes * 60.0 + seconds).ok()
}
