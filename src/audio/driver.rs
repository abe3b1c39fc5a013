//! Implementación de las abstracciones de voz sobre songbird.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::GuildId;
use songbird::{
    events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent},
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Songbird,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use super::{
    resource::{AudioResource, ResourceId},
    voice::{
        AudioPlayer, ConnectionState, ConnectionStateHook, NetworkingSession, PlayerEvent,
        PlayerEventSender, PlayerOptions, SubscriberAction, VoiceBackend, VoiceConnection,
        VoiceTarget,
    },
};

type Hooks = Arc<RwLock<Vec<Arc<dyn ConnectionStateHook>>>>;

/// Backend de voz respaldado por el manager de songbird
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    type Player = SongbirdPlayer;
    type Connection = SongbirdConnection;

    async fn join(&self, target: VoiceTarget) -> Result<SongbirdConnection> {
        let call = self
            .manager
            .join(target.guild_id, target.channel_id)
            .await
            .with_context(|| {
                format!(
                    "Error al conectar al canal {} en guild {}",
                    target.channel_id, target.guild_id
                )
            })?;

        let connection = SongbirdConnection::new(self.manager.clone(), target.guild_id, call);
        connection.register_relay().await;
        Ok(connection)
    }

    fn create_player(&self, options: PlayerOptions, events: PlayerEventSender) -> SongbirdPlayer {
        SongbirdPlayer {
            inner: Arc::new(PlayerInner {
                options,
                events,
                http: self.http.clone(),
                call: Mutex::new(None),
                current: Mutex::new(None),
                auto_paused: AtomicBool::new(false),
            }),
        }
    }
}

/// Conexión de voz de una guild
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    state: Arc<Mutex<ConnectionState>>,
    hooks: Hooks,
    destroyed: bool,
}

impl SongbirdConnection {
    fn new(manager: Arc<Songbird>, guild_id: GuildId, call: Arc<tokio::sync::Mutex<Call>>) -> Self {
        Self {
            manager,
            guild_id,
            call,
            state: Arc::new(Mutex::new(ConnectionState::Signalling)),
            hooks: Arc::new(RwLock::new(Vec::new())),
            destroyed: false,
        }
    }

    /// Traduce los eventos del driver a transiciones de [`ConnectionState`]
    async fn register_relay(&self) {
        let mut call = self.call.lock().await;

        // join() vuelve con el driver ya conectado: sembrar el estado inicial
        if let Some(info) = call.current_connection() {
            *self.state.lock() = ConnectionState::Ready {
                networking: NetworkingSession {
                    session_id: info.session_id.clone(),
                    endpoint: info.endpoint.clone(),
                    ssrc: 0,
                },
            };
        }

        for event in [
            CoreEvent::DriverConnect,
            CoreEvent::DriverReconnect,
            CoreEvent::DriverDisconnect,
        ] {
            call.add_global_event(
                Event::Core(event),
                StateRelay {
                    guild_id: self.guild_id,
                    state: self.state.clone(),
                    hooks: self.hooks.clone(),
                },
            );
        }
    }

    fn transition(&self, new: ConnectionState) {
        let old = std::mem::replace(&mut *self.state.lock(), new.clone());
        let hooks = self.hooks.read().clone();
        for hook in hooks {
            hook.on_state_change(&old, &new);
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    type Player = SongbirdPlayer;

    async fn on_state_change(&mut self, hook: Arc<dyn ConnectionStateHook>) {
        // si ya estamos conectados el hook tiene que ver el estado actual
        let current = self.state.lock().clone();
        if current != ConnectionState::Signalling {
            hook.on_state_change(&ConnectionState::Signalling, &current);
        }
        self.hooks.write().push(hook);
    }

    async fn is_alive(&self) -> bool {
        // songbird suelta la conexión al recibir un voice state sin canal
        !self.destroyed && self.call.lock().await.current_connection().is_some()
    }

    async fn subscribe(&mut self, player: &SongbirdPlayer) -> Result<()> {
        if self.destroyed {
            anyhow::bail!("La conexión de guild {} ya fue destruida", self.guild_id);
        }

        *player.inner.call.lock() = Some(self.call.clone());
        self.hooks.write().push(Arc::new(SubscriberHook {
            player: Arc::downgrade(&player.inner),
        }));

        debug!("Reproductor suscrito a la conexión de guild {}", self.guild_id);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.transition(ConnectionState::Destroyed);

        self.manager
            .remove(self.guild_id)
            .await
            .with_context(|| format!("Error al salir del canal en guild {}", self.guild_id))?;

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Relay de eventos del driver hacia los hooks de la conexión
struct StateRelay {
    guild_id: GuildId,
    state: Arc<Mutex<ConnectionState>>,
    hooks: Hooks,
}

#[async_trait]
impl VoiceEventHandler for StateRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let new = match ctx {
            EventContext::DriverConnect(data) | EventContext::DriverReconnect(data) => {
                ConnectionState::Ready {
                    networking: NetworkingSession {
                        session_id: data.session_id.to_string(),
                        endpoint: data.server.to_string(),
                        ssrc: data.ssrc,
                    },
                }
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?}",
                    self.guild_id, data.reason
                );
                ConnectionState::Disconnected
            }
            _ => return None,
        };

        let old = std::mem::replace(&mut *self.state.lock(), new.clone());
        let hooks = self.hooks.read().clone();
        for hook in hooks {
            hook.on_state_change(&old, &new);
        }

        None
    }
}

/// Aplica el `NoSubscriberBehavior` del reproductor cuando la conexión se cae o vuelve
struct SubscriberHook {
    player: Weak<PlayerInner>,
}

impl ConnectionStateHook for SubscriberHook {
    fn on_state_change(&self, _old: &ConnectionState, new: &ConnectionState) {
        let Some(player) = self.player.upgrade() else {
            return;
        };

        let auto_paused = player.auto_paused.load(Ordering::SeqCst);
        match player.options.no_subscriber.on_connection_change(new, auto_paused) {
            Some(SubscriberAction::Pause) => player.auto_pause(),
            Some(SubscriberAction::Resume) => player.auto_resume(),
            None => {}
        }
    }
}

#[derive(Clone)]
struct CurrentTrack {
    resource: ResourceId,
    handle: TrackHandle,
    start: Duration,
}

struct PlayerInner {
    options: PlayerOptions,
    events: PlayerEventSender,
    http: reqwest::Client,
    call: Mutex<Option<Arc<tokio::sync::Mutex<Call>>>>,
    current: Mutex<Option<CurrentTrack>>,
    auto_paused: AtomicBool,
}

impl PlayerInner {
    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|track| track.handle.clone())
    }

    /// El track `resource` terminó: olvidarlo y avisar al controlador
    fn finish(&self, resource: ResourceId) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|track| track.resource == resource) {
            *current = None;
        }
        drop(current);

        let _ = self.events.send(PlayerEvent::Idle { resource });
    }

    fn auto_pause(&self) {
        if let Some(handle) = self.current_handle() {
            if handle.pause().is_ok() {
                self.auto_paused.store(true, Ordering::SeqCst);
                info!("⏸️ Pausado: la conexión de voz se perdió");
            }
        }
    }

    fn auto_resume(&self) {
        self.auto_paused.store(false, Ordering::SeqCst);
        if let Some(handle) = self.current_handle() {
            let _ = handle.play();
            info!("▶️ Reanudado: la conexión de voz volvió");
        }
    }
}

/// Reproductor sobre el `Call` de songbird al que está suscrito
pub struct SongbirdPlayer {
    inner: Arc<PlayerInner>,
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    async fn play(&self, resource: AudioResource) -> Result<Duration> {
        let call = self
            .inner
            .call
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Reproductor sin conexión suscrita"))?;

        let input: Input =
            HttpRequest::new(self.inner.http.clone(), resource.stream.url.clone()).into();

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackIdleNotifier {
                    resource: resource.id,
                    player: Arc::downgrade(&self.inner),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    resource: resource.id,
                    player: Arc::downgrade(&self.inner),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        self.inner.auto_paused.store(false, Ordering::SeqCst);

        let requested = resource.start();
        *self.inner.current.lock() = Some(CurrentTrack {
            resource: resource.id,
            handle: handle.clone(),
            start: requested,
        });

        let mut start = requested;
        if !requested.is_zero() {
            if let Err(e) = handle.seek_async(requested).await {
                warn!(
                    "No se pudo saltar a {} en recurso {}, reproduciendo desde el inicio: {}",
                    humantime::format_duration(requested),
                    resource.id,
                    e
                );
                start = Duration::ZERO;
                if let Some(track) = self
                    .inner
                    .current
                    .lock()
                    .as_mut()
                    .filter(|track| track.resource == resource.id)
                {
                    track.start = start;
                }
            }
        }

        debug!(
            "Recurso {} ({}) en reproducción",
            resource.id,
            resource.kind().as_str()
        );
        Ok(start)
    }

    fn stop(&self) -> bool {
        // un track ya terminado devuelve error: no habrá evento de fin
        self.inner
            .current_handle()
            .is_some_and(|handle| handle.stop().is_ok())
    }

    fn pause(&self) -> bool {
        self.inner
            .current_handle()
            .is_some_and(|handle| handle.pause().is_ok())
    }

    fn unpause(&self) -> bool {
        self.inner.auto_paused.store(false, Ordering::SeqCst);
        self.inner
            .current_handle()
            .is_some_and(|handle| handle.play().is_ok())
    }

    async fn playback_duration(&self) -> Option<Duration> {
        let (handle, start) = {
            let current = self.inner.current.lock();
            let track = current.as_ref()?;
            (track.handle.clone(), track.start)
        };

        let info = handle.get_info().await.ok()?;
        Some(info.position.saturating_sub(start))
    }
}

/// Fin del track (natural o por stop)
struct TrackIdleNotifier {
    resource: ResourceId,
    player: Weak<PlayerInner>,
}

#[async_trait]
impl VoiceEventHandler for TrackIdleNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track {} terminado", self.resource);
        if let Some(player) = self.player.upgrade() {
            player.finish(self.resource);
        }
        None
    }
}

/// Error del track: se informa y el reproductor queda ocioso
struct TrackErrorNotifier {
    resource: ResourceId,
    player: Weak<PlayerInner>,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let Some(player) = self.player.upgrade() else {
            return None;
        };

        let message = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .map(|(state, _handle)| format!("{:?}", state.playing))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "error desconocido".to_string(),
        };

        let _ = player.events.send(PlayerEvent::Error {
            resource: self.resource,
            message,
        });
        player.finish(self.resource);

        None
    }
}
