//! Contracts between the queue controller and the voice stack.
//!
//! The controller never touches songbird directly: it joins channels through a
//! [`VoiceBackend`], drives an [`AudioPlayer`] and listens to [`PlayerEvent`]s
//! tagged with the [`ResourceId`] they refer to.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::resource::{AudioResource, ResourceId};

/// Canal de voz al que hay que unirse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Sesión UDP/websocket de voz negociada con Discord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkingSession {
    pub session_id: String,
    pub endpoint: String,
    pub ssrc: u32,
}

/// Estado de la conexión de voz
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Signalling,
    Ready {
        networking: NetworkingSession,
    },
    Disconnected,
    Destroyed,
}

impl ConnectionState {
    /// Objeto de networking asociado al estado, si lo hay
    pub fn networking(&self) -> Option<&NetworkingSession> {
        match self {
            ConnectionState::Ready { networking } => Some(networking),
            _ => None,
        }
    }
}

/// Se ejecuta en cada transición de estado de la conexión
pub trait ConnectionStateHook: Send + Sync {
    fn on_state_change(&self, old: &ConnectionState, new: &ConnectionState);
}

/// Listener del estado de networking de una conexión.
///
/// Only one networking session may hold it at a time.
#[derive(Debug)]
pub struct NetworkStateListener {
    guild_id: GuildId,
    bound: Mutex<Option<NetworkingSession>>,
}

impl NetworkStateListener {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            bound: Mutex::new(None),
        }
    }

    pub fn attach(&self, session: &NetworkingSession) {
        let previous = self.bound.lock().replace(session.clone());
        if let Some(previous) = previous.filter(|previous| previous != session) {
            debug!(
                "Listener movido sin desacoplar de la sesión {} en guild {}",
                previous.session_id, self.guild_id
            );
        }
        info!(
            "📡 Networking enlazado en guild {} (sesión {}, ssrc {})",
            self.guild_id, session.session_id, session.ssrc
        );
    }

    /// Desacopla el listener sólo si sigue enlazado a `session`
    pub fn detach(&self, session: &NetworkingSession) {
        let mut bound = self.bound.lock();
        if bound.as_ref() == Some(session) {
            *bound = None;
            debug!(
                "Networking desenlazado en guild {} (sesión {})",
                self.guild_id, session.session_id
            );
        }
    }

    pub fn bound_session(&self) -> Option<NetworkingSession> {
        self.bound.lock().clone()
    }
}

/// Compatibility shim for voice reconnects.
///
/// When the connection moves between states, the networking-state listener is
/// detached from the old state's networking object and attached to the new
/// one, so it never keeps watching a dead session after a reconnect.
pub struct NetworkingRebind {
    listener: Arc<NetworkStateListener>,
}

impl NetworkingRebind {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            listener: Arc::new(NetworkStateListener::new(guild_id)),
        }
    }

    pub fn listener(&self) -> &Arc<NetworkStateListener> {
        &self.listener
    }
}

impl ConnectionStateHook for NetworkingRebind {
    fn on_state_change(&self, old: &ConnectionState, new: &ConnectionState) {
        if let Some(networking) = old.networking() {
            self.listener.detach(networking);
        }
        if let Some(networking) = new.networking() {
            self.listener.attach(networking);
        }
    }
}

/// Qué hace el reproductor cuando no hay conexión suscrita
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoSubscriberBehavior {
    Pause,
    #[default]
    Continue,
}

/// Qué debe hacer el reproductor ante un cambio de conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberAction {
    Pause,
    Resume,
}

impl NoSubscriberBehavior {
    /// Decide la pausa automática para la transición a `new`.
    ///
    /// `auto_paused` says whether the current track was paused by a previous
    /// connection loss; only those pauses are undone when the connection is back.
    pub fn on_connection_change(
        self,
        new: &ConnectionState,
        auto_paused: bool,
    ) -> Option<SubscriberAction> {
        match new {
            ConnectionState::Disconnected | ConnectionState::Destroyed
                if self == NoSubscriberBehavior::Pause && !auto_paused =>
            {
                Some(SubscriberAction::Pause)
            }
            ConnectionState::Ready { .. } if auto_paused => Some(SubscriberAction::Resume),
            _ => None,
        }
    }
}

impl std::str::FromStr for NoSubscriberBehavior {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "continue" => Ok(Self::Continue),
            other => anyhow::bail!("Comportamiento sin suscriptor desconocido: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerOptions {
    pub no_subscriber: NoSubscriberBehavior,
}

/// Eventos emitidos por el reproductor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// El recurso terminó o fue detenido
    Idle { resource: ResourceId },
    /// Error en tiempo de ejecución del recurso
    Error { resource: ResourceId, message: String },
}

pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;
pub type PlayerEventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Reemplaza lo que esté sonando por `resource`.
    ///
    /// Returns the track position playback actually starts from, which is
    /// zero when seeking to the resource start failed.
    async fn play(&self, resource: AudioResource) -> Result<Duration>;

    /// Detiene el recurso actual. Devuelve `false` si no había nada sonando.
    fn stop(&self) -> bool;

    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    /// Tiempo reproducido del recurso actual desde su inicio
    async fn playback_duration(&self) -> Option<Duration>;
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    type Player: AudioPlayer;

    async fn on_state_change(&mut self, hook: Arc<dyn ConnectionStateHook>);

    /// `false` una vez que Discord cerró la conexión de voz
    async fn is_alive(&self) -> bool;

    /// Conecta la salida del reproductor a esta conexión
    async fn subscribe(&mut self, player: &Self::Player) -> Result<()>;

    async fn destroy(&mut self) -> Result<()>;
}

#[async_trait]
pub trait VoiceBackend: Send + Sync + 'static {
    type Player: AudioPlayer + 'static;
    type Connection: VoiceConnection<Player = Self::Player> + 'static;

    async fn join(&self, target: VoiceTarget) -> Result<Self::Connection>;

    fn create_player(&self, options: PlayerOptions, events: PlayerEventSender) -> Self::Player;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(id: &str, ssrc: u32) -> NetworkingSession {
        NetworkingSession {
            session_id: id.to_string(),
            endpoint: "us-east1.discord.media".to_string(),
            ssrc,
        }
    }

    fn ready(id: &str, ssrc: u32) -> ConnectionState {
        ConnectionState::Ready {
            networking: session(id, ssrc),
        }
    }

    #[test]
    fn rebind_follows_reconnects() {
        let rebind = NetworkingRebind::new(GuildId::new(1));

        rebind.on_state_change(&ConnectionState::Signalling, &ready("a", 1));
        assert_eq!(rebind.listener().bound_session(), Some(session("a", 1)));

        rebind.on_state_change(&ready("a", 1), &ready("b", 2));
        assert_eq!(rebind.listener().bound_session(), Some(session("b", 2)));

        rebind.on_state_change(&ready("b", 2), &ConnectionState::Disconnected);
        assert_eq!(rebind.listener().bound_session(), None);
    }

    #[test]
    fn detach_ignores_foreign_sessions() {
        let listener = NetworkStateListener::new(GuildId::new(1));
        listener.attach(&session("b", 2));

        listener.detach(&session("a", 1));

        assert_eq!(listener.bound_session(), Some(session("b", 2)));
    }

    #[test]
    fn pause_behavior_pauses_on_connection_loss() {
        let behavior = NoSubscriberBehavior::Pause;

        assert_eq!(
            behavior.on_connection_change(&ConnectionState::Disconnected, false),
            Some(SubscriberAction::Pause)
        );
        assert_eq!(
            behavior.on_connection_change(&ConnectionState::Destroyed, false),
            Some(SubscriberAction::Pause)
        );
        // ya pausado por una pérdida anterior
        assert_eq!(
            behavior.on_connection_change(&ConnectionState::Disconnected, true),
            None
        );
        assert_eq!(
            behavior.on_connection_change(&ready("b", 2), true),
            Some(SubscriberAction::Resume)
        );
    }

    #[test]
    fn continue_behavior_never_pauses() {
        let behavior = NoSubscriberBehavior::Continue;

        assert_eq!(
            behavior.on_connection_change(&ConnectionState::Disconnected, false),
            None
        );
        assert_eq!(behavior.on_connection_change(&ready("a", 1), false), None);
    }

    #[test]
    fn manual_pauses_are_not_undone_on_reconnect() {
        assert_eq!(
            NoSubscriberBehavior::Pause.on_connection_change(&ready("a", 1), false),
            None
        );
        assert_eq!(
            NoSubscriberBehavior::Pause.on_connection_change(&ConnectionState::Signalling, true),
            None
        );
    }

    #[test]
    fn only_ready_states_expose_networking() {
        assert!(ConnectionState::Signalling.networking().is_none());
        assert!(ConnectionState::Destroyed.networking().is_none());
        assert_eq!(ready("a", 7).networking(), Some(&session("a", 7)));
    }
}
