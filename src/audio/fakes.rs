//! In-memory voice backend for controller tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

use super::{
    resource::{AudioResource, ResourceId},
    voice::{
        AudioPlayer, ConnectionStateHook, PlayerEvent, PlayerEventSender, PlayerOptions,
        VoiceBackend, VoiceConnection, VoiceTarget,
    },
};

#[derive(Default)]
pub struct FakeVoice {
    pub joins: Vec<VoiceTarget>,
    pub fail_join: bool,
    /// Discord cerró la conexión (expulsión manual)
    pub kicked: bool,
    /// El reproductor no logra saltar al inicio del recurso
    pub fail_seek: bool,
    pub subscribed: bool,
    pub destroyed: usize,
    pub hooks: Vec<Arc<dyn ConnectionStateHook>>,
    pub player_options: Option<PlayerOptions>,
    pub played: Vec<AudioResource>,
    pub current: Option<ResourceId>,
    pub paused: bool,
    pub elapsed: Duration,
}

pub type SharedVoice = Arc<Mutex<FakeVoice>>;

#[derive(Default)]
pub struct FakeBackend {
    pub state: SharedVoice,
}

impl FakeBackend {
    pub fn played_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .played
            .iter()
            .map(|resource| resource.stream.url.clone())
            .collect()
    }
}

pub struct FakeConnection {
    state: SharedVoice,
}

pub struct FakePlayer {
    state: SharedVoice,
    events: PlayerEventSender,
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    type Player = FakePlayer;
    type Connection = FakeConnection;

    async fn join(&self, target: VoiceTarget) -> Result<FakeConnection> {
        let mut state = self.state.lock();
        if state.fail_join {
            anyhow::bail!("missing Connect permission");
        }
        state.joins.push(target);
        state.kicked = false;
        Ok(FakeConnection {
            state: self.state.clone(),
        })
    }

    fn create_player(&self, options: PlayerOptions, events: PlayerEventSender) -> FakePlayer {
        self.state.lock().player_options = Some(options);
        FakePlayer {
            state: self.state.clone(),
            events,
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    type Player = FakePlayer;

    async fn on_state_change(&mut self, hook: Arc<dyn ConnectionStateHook>) {
        self.state.lock().hooks.push(hook);
    }

    async fn is_alive(&self) -> bool {
        !self.state.lock().kicked
    }

    async fn subscribe(&mut self, _player: &FakePlayer) -> Result<()> {
        self.state.lock().subscribed = true;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.destroyed += 1;
        state.subscribed = false;
        Ok(())
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, resource: AudioResource) -> Result<Duration> {
        let mut state = self.state.lock();
        // igual que songbird: el track reemplazado emite su propio fin
        if let Some(replaced) = state.current.replace(resource.id) {
            let _ = self.events.send(PlayerEvent::Idle { resource: replaced });
        }
        state.paused = false;
        let start = if state.fail_seek {
            Duration::ZERO
        } else {
            resource.start()
        };
        state.played.push(resource);
        Ok(start)
    }

    fn stop(&self) -> bool {
        match self.state.lock().current.take() {
            Some(resource) => {
                let _ = self.events.send(PlayerEvent::Idle { resource });
                true
            }
            None => false,
        }
    }

    fn pause(&self) -> bool {
        let mut state = self.state.lock();
        state.paused = state.current.is_some();
        state.paused
    }

    fn unpause(&self) -> bool {
        let mut state = self.state.lock();
        let was_paused = state.paused;
        state.paused = false;
        was_paused
    }

    async fn playback_duration(&self) -> Option<Duration> {
        let state = self.state.lock();
        state.current.map(|_| state.elapsed)
    }
}
