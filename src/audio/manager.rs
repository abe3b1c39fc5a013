use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::sources::MediaResolver;

use super::{
    controller::{ControllerOptions, QueueController},
    voice::{PlayerEventReceiver, VoiceBackend},
};

pub type SharedController<B> = Arc<Mutex<QueueController<B>>>;

/// Un [`QueueController`] por guild.
///
/// Each controller gets its own event pump task, which applies player events
/// under the same mutex the commands take.
pub struct MusicManager<B: VoiceBackend> {
    backend: Arc<B>,
    resolver: Arc<dyn MediaResolver>,
    options: ControllerOptions,
    controllers: DashMap<GuildId, SharedController<B>>,
}

impl<B: VoiceBackend> MusicManager<B> {
    pub fn new(
        backend: Arc<B>,
        resolver: Arc<dyn MediaResolver>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            backend,
            resolver,
            options,
            controllers: DashMap::new(),
        }
    }

    /// Obtiene (o crea) el controlador de la guild
    pub fn controller(&self, guild_id: GuildId) -> SharedController<B> {
        self.controllers
            .entry(guild_id)
            .or_insert_with(|| self.spawn_controller(guild_id))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedController<B>> {
        self.controllers.get(&guild_id).map(|entry| entry.clone())
    }

    /// Cierra la sesión de la guild y olvida su controlador
    pub async fn remove(&self, guild_id: GuildId) {
        if let Some((_, controller)) = self.controllers.remove(&guild_id) {
            controller.lock().await.destroy_player().await;
            info!("🗑️ Controlador eliminado para guild {}", guild_id);
        }
    }

    fn spawn_controller(&self, guild_id: GuildId) -> SharedController<B> {
        let (controller, events) = QueueController::new(
            guild_id,
            self.backend.clone(),
            self.resolver.clone(),
            self.options,
        );
        let controller = Arc::new(Mutex::new(controller));

        tokio::spawn(pump_player_events(
            guild_id,
            Arc::downgrade(&controller),
            events,
        ));

        debug!("Controlador creado para guild {}", guild_id);
        controller
    }
}

async fn pump_player_events<B: VoiceBackend>(
    guild_id: GuildId,
    controller: Weak<Mutex<QueueController<B>>>,
    mut events: PlayerEventReceiver,
) {
    while let Some(event) = events.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        controller.lock().await.handle_player_event(event).await;
    }

    debug!("Pump de eventos terminado para guild {}", guild_id);
}
