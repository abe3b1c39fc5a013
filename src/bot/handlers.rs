use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use crate::{
    audio::{
        controller::{parse_timestamp, AddSong},
        error::PlaybackError,
        voice::VoiceTarget,
    },
    bot::MusicBot,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "seek" => handle_seek(ctx, &command, bot, guild_id).await?,
        "forward" => handle_forward(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let controller = bot.music.controller(guild_id);
    let mut controller = controller.lock().await;

    let embed = match controller.add_song(query).await {
        Ok(AddSong::Queued { url, origin }) => {
            let position = controller.queue_len();
            let target = VoiceTarget {
                guild_id,
                channel_id: voice_channel_id,
            };

            match controller.start_playing(target).await {
                Ok(()) => embeds::create_track_added_embed(&url, origin, position),
                Err(e) => playback_error_embed(guild_id, &e),
            }
        }
        Ok(AddSong::Rejected(rejection)) => embeds::create_warning_embed(&rejection.to_string()),
        Err(e) => playback_error_embed(guild_id, &e),
    };
    drop(controller);

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(controller) = bot.music.get(guild_id) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    let result = controller.lock().await.skip().await;
    match result {
        Ok(()) => reply(ctx, command, "⏭️ Canción saltada", false).await,
        Err(e) => reply_embed(ctx, command, playback_error_embed(guild_id, &e)).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(controller) = bot.music.get(guild_id) {
        let result = controller.lock().await.stop().await;
        if let Err(e) = result {
            return reply_embed(ctx, command, playback_error_embed(guild_id, &e)).await;
        }
    }

    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let paused = match bot.music.get(guild_id) {
        Some(controller) => controller.lock().await.pause(),
        None => Err(PlaybackError::NotConnected),
    };

    match paused {
        Ok(true) => reply(ctx, command, "⏸️ Reproducción pausada", false).await,
        Ok(false) => reply(ctx, command, "❌ No hay nada que pausar", true).await,
        Err(e) => reply_embed(ctx, command, playback_error_embed(guild_id, &e)).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let resumed = match bot.music.get(guild_id) {
        Some(controller) => controller.lock().await.resume(),
        None => Err(PlaybackError::NotConnected),
    };

    match resumed {
        Ok(true) => reply(ctx, command, "▶️ Reproducción reanudada", false).await,
        Ok(false) => reply(ctx, command, "❌ La reproducción no estaba pausada", true).await,
        Err(e) => reply_embed(ctx, command, playback_error_embed(guild_id, &e)).await,
    }
}

async fn handle_seek(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let time = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "time")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Tiempo no proporcionado"))?;

    let Some(controller) = bot.music.get(guild_id) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = {
        let mut controller = controller.lock().await;
        match controller.seek(time).await {
            Ok(true) => embeds::create_now_playing_embed(
                controller.current_song().unwrap_or("-"),
                parse_timestamp(time),
            ),
            Ok(false) => embeds::create_warning_embed("Formato inválido, usa `minutos:segundos`"),
            Err(e) => playback_error_embed(guild_id, &e),
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_forward(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let seconds = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "seconds")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Segundos no proporcionados"))?;

    let Some(controller) = bot.music.get(guild_id) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = {
        let mut controller = controller.lock().await;
        match controller.fast_forward(seconds).await {
            Ok(target) => embeds::create_now_playing_embed(
                controller.current_song().unwrap_or("-"),
                Some(target),
            ),
            Err(e) => playback_error_embed(guild_id, &e),
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let serialized = match bot.music.get(guild_id) {
        Some(controller) => controller.lock().await.serialize_queue(),
        None => String::new(),
    };

    reply_embed(ctx, command, embeds::create_queue_embed(&serialized)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let current = match bot.music.get(guild_id) {
        Some(controller) => {
            let controller = controller.lock().await;
            match controller.current_song() {
                Some(url) => Some((url.to_string(), controller.playback_position().await)),
                None => None,
            }
        }
        None => None,
    };

    match current {
        Some((url, position)) => {
            reply_embed(ctx, command, embeds::create_now_playing_embed(&url, position)).await
        }
        None => reply(ctx, command, "❌ No hay nada reproduciéndose actualmente", true).await,
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.music.remove(guild_id).await;

    reply(ctx, command, "👋 Desconectado del canal de voz", false).await
}

// Funciones auxiliares

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

fn playback_error_embed(guild_id: GuildId, error: &PlaybackError) -> CreateEmbed {
    error!("Error de reproducción en guild {}: {:?}", guild_id, error);

    match error {
        PlaybackError::NotConnected => {
            embeds::create_error_embed("Sin conexión", "El bot no está en un canal de voz")
        }
        PlaybackError::Connect(_) => embeds::create_error_embed(
            "Error de conexión",
            "No se pudo entrar al canal de voz. ¿Tengo permisos para conectar y hablar?",
        ),
        other => embeds::create_error_embed("Error de reproducción", &other.to_string()),
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
