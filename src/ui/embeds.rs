use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::controller::TrackOrigin;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Music";

/// Canciones por embed de cola
const QUEUE_PREVIEW: usize = 10;

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(url: &str, origin: TrackOrigin, position: usize) -> CreateEmbed {
    let source = match origin {
        TrackOrigin::Url => "🔗 URL",
        TrackOrigin::Search => "🔍 Búsqueda",
    };

    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(url)
        .url(url)
        .color(colors::SUCCESS_GREEN)
        .field("📋 Posición", position.to_string(), true)
        .field("Origen", source, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(url: &str, position: Option<Duration>) -> CreateEmbed {
    let elapsed = position.map_or_else(|| "-".to_string(), format_duration);

    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(url)
        .url(url)
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Posición", elapsed, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción.
///
/// `serialized` es la cola con una URL por línea; la primera es la que suena.
pub fn create_queue_embed(serialized: &str) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    let tracks: Vec<&str> = serialized.lines().filter(|line| !line.is_empty()).collect();
    let Some((current, upcoming)) = tracks.split_first() else {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY);
    };

    let mut embed = embed.field("▶️ Reproduciendo", *current, false);

    if !upcoming.is_empty() {
        let mut description = String::new();
        for (i, url) in upcoming.iter().take(QUEUE_PREVIEW).enumerate() {
            description.push_str(&format!("**{}**. {}\n", i + 1, url));
        }
        if upcoming.len() > QUEUE_PREVIEW {
            description.push_str(&format!("… y {} más\n", upcoming.len() - QUEUE_PREVIEW));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    embed.field(
        "Total",
        format!("**{}** canciones", tracks.len()),
        true,
    )
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia (entrada rechazada, cola llena...)
pub fn create_warning_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ No se agregó nada")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
