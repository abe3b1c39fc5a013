use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::{controller::ControllerOptions, voice::NoSubscriberBehavior};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub max_queue_size: usize,
    #[serde(skip)]
    pub no_subscriber: NoSubscriberBehavior,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdlp_concurrency: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            no_subscriber: std::env::var("NO_SUBSCRIBER_BEHAVIOR")
                .unwrap_or_else(|_| "continue".to_string())
                .parse()?,

            // yt-dlp
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            ytdlp_concurrency: std::env::var("YTDLP_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - The Discord token must not be empty
    /// - Queue size and yt-dlp concurrency must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.ytdlp_concurrency == 0 {
            anyhow::bail!("yt-dlp concurrency must be greater than 0");
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("YTDLP_PATH must not be empty");
        }

        Ok(())
    }

    /// Opciones de los controladores por guild
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            max_queue_size: self.max_queue_size,
            no_subscriber: self.no_subscriber,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {} queue, {:?} without subscriber\n  \
            yt-dlp: {} ({} concurrent)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.no_subscriber,
            self.ytdlp_path,
            self.ytdlp_concurrency,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            no_subscriber: NoSubscriberBehavior::Continue,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_concurrency: 3,
        }
    }
}
