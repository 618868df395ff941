use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    /// Token del bot. `None` activa el modo de desarrollo: la API HTTP
    /// responde pero no se conecta a Discord.
    pub discord_token: Option<String>,
    pub announce_channel_id: Option<u64>, // Canal para el mensaje de bienvenida

    // API HTTP
    pub http_port: u16,
    pub shared_secret: Option<String>,

    // Spotify (opcional - sin credenciales la rama se desactiva)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Binarios externos
    pub ffmpeg_path: String,
    pub ytdlp_path: String,

    // Red
    pub network_timeout_secs: u64,

    // Audio
    pub default_volume: f32,

    // Paths
    pub sounds_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            announce_channel_id: std::env::var("ANNOUNCE_CHANNEL_ID")
                .ok()
                .and_then(|s| s.parse().ok()),

            // API HTTP
            http_port: std::env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()?,
            shared_secret: std::env::var("SHARED_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            // Spotify
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),

            // Binarios externos
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            // Red (timeout de probes, distinto del streaming del cuerpo)
            network_timeout_secs: std::env::var("NETWORK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,

            // Paths
            sounds_file: std::env::var("SOUNDS_FILE")
                .unwrap_or_else(|_| "sounds.json".to_string())
                .into(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "DEFAULT_VOLUME debe estar entre 0.0 y 1.0, recibido: {}",
                self.default_volume
            );
        }

        if self.network_timeout_secs == 0 {
            anyhow::bail!("NETWORK_TIMEOUT_SECS debe ser mayor que 0");
        }

        if self.http_port == 0 {
            anyhow::bail!("PORT debe ser mayor que 0");
        }

        // Spotify requiere ambas credenciales o ninguna
        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET deben configurarse juntos");
        }

        Ok(())
    }

    pub fn dev_mode(&self) -> bool {
        self.discord_token.is_none()
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Resumen sin secretos, apto para logs.
    pub fn summary(&self) -> String {
        format!(
            "Config: puerto {}, secret={}, spotify={}, ffmpeg={}, yt-dlp={}, timeout={}s, sonidos={}",
            self.http_port,
            if self.shared_secret.is_some() { "sí" } else { "no" },
            if self.spotify_enabled() { "sí" } else { "no" },
            self.ffmpeg_path,
            self.ytdlp_path,
            self.network_timeout_secs,
            self.sounds_file.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: None,
            announce_channel_id: None,
            http_port: 3001,
            shared_secret: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            ffmpeg_path: "ffmpeg".into(),
            ytdlp_path: "yt-dlp".into(),
            network_timeout_secs: 10,
            default_volume: 1.0,
            sounds_file: "sounds.json".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valida() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_volumen_fuera_de_rango() {
        let config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spotify_credenciales_parciales() {
        let config = Config {
            spotify_client_id: Some("id".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
