use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::info;

use crate::audio::{SessionManager, TrackMetadata, Transcoder};
use crate::error::PlaybackError;
use crate::sources::{SourceKind, SourceResolver};

/// Resultado de un intento de reproducción que llegó a sonar.
#[derive(Debug)]
pub struct PlaybackStarted {
    pub kind: SourceKind,
    pub track_name: String,
}

/// Orquesta una petición de reproducción de punta a punta: validar,
/// asegurar la sesión, resolver la fuente, normalizar el audio y
/// vincularlo al reproductor. Cada llamada termina en exactamente uno de
/// {recurso sonando, fallo estructurado}; si algo falla después de
/// lanzar ffmpeg, soltar el `Input` a medio construir mata el proceso.
pub struct PlaybackHandler {
    sessions: Arc<SessionManager>,
    resolver: SourceResolver,
    transcoder: Transcoder,
    default_volume: f32,
}

impl PlaybackHandler {
    pub fn new(
        sessions: Arc<SessionManager>,
        resolver: SourceResolver,
        transcoder: Transcoder,
        default_volume: f32,
    ) -> Self {
        Self {
            sessions,
            resolver,
            transcoder,
            default_volume,
        }
    }

    pub async fn handle_play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        sound_url: &str,
        volume: Option<f32>,
    ) -> Result<PlaybackStarted, PlaybackError> {
        let sound_url = sound_url.trim();
        if sound_url.is_empty() {
            return Err(PlaybackError::InvalidArgument(
                "soundUrl no puede estar vacío".to_string(),
            ));
        }

        // Sin volumen explícito rige el configurado; se valida antes de
        // tocar el destino
        let volume = volume.unwrap_or(self.default_volume);
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidArgument(format!(
                "volume debe estar en [0, 1], recibido: {volume}"
            )));
        }

        self.sessions.ensure_session(guild_id, channel_id).await?;

        let resolved = self.resolver.resolve(sound_url).await?;
        let input = self.transcoder.normalize(resolved.input)?;

        let metadata = TrackMetadata {
            track_name: resolved.display_name.clone(),
            source: resolved.kind.as_str(),
        };
        self.sessions.play(guild_id, input, Some(volume), metadata).await?;

        info!(
            "✅ Reproducción iniciada en guild {} - fuente: {}, track: {}",
            guild_id,
            resolved.kind.as_str(),
            resolved.display_name
        );

        Ok(PlaybackStarted {
            kind: resolved.kind,
            track_name: resolved.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use songbird::Songbird;

    fn handler_with(config: Config) -> PlaybackHandler {
        PlaybackHandler::new(
            Arc::new(SessionManager::new(Songbird::serenity())),
            SourceResolver::new(&config).unwrap(),
            Transcoder::new(config.ffmpeg_path.clone()),
            config.default_volume,
        )
    }

    fn handler() -> PlaybackHandler {
        handler_with(Config::default())
    }

    #[tokio::test]
    async fn test_volumen_invalido_antes_de_conectar() {
        let handler = handler();

        for volume in [-0.1, 1.5, 2.0] {
            let err = handler
                .handle_play(GuildId::new(1), ChannelId::new(2), "airhorn", Some(volume))
                .await
                .map(|_| ())
                .unwrap_err();
            assert_eq!(err.tag(), "InvalidArgument");
        }
    }

    #[tokio::test]
    async fn test_sin_volumen_explicito_rige_el_configurado() {
        // Volumen configurado fuera de rango: si la petición sin volumen
        // lo rechaza, el valor configurado entró al pipeline
        let handler = handler_with(Config {
            default_volume: 1.5,
            ..Config::default()
        });

        let err = handler
            .handle_play(GuildId::new(1), ChannelId::new(2), "airhorn", None)
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.tag(), "InvalidArgument");
    }

    #[tokio::test]
    async fn test_sound_url_vacio() {
        let handler = handler();
        let err = handler
            .handle_play(GuildId::new(1), ChannelId::new(2), "   ", None)
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.tag(), "InvalidArgument");
    }
}
