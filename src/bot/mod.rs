//! Manejador de eventos de Discord: anuncio al conectar y los comandos
//! de texto `!play`, `!stop` y `!help`, el espejo por chat de la API
//! HTTP que usa la web.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audio::SessionManager;
use crate::config::Config;
use crate::library::SoundLibrary;
use crate::playback::PlaybackHandler;

pub struct SoundboardBot {
    config: Arc<Config>,
    library: Arc<SoundLibrary>,
    playback: Arc<PlaybackHandler>,
    sessions: Arc<SessionManager>,
}

impl SoundboardBot {
    pub fn new(
        config: Arc<Config>,
        library: Arc<SoundLibrary>,
        playback: Arc<PlaybackHandler>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            library,
            playback,
            sessions,
        }
    }

    async fn cmd_play(&self, ctx: &Context, msg: &Message, query: &str) -> Result<()> {
        if query.is_empty() {
            msg.reply(&ctx.http, "❌ Decí el nombre del sonido o pegá un link.")
                .await?;
            return Ok(());
        }

        let guild_id = msg
            .guild_id
            .ok_or_else(|| anyhow::anyhow!("!play solo funciona dentro de un servidor"))?;

        let channel_id = get_user_voice_channel(ctx, guild_id, msg.author.id)?;

        // Nombre amigable primero; si no está en la biblioteca, la
        // consulta se trata como URL o path tal cual
        let sound_url = match self.library.find(query).await {
            Some(entry) => {
                info!("📚 Sonido encontrado en la biblioteca: {}", entry.name);
                entry.url
            }
            None => query.to_string(),
        };

        match self
            .playback
            .handle_play(guild_id, channel_id, &sound_url, None)
            .await
        {
            Ok(started) => {
                msg.channel_id
                    .say(&ctx.http, format!("✅ Tocando: **{}**", started.track_name))
                    .await?;
            }
            Err(e) => {
                msg.channel_id
                    .say(&ctx.http, format!("❌ Error al tocar: {e}"))
                    .await?;
            }
        }

        Ok(())
    }

    async fn cmd_stop(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let guild_id = msg
            .guild_id
            .ok_or_else(|| anyhow::anyhow!("!stop solo funciona dentro de un servidor"))?;

        match self.sessions.stop(guild_id) {
            Ok(()) => {
                msg.reply(&ctx.http, "⏹️ Reproducción parada.").await?;
            }
            Err(_) => {
                msg.reply(&ctx.http, "❌ No hay nada sonando.").await?;
            }
        }

        Ok(())
    }

    async fn cmd_help(&self, ctx: &Context, msg: &Message, topic: Option<&str>) -> Result<()> {
        if matches!(topic, Some("sons") | Some("sonidos")) {
            let entries = self.library.all().await?;
            if entries.is_empty() {
                msg.reply(&ctx.http, "📚 La biblioteca está vacía.").await?;
                return Ok(());
            }

            let names: String = entries
                .iter()
                .map(|e| format!("• {}\n", e.name))
                .collect();

            msg.reply(&ctx.http, "🎵 **Sonidos disponibles:**").await?;
            // Discord corta los mensajes en 2000 caracteres
            for chunk in chunk_message(&names, 1900) {
                msg.channel_id
                    .say(&ctx.http, format!("```\n{chunk}\n```"))
                    .await?;
            }
            return Ok(());
        }

        msg.reply(
            &ctx.http,
            "📌 **Comandos del bot:**\n\n\
             ▶️ `!play <nombre o url>` - Toca un sonido o URL\n\
             ⏹️ `!stop` - Para la reproducción actual\n\
             📚 `!help sonidos` - Lista los sonidos de la biblioteca",
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventHandler for SoundboardBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 Bot {} conectado a Discord", ready.user.name);

        if let Some(channel_id) = self.config.announce_channel_id {
            let message = format!(
                "🎧 **El bot de sonidos {} está online!**\n\n\
                 📌 Usá el soundboard desde la web o `!play <nombre>` acá mismo.",
                ready.user.name
            );
            if let Err(e) = ChannelId::new(channel_id).say(&ctx.http, message).await {
                warn!("⚠️ No se pudo enviar el mensaje de bienvenida: {}", e);
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || !msg.content.starts_with('!') {
            return;
        }

        let mut parts = msg.content[1..].trim().split_whitespace();
        let command = match parts.next() {
            Some(c) => c.to_lowercase(),
            None => return,
        };
        let rest = parts.collect::<Vec<_>>().join(" ");

        let result = match command.as_str() {
            "play" => self.cmd_play(&ctx, &msg, rest.trim()).await,
            "stop" => self.cmd_stop(&ctx, &msg).await,
            "help" => {
                self.cmd_help(&ctx, &msg, rest.split_whitespace().next())
                    .await
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            error!("Error en comando !{}: {:?}", command, e);
            let _ = msg
                .reply(&ctx.http, format!("❌ Error: {e}"))
                .await;
        }
    }
}

/// Canal de voz actual del usuario que invocó el comando.
fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Tenés que estar en un canal de voz"))?;

    Ok(channel_id)
}

fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if current.len() + line.len() + 1 > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partido_de_mensajes_largos() {
        let text = "• sonido\n".repeat(500);
        let chunks = chunk_message(&text, 1900);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 1900 + 1);
        }
        let total: usize = chunks.iter().map(|c| c.lines().count()).sum();
        assert_eq!(total, 500);
    }

    #[test]
    fn test_texto_corto_en_un_bloque() {
        let chunks = chunk_message("• uno\n• dos\n", 1900);
        assert_eq!(chunks.len(), 1);
    }
}
