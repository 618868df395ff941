use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod library;
mod playback;
mod server;
mod sources;

use crate::audio::{SessionManager, Transcoder};
use crate::bot::SoundboardBot;
use crate::config::Config;
use crate::library::SoundLibrary;
use crate::playback::PlaybackHandler;
use crate::server::AppState;
use crate::sources::SourceResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_soundboard=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Soundboard v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // El manager de voz se comparte entre el cliente de Discord y la API
    let manager = Songbird::serenity();
    let sessions = Arc::new(SessionManager::new(manager.clone()));
    let resolver = SourceResolver::new(&config)?;
    let transcoder = Transcoder::new(config.ffmpeg_path.clone());
    let playback = Arc::new(PlaybackHandler::new(
        sessions.clone(),
        resolver,
        transcoder,
        config.default_volume,
    ));
    let library = Arc::new(SoundLibrary::new(config.sounds_file.clone()));
    let config = Arc::new(config);

    // Levantar la API HTTP
    let state = AppState {
        playback: playback.clone(),
        sessions: sessions.clone(),
        config: config.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = server::serve(state).await {
            error!("❌ Error fatal en el servidor HTTP: {:?}", e);
            std::process::exit(1);
        }
    });

    // Manejar shutdown graceful
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Error al registrar Ctrl+C");
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            sessions.shutdown().await;
            std::process::exit(0);
        });
    }

    match config.discord_token.clone() {
        Some(token) => {
            // Intents mínimos: voz y comandos de texto
            let intents = GatewayIntents::GUILDS
                | GatewayIntents::GUILD_VOICE_STATES
                | GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::MESSAGE_CONTENT;

            let handler = SoundboardBot::new(
                config.clone(),
                library,
                playback.clone(),
                sessions.clone(),
            );

            let mut client = Client::builder(&token, intents)
                .event_handler(handler)
                .register_songbird_with(manager.clone())
                .await?;

            info!("🚀 Bot iniciado exitosamente");
            if let Err(why) = client.start().await {
                error!("Error al ejecutar cliente: {:?}", why);
            }
        }
        None => {
            info!("⚠️ DISCORD_TOKEN no configurado - modo de desarrollo, solo API HTTP");
            futures::future::pending::<()>().await;
        }
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: se necesitan ffmpeg y yt-dlp");
    }
}
