use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use serenity::model::id::{ChannelId, GuildId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::audio::SessionManager;
use crate::config::Config;
use crate::error::PlaybackError;
use crate::playback::PlaybackHandler;

/// Estado compartido entre rutas.
#[derive(Clone)]
pub struct AppState {
    pub playback: Arc<PlaybackHandler>,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<Config>,
}

/// Levanta la API HTTP que el front usa para disparar sonidos.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));

    let app = Router::new()
        .route("/play", post(play))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/stop", post(stop))
        .route("/status/:guild_id", get(status))
        .route("/health", get(health))
        .with_state(state);

    info!("🚀 API HTTP escuchando en {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub secret: Option<String>,
    pub guild_id: String,
    pub voice_channel_id: String,
    pub sound_url: String,
    pub volume: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildRequest {
    pub secret: Option<String>,
    pub guild_id: String,
}

type ApiError = (StatusCode, Json<Value>);

/// Todo error del pipeline sale como `{error, message}` con el estado de
/// su categoría; nada se propaga sin mapear hasta axum.
fn error_response(err: &PlaybackError) -> ApiError {
    (
        err.status_code(),
        Json(json!({ "error": err.tag(), "message": err.to_string() })),
    )
}

fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected {
        Some(expected) => provided == Some(expected),
        None => true,
    }
}

fn check_secret(config: &Config, provided: Option<&str>) -> Result<(), ApiError> {
    if secret_matches(config.shared_secret.as_deref(), provided) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        ))
    }
}

fn parse_id(value: &str, field: &str) -> Result<u64, ApiError> {
    match value.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(error_response(&PlaybackError::InvalidArgument(format!(
            "{field} debe ser un id numérico de Discord, recibido: {value:?}"
        )))),
    }
}

async fn play(
    State(state): State<AppState>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&state.config, req.secret.as_deref())?;

    // Modo de desarrollo: sin token no hay Discord, la respuesta se simula
    if state.config.dev_mode() {
        info!("🔧 Modo de desarrollo - simulando reproducción de {}", req.sound_url);
        return Ok(Json(json!({
            "ok": true,
            "source": "dev",
            "message": "modo de desarrollo - audio simulado"
        })));
    }

    let guild_id = parse_id(&req.guild_id, "guildId")?;
    let channel_id = parse_id(&req.voice_channel_id, "voiceChannelId")?;

    let started = state
        .playback
        .handle_play(
            GuildId::new(guild_id),
            ChannelId::new(channel_id),
            &req.sound_url,
            req.volume,
        )
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({
        "ok": true,
        "source": started.kind.as_str(),
        "trackName": started.track_name
    })))
}

async fn pause(
    State(state): State<AppState>,
    Json(req): Json<GuildRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&state.config, req.secret.as_deref())?;
    let guild_id = parse_id(&req.guild_id, "guildId")?;

    state
        .sessions
        .pause(GuildId::new(guild_id))
        .map_err(|e| error_response(&e))?;
    Ok(Json(json!({ "ok": true })))
}

async fn resume(
    State(state): State<AppState>,
    Json(req): Json<GuildRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&state.config, req.secret.as_deref())?;
    let guild_id = parse_id(&req.guild_id, "guildId")?;

    state
        .sessions
        .resume(GuildId::new(guild_id))
        .map_err(|e| error_response(&e))?;
    Ok(Json(json!({ "ok": true })))
}

async fn stop(
    State(state): State<AppState>,
    Json(req): Json<GuildRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&state.config, req.secret.as_deref())?;
    let guild_id = parse_id(&req.guild_id, "guildId")?;

    state
        .sessions
        .stop(GuildId::new(guild_id))
        .map_err(|e| error_response(&e))?;
    Ok(Json(json!({ "ok": true })))
}

async fn status(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let guild_id = parse_id(&guild_id, "guildId")?;
    let snapshot = state.sessions.status(GuildId::new(guild_id));

    Ok(Json(json!({
        "status": snapshot.status.as_str(),
        "trackName": snapshot.track_name,
        "startedAt": snapshot.started_at.map(|t| t.to_rfc3339()),
        "source": snapshot.source,
    })))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "timestamp": Utc::now().to_rfc3339() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_request_en_camel_case() {
        let req: PlayRequest = serde_json::from_str(
            r#"{
                "guildId": "123",
                "voiceChannelId": "456",
                "soundUrl": "https://example.com/a.mp3",
                "volume": 0.5
            }"#,
        )
        .unwrap();

        assert_eq!(req.guild_id, "123");
        assert_eq!(req.voice_channel_id, "456");
        assert_eq!(req.sound_url, "https://example.com/a.mp3");
        assert_eq!(req.volume, Some(0.5));
        assert_eq!(req.secret, None);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("123", "guildId").unwrap(), 123);
        assert!(parse_id("abc", "guildId").is_err());
        assert!(parse_id("", "guildId").is_err());
        // Los ids de Discord nunca son cero
        assert!(parse_id("0", "guildId").is_err());
    }

    #[test]
    fn test_secret() {
        // Sin secreto configurado todo pasa
        assert!(secret_matches(None, None));
        assert!(secret_matches(None, Some("lo que sea")));
        // Con secreto configurado tiene que coincidir
        assert!(secret_matches(Some("s3cr3t"), Some("s3cr3t")));
        assert!(!secret_matches(Some("s3cr3t"), Some("otro")));
        assert!(!secret_matches(Some("s3cr3t"), None));
    }
}
