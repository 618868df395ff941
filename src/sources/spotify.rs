use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use super::{ExtractedStream, SourceKind, StreamRequest, StreamStrategy, StreamingProvider};
use crate::error::PlaybackError;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

pub fn is_spotify_host(host: &str) -> bool {
    host == "open.spotify.com" || host == "spotify.com" || host == "www.spotify.com"
}

/// Clasificación sintáctica de una URL de Spotify. El id de colección
/// lleva el prefijo `album:`/`playlist:` para que la estrategia sepa qué
/// endpoint del catálogo consultar.
pub fn classify_url(parsed: &Url) -> SourceKind {
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    // Los paths pueden llevar prefijo regional (/intl-es/track/...)
    for window in segments.windows(2) {
        let id = window[1].to_string();
        match window[0] {
            "track" => {
                return SourceKind::StreamingTrack {
                    provider: StreamingProvider::Spotify,
                    id,
                }
            }
            "album" => {
                return SourceKind::StreamingCollection {
                    provider: StreamingProvider::Spotify,
                    id: format!("album:{id}"),
                }
            }
            "playlist" => {
                return SourceKind::StreamingCollection {
                    provider: StreamingProvider::Spotify,
                    id: format!("playlist:{id}"),
                }
            }
            _ => {}
        }
    }

    // URL de Spotify sin forma reconocible: se intenta como track
    SourceKind::StreamingTrack {
        provider: StreamingProvider::Spotify,
        id: parsed.to_string(),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Track {
    name: String,
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

#[derive(Deserialize)]
struct AlbumTracks {
    items: Vec<AlbumItem>,
}

#[derive(Deserialize)]
struct AlbumItem {
    id: String,
}

#[derive(Deserialize)]
struct PlaylistTracks {
    items: Vec<PlaylistItem>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<AlbumItem>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente mínimo de la Web API de Spotify con client-credentials grant
/// y caché del token de acceso.
pub struct SpotifyApi {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

impl SpotifyApi {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String, PlaybackError> {
        {
            let cached = self.token.read();
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        let auth = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(ACCOUNTS_URL)
            .header("Authorization", format!("Basic {auth}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlaybackError::upstream(
                "spotify",
                format!("token rechazado con estado {}", response.status()),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlaybackError::upstream("spotify", format!("respuesta de token: {e}")))?;

        let value = token.access_token.clone();
        // Margen de 30s para no usar un token al borde de expirar
        let expires_at =
            Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(30));
        *self.token.write() = Some(CachedToken {
            value: token.access_token,
            expires_at,
        });

        Ok(value)
    }

    async fn get_track(&self, track_id: &str) -> Result<Track, PlaybackError> {
        let token = self.token().await?;
        let response = self
            .http
            .get(format!("{API_BASE}/tracks/{track_id}"))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlaybackError::upstream(
                "spotify",
                format!("track {} devolvió {}", track_id, response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PlaybackError::upstream("spotify", format!("respuesta de track: {e}")))
    }

    /// Primer track de un álbum o playlist (limitación documentada: las
    /// colecciones no encolan, suena solo el primer ítem).
    async fn first_collection_track(&self, collection_id: &str) -> Result<String, PlaybackError> {
        let token = self.token().await?;

        let (endpoint, is_playlist) = match collection_id.split_once(':') {
            Some(("album", id)) => (format!("{API_BASE}/albums/{id}/tracks?limit=1"), false),
            Some(("playlist", id)) => (format!("{API_BASE}/playlists/{id}/tracks?limit=1"), true),
            _ => {
                return Err(PlaybackError::upstream(
                    "spotify",
                    format!("colección irreconocible: {collection_id}"),
                ))
            }
        };

        let response = self.http.get(&endpoint).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(PlaybackError::upstream(
                "spotify",
                format!("colección devolvió {}", response.status()),
            ));
        }

        let first = if is_playlist {
            let body: PlaylistTracks = response.json().await.map_err(|e| {
                PlaybackError::upstream("spotify", format!("respuesta de playlist: {e}"))
            })?;
            body.items.into_iter().next().and_then(|i| i.track)
        } else {
            let body: AlbumTracks = response.json().await.map_err(|e| {
                PlaybackError::upstream("spotify", format!("respuesta de álbum: {e}"))
            })?;
            body.items.into_iter().next()
        };

        first.map(|t| t.id).ok_or_else(|| {
            PlaybackError::upstream("spotify", "la colección no tiene tracks")
        })
    }
}

/// Estrategia primaria: Web API oficial, que expone la `preview_url` de
/// 30 segundos de cada track.
pub struct ApiPreviewStrategy {
    api: SpotifyApi,
}

impl ApiPreviewStrategy {
    pub fn new(api: SpotifyApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StreamStrategy for ApiPreviewStrategy {
    fn name(&self) -> &'static str {
        "spotify-api"
    }

    async fn extract(&self, request: &StreamRequest) -> Result<ExtractedStream, PlaybackError> {
        let track_id = if request.collection {
            self.api.first_collection_track(&request.id).await?
        } else {
            request.id.clone()
        };

        let track = self.api.get_track(&track_id).await?;
        let title = match track.artists.first() {
            Some(artist) => format!("{} - {}", artist.name, track.name),
            None => track.name.clone(),
        };

        match track.preview_url {
            Some(url) => Ok(ExtractedStream {
                audio_url: url,
                title: Some(title),
            }),
            None => Err(PlaybackError::upstream(
                "spotify",
                "este track no tiene prévia de audio disponible",
            )),
        }
    }
}

fn embed_preview_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""audioPreview"\s*:\s*\{\s*"url"\s*:\s*"([^"]+)""#)
            .expect("patrón de audioPreview")
    })
}

fn embed_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("patrón de name"))
}

/// Estrategia secundaria: la página de embed público incluye la misma
/// prévia en su JSON inline y no requiere credenciales.
pub struct EmbedScrapeStrategy {
    http: reqwest::Client,
}

impl EmbedScrapeStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StreamStrategy for EmbedScrapeStrategy {
    fn name(&self) -> &'static str {
        "spotify-embed"
    }

    async fn extract(&self, request: &StreamRequest) -> Result<ExtractedStream, PlaybackError> {
        if request.collection {
            return Err(PlaybackError::upstream(
                "spotify",
                "el embed solo sirve para tracks individuales",
            ));
        }

        let embed_url = format!("https://open.spotify.com/embed/track/{}", request.id);
        debug!("Scrapeando embed de Spotify: {}", embed_url);

        let response = self.http.get(&embed_url).send().await?;
        if !response.status().is_success() {
            return Err(PlaybackError::upstream(
                "spotify",
                format!("embed devolvió {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PlaybackError::upstream("spotify", format!("leyendo embed: {e}")))?;

        parse_embed_html(&html).ok_or_else(|| {
            PlaybackError::upstream("spotify", "el embed no contiene prévia de audio")
        })
    }
}

fn parse_embed_html(html: &str) -> Option<ExtractedStream> {
    let audio_url = embed_preview_regex()
        .captures(html)?
        .get(1)?
        .as_str()
        .replace("\\/", "/");

    let title = embed_name_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(ExtractedStream { audio_url, title })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hosts_de_spotify() {
        assert!(is_spotify_host("open.spotify.com"));
        assert!(!is_spotify_host("example.com"));
        assert!(!is_spotify_host("notspotify.com"));
    }

    #[test]
    fn test_clasificacion_con_prefijo_regional() {
        let parsed = Url::parse("https://open.spotify.com/intl-es/track/abc123").unwrap();
        assert_eq!(
            classify_url(&parsed),
            SourceKind::StreamingTrack {
                provider: StreamingProvider::Spotify,
                id: "abc123".into()
            }
        );
    }

    #[test]
    fn test_parseo_del_embed() {
        let html = r#"{"name":"Never Gonna Give You Up","audioPreview":{"url":"https:\/\/p.scdn.co\/mp3-preview\/abc"}}"#;
        let parsed = parse_embed_html(html).unwrap();
        assert_eq!(parsed.audio_url, "https://p.scdn.co/mp3-preview/abc");
        assert_eq!(parsed.title.as_deref(), Some("Never Gonna Give You Up"));
    }

    #[test]
    fn test_embed_sin_previa() {
        assert!(parse_embed_html(r#"{"name":"x"}"#).is_none());
    }
}
