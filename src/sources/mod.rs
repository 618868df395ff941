pub mod direct;
pub mod local;
pub mod scraper;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::PlaybackError;

/// User-Agent de navegador para fetches directos: algunos orígenes
/// rechazan los identificadores por defecto de clientes HTTP.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

const AUDIO_EXTENSIONS: &[&str] = &[
    ".mp3", ".wav", ".ogg", ".flac", ".m4a", ".aac", ".opus", ".webm",
];

/// Proveedores de streaming con cadena de extracción propia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingProvider {
    YouTube,
    Spotify,
}

impl StreamingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamingProvider::YouTube => "youtube",
            StreamingProvider::Spotify => "spotify",
        }
    }
}

/// Clasificación sintáctica de un `soundUrl`. Exactamente una variante
/// por entrada; la clasificación nunca toca la red.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    LocalFile,
    DirectHttp,
    ScrapedPage { scraper: &'static str },
    StreamingTrack { provider: StreamingProvider, id: String },
    StreamingCollection { provider: StreamingProvider, id: String },
}

impl SourceKind {
    /// Etiqueta corta para respuestas de la API y metadatos de estado.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LocalFile => "local",
            SourceKind::DirectHttp => "direct",
            SourceKind::ScrapedPage { scraper } => scraper,
            SourceKind::StreamingTrack { provider, .. }
            | SourceKind::StreamingCollection { provider, .. } => provider.as_str(),
        }
    }
}

/// Entrada decodificable que el transcodificador sabe normalizar.
#[derive(Debug)]
pub enum DecodableInput {
    File(PathBuf),
    Stream(reqwest::Response),
}

/// Resultado de la resolución: la entrada más los metadatos que el
/// reproductor expone en `/status`.
#[derive(Debug)]
pub struct ResolvedAudio {
    pub input: DecodableInput,
    pub display_name: String,
    pub kind: SourceKind,
}

/// Petición uniforme para las estrategias de extracción de streaming.
pub struct StreamRequest {
    pub id: String,
    pub collection: bool,
    pub original_url: String,
}

/// URL de audio reproducible obtenida por una estrategia.
pub struct ExtractedStream {
    pub audio_url: String,
    pub title: Option<String>,
}

/// Estrategia de extracción para un proveedor de streaming. Las librerías
/// de extracción de plataformas cerradas se degradan impredeciblemente,
/// así que cada proveedor lleva una lista ordenada que se prueba en
/// secuencia; agregar o quitar una estrategia es editar esa lista.
#[async_trait]
pub trait StreamStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, request: &StreamRequest) -> Result<ExtractedStream, PlaybackError>;
}

/// Clasifica un `soundUrl` en exactamente un [`SourceKind`].
///
/// Orden de predicados (gana el primero): sintaxis de path local,
/// dominios de streaming conocidos, páginas scrapeables, y por último
/// HTTP directo. Función pura sobre la sintaxis de la cadena.
pub fn classify(sound_url: &str) -> SourceKind {
    let trimmed = sound_url.trim().trim_matches('"');

    if looks_like_path(trimmed) {
        return SourceKind::LocalFile;
    }

    if let Ok(parsed) = Url::parse(trimmed) {
        if let Some(host) = parsed.host_str() {
            let host = host.to_ascii_lowercase();

            if youtube::is_youtube_host(&host) {
                return youtube::classify_url(&parsed);
            }

            if spotify::is_spotify_host(&host) {
                return spotify::classify_url(&parsed);
            }

            // Una URL de scraper que ya apunta a un archivo de audio se
            // trata como fetch directo, sin pasar por el HTML.
            if scraper::is_scrape_host(&host) && !has_audio_extension(parsed.path()) {
                return SourceKind::ScrapedPage {
                    scraper: scraper::SCRAPER_NAME,
                };
            }
        }
    }

    SourceKind::DirectHttp
}

/// Sintaxis de path de sistema de archivos: absoluto, letra de unidad de
/// Windows, o relativo con separadores y sin esquema URI.
fn looks_like_path(s: &str) -> bool {
    if s.is_empty() || s.contains("://") {
        return false;
    }

    if s.starts_with('/') || s.starts_with("./") || s.starts_with("../") || s.starts_with('~') {
        return true;
    }

    let bytes = s.as_bytes();
    if bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        return true;
    }

    s.contains('\\') || s.contains('/')
}

fn has_audio_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Nombre legible derivado del último segmento de una URL, sin extensión.
pub(crate) fn display_name_from_url(url: &str) -> String {
    let tail = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or(url);

    let name = tail.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(tail);

    if name.is_empty() {
        "audio".to_string()
    } else {
        name.to_string()
    }
}

/// Resuelve un `soundUrl` arbitrario a una entrada decodificable,
/// aplicando la cadena de fallback por proveedor para streaming.
pub struct SourceResolver {
    http: reqwest::Client,
    probe_timeout: Duration,
    youtube: Vec<Box<dyn StreamStrategy>>,
    spotify: Vec<Box<dyn StreamStrategy>>,
}

impl SourceResolver {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let probe_timeout = Duration::from_secs(config.network_timeout_secs);

        // Sin timeout global: el cuerpo de un stream de audio puede durar
        // más que cualquier probe. El timeout explícito envuelve cada probe.
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(probe_timeout)
            .build()?;

        let youtube: Vec<Box<dyn StreamStrategy>> = vec![
            Box::new(youtube::YtDlpStrategy::new(
                config.ytdlp_path.clone(),
                probe_timeout,
            )),
            Box::new(youtube::InvidiousStrategy::new(http.clone())),
        ];

        // Sin credenciales la rama Spotify queda desactivada por completo
        let spotify: Vec<Box<dyn StreamStrategy>> = if config.spotify_enabled() {
            let api = spotify::SpotifyApi::new(
                http.clone(),
                config.spotify_client_id.clone().unwrap_or_default(),
                config.spotify_client_secret.clone().unwrap_or_default(),
            );
            vec![
                Box::new(spotify::ApiPreviewStrategy::new(api)),
                Box::new(spotify::EmbedScrapeStrategy::new(http.clone())),
            ]
        } else {
            Vec::new()
        };

        Ok(Self {
            http,
            probe_timeout,
            youtube,
            spotify,
        })
    }

    pub async fn resolve(&self, sound_url: &str) -> Result<ResolvedAudio, PlaybackError> {
        let kind = classify(sound_url);
        info!("🔎 Fuente clasificada como {}: {}", kind.as_str(), sound_url);

        match kind.clone() {
            SourceKind::LocalFile => local::resolve(sound_url),
            SourceKind::DirectHttp => direct::resolve(self, sound_url).await,
            SourceKind::ScrapedPage { .. } => scraper::resolve(self, sound_url).await,
            SourceKind::StreamingTrack { provider, id } => {
                self.resolve_streaming(kind, provider, id, false, sound_url)
                    .await
            }
            SourceKind::StreamingCollection { provider, id } => {
                self.resolve_streaming(kind, provider, id, true, sound_url)
                    .await
            }
        }
    }

    async fn resolve_streaming(
        &self,
        kind: SourceKind,
        provider: StreamingProvider,
        id: String,
        collection: bool,
        original_url: &str,
    ) -> Result<ResolvedAudio, PlaybackError> {
        let strategies = match provider {
            StreamingProvider::YouTube => &self.youtube,
            StreamingProvider::Spotify => &self.spotify,
        };

        if strategies.is_empty() {
            return Err(PlaybackError::upstream(
                provider.as_str(),
                "proveedor no configurado",
            ));
        }

        let request = StreamRequest {
            id: id.clone(),
            collection,
            original_url: original_url.to_string(),
        };

        for strategy in strategies {
            info!("🎯 Probando estrategia {} para {}", strategy.name(), id);

            match tokio::time::timeout(self.probe_timeout, strategy.extract(&request)).await {
                Ok(Ok(extracted)) => {
                    let response = self.fetch_stream(&extracted.audio_url).await?;
                    let display_name = extracted
                        .title
                        .unwrap_or_else(|| display_name_from_url(original_url));

                    info!("✅ Estrategia {} resolvió: {}", strategy.name(), display_name);
                    return Ok(ResolvedAudio {
                        input: DecodableInput::Stream(response),
                        display_name,
                        kind,
                    });
                }
                Ok(Err(e)) => {
                    warn!("❌ Estrategia {} falló: {}", strategy.name(), e);
                }
                Err(_) => {
                    warn!(
                        "⏰ Estrategia {} superó el timeout de {}s",
                        strategy.name(),
                        self.probe_timeout.as_secs()
                    );
                }
            }
        }

        Err(PlaybackError::upstream(
            provider.as_str(),
            "todas las estrategias de extracción fallaron",
        ))
    }

    /// GET con timeout explícito sobre el handshake; el cuerpo se consume
    /// en streaming sin límite de duración.
    pub(crate) async fn fetch_stream(
        &self,
        url: &str,
    ) -> Result<reqwest::Response, PlaybackError> {
        let response = tokio::time::timeout(self.probe_timeout, self.http.get(url).send())
            .await
            .map_err(|_| {
                PlaybackError::NetworkError(format!(
                    "timeout de {}s al abrir {}",
                    self.probe_timeout.as_secs(),
                    url
                ))
            })??;

        if !response.status().is_success() {
            return Err(PlaybackError::NetworkError(format!(
                "estado HTTP {} al acceder a {}",
                response.status(),
                url
            )));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_locales() {
        assert_eq!(classify("/home/user/sound.mp3"), SourceKind::LocalFile);
        assert_eq!(classify("./sounds/a.wav"), SourceKind::LocalFile);
        assert_eq!(classify("../a.ogg"), SourceKind::LocalFile);
        assert_eq!(classify("C:\\sounds\\airhorn.mp3"), SourceKind::LocalFile);
        assert_eq!(classify("D:/music/x.mp3"), SourceKind::LocalFile);
        assert_eq!(classify("sounds/relative.mp3"), SourceKind::LocalFile);
        // Comillas envolventes (el front a veces las manda)
        assert_eq!(classify("\"/tmp/a.mp3\""), SourceKind::LocalFile);
    }

    #[test]
    fn test_youtube_track_y_coleccion() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            SourceKind::StreamingTrack {
                provider: StreamingProvider::YouTube,
                id: "dQw4w9WgXcQ".into()
            }
        );
        assert_eq!(
            classify("https://youtu.be/dQw4w9WgXcQ"),
            SourceKind::StreamingTrack {
                provider: StreamingProvider::YouTube,
                id: "dQw4w9WgXcQ".into()
            }
        );
        assert_eq!(
            classify("https://www.youtube.com/playlist?list=PL123"),
            SourceKind::StreamingCollection {
                provider: StreamingProvider::YouTube,
                id: "PL123".into()
            }
        );
    }

    #[test]
    fn test_spotify_track_y_coleccion() {
        assert_eq!(
            classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"),
            SourceKind::StreamingTrack {
                provider: StreamingProvider::Spotify,
                id: "4uLU6hMCjMI75M1A2tKUQC".into()
            }
        );
        assert_eq!(
            classify("https://open.spotify.com/album/1ATL5GLyefJaxhQzSPVrLX"),
            SourceKind::StreamingCollection {
                provider: StreamingProvider::Spotify,
                id: "album:1ATL5GLyefJaxhQzSPVrLX".into()
            }
        );
        assert_eq!(
            classify("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            SourceKind::StreamingCollection {
                provider: StreamingProvider::Spotify,
                id: "playlist:37i9dQZF1DXcBWIGoYBM5M".into()
            }
        );
    }

    #[test]
    fn test_scraper_y_fallthrough_directo() {
        assert_eq!(
            classify("https://www.myinstants.com/en/instant/airhorn/"),
            SourceKind::ScrapedPage {
                scraper: "myinstants"
            }
        );
        // Ya apunta a un mp3: no se scrapea
        assert_eq!(
            classify("https://www.myinstants.com/media/sounds/airhorn.mp3"),
            SourceKind::DirectHttp
        );
        assert_eq!(
            classify("https://example.com/a.mp3"),
            SourceKind::DirectHttp
        );
        // Nombre suelto sin separadores: directo (el bot resuelve nombres
        // amigables contra la biblioteca antes de llegar aquí)
        assert_eq!(classify("airhorn"), SourceKind::DirectHttp);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name_from_url("https://example.com/a.mp3"), "a");
        assert_eq!(
            display_name_from_url("https://x.com/sounds/air-horn.mp3?v=2"),
            "air-horn"
        );
        assert_eq!(display_name_from_url("https://x.com/"), "audio");
    }
}
