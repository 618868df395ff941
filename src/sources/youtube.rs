use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ExtractedStream, SourceKind, StreamRequest, StreamStrategy, StreamingProvider};
use crate::error::PlaybackError;

pub fn is_youtube_host(host: &str) -> bool {
    host == "www.youtube.com"
        || host == "youtube.com"
        || host == "youtu.be"
        || host == "m.youtube.com"
        || host == "music.youtube.com"
}

/// Clasificación sintáctica de una URL de YouTube ya verificada por host.
/// Una URL con `list=` o path `/playlist` es colección; el resto, track.
pub fn classify_url(parsed: &Url) -> SourceKind {
    let list_id = parsed
        .query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned());

    if parsed.path().starts_with("/playlist") || list_id.is_some() {
        return SourceKind::StreamingCollection {
            provider: StreamingProvider::YouTube,
            id: list_id.unwrap_or_else(|| parsed.to_string()),
        };
    }

    SourceKind::StreamingTrack {
        provider: StreamingProvider::YouTube,
        id: extract_video_id(parsed).unwrap_or_else(|| parsed.to_string()),
    }
}

fn extract_video_id(parsed: &Url) -> Option<String> {
    // Formato corto: youtu.be/<id>
    if parsed.host_str() == Some("youtu.be") {
        return parsed
            .path_segments()
            .and_then(|mut s| s.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    // watch?v=<id>
    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        return Some(v.into_owned());
    }

    // /shorts/<id> y /embed/<id>
    let mut segments = parsed.path_segments()?;
    match segments.next() {
        Some("shorts") | Some("embed") => segments.next().map(str::to_string),
        _ => None,
    }
}

/// Estrategia primaria: `yt-dlp --get-url` resuelve la URL de audio sin
/// descargar. Para colecciones se toma el primer ítem (limitación
/// documentada: no hay cola).
pub struct YtDlpStrategy {
    ytdlp_path: String,
    timeout: Duration,
}

impl YtDlpStrategy {
    pub fn new(ytdlp_path: String, timeout: Duration) -> Self {
        Self { ytdlp_path, timeout }
    }
}

#[async_trait]
impl StreamStrategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(&self, request: &StreamRequest) -> Result<ExtractedStream, PlaybackError> {
        let mut args = vec![
            "--get-title",
            "--get-url",
            "-f",
            "bestaudio/best",
            "--quiet",
            "--no-warnings",
        ];

        if request.collection {
            args.extend(["--playlist-items", "1"]);
        } else {
            args.push("--no-playlist");
        }
        args.push(&request.original_url);

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.ytdlp_path)
                .args(&args)
                .output(),
        )
        .await
        .map_err(|_| {
            PlaybackError::upstream("youtube", format!("yt-dlp superó {}s", self.timeout.as_secs()))
        })?
        .map_err(|e| PlaybackError::upstream("youtube", format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::upstream(
                "youtube",
                format!("yt-dlp terminó con error: {}", stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ytdlp_output(&stdout).ok_or_else(|| {
            PlaybackError::upstream("youtube", "yt-dlp no devolvió ninguna URL de audio")
        })
    }
}

/// Con `--get-title --get-url` yt-dlp imprime el título y después la URL,
/// una por línea.
fn parse_ytdlp_output(stdout: &str) -> Option<ExtractedStream> {
    let mut title = None;
    let mut audio_url = None;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("http://") || line.starts_with("https://") {
            if audio_url.is_none() {
                audio_url = Some(line.to_string());
            }
        } else if title.is_none() {
            title = Some(line.to_string());
        }
    }

    audio_url.map(|url| ExtractedStream {
        audio_url: url,
        title,
    })
}

/// Estrategia secundaria: API de Invidious como alternativa cuando
/// yt-dlp se rompe por cambios del lado de YouTube.
pub struct InvidiousStrategy {
    http: reqwest::Client,
    instances: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    title: String,
    #[serde(rename = "adaptiveFormats", default)]
    adaptive_formats: Vec<AdaptiveFormat>,
}

#[derive(Debug, Deserialize)]
struct AdaptiveFormat {
    url: String,
    #[serde(rename = "type")]
    format_type: String,
    bitrate: Option<String>,
}

impl InvidiousStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            instances: vec![
                "https://yewtu.be",
                "https://inv.nadeko.net",
                "https://invidious.nerdvpn.de",
            ],
        }
    }
}

#[async_trait]
impl StreamStrategy for InvidiousStrategy {
    fn name(&self) -> &'static str {
        "invidious"
    }

    async fn extract(&self, request: &StreamRequest) -> Result<ExtractedStream, PlaybackError> {
        if request.collection {
            return Err(PlaybackError::upstream(
                "youtube",
                "invidious no soporta colecciones",
            ));
        }

        for instance in &self.instances {
            let endpoint = format!("{}/api/v1/videos/{}", instance, request.id);
            debug!("Consultando instancia Invidious: {}", endpoint);

            let video: InvidiousVideo = match self.http.get(&endpoint).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("❌ Respuesta inválida de {}: {}", instance, e);
                        continue;
                    }
                },
                Ok(resp) => {
                    warn!("❌ Instancia {} devolvió {}", instance, resp.status());
                    continue;
                }
                Err(e) => {
                    warn!("❌ Instancia {} inalcanzable: {}", instance, e);
                    continue;
                }
            };

            // Formato de audio con mayor bitrate disponible
            let best = video
                .adaptive_formats
                .iter()
                .filter(|f| f.format_type.starts_with("audio/"))
                .max_by_key(|f| {
                    f.bitrate
                        .as_deref()
                        .and_then(|b| b.parse::<u64>().ok())
                        .unwrap_or(0)
                });

            if let Some(format) = best {
                return Ok(ExtractedStream {
                    audio_url: format.url.clone(),
                    title: Some(video.title),
                });
            }
        }

        Err(PlaybackError::upstream(
            "youtube",
            "ninguna instancia de Invidious devolvió audio",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_hosts_de_youtube() {
        assert!(is_youtube_host("www.youtube.com"));
        assert!(is_youtube_host("youtu.be"));
        assert!(is_youtube_host("music.youtube.com"));
        assert!(!is_youtube_host("example.com"));
        assert!(!is_youtube_host("notyoutube.com"));
    }

    #[test]
    fn test_extraccion_de_video_id() {
        assert_eq!(
            extract_video_id(&parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ")),
            Some("dQw4w9WgXcQ".into())
        );
        assert_eq!(
            extract_video_id(&parse("https://youtu.be/dQw4w9WgXcQ?t=10")),
            Some("dQw4w9WgXcQ".into())
        );
        assert_eq!(
            extract_video_id(&parse("https://www.youtube.com/shorts/abc123")),
            Some("abc123".into())
        );
        assert_eq!(
            extract_video_id(&parse("https://www.youtube.com/embed/xyz789")),
            Some("xyz789".into())
        );
    }

    #[test]
    fn test_salida_de_ytdlp() {
        let out = "Never Gonna Give You Up\nhttps://rr4.googlevideo.com/audio.webm\n";
        let parsed = parse_ytdlp_output(out).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(parsed.audio_url, "https://rr4.googlevideo.com/audio.webm");

        // Sin título (algunos extractores solo imprimen la URL)
        let parsed = parse_ytdlp_output("https://example.com/a\n").unwrap();
        assert_eq!(parsed.title, None);

        assert!(parse_ytdlp_output("").is_none());
    }
}
