use super::{display_name_from_url, DecodableInput, ResolvedAudio, SourceKind, SourceResolver};
use crate::error::PlaybackError;

/// Resuelve una URL HTTP directa: GET con User-Agent de navegador,
/// estado exitoso obligatorio y un chequeo laxo de Content-Type.
pub async fn resolve(
    resolver: &SourceResolver,
    sound_url: &str,
) -> Result<ResolvedAudio, PlaybackError> {
    let response = resolver.fetch_stream(sound_url).await?;

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if !looks_like_audio(content_type) {
            return Err(PlaybackError::UnsupportedContentType(format!(
                "{} devolvió {}",
                sound_url, content_type
            )));
        }
    }

    Ok(ResolvedAudio {
        display_name: display_name_from_url(sound_url),
        input: DecodableInput::Stream(response),
        kind: SourceKind::DirectHttp,
    })
}

/// Laxo a propósito: muchos servidores sirven mp3 como octet-stream.
/// Solo se rechaza lo que claramente no es un medio (HTML, texto, JSON).
fn looks_like_audio(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    !(ct.starts_with("text/") || ct.contains("html") || ct.contains("json") || ct.contains("xml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types_aceptados() {
        assert!(looks_like_audio("audio/mpeg"));
        assert!(looks_like_audio("audio/ogg; codecs=opus"));
        assert!(looks_like_audio("application/octet-stream"));
        assert!(looks_like_audio("video/webm"));
    }

    #[test]
    fn test_content_types_rechazados() {
        assert!(!looks_like_audio("text/html; charset=utf-8"));
        assert!(!looks_like_audio("application/json"));
        assert!(!looks_like_audio("text/plain"));
        assert!(!looks_like_audio("application/xhtml+xml"));
    }
}
