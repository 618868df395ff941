use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};
use url::Url;

use super::{direct, display_name_from_url, DecodableInput, ResolvedAudio, SourceKind, SourceResolver};
use crate::error::PlaybackError;

pub const SCRAPER_NAME: &str = "myinstants";

pub fn is_scrape_host(host: &str) -> bool {
    host == "myinstants.com" || host.ends_with(".myinstants.com")
}

fn audio_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Primer archivo de audio embebido en la página, absoluto o relativo
    RE.get_or_init(|| {
        Regex::new(r#"(?:https?://[^"'\s]+?|/media/sounds/[^"'\s]+?)\.(?:mp3|ogg|wav)"#)
            .expect("patrón de audio embebido")
    })
}

/// Scrapea una página de MyInstants buscando la primera URL de audio
/// embebida. El scraping es best-effort: si el patrón no aparece, la URL
/// original se intenta como fetch directo en lugar de fallar.
pub async fn resolve(
    resolver: &SourceResolver,
    page_url: &str,
) -> Result<ResolvedAudio, PlaybackError> {
    let response = resolver.fetch_stream(page_url).await?;
    let html = response
        .text()
        .await
        .map_err(|e| PlaybackError::NetworkError(format!("leyendo HTML de {page_url}: {e}")))?;

    match extract_audio_url(&html, page_url) {
        Some(audio_url) => {
            info!("🎯 Audio extraído de {}: {}", SCRAPER_NAME, audio_url);
            let stream = resolver.fetch_stream(&audio_url).await?;

            Ok(ResolvedAudio {
                display_name: display_name_from_url(&audio_url),
                input: DecodableInput::Stream(stream),
                kind: SourceKind::ScrapedPage {
                    scraper: SCRAPER_NAME,
                },
            })
        }
        None => {
            warn!(
                "⚠️ Sin audio embebido en {}, intentando fetch directo",
                page_url
            );
            direct::resolve(resolver, page_url).await
        }
    }
}

/// Primera URL de audio del HTML, absolutizada contra la página origen.
fn extract_audio_url(html: &str, page_url: &str) -> Option<String> {
    let found = audio_url_regex().find(html)?.as_str();

    if found.starts_with("http") {
        return Some(found.to_string());
    }

    let base = Url::parse(page_url).ok()?;
    base.join(found).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<html><body>
        <button onclick="play('/media/sounds/airhorn.mp3', 'n', this)">Play</button>
        <button onclick="play('/media/sounds/other.mp3', 'n', this)">Play</button>
    </body></html>"#;

    #[test]
    fn test_extrae_primer_audio_relativo() {
        let url = extract_audio_url(SAMPLE, "https://www.myinstants.com/en/instant/airhorn/");
        assert_eq!(
            url.as_deref(),
            Some("https://www.myinstants.com/media/sounds/airhorn.mp3")
        );
    }

    #[test]
    fn test_extrae_audio_absoluto() {
        let html = r#"<audio src="https://cdn.example.com/clip.ogg"></audio>"#;
        let url = extract_audio_url(html, "https://www.myinstants.com/x/");
        assert_eq!(url.as_deref(), Some("https://cdn.example.com/clip.ogg"));
    }

    #[test]
    fn test_sin_coincidencia() {
        assert_eq!(
            extract_audio_url("<html><p>nada</p></html>", "https://www.myinstants.com/"),
            None
        );
    }

    #[test]
    fn test_hosts() {
        assert!(is_scrape_host("myinstants.com"));
        assert!(is_scrape_host("www.myinstants.com"));
        assert!(!is_scrape_host("example.com"));
        assert!(!is_scrape_host("notmyinstants.com"));
    }
}
