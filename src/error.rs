use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errores estructurados del pipeline de reproducción.
///
/// Cada variante cruza la frontera HTTP como `{error, message}` con el
/// código de estado de [`PlaybackError::status_code`]. Ningún error de
/// resolución o transcodificación se propaga sin mapear.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("destino de voz no disponible: {0}")]
    DestinationUnavailable(String),

    #[error("archivo local no encontrado: {}", .0.display())]
    NotFound(PathBuf),

    #[error("proveedor no disponible ({provider}): {detail}")]
    UpstreamUnavailable { provider: String, detail: String },

    #[error("la respuesta no parece audio: {0}")]
    UnsupportedContentType(String),

    #[error("error de red: {0}")]
    NetworkError(String),

    #[error("fallo del transcodificador: {0}")]
    TranscoderFailure(String),

    #[error("no hay sesión activa para este servidor")]
    NoActiveSession,
}

impl PlaybackError {
    /// Etiqueta estable de la taxonomía, apta para clientes.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::DestinationUnavailable(_) => "DestinationUnavailable",
            Self::NotFound(_) => "NotFound",
            Self::UpstreamUnavailable { .. } => "UpstreamUnavailable",
            Self::UnsupportedContentType(_) => "UnsupportedContentType",
            Self::NetworkError(_) => "NetworkError",
            Self::TranscoderFailure(_) => "TranscoderFailure",
            Self::NoActiveSession => "NoActiveSession",
        }
    }

    /// Código HTTP según la categoría: 400 entrada del cliente, 404 "nada
    /// sobre lo que actuar", 5xx fallos de upstream o de procesamiento.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::DestinationUnavailable(_) | Self::NotFound(_) | Self::NoActiveSession => {
                StatusCode::NOT_FOUND
            }
            Self::UpstreamUnavailable { .. }
            | Self::NetworkError(_)
            | Self::UnsupportedContentType(_) => StatusCode::BAD_GATEWAY,
            Self::TranscoderFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn upstream(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            provider: provider.into(),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for PlaybackError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_por_categoria() {
        assert_eq!(
            PlaybackError::InvalidArgument("volumen".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PlaybackError::NotFound(PathBuf::from("/tmp/x.mp3")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PlaybackError::NoActiveSession.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PlaybackError::upstream("spotify", "sin prévia").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            PlaybackError::TranscoderFailure("spawn".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tag_estable() {
        assert_eq!(PlaybackError::NoActiveSession.tag(), "NoActiveSession");
        assert_eq!(
            PlaybackError::NetworkError("timeout".into()).tag(),
            "NetworkError"
        );
    }

    #[test]
    fn test_not_found_menciona_el_path() {
        let err = PlaybackError::NotFound(PathBuf::from("/nonexistent/file.mp3"));
        assert!(err.to_string().contains("/nonexistent/file.mp3"));
    }
}
