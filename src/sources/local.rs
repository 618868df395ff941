use std::path::PathBuf;

use super::{DecodableInput, ResolvedAudio, SourceKind};
use crate::error::PlaybackError;

/// Resuelve un path local verificando su existencia. Un path que no
/// existe falla con `NotFound` y nunca cae a la rama HTTP directa.
pub fn resolve(sound_url: &str) -> Result<ResolvedAudio, PlaybackError> {
    // El front a veces manda el path entre comillas
    let clean = sound_url.trim().trim_matches('"');
    let path = PathBuf::from(clean);

    if !path.is_file() {
        return Err(PlaybackError::NotFound(path));
    }

    let display_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    Ok(ResolvedAudio {
        input: DecodableInput::File(path),
        display_name,
        kind: SourceKind::LocalFile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archivo_inexistente_es_not_found() {
        let err = resolve("/nonexistent/file.mp3").unwrap_err();
        match err {
            PlaybackError::NotFound(path) => {
                assert_eq!(path, PathBuf::from("/nonexistent/file.mp3"));
            }
            other => panic!("se esperaba NotFound, llegó {other:?}"),
        }
    }

    #[test]
    fn test_archivo_existente() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("airhorn.mp3");
        std::fs::write(&file, b"not really audio").unwrap();

        let resolved = resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved.display_name, "airhorn");
        assert_eq!(resolved.kind, SourceKind::LocalFile);
        match resolved.input {
            DecodableInput::File(p) => assert_eq!(p, file),
            _ => panic!("se esperaba entrada de archivo"),
        }
    }

    #[test]
    fn test_comillas_envolventes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.wav");
        std::fs::write(&file, b"x").unwrap();

        let quoted = format!("\"{}\"", file.display());
        let resolved = resolve(&quoted).unwrap();
        assert_eq!(resolved.display_name, "clip");
    }
}
