use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// Entrada de la biblioteca de sonidos (sounds.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundEntry {
    pub name: String,
    pub url: String,
}

/// Vista de solo lectura sobre el sounds.json que mantiene la web. Los
/// escritores (upload, rename, delete) viven fuera de este proceso, así
/// que cada consulta relee el archivo y no hace falta ningún lock.
pub struct SoundLibrary {
    path: PathBuf,
}

impl SoundLibrary {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Lista completa; un archivo ausente es una biblioteca vacía.
    pub async fn all(&self) -> Result<Vec<SoundEntry>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&raw)?)
    }

    /// Primera entrada cuyo nombre contiene la consulta, sin distinguir
    /// mayúsculas. Un fallo de lectura se reporta como "no encontrado".
    pub async fn find(&self, query: &str) -> Option<SoundEntry> {
        let entries = match self.all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ No se pudo leer la biblioteca de sonidos: {}", e);
                return None;
            }
        };

        let query = query.to_lowercase();
        entries
            .into_iter()
            .find(|entry| entry.name.to_lowercase().contains(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_library(entries: &[SoundEntry]) -> (tempfile::TempDir, SoundLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sounds.json");
        std::fs::write(&path, serde_json::to_vec(entries).unwrap()).unwrap();
        (dir, SoundLibrary::new(path))
    }

    #[tokio::test]
    async fn test_busqueda_sin_mayusculas() {
        let (_dir, library) = write_library(&[
            SoundEntry {
                name: "Airhorn Clásico".into(),
                url: "https://example.com/airhorn.mp3".into(),
            },
            SoundEntry {
                name: "Ratinho".into(),
                url: "/sounds/ratinho.mp3".into(),
            },
        ]);

        let found = library.find("ratinho").await.unwrap();
        assert_eq!(found.url, "/sounds/ratinho.mp3");

        let found = library.find("AIRHORN").await.unwrap();
        assert_eq!(found.name, "Airhorn Clásico");

        assert!(library.find("inexistente").await.is_none());
    }

    #[tokio::test]
    async fn test_archivo_ausente_es_biblioteca_vacia() {
        let library = SoundLibrary::new(PathBuf::from("/nonexistent/sounds.json"));
        assert!(library.all().await.unwrap().is_empty());
        assert!(library.find("x").await.is_none());
    }
}
