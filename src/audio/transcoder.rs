use futures::TryStreamExt;
use songbird::input::{AudioStream, ChildContainer, Input, LiveInput, RawAdapter};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use symphonia::core::io::{MediaSource, ReadOnlySource};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, warn};

use crate::error::PlaybackError;
use crate::sources::DecodableInput;

/// Formato intermedio fijo: PCM f32 intercalado, 48 kHz estéreo, sin
/// cabecera. Todas las ramas del resolver convergen acá antes de tocar
/// el transporte de voz.
pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Invoca ffmpeg como proceso externo y entrega su salida como `Input`
/// de songbird sin esperar a que termine: el consumo del reproductor
/// arrastra al proceso. El `ChildContainer` mata a ffmpeg cuando el
/// recurso se suelta, así que un `stop` o un fallo posterior del
/// pipeline nunca deja procesos colgados.
pub struct Transcoder {
    ffmpeg_path: String,
}

impl Transcoder {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }

    /// Normaliza cualquier entrada decodificable al formato fijo.
    pub fn normalize(&self, input: DecodableInput) -> Result<Input, PlaybackError> {
        match input {
            DecodableInput::File(path) => self.from_path(&path.to_string_lossy()),
            DecodableInput::Stream(response) => self.from_stream(response),
        }
    }

    fn from_path(&self, path: &str) -> Result<Input, PlaybackError> {
        debug!("🎬 ffmpeg desde archivo: {}", path);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(pcm_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PlaybackError::TranscoderFailure(format!("no se pudo lanzar ffmpeg: {e}"))
            })?;

        drain_stderr(&mut child);
        Ok(wrap_child(child))
    }

    fn from_stream(&self, response: reqwest::Response) -> Result<Input, PlaybackError> {
        debug!("🎬 ffmpeg desde stream HTTP: {}", response.url());

        let mut child = Command::new(&self.ffmpeg_path)
            .args(pcm_args("pipe:0"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PlaybackError::TranscoderFailure(format!("no se pudo lanzar ffmpeg: {e}"))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            PlaybackError::TranscoderFailure("ffmpeg sin stdin disponible".to_string())
        })?;

        // Bombea el cuerpo HTTP hacia ffmpeg. Si el reproductor suelta el
        // recurso, ffmpeg muere, la escritura falla con EPIPE y el stream
        // de red se libera con la tarea.
        let byte_stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = SyncIoBridge::new(StreamReader::new(byte_stream));

        tokio::task::spawn_blocking(move || {
            match std::io::copy(&mut reader, &mut stdin) {
                Ok(bytes) => debug!("🎬 Stream completo enviado a ffmpeg ({} bytes)", bytes),
                Err(e) => debug!("Bombeo hacia ffmpeg interrumpido: {}", e),
            }
            // stdin se suelta acá y ffmpeg ve EOF
        });

        drain_stderr(&mut child);
        Ok(wrap_child(child))
    }
}

/// Argumentos de ffmpeg para el formato intermedio fijo.
fn pcm_args(input_spec: &str) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input_spec.into(),
        "-vn".into(),
        "-f".into(),
        "f32le".into(),
        "-acodec".into(),
        "pcm_f32le".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-ac".into(),
        CHANNELS.to_string(),
        "pipe:1".into(),
    ]
}

/// Canal lateral de errores del proceso: el stderr de ffmpeg se vuelca a
/// los logs sin interrumpir la reproducción.
fn drain_stderr(child: &mut Child) {
    if let Some(stderr) = child.stderr.take() {
        tokio::task::spawn_blocking(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                warn!("ffmpeg: {}", line);
            }
        });
    }
}

/// Envuelve el stdout del proceso como PCM crudo para el driver. El
/// `RawAdapter` antepone la cabecera que el códec raw de songbird
/// reconoce, evitando el probing de contenedores.
fn wrap_child(child: Child) -> Input {
    let container = ChildContainer::from(child);
    let adapter = RawAdapter::new(ReadOnlySource::new(container), SAMPLE_RATE, CHANNELS);

    let stream = AudioStream {
        input: Box::new(adapter) as Box<dyn MediaSource>,
        hint: None,
    };

    Input::Live(LiveInput::Raw(stream), None)
}
