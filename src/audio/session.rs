use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::PlaybackError;

/// Estados del reproductor por servidor.
///
/// `idle -[play]-> buffering -[stream listo]-> playing -[pause]-> paused
/// -[resume]-> playing; cualquier estado -[stop | fin | error]-> idle`.
/// Toda transición a `idle` suelta el recurso de audio, lo que mata al
/// ffmpeg que lo alimentaba.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Buffering => "buffering",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
        }
    }
}

/// Metadatos del track actual para las consultas de estado.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub track_name: String,
    pub source: &'static str,
}

/// Instantánea del reproductor devuelta por `status`. Sin sesión, los
/// campos vuelven a sus valores de reposo.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub track_name: Option<String>,
    pub source: Option<&'static str>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlayerSnapshot {
    fn idle() -> Self {
        Self {
            status: PlayerStatus::Idle,
            track_name: None,
            source: None,
            started_at: None,
        }
    }
}

/// Conexión viva a un canal de voz. A lo sumo una por guild.
struct VoiceSession {
    channel_id: ChannelId,
    call: Arc<Mutex<Call>>,
}

/// Recurso de audio vinculado al reproductor de una guild. Reemplazado,
/// nunca mezclado, en cada `play`.
struct PlayerRecord {
    handle: TrackHandle,
    status: PlayerStatus,
    metadata: TrackMetadata,
    started_at: DateTime<Utc>,
}

/// Dueño exclusivo de las sesiones de voz y sus reproductores.
///
/// Registro explícito por guild: creación serializada con un lock por
/// clave (guilds distintas nunca se bloquean entre sí), reutilización de
/// la conexión entre plays, y desmontaje completo cuando el transporte
/// notifica la desconexión.
pub struct SessionManager {
    songbird: Arc<Songbird>,
    sessions: Arc<DashMap<GuildId, VoiceSession>>,
    players: Arc<DashMap<GuildId, PlayerRecord>>,
    join_locks: Arc<DashMap<GuildId, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            sessions: Arc::new(DashMap::new()),
            players: Arc::new(DashMap::new()),
            join_locks: Arc::new(DashMap::new()),
        }
    }

    /// Devuelve la sesión existente para la guild o crea la conexión.
    /// Dos llamadas concurrentes para la misma guild nunca crean dos
    /// conexiones: la creación va bajo el lock de esa guild.
    pub async fn ensure_session(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), PlaybackError> {
        let lock = self
            .join_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(session) = self.sessions.get(&guild_id) {
            if session.channel_id == channel_id {
                debug!("Reutilizando sesión de voz para guild {}", guild_id);
                return Ok(());
            }
            info!(
                "🔀 Cambiando de canal en guild {}: {} -> {}",
                guild_id, session.channel_id, channel_id
            );
        }

        let call = self
            .songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::DestinationUnavailable(e.to_string()))?;

        {
            // Una sola suscripción por sesión: el transporte notifica la
            // desconexión y el handler desmonta el registro completo.
            let mut call_lock = call.lock().await;
            call_lock.remove_all_global_events();
            call_lock.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectHandler {
                    guild_id,
                    sessions: self.sessions.clone(),
                    players: self.players.clone(),
                    join_locks: self.join_locks.clone(),
                },
            );
        }

        self.sessions.insert(
            guild_id,
            VoiceSession {
                channel_id,
                call: call.clone(),
            },
        );

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Vincula un nuevo recurso al reproductor de la guild. Cualquier
    /// recurso anterior se detiene antes de vincular el nuevo: el último
    /// pedido gana, semántica de soundboard.
    pub async fn play(
        &self,
        guild_id: GuildId,
        input: Input,
        volume: Option<f32>,
        metadata: TrackMetadata,
    ) -> Result<(), PlaybackError> {
        let call = self
            .sessions
            .get(&guild_id)
            .map(|s| s.call.clone())
            .ok_or(PlaybackError::NoActiveSession)?;

        if let Some((_, previous)) = self.players.remove(&guild_id) {
            debug!("⏹️ Deteniendo recurso anterior en guild {}", guild_id);
            let _ = previous.handle.stop();
        }

        let handle = {
            let mut call_lock = call.lock().await;
            call_lock.play_input(input)
        };

        if let Some(v) = volume {
            let _ = handle.set_volume(v);
        }

        // El registro entra antes de suscribir los eventos: un `Play`
        // inmediato tiene que encontrar su registro para confirmarlo
        info!("🎵 Reproduciendo: {} ({})", metadata.track_name, metadata.source);
        self.players.insert(
            guild_id,
            PlayerRecord {
                handle: handle.clone(),
                status: PlayerStatus::Buffering,
                metadata,
                started_at: Utc::now(),
            },
        );

        let lifecycle = TrackLifecycleHandler {
            guild_id,
            players: self.players.clone(),
        };
        for event in [TrackEvent::Play, TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), lifecycle.clone()) {
                warn!("No se pudo registrar handler de track: {:?}", e);
            }
        }

        Ok(())
    }

    pub fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut record = self
            .players
            .get_mut(&guild_id)
            .ok_or(PlaybackError::NoActiveSession)?;

        record
            .handle
            .pause()
            .map_err(|_| PlaybackError::NoActiveSession)?;
        record.status = PlayerStatus::Paused;

        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut record = self
            .players
            .get_mut(&guild_id)
            .ok_or(PlaybackError::NoActiveSession)?;

        record
            .handle
            .play()
            .map_err(|_| PlaybackError::NoActiveSession)?;
        record.status = PlayerStatus::Playing;

        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Detiene y suelta el recurso actual. Una segunda llamada sin
    /// recurso vigente devuelve `NoActiveSession`.
    pub fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let (_, record) = self
            .players
            .remove(&guild_id)
            .ok_or(PlaybackError::NoActiveSession)?;

        let _ = record.handle.stop();
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    /// Instantánea del reproductor; valores de reposo si no hay sesión.
    pub fn status(&self, guild_id: GuildId) -> PlayerSnapshot {
        match self.players.get(&guild_id) {
            Some(record) => PlayerSnapshot {
                status: record.status,
                track_name: Some(record.metadata.track_name.clone()),
                source: Some(record.metadata.source),
                started_at: Some(record.started_at),
            },
            None => PlayerSnapshot::idle(),
        }
    }

    /// Desmontaje explícito al apagar el proceso; fuera de esto las
    /// sesiones solo mueren cuando el transporte se desconecta.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|e| *e.key()).collect();

        for guild_id in guilds {
            if let Some((_, record)) = self.players.remove(&guild_id) {
                let _ = record.handle.stop();
            }
            self.sessions.remove(&guild_id);
            self.join_locks.remove(&guild_id);
            if let Err(e) = self.songbird.remove(guild_id).await {
                warn!("Error al soltar la conexión de {}: {:?}", guild_id, e);
            }
        }

        info!("👋 Sesiones de voz cerradas");
    }
}

/// Transición del registro del reproductor ante un evento de track.
#[derive(Debug, PartialEq, Eq)]
enum Transition {
    SetPlaying,
    Clear,
    Ignore,
}

/// Los eventos de un track ya reemplazado por un play posterior no
/// tocan el registro (`is_current` compara uuids).
fn lifecycle_transition(is_current: bool, mode: &PlayMode) -> Transition {
    if !is_current {
        return Transition::Ignore;
    }

    match mode {
        PlayMode::Play => Transition::SetPlaying,
        PlayMode::End | PlayMode::Stop | PlayMode::Errored(_) => Transition::Clear,
        _ => Transition::Ignore,
    }
}

/// Transiciones asíncronas del track: confirmación de reproducción y
/// vuelta a reposo al terminar o fallar.
#[derive(Clone)]
struct TrackLifecycleHandler {
    guild_id: GuildId,
    players: Arc<DashMap<GuildId, PlayerRecord>>,
}

#[serenity::async_trait]
impl VoiceEventHandler for TrackLifecycleHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, handle) in *track_list {
                let is_current = self
                    .players
                    .get(&self.guild_id)
                    .map(|r| r.handle.uuid() == handle.uuid())
                    .unwrap_or(false);

                match lifecycle_transition(is_current, &state.playing) {
                    Transition::SetPlaying => {
                        if let Some(mut record) = self.players.get_mut(&self.guild_id) {
                            record.status = PlayerStatus::Playing;
                        }
                    }
                    Transition::Clear => {
                        if let PlayMode::Errored(e) = &state.playing {
                            error!(
                                "❌ Error de reproducción en guild {}: {:?}",
                                self.guild_id, e
                            );
                        } else {
                            debug!("🎵 Track finalizado en guild {}", self.guild_id);
                        }
                        self.players.remove(&self.guild_id);
                    }
                    Transition::Ignore => {}
                }
            }
        }

        None
    }
}

/// Desconexión a nivel de transporte: se eliminan por completo las
/// entradas de la guild (lock de join incluido) para que el próximo
/// `ensure_session` cree una conexión fresca en lugar de reutilizar un
/// handle muerto.
struct DisconnectHandler {
    guild_id: GuildId,
    sessions: Arc<DashMap<GuildId, VoiceSession>>,
    players: Arc<DashMap<GuildId, PlayerRecord>>,
    join_locks: Arc<DashMap<GuildId, Arc<Mutex<()>>>>,
}

impl DisconnectHandler {
    fn teardown(&self) {
        if let Some((_, record)) = self.players.remove(&self.guild_id) {
            let _ = record.handle.stop();
        }
        self.sessions.remove(&self.guild_id);
        self.join_locks.remove(&self.guild_id);
    }
}

#[serenity::async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        info!("🔌 Transporte desconectado en guild {}", self.guild_id);
        self.teardown();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_en_reposo() {
        let snapshot = PlayerSnapshot::idle();
        assert_eq!(snapshot.status, PlayerStatus::Idle);
        assert_eq!(snapshot.track_name, None);
        assert_eq!(snapshot.source, None);
        assert_eq!(snapshot.started_at, None);
    }

    #[test]
    fn test_status_sin_sesion_devuelve_reposo() {
        let manager = SessionManager::new(Songbird::serenity());
        let snapshot = manager.status(GuildId::new(1));
        assert_eq!(snapshot.status, PlayerStatus::Idle);
        assert_eq!(snapshot.track_name, None);
    }

    #[test]
    fn test_operaciones_sin_sesion() {
        let manager = SessionManager::new(Songbird::serenity());
        let guild = GuildId::new(42);

        assert!(matches!(
            manager.pause(guild),
            Err(PlaybackError::NoActiveSession)
        ));
        assert!(matches!(
            manager.resume(guild),
            Err(PlaybackError::NoActiveSession)
        ));
        assert!(matches!(
            manager.stop(guild),
            Err(PlaybackError::NoActiveSession)
        ));
    }

    #[test]
    fn test_transiciones_del_ciclo_de_vida() {
        // Solo el recurso vigente mueve el registro
        assert_eq!(
            lifecycle_transition(false, &PlayMode::Play),
            Transition::Ignore
        );
        assert_eq!(
            lifecycle_transition(false, &PlayMode::End),
            Transition::Ignore
        );

        assert_eq!(
            lifecycle_transition(true, &PlayMode::Play),
            Transition::SetPlaying
        );
        assert_eq!(lifecycle_transition(true, &PlayMode::End), Transition::Clear);
        assert_eq!(
            lifecycle_transition(true, &PlayMode::Stop),
            Transition::Clear
        );
        // Pausar no toca el registro (el estado lo fija `pause`)
        assert_eq!(
            lifecycle_transition(true, &PlayMode::Pause),
            Transition::Ignore
        );
    }

    #[tokio::test]
    async fn test_desconexion_desmonta_el_registro_completo() {
        use serenity::model::id::UserId;

        let sessions: Arc<DashMap<GuildId, VoiceSession>> = Arc::new(DashMap::new());
        let players: Arc<DashMap<GuildId, PlayerRecord>> = Arc::new(DashMap::new());
        let join_locks: Arc<DashMap<GuildId, Arc<Mutex<()>>>> = Arc::new(DashMap::new());
        let guild = GuildId::new(7);

        let call = Call::standalone(guild, UserId::new(1));
        sessions.insert(
            guild,
            VoiceSession {
                channel_id: ChannelId::new(2),
                call: Arc::new(Mutex::new(call)),
            },
        );
        join_locks.insert(guild, Arc::new(Mutex::new(())));

        let handler = DisconnectHandler {
            guild_id: guild,
            sessions: sessions.clone(),
            players: players.clone(),
            join_locks: join_locks.clone(),
        };
        handler.teardown();

        assert!(sessions.is_empty());
        assert!(players.is_empty());
        // El lock de join también se suelta; el mapa no crece sin límite
        assert!(join_locks.is_empty());
    }

    #[test]
    fn test_nombres_de_estado() {
        assert_eq!(PlayerStatus::Idle.as_str(), "idle");
        assert_eq!(PlayerStatus::Buffering.as_str(), "buffering");
        assert_eq!(PlayerStatus::Playing.as_str(), "playing");
        assert_eq!(PlayerStatus::Paused.as_str(), "paused");
    }
}
