pub mod session;
pub mod transcoder;

pub use session::{PlayerSnapshot, PlayerStatus, SessionManager, TrackMetadata};
pub use transcoder::Transcoder;
