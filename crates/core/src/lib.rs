//! Cœur du client radio IL-2 SRS
//!
//! Assemble le crate `audio` et le crate `network` :
//! - configuration persistante (`settings`)
//! - découverte du serveur depuis les données du jeu (`discovery`)
//! - touches push-to-talk (`input`)
//! - cycle de vie d'une session radio (`orchestrator`)

pub mod discovery;
pub mod error;
pub mod input;
pub mod orchestrator;
pub mod settings;

pub use discovery::{parse_game_packet, split_server_address, GameInfo, GameListener, GAME_DATA_PORT};
pub use error::{CoreError, CoreResult};
pub use input::{ChannelPttSource, KeyBindings, PttControl, PttEvent, PttEventSource, PttState};
#[cfg(target_os = "linux")]
pub use input::EvdevPttSource;
pub use orchestrator::{forward_packet, SessionOrchestrator, VoiceSink};
pub use settings::{KeybindSettings, ServerEntry, Settings, DEFAULT_PILOT_NAME};
