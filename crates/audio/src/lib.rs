//! Crate audio du client radio IL-2 SRS
//!
//! Ce crate gère toute la chaîne audio :
//! - Capture microphone avec cpal (48 kHz mono, frames de 10 ms)
//! - Compression/décompression Opus VoIP
//! - Étage de gain et lecture audio avec cpal
//! - Pipeline capture → encode et réception → décodage → lecture

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, gain)
pub mod traits;      // Traits abstraits
pub mod devices;     // Recherche des périphériques
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Implémentation lecture avec cpal
pub mod codec;       // Implémentation Opus
pub mod pipeline;    // Pipeline audio
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::CpalCapture;
pub use playback::CpalPlayback;
pub use codec::OpusCodec;
pub use devices::{list_devices, DeviceInfo, DeviceList};
pub use pipeline::{AudioPipeline, AudioStats, CaptureState, PlaybackOutcome, PlaybackState};
