//! Crate network - Client du protocole SRS (Simple Radio Standalone) pour IL-2
//!
//! Ce crate gère la communication avec le relais vocal :
//! - canal de contrôle TCP : messages JSON délimités par `\n`
//! - canal voix UDP : paquets Opus avec enveloppe binaire en sortie, bruts en entrée
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs (transport, décodage, état)
//! - `types` : États de connexion, configuration, statistiques
//! - `voice` : Enveloppe binaire des paquets voix
//! - `control` : Messages de contrôle JSON
//! - `session` : État partagé d'une session connectée
//! - `client` : Client protocolaire et boucles de fond
//!
//! # Example
//!
//! ```rust,no_run
//! use network::{ProtocolClient, ProtocolConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ProtocolClient::new(ProtocolConfig::default());
//! let _voice = client.connect("127.0.0.1", 6002, "LinuxPilot").await?;
//!
//! client.send_radio_update(1, 2).await?;
//! client.send_voice(&[0xF8, 0xFF, 0xFE], 1).await?;
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod types;
mod voice;
mod control;
mod session;
mod client;

pub use error::{NetworkError, NetworkResult};

pub use types::{ConnectionState, ProtocolConfig, SessionStats};

pub use voice::{VoiceFrameCodec, VoicePacket};

pub use control::{
    ClientInfo, ControlMessage, GameState, MessageKind, RadioInfo, CLIENT_VERSION, SERVER_TYPE,
};

pub use session::Session;

pub use client::ProtocolClient;

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Port TCP/UDP par défaut d'un serveur SRS
pub const DEFAULT_SERVER_PORT: u16 = 6002;

/// Adresses et affichage
pub mod utils {
    use super::*;

    /// Découpe une adresse `"hôte:port"`
    ///
    /// Le port est pris après le dernier `:` ; l'hôte ne peut pas être vide.
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    ///
    /// let (host, port) = utils::split_host_port("srs.example.org:6002").unwrap();
    /// assert_eq!(host, "srs.example.org");
    /// assert_eq!(port, 6002);
    /// ```
    pub fn split_host_port(addr: &str) -> NetworkResult<(String, u16)> {
        let invalid = || NetworkError::InvalidAddress { addr: addr.to_string() };

        let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok((host.to_string(), port))
    }

    /// Durée lisible : `56ms`, `1.23s` ou `12min 05s`
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    /// use std::time::Duration;
    ///
    /// assert_eq!(utils::format_duration(Duration::from_millis(1234)), "1.23s");
    /// assert_eq!(utils::format_duration(Duration::from_secs(725)), "12min 05s");
    /// ```
    pub fn format_duration(duration: std::time::Duration) -> String {
        let ms = duration.as_millis();
        let secs = duration.as_secs();

        match ms {
            0..1000 => format!("{}ms", ms),
            1000..60_000 => format!("{:.2}s", ms as f64 / 1000.0),
            _ => format!("{}min {:02}s", secs / 60, secs % 60),
        }
    }
}
