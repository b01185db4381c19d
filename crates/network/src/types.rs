//! Types de données pour le client protocolaire
//!
//! Ce module définit :
//! - ConnectionState : machine à états de la session
//! - ProtocolConfig : paramètres des boucles réseau
//! - SessionStats : compteurs de la session en cours

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// États de connexion au relais SRS
///
/// Disconnected → Connecting → Handshaking → Connected → Disconnected.
/// Toute erreur pendant la connexion ramène directement à `Disconnected`.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// Aucune session active
    Disconnected,

    /// Connexion TCP en cours
    Connecting { target: String },

    /// Sockets ouverts, envoi du SYNC en cours
    Handshaking { server_addr: SocketAddr },

    /// Session établie, boucles démarrées
    Connected {
        server_addr: SocketAddr,
        local_addr: SocketAddr,
        connected_at: Instant,
    },
}

impl ConnectionState {
    /// Vérifie si on est connecté
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Vérifie si une connexion est en cours d'établissement
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting { .. } | ConnectionState::Handshaking { .. }
        )
    }

    /// Adresse du relais si elle est connue
    pub fn server_addr(&self) -> Option<SocketAddr> {
        match self {
            ConnectionState::Handshaking { server_addr } => Some(*server_addr),
            ConnectionState::Connected { server_addr, .. } => Some(*server_addr),
            _ => None,
        }
    }

    /// Description textuelle de l'état pour les logs et la CLI
    pub fn description(&self) -> String {
        match self {
            ConnectionState::Disconnected => "Déconnecté".to_string(),
            ConnectionState::Connecting { target } => format!("Connexion vers {}", target),
            ConnectionState::Handshaking { server_addr } => {
                format!("Handshake avec {}", server_addr)
            }
            ConnectionState::Connected { server_addr, connected_at, .. } => {
                format!(
                    "Connecté à {} depuis {}s",
                    server_addr,
                    connected_at.elapsed().as_secs()
                )
            }
        }
    }
}

/// Configuration du client protocolaire
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    /// Intervalle de la boucle de ping (défaut: 4s, le relais coupe après 5s)
    pub ping_interval: Duration,

    /// Taille des lectures sur le canal TCP (défaut: 4096)
    pub tcp_read_chunk: usize,

    /// Taille du buffer de réception UDP (défaut: 4096)
    pub udp_buffer_size: usize,

    /// Longueur maximale d'une ligne de contrôle avant abandon du buffer
    pub max_line_bytes: usize,

    /// Timeout de la connexion TCP (None = celui du système)
    pub connect_timeout: Option<Duration>,

    /// Profondeur de la file des paquets voix reçus
    pub voice_queue_depth: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(4),
            tcp_read_chunk: 4096,
            udp_buffer_size: 4096,
            max_line_bytes: 64 * 1024,
            connect_timeout: Some(Duration::from_secs(5)),
            voice_queue_depth: 64,
        }
    }
}

impl ProtocolConfig {
    /// Configuration pour tests (paramètres accélérés)
    pub fn test_config() -> Self {
        Self {
            ping_interval: Duration::from_millis(100),
            connect_timeout: Some(Duration::from_millis(1000)),
            voice_queue_depth: 8,
            ..Default::default()
        }
    }
}

/// Compteurs de la session en cours
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Datagrammes voix envoyés
    pub voice_sent: u64,

    /// Paquets voix livrés au pipeline
    pub voice_received: u64,

    /// Datagrammes rejetés (vides) ou perdus (file pleine)
    pub voice_dropped: u64,

    /// Lignes de contrôle décodées
    pub control_received: u64,

    /// Lignes de contrôle illisibles
    pub control_decode_errors: u64,
}
