//! Gestion d'erreurs pour le système networking
//!
//! Ce module définit tous les types d'erreurs possibles dans le client SRS.
//! Trois familles :
//! - transport (connexion, envoi, réception) : terminales pour la session
//! - décodage protocolaire (ligne JSON invalide, datagramme vide) : l'unité
//!   fautive est ignorée, la boucle continue
//! - état (`NotConnected`) : simple statut que l'appelant peut ignorer

use std::net::SocketAddr;
use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système réseau
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connexion TCP au relais impossible
    #[error("Connexion impossible vers {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// Impossible de bind le socket UDP sur le port local de la connexion TCP
    #[error("Impossible de bind le socket UDP sur {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    /// Timeout lors de la tentative de connexion
    #[error("Timeout de connexion vers {addr} après {timeout_ms}ms")]
    ConnectionTimeout { addr: String, timeout_ms: u64 },

    /// La session n'est pas connectée : l'opération n'a rien fait
    #[error("Non connecté au serveur SRS")]
    NotConnected,

    /// Datagramme voix invalide (vide)
    #[error("Paquet voix malformé: {reason}")]
    MalformedPacket { reason: String },

    /// Ligne de contrôle illisible (JSON invalide ou UTF-8 invalide)
    #[error("Message de contrôle illisible: {0}")]
    ControlDecode(String),

    /// Adresse ou port invalide
    #[error("Adresse invalide: {addr}")]
    InvalidAddress { addr: String },

    /// Erreur lors de la sérialisation JSON d'un message sortant
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Erreur générale d'entrée/sortie réseau
    #[error("Erreur IO réseau: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration réseau invalide
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Conversion automatique des erreurs de parsing d'adresses
impl From<std::net::AddrParseError> for NetworkError {
    fn from(err: std::net::AddrParseError) -> Self {
        NetworkError::InvalidAddress {
            addr: format!("Erreur de parsing: {}", err),
        }
    }
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

impl NetworkError {
    /// Crée une erreur de connexion avec contexte
    pub fn connect_failed(addr: impl Into<String>, cause: &std::io::Error) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: cause.to_string(),
        }
    }

    /// Crée une erreur de bind avec contexte
    pub fn bind_failed(addr: SocketAddr, cause: &std::io::Error) -> Self {
        Self::BindFailed {
            addr,
            reason: cause.to_string(),
        }
    }

    /// Crée une erreur de datagramme malformé
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket { reason: reason.into() }
    }

    /// L'erreur concerne une seule unité (ligne, datagramme) ou un simple
    /// statut : la session peut continuer
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetworkError::MalformedPacket { .. } | NetworkError::ControlDecode(_) | NetworkError::NotConnected
        )
    }

    /// L'erreur est une erreur de transport : la session est terminée
    pub fn requires_reconnection(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectFailed { .. }
                | NetworkError::BindFailed { .. }
                | NetworkError::ConnectionTimeout { .. }
                | NetworkError::Io(_)
        )
    }
}
