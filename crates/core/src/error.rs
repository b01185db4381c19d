//! Erreurs du crate client-core

use thiserror::Error;

/// Erreurs de l'orchestration du client
#[derive(Error, Debug)]
pub enum CoreError {
    /// Le port d'écoute des données du jeu est déjà pris
    #[error("Impossible d'écouter les données du jeu sur le port UDP {port}: {reason} (un autre client SRS est-il lancé ?)")]
    DiscoveryBind { port: u16, reason: String },

    /// Adresse de serveur SRS invalide
    #[error("Adresse de serveur invalide: {0}")]
    InvalidServerAddress(String),

    /// Connexion au relais impossible, rien n'a été démarré
    #[error("Connexion au serveur SRS impossible: {0}")]
    ConnectFailed(#[source] network::NetworkError),

    /// Session déjà démarrée
    #[error("Session déjà démarrée")]
    AlreadyRunning,

    /// Erreur du système audio
    #[error("Erreur audio: {0}")]
    Audio(#[from] audio::AudioError),

    /// Erreur réseau hors connexion
    #[error("Erreur réseau: {0}")]
    Network(#[from] network::NetworkError),

    /// Fichier de configuration illisible
    #[error("Configuration illisible: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Configuration impossible à sérialiser
    #[error("Configuration impossible à écrire: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),

    /// Dossier de configuration introuvable
    #[error("Dossier de configuration introuvable")]
    NoConfigDir,

    /// Accès refusé aux périphériques d'entrée
    #[error("Accès refusé à /dev/input : ajoutez votre utilisateur au groupe 'input' (sudo usermod -a -G input $USER) puis reconnectez-vous")]
    InputPermission,

    /// Erreur d'entrée/sortie
    #[error("Erreur IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Type Result du crate client-core
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_bind_message() {
        let error = CoreError::DiscoveryBind { port: 4322, reason: "occupé".into() };
        let message = error.to_string();
        assert!(message.contains("4322"));
        assert!(message.contains("autre client SRS"));
    }

    #[test]
    fn test_network_conversion() {
        let error: CoreError = network::NetworkError::NotConnected.into();
        assert!(matches!(error, CoreError::Network(network::NetworkError::NotConnected)));
    }
}
