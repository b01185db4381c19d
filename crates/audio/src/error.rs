//! Erreurs de la chaîne audio : périphériques, codec Opus, buffers

use thiserror::Error;

/// Erreurs du crate audio
///
/// Une erreur de périphérique est fatale pour une seule direction
/// (capture ou lecture) : l'autre direction continue de fonctionner.
#[derive(Error, Debug)]
pub enum AudioError {
    /// L'hôte audio n'expose aucun micro ou aucune sortie
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// Le périphérique demandé dans la configuration n'existe pas
    #[error("Périphérique audio introuvable: {0}")]
    DeviceNotFound(String),

    /// Format refusé par le périphérique ou configuration incohérente
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal au démarrage d'un stream
    #[error("Erreur cpal: {0}")]
    CpalError(#[from] cpal::PlayStreamError),

    /// Paquet corrompu ou échec interne d'Opus
    #[error("Erreur Opus: {0}")]
    OpusError(String),

    /// Paquet voix vide : rien à décoder
    #[error("Paquet audio vide")]
    EmptyPacket,

    /// File de lecture pleine
    #[error("File de lecture pleine, frame perdue")]
    BufferOverflow,

    /// Stream en échec ou périphérique débranché
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Composant utilisé dans le mauvais état
    #[error("Composant audio non prêt: {0}")]
    InitializationError(String),
}

impl From<opus::Error> for AudioError {
    fn from(err: opus::Error) -> Self {
        AudioError::OpusError(format!("{:?}", err))
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceDisconnected,
            other => AudioError::ConfigError(format!("Erreur construction stream: {:?}", other)),
        }
    }
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {:?}", err))
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        AudioError::InitializationError(format!("Énumération des périphériques impossible: {:?}", err))
    }
}

impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::ConfigError(format!("Arrêt du stream impossible: {:?}", err))
    }
}

impl AudioError {
    /// Indique si l'erreur concerne le périphérique lui-même
    ///
    /// Ces erreurs sont remontées à l'appelant qui décide de réessayer ou non.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            AudioError::NoDeviceFound
                | AudioError::DeviceNotFound(_)
                | AudioError::DeviceDisconnected
                | AudioError::CpalError(_)
        )
    }
}

/// Result du crate audio
pub type AudioResult<T> = Result<T, AudioError>;
