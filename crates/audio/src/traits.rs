//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces (traits) que doivent implémenter
//! tous les composants audio. Le pipeline ne connaît que ces traits,
//! ce qui permet de le tester sans matériel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioFrame, AudioResult};

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Implémentations :
/// - CpalCapture : microphone réel via cpal
/// - des captures factices dans les tests
///
/// Les frames sont livrées sur un canal borné : le callback temps réel
/// ne bloque jamais, une frame qui ne rentre pas est perdue.
#[async_trait]
pub trait AudioCapture: Send {
    /// Démarre la capture audio
    ///
    /// Ouvre le périphérique et retourne le récepteur des frames capturées.
    /// Chaque frame contient exactement une frame de codec.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` : Aucun microphone trouvé
    /// - `AudioError::DeviceNotFound` : Le microphone configuré n'existe pas
    /// - `AudioError::ConfigError` : Format non supporté par le périphérique
    ///
    /// # Example
    /// ```rust,no_run
    /// use audio::{AudioCapture, CpalCapture, AudioConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut capture = CpalCapture::new(AudioConfig::default());
    /// let mut frames = capture.start().await?;
    ///
    /// while let Some(frame) = frames.recv().await {
    ///     println!("Reçu frame avec {} échantillons", frame.samples.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>>;

    /// Arrête la capture audio
    ///
    /// Ferme le périphérique ; le récepteur retourné par `start()` se termine.
    /// Appeler `stop()` sur une capture arrêtée ne fait rien.
    async fn stop(&mut self) -> AudioResult<()>;

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour jouer l'audio sur un périphérique de sortie
///
/// Les frames sont jouées dans l'ordre d'arrivée, sans réordonnancement.
#[async_trait]
pub trait AudioPlayback: Send {
    /// Ouvre le périphérique de sortie et démarre le stream
    async fn start(&mut self) -> AudioResult<()>;

    /// Arrête la lecture et ferme le périphérique
    async fn stop(&mut self) -> AudioResult<()>;

    /// Met une frame en queue pour lecture
    ///
    /// # Erreurs
    /// - `AudioError::BufferOverflow` : Buffer plein, frame rejetée
    /// - `AudioError::DeviceDisconnected` : le stream a échoué depuis son ouverture
    async fn play_frame(&mut self, frame: AudioFrame) -> AudioResult<()>;

    /// Vérifie si la lecture est active
    fn is_playing(&self) -> bool;

    /// Indique si le stream a signalé une erreur depuis son ouverture
    fn has_failed(&self) -> bool {
        false
    }

    /// Nombre de frames en attente de lecture
    fn buffer_level(&self) -> usize {
        0
    }

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour encoder/décoder l'audio
///
/// Le codec est une capacité externe : PCM 16 bits → paquet compressé,
/// et paquet compressé → PCM (ou rien si le décodeur ne produit pas d'audio).
pub trait AudioCodec: Send {
    /// Compresse une frame complète
    fn encode(&mut self, frame: &AudioFrame) -> AudioResult<Vec<u8>>;

    /// Décompresse un paquet
    ///
    /// Retourne `Ok(None)` si le paquet ne contient pas d'audio.
    ///
    /// # Erreurs
    /// - `AudioError::EmptyPacket` : paquet vide
    /// - `AudioError::OpusError` : paquet corrompu
    fn decode(&mut self, packet: &[u8]) -> AudioResult<Option<AudioFrame>>;

    /// Remet l'état interne du codec à zéro
    fn reset(&mut self) -> AudioResult<()>;

    /// Description du codec pour les logs
    fn codec_info(&self) -> String;
}
