//! Configuration audio du client radio
//!
//! Ce module définit les paramètres audio imposés par le relais SRS :
//! 48 kHz, mono, frames de 10 ms encodées en Opus VoIP.

use serde::{Deserialize, Serialize};

/// Nom de périphérique qui désigne le périphérique par défaut du système
pub const DEFAULT_DEVICE: &str = "default";

/// Configuration principale pour tout le système audio
///
/// Cette structure contient tous les paramètres nécessaires pour configurer :
/// - La capture audio (microphone)
/// - La compression Opus
/// - La lecture audio (haut-parleurs) et le gain de sortie
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage en Hz
    ///
    /// Le relais SRS travaille exclusivement à 48 kHz
    pub sample_rate: u32,

    /// Nombre de canaux audio (1 = mono)
    pub channels: u16,

    /// Durée de chaque frame audio en millisecondes
    ///
    /// 10ms = 480 échantillons à 48 kHz, une frame Opus
    pub frame_duration_ms: u16,

    /// Débit cible pour la compression Opus en bits par seconde
    pub opus_bitrate: u32,

    /// Périphérique d'entrée (`"default"` = périphérique par défaut)
    pub input_device: String,

    /// Périphérique de sortie (`"default"` = périphérique par défaut)
    pub output_device: String,

    /// Gain appliqué à l'audio reçu, en décibels
    ///
    /// 0 dB = pas de changement, +6 dB ≈ amplitude doublée
    pub speaker_boost_db: f32,

    /// Profondeur du canal capture → encodeur, en frames
    ///
    /// Si l'encodeur prend du retard, les frames en trop sont perdues
    /// plutôt que de bloquer le callback temps réel.
    pub capture_queue_frames: usize,

    /// Nombre maximal de frames en attente de lecture
    pub playback_queue_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,                       // 48 kHz imposé par SRS
            channels: 1,                              // Mono
            frame_duration_ms: 10,                    // 480 échantillons
            opus_bitrate: 32000,                      // 32 kbps
            input_device: DEFAULT_DEVICE.to_string(),
            output_device: DEFAULT_DEVICE.to_string(),
            speaker_boost_db: 0.0,
            capture_queue_frames: 16,
            playback_queue_frames: 32,
        }
    }
}

impl AudioConfig {
    /// Calcule le nombre d'échantillons par frame
    ///
    /// Formule : (sample_rate * frame_duration_ms) / 1000
    /// Exemple : (48000 * 10) / 1000 = 480 échantillons
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Taille en bytes d'une frame brute (i16 = 2 bytes par échantillon)
    pub fn frame_size_bytes(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * 2
    }

    /// Taille maximale d'un paquet Opus
    ///
    /// Un paquet Opus ne dépasse jamais 1275 bytes par frame ; 4000 couvre
    /// largement les frames multiples.
    pub fn max_compressed_frame_size(&self) -> usize {
        4000
    }

    /// Facteur linéaire correspondant à `speaker_boost_db`
    pub fn speaker_gain(&self) -> f32 {
        crate::types::db_to_gain(self.speaker_boost_db)
    }

    /// Indique si un nom de périphérique désigne le périphérique par défaut
    pub fn is_default_device(name: &str) -> bool {
        name.is_empty() || name.eq_ignore_ascii_case(DEFAULT_DEVICE)
    }

    /// Valide que la configuration est cohérente
    ///
    /// Opus n'accepte que certaines fréquences et durées de frame.
    pub fn validate(&self) -> Result<(), String> {
        if ![8000, 12000, 16000, 24000, 48000].contains(&self.sample_rate) {
            return Err(format!(
                "Sample rate invalide: {} (Opus accepte 8000, 12000, 16000, 24000 ou 48000)",
                self.sample_rate
            ));
        }

        if self.channels == 0 || self.channels > 2 {
            return Err(format!("Nombre de canaux invalide: {} (doit être 1 ou 2)", self.channels));
        }

        if ![10, 20, 40, 60].contains(&self.frame_duration_ms) {
            return Err(format!(
                "Durée de frame invalide: {}ms (doit être 10, 20, 40 ou 60)",
                self.frame_duration_ms
            ));
        }

        if self.opus_bitrate < 6000 || self.opus_bitrate > 128000 {
            return Err(format!("Bitrate Opus invalide: {} (doit être entre 6000 et 128000)", self.opus_bitrate));
        }

        if !self.speaker_boost_db.is_finite() {
            return Err("Gain haut-parleur invalide".to_string());
        }

        if self.capture_queue_frames == 0 || self.playback_queue_frames == 0 {
            return Err("Les files audio doivent contenir au moins une frame".to_string());
        }

        Ok(())
    }

    /// Configuration construite à partir des réglages utilisateur
    pub fn with_devices(input_device: &str, output_device: &str, speaker_boost_db: f32) -> Self {
        Self {
            input_device: input_device.to_string(),
            output_device: output_device.to_string(),
            speaker_boost_db,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.samples_per_frame(), 480); // 48000 * 10 / 1000
        assert_eq!(config.frame_size_bytes(), 960);  // 480 * 1 * 2
        assert_eq!(config.speaker_gain(), 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.sample_rate = 44100; // Non supporté par Opus
        assert!(config.validate().is_err());

        config.sample_rate = 48000;
        config.channels = 0;
        assert!(config.validate().is_err());

        config.channels = 1;
        config.frame_duration_ms = 15;
        assert!(config.validate().is_err());

        config.frame_duration_ms = 10;
        config.speaker_boost_db = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_names() {
        assert!(AudioConfig::is_default_device("default"));
        assert!(AudioConfig::is_default_device("Default"));
        assert!(AudioConfig::is_default_device(""));
        assert!(!AudioConfig::is_default_device("USB Headset"));

        let config = AudioConfig::with_devices("mic", "default", 6.0);
        assert_eq!(config.input_device, "mic");
        assert!(config.speaker_gain() > 1.99 && config.speaker_gain() < 2.0);
    }
}
