//! Types de données pour le système audio
//!
//! Ce module définit les structures principales pour manipuler l'audio :
//! - Sample : un échantillon PCM 16 bits signé
//! - AudioFrame : une frame de codec (10 ms) d'échantillons mono
//! - L'étage de gain appliqué à l'audio reçu

use std::time::Instant;

/// Type pour un échantillon audio
///
/// Le relais et le codec travaillent en PCM 16 bits signé :
/// - 0 = silence
/// - i16::MAX / i16::MIN = amplitude maximale
pub type Sample = i16;

/// Frame d'audio brute (non compressée)
///
/// Une frame contient exactement une frame de codec (10 ms à 48 kHz,
/// soit 480 échantillons mono). Capture, encodage, décodage et lecture
/// travaillent tous sur cette unité.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Les échantillons audio bruts (mono)
    pub samples: Vec<Sample>,

    /// Instant de création de cette frame
    pub timestamp: Instant,

    /// Numéro de séquence local (ordre de capture)
    ///
    /// Sans rapport avec le numéro de séquence réseau, qui appartient à la session.
    pub sequence_number: u64,
}

impl AudioFrame {
    /// Crée une nouvelle frame audio
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![0, 120, -120, 0], 42);
    /// assert_eq!(frame.samples.len(), 4);
    /// ```
    pub fn new(samples: Vec<Sample>, sequence_number: u64) -> Self {
        Self {
            samples,
            timestamp: Instant::now(),
            sequence_number,
        }
    }

    /// Crée une frame de silence
    pub fn silence(sample_count: usize, sequence_number: u64) -> Self {
        Self::new(vec![0; sample_count], sequence_number)
    }

    /// Crée une frame de taille fixe à partir d'un bloc partiel
    ///
    /// Un bloc trop court (fin de flux) est complété par des zéros ;
    /// un bloc trop long est tronqué à la taille de frame.
    pub fn padded(samples: &[Sample], frame_size: usize, sequence_number: u64) -> Self {
        let mut buffer = vec![0; frame_size];
        let len = samples.len().min(frame_size);
        buffer[..len].copy_from_slice(&samples[..len]);
        Self::new(buffer, sequence_number)
    }

    /// Complète la frame par des zéros jusqu'à `frame_size` échantillons
    pub fn pad_to(&mut self, frame_size: usize) {
        if self.samples.len() < frame_size {
            self.samples.resize(frame_size, 0);
        }
    }

    /// Durée de cette frame en millisecondes pour un sample rate donné
    pub fn duration_ms(&self, sample_rate: u32) -> f32 {
        (self.samples.len() as f32 / sample_rate as f32) * 1000.0
    }

    /// Niveau maximum normalisé (0.0 - 1.0)
    pub fn peak_level(&self) -> f32 {
        self.samples
            .iter()
            .map(|&s| s.unsigned_abs())
            .max()
            .map(|peak| peak as f32 / 32768.0)
            .unwrap_or(0.0)
    }

    /// Niveau RMS normalisé (0.0 - 1.0)
    pub fn rms_level(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let f = s as f64 / 32768.0;
                f * f
            })
            .sum();

        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }

    /// Applique un gain en décibels à la frame
    ///
    /// Voir [`apply_gain_sample`] pour le détail du calcul.
    pub fn apply_gain_db(&mut self, boost_db: f32) {
        let gain = db_to_gain(boost_db);
        for sample in &mut self.samples {
            *sample = apply_gain_sample(*sample, gain);
        }
    }
}

/// Convertit un gain en décibels en facteur linéaire : 10^(dB/20)
pub fn db_to_gain(boost_db: f32) -> f32 {
    10f32.powf(boost_db / 20.0)
}

/// Étage de gain sur un échantillon
///
/// 1. normalisation en flottant : s / 32768
/// 2. multiplication par le gain linéaire
/// 3. écrêtage dur à [-1, 1]
/// 4. retour en 16 bits : f * 32767
///
/// Pour un gain de 0 dB la sortie reste à ±1 LSB de l'entrée ;
/// pour un gain très élevé la sortie sature sans jamais déborder.
#[inline]
pub fn apply_gain_sample(sample: Sample, gain: f32) -> Sample {
    let normalized = (sample as f32 / 32768.0) * gain;
    let clipped = normalized.clamp(-1.0, 1.0);
    (clipped * 32767.0) as Sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = AudioFrame::new(vec![1, -2, 3], 7);
        assert_eq!(frame.samples.len(), 3);
        assert_eq!(frame.sequence_number, 7);

        let silence = AudioFrame::silence(480, 0);
        assert_eq!(silence.samples.len(), 480);
        assert_eq!(silence.peak_level(), 0.0);
        assert_eq!(silence.rms_level(), 0.0);
        assert_eq!(silence.duration_ms(48000), 10.0);
    }

    #[test]
    fn test_partial_frame_is_zero_padded() {
        let frame = AudioFrame::padded(&[100, 200, 300], 480, 1);
        assert_eq!(frame.samples.len(), 480);
        assert_eq!(&frame.samples[..3], &[100, 200, 300]);
        assert!(frame.samples[3..].iter().all(|&s| s == 0));

        let long: Vec<Sample> = (0..600).map(|i| i as Sample).collect();
        let truncated = AudioFrame::padded(&long, 480, 2);
        assert_eq!(truncated.samples.len(), 480);
        assert_eq!(truncated.samples[479], 479);

        let mut short = AudioFrame::new(vec![5; 10], 3);
        short.pad_to(480);
        assert_eq!(short.samples.len(), 480);
        assert_eq!(short.samples[9], 5);
        assert_eq!(short.samples[10], 0);
    }

    #[test]
    fn test_zero_db_gain_stays_within_one_lsb() {
        let gain = db_to_gain(0.0);
        assert_eq!(gain, 1.0);

        for s in (i16::MIN..=i16::MAX).step_by(7).chain([i16::MIN, -1, 0, 1, i16::MAX]) {
            let out = apply_gain_sample(s, gain);
            let diff = (out as i32 - s as i32).abs();
            assert!(diff <= 1, "échantillon {} -> {} (écart {})", s, out, diff);
        }
    }

    #[test]
    fn test_large_gain_clamps_without_wraparound() {
        let mut frame = AudioFrame::new(vec![i16::MIN, -20000, -1, 0, 1, 20000, i16::MAX], 0);
        frame.apply_gain_db(60.0);

        assert_eq!(frame.samples[0], -32767);
        assert_eq!(frame.samples[1], -32767);
        assert_eq!(frame.samples[3], 0);
        assert_eq!(frame.samples[5], 32767);
        assert_eq!(frame.samples[6], 32767);
        // Un gain positif ne change jamais le signe
        assert!(frame.samples[2] <= 0);
        assert!(frame.samples[4] >= 0);
    }

    #[test]
    fn test_negative_gain_attenuates() {
        let mut frame = AudioFrame::new(vec![16000, -16000], 0);
        frame.apply_gain_db(-6.0);
        assert!(frame.samples[0] > 7900 && frame.samples[0] < 8100);
        assert!(frame.samples[1] < -7900 && frame.samples[1] > -8100);
    }
}
