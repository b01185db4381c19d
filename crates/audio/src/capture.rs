//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture en utilisant la librairie cpal
//! (Cross-Platform Audio Library) pour capturer l'audio depuis le microphone.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};
use tokio::sync::mpsc;

use crate::devices::{device_name, find_input_device, select_stream_config};
use crate::{AudioCapture, AudioConfig, AudioError, AudioFrame, AudioResult, Sample};

/// Implémentation de capture audio avec cpal
///
/// Cette structure gère :
/// - La recherche du microphone configuré
/// - La configuration du stream audio (48 kHz)
/// - La conversion des échantillons cpal en frames i16 mono de 10 ms
///
/// # Architecture thread
///
/// cpal fonctionne avec des callbacks. Quand des données audio arrivent,
/// cpal appelle notre fonction qui accumule les échantillons.
/// Quand on a assez d'échantillons pour une frame, on l'envoie sur
/// un canal borné sans jamais bloquer le thread temps réel.
pub struct CpalCapture {
    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// Nom du périphérique ouvert, pour debug
    device_name: String,
}

/// Accumule les échantillons livrés par cpal et découpe des frames
///
/// Vit dans le callback temps réel : aucune allocation par échantillon,
/// aucun verrou.
struct FrameAccumulator {
    buffer: Vec<Sample>,
    frame_size: usize,
    device_channels: usize,
    sequence: u64,
    sender: mpsc::Sender<AudioFrame>,
    dropped: u64,
}

impl FrameAccumulator {
    fn new(frame_size: usize, device_channels: usize, sender: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            buffer: Vec::with_capacity(frame_size),
            frame_size,
            device_channels: device_channels.max(1),
            sequence: 0,
            sender,
            dropped: 0,
        }
    }

    /// Ajoute un bloc entrelacé, mixé en mono
    fn push_interleaved<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> Sample) {
        for chunk in data.chunks(self.device_channels) {
            let sum: i32 = chunk.iter().map(|&s| convert(s) as i32).sum();
            self.buffer.push((sum / chunk.len() as i32) as Sample);

            if self.buffer.len() >= self.frame_size {
                self.flush();
            }
        }
    }

    /// Envoie la frame accumulée (non-bloquant)
    fn flush(&mut self) {
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.frame_size));
        let frame = AudioFrame::new(samples, self.sequence);
        self.sequence += 1;

        if self.sender.try_send(frame).is_err() {
            // File pleine ou récepteur fermé : la frame est perdue
            self.dropped += 1;
            if self.dropped % 100 == 1 {
                tracing::debug!(dropped = self.dropped, "Frames de capture perdues");
            }
        }
    }
}

fn f32_to_sample(s: f32) -> Sample {
    (s.clamp(-1.0, 1.0) * 32767.0) as Sample
}

fn u16_to_sample(s: u16) -> Sample {
    (s as i32 - 32768) as Sample
}

impl CpalCapture {
    /// Crée une nouvelle instance de capture
    ///
    /// Le périphérique n'est recherché et ouvert qu'au `start()`.
    pub fn new(config: AudioConfig) -> Self {
        Self {
            device_name: config.input_device.clone(),
            config,
            stream: None,
        }
    }

    /// Construit le stream d'entrée qui alimente le canal de frames
    fn build_stream(
        &self,
        device: &Device,
        stream_config: &SupportedStreamConfig,
        sender: mpsc::Sender<AudioFrame>,
    ) -> AudioResult<Stream> {
        let accumulator = FrameAccumulator::new(
            self.config.samples_per_frame(),
            stream_config.channels() as usize,
            sender,
        );
        let cfg = stream_config.config();
        let on_error = |err: cpal::StreamError| {
            tracing::error!(error = %err, "Erreur stream de capture");
        };

        let stream = match stream_config.sample_format() {
            SampleFormat::I16 => {
                let mut acc = accumulator;
                device.build_input_stream(
                    &cfg,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| acc.push_interleaved(data, |s| s),
                    on_error,
                    None,
                )?
            }
            SampleFormat::F32 => {
                let mut acc = accumulator;
                device.build_input_stream(
                    &cfg,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| acc.push_interleaved(data, f32_to_sample),
                    on_error,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let mut acc = accumulator;
                device.build_input_stream(
                    &cfg,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| acc.push_interleaved(data, u16_to_sample),
                    on_error,
                    None,
                )?
            }
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )))
            }
        };

        Ok(stream)
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(AudioError::InitializationError("Capture déjà démarrée".to_string()));
        }

        let device = find_input_device(&self.config.input_device)?;
        self.device_name = device_name(&device);

        let stream_config = select_stream_config(device.supported_input_configs()?, &self.config)?;

        tracing::info!(
            device = %self.device_name,
            sample_rate = self.config.sample_rate,
            device_channels = stream_config.channels(),
            format = ?stream_config.sample_format(),
            frame_samples = self.config.samples_per_frame(),
            "Démarrage de la capture audio"
        );

        let (sender, receiver) = mpsc::channel(self.config.capture_queue_frames);
        let stream = self.build_stream(&device, &stream_config, sender)?;
        stream.play()?;

        self.stream = Some(stream);
        Ok(receiver)
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(()); // Déjà arrêté
        };

        // La fermeture du stream libère le callback, donc le Sender :
        // le récepteur côté pipeline se termine de lui-même.
        let paused = stream.pause();
        drop(stream);

        tracing::info!(device = %self.device_name, "Capture audio arrêtée");
        paused.map_err(AudioError::from)
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_sample_conversions() {
        assert_eq!(f32_to_sample(0.0), 0);
        assert_eq!(f32_to_sample(1.0), 32767);
        assert_eq!(f32_to_sample(-2.0), -32767);
        assert_eq!(u16_to_sample(32768), 0);
        assert_eq!(u16_to_sample(0), i16::MIN);
        assert_eq!(u16_to_sample(u16::MAX), i16::MAX);
    }

    #[tokio::test]
    async fn test_accumulator_cuts_frames_and_downmixes() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut acc = FrameAccumulator::new(4, 2, tx);

        // Stéréo : 6 paires -> 6 échantillons mono -> 1 frame de 4 + 2 en attente
        let data: Vec<i16> = vec![100, 300, 0, 0, -50, -150, 10, 10, 7, 7, 8, 8];
        acc.push_interleaved(&data, |s| s);

        let frame = rx.recv().await.expect("Frame");
        assert_eq!(frame.samples, vec![200, 0, -100, 10]);
        assert_eq!(frame.sequence_number, 0);
        assert_eq!(acc.buffer, vec![7, 8]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accumulator_drops_when_queue_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut acc = FrameAccumulator::new(2, 1, tx);

        acc.push_interleaved(&[1i16, 2, 3, 4, 5, 6], |s| s);

        assert_eq!(acc.dropped, 2);
        assert_eq!(rx.recv().await.expect("Frame").samples, vec![1, 2]);
    }

    #[test]
    fn test_capture_creation() {
        let capture = CpalCapture::new(AudioConfig::default());
        assert!(!capture.is_recording());
        assert_eq!(capture.device_info(), "default");
    }

    // Nécessite un vrai microphone
    #[tokio::test]
    #[ignore]
    async fn test_capture_frame() {
        let mut capture = CpalCapture::new(AudioConfig::default());
        let mut frames = capture.start().await.expect("Démarrage capture");

        match timeout(Duration::from_secs(5), frames.recv()).await {
            Ok(Some(frame)) => assert_eq!(frame.samples.len(), 480), // 10ms à 48kHz
            Ok(None) => panic!("Canal fermé"),
            Err(_) => panic!("Timeout - aucune frame reçue"),
        }

        capture.stop().await.expect("Arrêt capture");
        assert!(!capture.is_recording());
    }
}
