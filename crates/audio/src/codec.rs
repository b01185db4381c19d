//! Module de compression/décompression audio avec Opus
//!
//! Ce module implémente le trait AudioCodec en utilisant la librairie Opus,
//! configurée comme l'attend le relais SRS : 48 kHz, mono, mode VoIP,
//! une frame de 10 ms par paquet.

use opus::{Application, Channels, Decoder, Encoder};

use crate::{AudioCodec, AudioConfig, AudioError, AudioFrame, AudioResult};

/// Nombre maximal d'échantillons qu'un paquet Opus peut produire (120 ms à 48 kHz)
const MAX_DECODED_SAMPLES: usize = 5760;

/// Implémentation du codec Opus
///
/// Un encodeur et un décodeur Opus configurés pour la voix.
/// Chaque direction du pipeline possède sa propre instance : Opus n'est pas
/// thread-safe au niveau d'une instance mais plusieurs instances peuvent
/// vivre sur des threads différents.
pub struct OpusCodec {
    /// Encodeur Opus pour compresser l'audio du micro
    encoder: Encoder,

    /// Décodeur Opus pour décompresser l'audio reçu
    decoder: Decoder,

    /// Configuration audio utilisée
    config: AudioConfig,

    /// Buffer de travail pour les données compressées
    compressed_buffer: Vec<u8>,

    /// Buffer de travail pour les données décompressées
    decompressed_buffer: Vec<i16>,

    /// Compteur de frames décodées (sert de numéro de séquence local)
    decoded_frames: u64,
}

impl OpusCodec {
    /// Crée un nouveau codec Opus
    ///
    /// # Erreurs
    /// - `AudioError::ConfigError` si la configuration n'est pas supportée
    /// - `AudioError::OpusError` si l'initialisation Opus échoue
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let opus_channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(AudioError::ConfigError(format!(
                    "Nombre de canaux non supporté par Opus: {}",
                    config.channels
                )))
            }
        };

        // Application::Voip optimise pour la voix
        let mut encoder = Encoder::new(config.sample_rate, opus_channels, Application::Voip)
            .map_err(|e| AudioError::OpusError(format!("Impossible de créer l'encodeur: {:?}", e)))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(config.opus_bitrate as i32))
            .map_err(|e| AudioError::OpusError(format!("Impossible de définir le bitrate: {:?}", e)))?;

        encoder
            .set_vbr(true)
            .map_err(|e| AudioError::OpusError(format!("Impossible d'activer VBR: {:?}", e)))?;

        let decoder = Decoder::new(config.sample_rate, opus_channels)
            .map_err(|e| AudioError::OpusError(format!("Impossible de créer le décodeur: {:?}", e)))?;

        tracing::debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate = config.opus_bitrate,
            frame_samples = config.samples_per_frame(),
            "Codec Opus initialisé"
        );

        Ok(Self {
            compressed_buffer: vec![0u8; config.max_compressed_frame_size()],
            decompressed_buffer: vec![0i16; MAX_DECODED_SAMPLES * config.channels as usize],
            encoder,
            decoder,
            config,
            decoded_frames: 0,
        })
    }

    /// Nombre d'échantillons attendus par frame (tous canaux confondus)
    fn frame_samples(&self) -> usize {
        self.config.samples_per_frame() * self.config.channels as usize
    }
}

impl AudioCodec for OpusCodec {
    fn encode(&mut self, frame: &AudioFrame) -> AudioResult<Vec<u8>> {
        let expected = self.frame_samples();

        if frame.samples.len() > expected {
            return Err(AudioError::OpusError(format!(
                "Taille de frame incorrecte: {} échantillons (attendu: {})",
                frame.samples.len(),
                expected
            )));
        }

        // Une frame partielle est complétée par du silence avant encodage
        let encoded_size = if frame.samples.len() < expected {
            let padded = AudioFrame::padded(&frame.samples, expected, frame.sequence_number);
            self.encoder.encode(&padded.samples, &mut self.compressed_buffer)
        } else {
            self.encoder.encode(&frame.samples, &mut self.compressed_buffer)
        }
        .map_err(|e| AudioError::OpusError(format!("Erreur encodage: {:?}", e)))?;

        Ok(self.compressed_buffer[..encoded_size].to_vec())
    }

    fn decode(&mut self, packet: &[u8]) -> AudioResult<Option<AudioFrame>> {
        // Opus interprète un paquet vide comme une perte : on le refuse ici
        if packet.is_empty() {
            return Err(AudioError::EmptyPacket);
        }

        let decoded = self
            .decoder
            .decode(packet, &mut self.decompressed_buffer, false)
            .map_err(|e| AudioError::OpusError(format!("Erreur décodage Opus: {:?}", e)))?;

        if decoded == 0 {
            return Ok(None);
        }

        let total = decoded * self.config.channels as usize;
        self.decoded_frames += 1;

        Ok(Some(AudioFrame::new(
            self.decompressed_buffer[..total].to_vec(),
            self.decoded_frames,
        )))
    }

    fn reset(&mut self) -> AudioResult<()> {
        self.encoder
            .reset_state()
            .map_err(|e| AudioError::OpusError(format!("Impossible de réinitialiser l'encodeur: {:?}", e)))?;
        self.decoder
            .reset_state()
            .map_err(|e| AudioError::OpusError(format!("Impossible de réinitialiser le décodeur: {:?}", e)))?;
        self.decoded_frames = 0;

        tracing::debug!("Codec Opus réinitialisé");
        Ok(())
    }

    fn codec_info(&self) -> String {
        format!(
            "Opus VoIP - {}Hz, {} ch, {}bps, {}ms",
            self.config.sample_rate,
            self.config.channels,
            self.config.opus_bitrate,
            self.config.frame_duration_ms
        )
    }
}
