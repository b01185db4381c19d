//! Pipeline audio du client radio
//!
//! Deux chemins indépendants :
//!
//! ```text
//! Microphone → [Capture] → [Encode] → sink (paquets Opus vers le réseau)
//! réseau (paquets Opus) → [Decode] → [Gain] → [Playback] → Haut-parleurs
//! ```
//!
//! Arrêter un chemin n'affecte jamais l'autre. Une erreur d'ouverture de
//! périphérique est fatale pour la direction concernée seulement et remonte
//! à l'appelant.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::{
    AudioCapture, AudioCodec, AudioConfig, AudioError, AudioFrame, AudioPlayback, AudioResult,
    CpalCapture, CpalPlayback, OpusCodec,
};

/// Délai avant une nouvelle tentative d'ouverture de la sortie après un échec
const PLAYBACK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// État du chemin de capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// État du chemin de lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Résultat du traitement d'un paquet reçu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// La frame a été mise en file de lecture
    Played,
    /// Le décodeur n'a produit aucun audio
    Silent,
    /// Paquet vide ou corrompu, ignoré
    DecodeFailed,
    /// File de lecture pleine, frame perdue
    Overflow,
    /// Le périphérique a échoué ; il sera rouvert au prochain paquet
    DeviceUnavailable,
}

/// Statistiques du pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStats {
    pub frames_encoded: u64,
    pub encode_errors: u64,
    pub frames_dropped: u64,
    pub packets_played: u64,
    pub decode_failures: u64,
    pub playback_errors: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    frames_encoded: AtomicU64,
    encode_errors: AtomicU64,
    frames_dropped: AtomicU64,
    packets_played: AtomicU64,
    decode_failures: AtomicU64,
    playback_errors: AtomicU64,
}

impl PipelineCounters {
    fn snapshot(&self) -> AudioStats {
        AudioStats {
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            packets_played: self.packets_played.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            playback_errors: self.playback_errors.load(Ordering::Relaxed),
        }
    }
}

/// Chemin réception → décodage → gain → lecture
///
/// Partagé entre le pipeline et la tâche de lecture.
struct PlaybackPath {
    playback: Mutex<Box<dyn AudioPlayback>>,
    decoder: Mutex<Box<dyn AudioCodec>>,
    playing: AtomicBool,
    boost_db: f32,
    counters: Arc<PipelineCounters>,
}

impl PlaybackPath {
    async fn play_packet(&self, payload: &[u8]) -> AudioResult<PlaybackOutcome> {
        // Décode d'abord : un paquet invalide ne touche jamais au périphérique
        let decoded = self.decoder.lock().await.decode(payload);
        let mut frame = match decoded {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(PlaybackOutcome::Silent),
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, len = payload.len(), "Paquet voix ignoré");
                return Ok(PlaybackOutcome::DecodeFailed);
            }
        };

        let mut playback = self.playback.lock().await;

        if playback.has_failed() {
            tracing::warn!(device = %playback.device_info(), "Périphérique de lecture en échec, réouverture");
            let _ = playback.stop().await;
            self.playing.store(false, Ordering::SeqCst);
        }

        // Idle → Playing au premier paquet à jouer
        if !playback.is_playing() {
            playback.start().await?;
            self.playing.store(true, Ordering::SeqCst);
            tracing::info!(device = %playback.device_info(), "Lecture démarrée");
        }

        frame.apply_gain_db(self.boost_db);

        match playback.play_frame(frame).await {
            Ok(()) => {
                self.counters.packets_played.fetch_add(1, Ordering::Relaxed);
                Ok(PlaybackOutcome::Played)
            }
            Err(AudioError::BufferOverflow) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(PlaybackOutcome::Overflow)
            }
            Err(AudioError::DeviceDisconnected) => {
                self.counters.playback_errors.fetch_add(1, Ordering::Relaxed);
                let _ = playback.stop().await;
                self.playing.store(false, Ordering::SeqCst);
                Ok(PlaybackOutcome::DeviceUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    /// Ferme la sortie et remet le décodeur à zéro pour le prochain flux
    async fn stop(&self) -> AudioResult<()> {
        let result = self.playback.lock().await.stop().await;
        self.playing.store(false, Ordering::SeqCst);
        if let Err(e) = self.decoder.lock().await.reset() {
            tracing::warn!(error = %e, "Remise à zéro du décodeur impossible");
        }
        result
    }
}

/// Pipeline audio complet
///
/// # Example
/// ```rust,no_run
/// use audio::{AudioConfig, AudioPipeline};
/// use tokio::sync::mpsc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pipeline = AudioPipeline::new(AudioConfig::default())?;
///
/// let (encoded_tx, mut encoded_rx) = mpsc::channel(32);
/// pipeline.start_capture(encoded_tx).await?;
///
/// while let Some(packet) = encoded_rx.recv().await {
///     pipeline.play_packet(&packet).await?; // loopback local
/// }
/// # Ok(())
/// # }
/// ```
pub struct AudioPipeline {
    config: AudioConfig,
    capture: Box<dyn AudioCapture>,
    encoder: Arc<Mutex<Box<dyn AudioCodec>>>,
    capture_task: Option<JoinHandle<()>>,
    playback: Arc<PlaybackPath>,
    playback_task: Option<JoinHandle<()>>,
    counters: Arc<PipelineCounters>,
}

impl AudioPipeline {
    /// Crée le pipeline avec cpal et Opus
    ///
    /// Aucun périphérique n'est ouvert ici.
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let encoder = Box::new(OpusCodec::new(config.clone())?);
        let decoder = Box::new(OpusCodec::new(config.clone())?);
        let capture = Box::new(CpalCapture::new(config.clone()));
        let playback = Box::new(CpalPlayback::new(config.clone()));

        Ok(Self::with_components(config, capture, playback, encoder, decoder))
    }

    /// Crée le pipeline à partir de composants fournis (tests, autres backends)
    pub fn with_components(
        config: AudioConfig,
        capture: Box<dyn AudioCapture>,
        playback: Box<dyn AudioPlayback>,
        encoder: Box<dyn AudioCodec>,
        decoder: Box<dyn AudioCodec>,
    ) -> Self {
        let counters = Arc::new(PipelineCounters::default());

        tracing::debug!(
            codec = %encoder.codec_info(),
            input = %capture.device_info(),
            output = %playback.device_info(),
            boost_db = config.speaker_boost_db,
            "Pipeline audio créé"
        );

        let playback = Arc::new(PlaybackPath {
            playback: Mutex::new(playback),
            decoder: Mutex::new(decoder),
            playing: AtomicBool::new(false),
            boost_db: config.speaker_boost_db,
            counters: Arc::clone(&counters),
        });

        Self {
            config,
            capture,
            encoder: Arc::new(Mutex::new(encoder)),
            capture_task: None,
            playback,
            playback_task: None,
            counters,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn capture_state(&self) -> CaptureState {
        if self.capture.is_recording() {
            CaptureState::Capturing
        } else {
            CaptureState::Idle
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        if self.playback.playing.load(Ordering::SeqCst) {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn stats(&self) -> AudioStats {
        self.counters.snapshot()
    }

    /// Idle → Capturing : ouvre le micro et encode chaque frame vers `sink`
    ///
    /// Le sink est borné : si le consommateur prend du retard, les paquets
    /// en trop sont perdus plutôt que de retarder la capture.
    pub async fn start_capture(&mut self, sink: mpsc::Sender<Vec<u8>>) -> AudioResult<()> {
        if self.capture.is_recording() {
            return Ok(());
        }

        let frames = self.capture.start().await?;
        tracing::info!(device = %self.capture.device_info(), "Capture démarrée");

        let encoder = Arc::clone(&self.encoder);
        let counters = Arc::clone(&self.counters);
        let frame_size = self.config.samples_per_frame();

        self.capture_task = Some(tokio::spawn(run_encoder(frames, encoder, sink, frame_size, counters)));
        Ok(())
    }

    /// Capturing → Idle ; sans effet si la capture est déjà arrêtée
    pub async fn stop_capture(&mut self) -> AudioResult<()> {
        let result = self.capture.stop().await;
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        result
    }

    /// Décode, applique le gain et joue un paquet reçu
    ///
    /// Ouvre la sortie au premier paquet. Un paquet invalide est ignoré
    /// (`PlaybackOutcome::DecodeFailed`). Seule une erreur d'ouverture du
    /// périphérique est retournée comme erreur.
    pub async fn play_packet(&self, payload: &[u8]) -> AudioResult<PlaybackOutcome> {
        self.playback.play_packet(payload).await
    }

    /// Lance la tâche qui consomme les paquets reçus du réseau
    ///
    /// Après un échec d'ouverture de la sortie, les paquets sont ignorés
    /// pendant un court délai avant une nouvelle tentative.
    pub fn spawn_playback(&mut self, mut inbound: mpsc::Receiver<Vec<u8>>) {
        if let Some(task) = self.playback_task.take() {
            task.abort();
        }

        let path = Arc::clone(&self.playback);
        self.playback_task = Some(tokio::spawn(async move {
            let mut retry_after: Option<Instant> = None;

            while let Some(payload) = inbound.recv().await {
                if retry_after.is_some_and(|deadline| Instant::now() < deadline) {
                    continue;
                }

                match path.play_packet(&payload).await {
                    Ok(_) => retry_after = None,
                    Err(e) => {
                        path.counters.playback_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "Impossible d'ouvrir la sortie audio");
                        retry_after = Some(Instant::now() + PLAYBACK_RETRY_DELAY);
                    }
                }
            }

            tracing::debug!("Tâche de lecture terminée");
        }));
    }

    /// Arrête la tâche de lecture et ferme la sortie
    pub async fn stop_playback(&mut self) -> AudioResult<()> {
        if let Some(task) = self.playback_task.take() {
            task.abort();
        }
        self.playback.stop().await
    }

    /// Arrête les deux directions
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop_capture().await {
            tracing::warn!(error = %e, "Erreur à l'arrêt de la capture");
        }
        if let Err(e) = self.stop_playback().await {
            tracing::warn!(error = %e, "Erreur à l'arrêt de la lecture");
        }
    }
}

/// Boucle d'encodage : frames capturées → paquets Opus
async fn run_encoder(
    mut frames: mpsc::Receiver<AudioFrame>,
    encoder: Arc<Mutex<Box<dyn AudioCodec>>>,
    sink: mpsc::Sender<Vec<u8>>,
    frame_size: usize,
    counters: Arc<PipelineCounters>,
) {
    while let Some(mut frame) = frames.recv().await {
        frame.pad_to(frame_size);

        let encoded = encoder.lock().await.encode(&frame);
        let packet = match encoded {
            Ok(packet) => packet,
            Err(e) => {
                counters.encode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Erreur d'encodage");
                continue;
            }
        };

        match sink.try_send(packet) {
            Ok(()) => {
                counters.frames_encoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    tracing::debug!("Tâche d'encodage terminée");
}
