//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente le trait AudioPlayback en utilisant la librairie cpal
//! pour jouer l'audio reçu du relais via les haut-parleurs ou le casque.
//!
//! La lecture doit gérer :
//! - Les underruns (pas assez de données : on joue du silence)
//! - Une file bornée (latence maximale contrôlée)
//! - La duplication du mono sur tous les canaux du périphérique

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::devices::{device_name, find_output_device, select_stream_config};
use crate::{AudioConfig, AudioError, AudioFrame, AudioPlayback, AudioResult, Sample};

/// Compteurs partagés avec le callback temps réel
#[derive(Debug, Default)]
struct PlaybackCounters {
    frames_played: AtomicU64,
    underruns: AtomicU64,
}

/// Implémentation de lecture audio avec cpal
///
/// # Architecture thread
///
/// Le pipeline ajoute des frames via `play_frame()`.
/// Le callback cpal (thread temps réel) vide la file et envoie les
/// échantillons vers le hardware audio, sans jamais bloquer : si la file
/// est verrouillée ou vide, il joue du silence.
pub struct CpalPlayback {
    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// File des frames en attente de lecture
    frame_buffer: Arc<Mutex<VecDeque<AudioFrame>>>,

    /// Positionné par le callback d'erreur de cpal
    failed: Arc<AtomicBool>,

    /// Nom du périphérique pour debug
    device_name: String,

    counters: Arc<PlaybackCounters>,
}

impl CpalPlayback {
    /// Crée une nouvelle instance de lecture
    ///
    /// Le périphérique n'est ouvert qu'au `start()`, c'est-à-dire
    /// au premier paquet à jouer.
    pub fn new(config: AudioConfig) -> Self {
        let frame_buffer = Arc::new(Mutex::new(VecDeque::with_capacity(config.playback_queue_frames)));

        Self {
            device_name: config.output_device.clone(),
            config,
            stream: None,
            frame_buffer,
            failed: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(PlaybackCounters::default()),
        }
    }

    /// Retourne les statistiques de lecture : (frames jouées, underruns)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.counters.frames_played.load(Ordering::Relaxed),
            self.counters.underruns.load(Ordering::Relaxed),
        )
    }

    /// Construit et configure le stream audio de sortie
    fn build_stream(&self, device: &Device, stream_config: &SupportedStreamConfig) -> AudioResult<Stream> {
        let cfg = stream_config.config();
        let channels = stream_config.channels() as usize;

        let failed = Arc::clone(&self.failed);
        let on_error = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "Erreur stream de lecture");
            failed.store(true, Ordering::SeqCst);
        };

        let mut filler = OutputFiller::new(
            Arc::clone(&self.frame_buffer),
            Arc::clone(&self.counters),
            channels,
            self.config.samples_per_frame(),
        );

        let stream = match stream_config.sample_format() {
            SampleFormat::I16 => device.build_output_stream(
                &cfg,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| filler.fill(data, |s| s),
                on_error,
                None,
            )?,
            SampleFormat::F32 => device.build_output_stream(
                &cfg,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    filler.fill(data, |s| s as f32 / 32768.0)
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => device.build_output_stream(
                &cfg,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    filler.fill(data, |s| (s as i32 + 32768) as u16)
                },
                on_error,
                None,
            )?,
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

/// État du callback de sortie
struct OutputFiller {
    frame_buffer: Arc<Mutex<VecDeque<AudioFrame>>>,
    counters: Arc<PlaybackCounters>,
    pending: VecDeque<Sample>,
    device_channels: usize,
}

impl OutputFiller {
    fn new(
        frame_buffer: Arc<Mutex<VecDeque<AudioFrame>>>,
        counters: Arc<PlaybackCounters>,
        device_channels: usize,
        samples_per_frame: usize,
    ) -> Self {
        Self {
            frame_buffer,
            counters,
            pending: VecDeque::with_capacity(samples_per_frame * 4),
            device_channels: device_channels.max(1),
        }
    }

    /// Remplit le buffer de sortie ; silence si pas de données
    fn fill<T: Copy>(&mut self, output: &mut [T], convert: impl Fn(Sample) -> T) {
        let needed = output.len() / self.device_channels;

        while self.pending.len() < needed {
            let Ok(mut queue) = self.frame_buffer.try_lock() else {
                break;
            };
            match queue.pop_front() {
                Some(frame) => {
                    self.pending.extend(frame.samples);
                    self.counters.frames_played.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    self.counters.underruns.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }

        for slot in output.chunks_mut(self.device_channels) {
            let value = convert(self.pending.pop_front().unwrap_or(0));
            for sample in slot.iter_mut() {
                *sample = value;
            }
        }
    }
}

#[async_trait]
impl AudioPlayback for CpalPlayback {
    async fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(()); // Déjà démarré
        }

        let device = find_output_device(&self.config.output_device)?;
        self.device_name = device_name(&device);

        let stream_config = select_stream_config(device.supported_output_configs()?, &self.config)?;

        tracing::info!(
            device = %self.device_name,
            device_channels = stream_config.channels(),
            format = ?stream_config.sample_format(),
            "Ouverture du périphérique de lecture"
        );

        self.failed.store(false, Ordering::SeqCst);
        let stream = self.build_stream(&device, &stream_config)?;
        stream.play()?;

        self.stream = Some(stream);
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        self.frame_buffer.lock().await.clear();
        let paused = stream.pause();
        drop(stream);

        let (played, underruns) = self.stats();
        tracing::info!(device = %self.device_name, played, underruns, "Lecture audio arrêtée");

        // Un stream en échec ne se met pas toujours en pause proprement
        if self.failed.load(Ordering::SeqCst) {
            return Ok(());
        }
        paused.map_err(AudioError::from)
    }

    async fn play_frame(&mut self, frame: AudioFrame) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::InitializationError("Lecture non démarrée".to_string()));
        }
        if self.failed.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceDisconnected);
        }

        push_bounded(&self.frame_buffer, frame, self.config.playback_queue_frames).await
    }

    fn is_playing(&self) -> bool {
        self.stream.is_some()
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn buffer_level(&self) -> usize {
        self.frame_buffer.try_lock().map(|queue| queue.len()).unwrap_or(0)
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Ajoute une frame à la file si elle n'est pas pleine
async fn push_bounded(
    frame_buffer: &Mutex<VecDeque<AudioFrame>>,
    frame: AudioFrame,
    capacity: usize,
) -> AudioResult<()> {
    let mut queue = frame_buffer.lock().await;
    if queue.len() >= capacity {
        return Err(AudioError::BufferOverflow);
    }
    queue.push_back(frame);
    Ok(())
}
