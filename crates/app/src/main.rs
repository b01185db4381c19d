// Diagnostics audio du client IL-2 SRS
//
// - sine : tonalité encodée puis décodée et jouée sur la sortie configurée
// - loopback : micro → Opus → haut-parleurs, pour vérifier la chaîne complète

use std::f32::consts::PI;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

use audio::{AudioCodec, AudioConfig, AudioFrame, AudioPipeline, OpusCodec, PlaybackOutcome, Sample};
use client_core::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tests de la chaîne audio")]
struct Cli {
    /// Fichier de configuration (périphériques et gain)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Joue une tonalité après passage par Opus
    Sine {
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f32,
        /// Durée en millisecondes
        #[arg(short, long, default_value_t = 2000)]
        duration: u64,
    },
    /// Renvoie le micro vers les haut-parleurs jusqu'à Ctrl+C
    Loopback,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let settings = match &cli.config {
        Some(path) => Settings::load_or_default(path),
        None => Settings::load(),
    };
    let config = settings.audio_config();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Configuration audio invalide")?;

    println!("🎤 Test audio IL-2 SRS");
    println!("   Entrée : {}", config.input_device);
    println!("   Sortie : {} (gain {:+.1} dB)", config.output_device, config.speaker_boost_db);

    match cli.command {
        Commands::Sine { frequency, duration } => play_sine(config, frequency, duration).await,
        Commands::Loopback => run_loopback(config).await,
    }
}

/// Tonalité d'amplitude moitié pleine échelle
fn sine_samples(sample_rate: u32, frequency: f32, duration_ms: u64) -> Vec<Sample> {
    let count = (sample_rate as u64 * duration_ms / 1000) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((2.0 * PI * frequency * t).sin() * 0.5 * Sample::MAX as f32) as Sample
        })
        .collect()
}

/// Découpe en frames de codec ; la dernière frame partielle est complétée de zéros
fn split_frames(samples: &[Sample], frame_size: usize) -> Vec<AudioFrame> {
    samples
        .chunks(frame_size)
        .enumerate()
        .map(|(i, chunk)| AudioFrame::padded(chunk, frame_size, i as u64))
        .collect()
}

async fn play_sine(config: AudioConfig, frequency: f32, duration_ms: u64) -> Result<()> {
    let mut encoder = OpusCodec::new(config.clone()).context("Création de l'encodeur")?;
    let pipeline = AudioPipeline::new(config.clone()).context("Initialisation audio")?;

    let samples = sine_samples(config.sample_rate, frequency, duration_ms);
    let frames = split_frames(&samples, config.samples_per_frame());
    let peak = frames.iter().map(AudioFrame::peak_level).fold(0.0, f32::max);
    let rms = frames.iter().map(AudioFrame::rms_level).fold(0.0, f32::max);
    println!("🎵 {} Hz pendant {} ms ({} frames)", frequency, duration_ms, frames.len());
    println!("   Niveau : crête {:.2}, RMS {:.2}", peak, rms);

    let mut ticker = interval(Duration::from_millis(config.frame_duration_ms as u64));
    let mut bytes = 0usize;
    for frame in &frames {
        ticker.tick().await;
        let packet = encoder.encode(frame).context("Encodage Opus")?;
        bytes += packet.len();
        if pipeline.play_packet(&packet).await? == PlaybackOutcome::DecodeFailed {
            tracing::warn!(sequence = frame.sequence_number, "Frame non décodée");
        }
    }

    // Laisse le buffer de sortie se vider
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = pipeline.stats();
    println!("✅ {} paquets joués, {} octets Opus", stats.packets_played, bytes);
    Ok(())
}

async fn run_loopback(config: AudioConfig) -> Result<()> {
    println!("⚠️  Éloignez le micro des haut-parleurs pour éviter le larsen.");

    let mut pipeline = AudioPipeline::new(config.clone()).context("Initialisation audio")?;
    let (encoded_tx, mut encoded_rx) = mpsc::channel(config.capture_queue_frames);
    pipeline.start_capture(encoded_tx).await.context("Ouverture du micro")?;
    println!("💬 Parlez dans le micro, Ctrl+C pour arrêter");

    loop {
        tokio::select! {
            packet = encoded_rx.recv() => {
                let Some(packet) = packet else { break };
                pipeline.play_packet(&packet).await.context("Ouverture de la sortie")?;
            }
            _ = signal::ctrl_c() => break,
        }
    }

    pipeline.shutdown().await;
    let stats = pipeline.stats();
    println!("\n📊 Frames encodées : {}, jouées : {}, perdues : {}",
             stats.frames_encoded, stats.packets_played, stats.frames_dropped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_length_and_amplitude() {
        let samples = sine_samples(48000, 440.0, 100);
        assert_eq!(samples.len(), 4800);
        assert_eq!(samples[0], 0);
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 15000 && peak <= (Sample::MAX / 2) as u16 + 1);
    }

    #[test]
    fn test_last_frame_is_padded() {
        let samples = vec![7; 1000];
        let frames = split_frames(&samples, 480);

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.samples.len() == 480));
        assert_eq!(frames[2].samples[39], 7);
        assert_eq!(frames[2].samples[40], 0);
        assert_eq!(frames[2].sequence_number, 2);
    }

    #[test]
    fn test_parse_sine_defaults() {
        let cli = Cli::try_parse_from(["test-audio", "sine"]).unwrap();
        assert!(matches!(cli.command, Commands::Sine { duration: 2000, .. }));
    }
}
