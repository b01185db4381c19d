// Client radio IL-2 SRS pour Linux
//
// Attend les données du jeu, se connecte au serveur SRS annoncé,
// puis émet la voix du micro tant qu'une touche PTT est tenue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use audio::{list_devices, AudioPipeline};
use client_core::{GameListener, SessionOrchestrator, Settings, GAME_DATA_PORT};
use network::{utils, ProtocolClient, ProtocolConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Client radio SRS pour IL-2 Sturmovik")]
struct Cli {
    /// Logs détaillés (niveau debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attend le jeu, se connecte et démarre la radio
    Run {
        /// Fichier de configuration à utiliser
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Se connecte directement à un serveur, sans attendre le jeu
    Connect {
        /// Adresse du serveur, `hôte:port`
        #[arg(short, long)]
        server: String,
        /// Nom de pilote annoncé
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Affiche l'adresse du serveur et le nom du pilote émis par le jeu
    ListenGame {
        #[arg(short, long, default_value_t = GAME_DATA_PORT)]
        port: u16,
    },
    /// Liste les périphériques audio
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Connect { server, name, config } => {
            let settings = load_settings(config);
            start_session(settings, &server, name.as_deref()).await
        }
        Commands::ListenGame { port } => listen_game(port).await,
        Commands::Devices => show_devices(),
    }
}

/// `RUST_LOG` prime sur le niveau par défaut, `--verbose` sur les deux
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_settings(path: Option<PathBuf>) -> Settings {
    match path {
        Some(path) => Settings::load_or_default(&path),
        None => Settings::load(),
    }
}

/// Parcours complet : configuration, jeu, audio, connexion, boucle
async fn run(config: Option<PathBuf>) -> Result<()> {
    println!("🛩️  IL-2 SRS client");

    // 1. Configuration
    let settings = load_settings(config);
    println!("   Pilote : {}", settings.user.pilot_name);
    println!("   PTT : {} / {}", settings.keybinds.ptt1, settings.keybinds.ptt2);

    // 2. Données du jeu
    let listener = GameListener::bind(GAME_DATA_PORT)
        .await
        .context("Écoute des données du jeu")?;
    println!("⏳ En attente du jeu sur le port UDP {} (Ctrl+C pour quitter)...", GAME_DATA_PORT);

    let (server, pilot) = tokio::select! {
        found = listener.wait_for_game_data() => found.context("Réception des données du jeu")?,
        _ = signal::ctrl_c() => {
            println!("\n👋 Annulé");
            return Ok(());
        }
    };
    drop(listener);
    println!("✅ Serveur {}, pilote {}", server, pilot);

    // 3 à 5. Audio, connexion, boucle
    start_session(settings, &server, Some(&pilot)).await
}

async fn start_session(settings: Settings, server: &str, pilot: Option<&str>) -> Result<()> {
    let pipeline = AudioPipeline::new(settings.audio_config()).context("Initialisation audio")?;
    let client = Arc::new(ProtocolClient::new(ProtocolConfig::default()));
    let mut orchestrator = SessionOrchestrator::new(settings, pipeline, client);

    orchestrator
        .start(server, pilot)
        .await
        .with_context(|| format!("Démarrage de la session sur {}", server))?;
    println!("📡 {} ; Ctrl+C pour quitter", orchestrator.client().state().await.description());

    let started = Instant::now();
    orchestrator.run_until_shutdown().await;

    let audio = orchestrator.audio_stats();
    let session = orchestrator.session_stats().await;
    println!("\n📈 Session ({}) :", utils::format_duration(started.elapsed()));
    println!("   Paquets voix envoyés : {}", session.voice_sent);
    println!("   Paquets voix reçus : {}", session.voice_received);
    println!("   Frames encodées : {}", audio.frames_encoded);
    println!("   Paquets joués : {}", audio.packets_played);
    println!("👋 Au revoir !");
    Ok(())
}

async fn listen_game(port: u16) -> Result<()> {
    let listener = GameListener::bind(port).await?;
    println!("⏳ En attente des données du jeu sur le port UDP {}...", port);

    tokio::select! {
        found = listener.wait_for_game_data() => {
            let (server, pilot) = found?;
            println!("✅ Serveur SRS : {}", server);
            println!("✅ Pilote : {}", pilot);
        }
        _ = signal::ctrl_c() => println!("\n👋 Annulé"),
    }
    Ok(())
}

fn show_devices() -> Result<()> {
    let devices = list_devices().context("Énumération des périphériques audio")?;

    println!("🎤 Entrées :");
    for device in &devices.inputs {
        println!("   {}{}", device.name, if device.is_default { " (défaut)" } else { "" });
    }
    println!("🔊 Sorties :");
    for device in &devices.outputs {
        println!("   {}{}", device.name, if device.is_default { " (défaut)" } else { "" });
    }
    Ok(())
}
