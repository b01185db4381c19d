//! Orchestration d'une session radio
//!
//! Relie les briques entre elles :
//!
//! ```text
//! micro → AudioPipeline (encode) → [canal] → envoi voix (radio 1, puis radio 2 si PTT)
//! relais → ProtocolClient (UDP) → [canal] → AudioPipeline (decode, gain, lecture)
//! touches → PttEventSource → [canal] → PttState
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use audio::{AudioPipeline, AudioStats};
use network::{NetworkError, NetworkResult, ProtocolClient, SessionStats};

use crate::discovery::split_server_address;
use crate::input::{PttEvent, PttEventSource, PttState};
use crate::settings::Settings;
use crate::{CoreError, CoreResult};

/// Canaux radio annoncés au démarrage
const INITIAL_RADIO_CHANNELS: (i32, i32) = (1, 2);

/// Intervalle de vérification de la session dans `run_until_shutdown`
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Profondeur de la file des événements PTT
const PTT_QUEUE_DEPTH: usize = 32;

/// Destination des paquets voix encodés
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn send_voice(&self, payload: &[u8], radio: u8) -> NetworkResult<()>;
}

#[async_trait]
impl VoiceSink for ProtocolClient {
    async fn send_voice(&self, payload: &[u8], radio: u8) -> NetworkResult<()> {
        ProtocolClient::send_voice(self, payload, radio).await
    }
}

/// Envoie un paquet sur chaque radio en émission, radio 1 d'abord
///
/// Retourne le nombre de paquets envoyés.
pub async fn forward_packet(packet: &[u8], ptt: &PttState, sink: &dyn VoiceSink) -> usize {
    let mut sent = 0;
    for radio in ptt.active_radios() {
        match sink.send_voice(packet, radio).await {
            Ok(()) => sent += 1,
            Err(NetworkError::NotConnected) => {
                tracing::trace!(radio, "Non connecté, paquet voix ignoré");
            }
            Err(e) => {
                tracing::warn!(radio, error = %e, "Envoi voix impossible");
            }
        }
    }
    sent
}

/// Tâche d'envoi : consomme les paquets encodés par la capture
async fn forward_voice(mut encoded: mpsc::Receiver<Vec<u8>>, ptt: Arc<PttState>, sink: Arc<dyn VoiceSink>) {
    while let Some(packet) = encoded.recv().await {
        forward_packet(&packet, &ptt, sink.as_ref()).await;
    }
    tracing::debug!("Tâche d'envoi voix terminée");
}

/// Tâche PTT : applique les événements à l'état partagé
async fn track_ptt(mut events: mpsc::Receiver<PttEvent>, ptt: Arc<PttState>) {
    while let Some(event) = events.recv().await {
        if ptt.apply(event) {
            tracing::info!(
                radio = event.control.radio(),
                pressed = event.pressed,
                "PTT {}",
                if event.pressed { "appuyé" } else { "relâché" }
            );
        }
    }
}

/// Session radio complète
pub struct SessionOrchestrator {
    settings: Settings,
    pipeline: AudioPipeline,
    client: Arc<ProtocolClient>,
    ptt_source: Box<dyn PttEventSource>,
    ptt: Arc<PttState>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl SessionOrchestrator {
    /// Crée l'orchestrateur avec la source PTT de la plateforme
    pub fn new(settings: Settings, pipeline: AudioPipeline, client: Arc<ProtocolClient>) -> Self {
        let ptt_source = default_ptt_source(&settings);
        Self::with_ptt_source(settings, pipeline, client, ptt_source)
    }

    pub fn with_ptt_source(
        settings: Settings,
        pipeline: AudioPipeline,
        client: Arc<ProtocolClient>,
        ptt_source: Box<dyn PttEventSource>,
    ) -> Self {
        Self {
            settings,
            pipeline,
            client,
            ptt_source,
            ptt: Arc::new(PttState::new()),
            tasks: Vec::new(),
            started: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &Arc<ProtocolClient> {
        &self.client
    }

    pub fn ptt_state(&self) -> &Arc<PttState> {
        &self.ptt
    }

    pub fn audio_stats(&self) -> AudioStats {
        self.pipeline.stats()
    }

    pub async fn session_stats(&self) -> SessionStats {
        self.client.stats().await
    }

    /// Démarre la session
    ///
    /// `pilot_name` vient du jeu ; sinon le nom de la configuration est utilisé.
    /// Si la connexion échoue, rien n'est démarré. Un échec d'ouverture du
    /// micro ou des touches laisse la session en réception seule.
    pub async fn start(&mut self, server_address: &str, pilot_name: Option<&str>) -> CoreResult<()> {
        if self.started {
            return Err(CoreError::AlreadyRunning);
        }

        let pilot_name = self.settings.resolve_pilot_name(pilot_name);
        let (host, port) = split_server_address(server_address)?;

        let inbound = self
            .client
            .connect(&host, port, &pilot_name)
            .await
            .map_err(CoreError::ConnectFailed)?;
        self.started = true;

        // Réception : UDP → décodage → lecture (sortie ouverte au premier paquet)
        self.pipeline.spawn_playback(inbound);

        // Émission : micro → encodage → envoi selon les PTT
        let (encoded_tx, encoded_rx) = mpsc::channel(self.pipeline.config().capture_queue_frames);
        match self.pipeline.start_capture(encoded_tx).await {
            Ok(()) => {
                let sink: Arc<dyn VoiceSink> = self.client.clone();
                self.tasks.push(tokio::spawn(forward_voice(encoded_rx, Arc::clone(&self.ptt), sink)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Micro indisponible, session en réception seule");
            }
        }

        let (ptt_tx, ptt_rx) = mpsc::channel(PTT_QUEUE_DEPTH);
        match self.ptt_source.start(ptt_tx).await {
            Ok(()) => {
                self.tasks.push(tokio::spawn(track_ptt(ptt_rx, Arc::clone(&self.ptt))));
            }
            Err(e) => {
                tracing::error!(error = %e, "Touches PTT indisponibles");
            }
        }

        let (radio1, radio2) = INITIAL_RADIO_CHANNELS;
        if let Err(e) = self.client.send_radio_update(radio1, radio2).await {
            tracing::warn!(error = %e, "Mise à jour radio initiale non envoyée");
        }

        tracing::info!(server = server_address, pilot = %pilot_name, "Session radio démarrée");
        Ok(())
    }

    /// Indique si la session est active
    pub async fn is_running(&self) -> bool {
        self.started && self.client.is_running().await
    }

    /// Arrête la session ; sans effet si elle est déjà arrêtée
    pub async fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        self.client.disconnect().await;
        self.pipeline.shutdown().await;
        self.ptt_source.stop().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.ptt.reset();

        let stats = self.pipeline.stats();
        tracing::info!(
            encoded = stats.frames_encoded,
            played = stats.packets_played,
            dropped = stats.frames_dropped,
            "Session radio arrêtée"
        );
    }

    /// Attend Ctrl+C ou la perte de la session, puis arrête tout
    pub async fn run_until_shutdown(&mut self) {
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut check = tokio::time::interval(SESSION_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Arrêt demandé (Ctrl+C)");
                    break;
                }
                _ = check.tick() => {
                    if !self.is_running().await {
                        tracing::warn!("Session perdue, arrêt");
                        break;
                    }
                }
            }
        }

        self.stop().await;
    }
}

#[cfg(target_os = "linux")]
fn default_ptt_source(settings: &Settings) -> Box<dyn PttEventSource> {
    Box::new(crate::input::EvdevPttSource::from_settings(&settings.keybinds))
}

#[cfg(not(target_os = "linux"))]
fn default_ptt_source(_settings: &Settings) -> Box<dyn PttEventSource> {
    tracing::warn!("Pas de source PTT sur cette plateforme");
    Box::new(crate::input::ChannelPttSource::silent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ChannelPttSource, PttControl};
    use audio::{AudioCapture, AudioCodec, AudioConfig, AudioError, AudioFrame, AudioPlayback, AudioResult};
    use network::{ProtocolConfig, VoiceFrameCodec};
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::{TcpListener, TcpStream, UdpSocket};
    use tokio::time::{sleep, timeout};

    /// Enregistre les envois (payload, radio)
    #[derive(Default)]
    struct RecordingSink {
        sent: StdMutex<Vec<(Vec<u8>, u8)>>,
        connected: bool,
    }

    #[async_trait]
    impl VoiceSink for RecordingSink {
        async fn send_voice(&self, payload: &[u8], radio: u8) -> NetworkResult<()> {
            if !self.connected {
                return Err(NetworkError::NotConnected);
            }
            self.sent.lock().unwrap().push((payload.to_vec(), radio));
            Ok(())
        }
    }

    fn connected_sink() -> RecordingSink {
        RecordingSink { connected: true, ..Default::default() }
    }

    #[tokio::test]
    async fn test_ptt_gates_each_frame() {
        let ptt = PttState::new();
        let sink = connected_sink();

        ptt.apply(PttEvent::new(PttControl::Ptt1, true));
        assert_eq!(forward_packet(b"frame-1", &ptt, &sink).await, 1);
        ptt.apply(PttEvent::new(PttControl::Ptt1, false));
        assert_eq!(forward_packet(b"frame-2", &ptt, &sink).await, 0);

        assert_eq!(*sink.sent.lock().unwrap(), vec![(b"frame-1".to_vec(), 1)]);
    }

    #[tokio::test]
    async fn test_both_radios_send_twice_in_order() {
        let ptt = Arc::new(PttState::new());
        ptt.apply(PttEvent::new(PttControl::Ptt2, true));
        ptt.apply(PttEvent::new(PttControl::Ptt1, true));

        let sink = Arc::new(connected_sink());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(forward_voice(rx, Arc::clone(&ptt), sink.clone()));

        tx.send(vec![7]).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(*sink.sent.lock().unwrap(), vec![(vec![7], 1), (vec![7], 2)]);
    }

    #[tokio::test]
    async fn test_not_connected_is_silent() {
        let ptt = PttState::new();
        ptt.apply(PttEvent::new(PttControl::Ptt1, true));
        let sink = RecordingSink::default();

        assert_eq!(forward_packet(&[1], &ptt, &sink).await, 0);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ptt_task_updates_state() {
        let ptt = Arc::new(PttState::new());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(track_ptt(rx, Arc::clone(&ptt)));

        tx.send(PttEvent::new(PttControl::Ptt2, true)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(ptt.is_active(PttControl::Ptt2));
        assert!(!ptt.is_active(PttControl::Ptt1));
    }

    // Composants audio factices pour la session complète

    struct IdleCapture {
        recording: bool,
        feeder: Arc<StdMutex<Option<mpsc::Sender<AudioFrame>>>>,
    }

    #[async_trait]
    impl AudioCapture for IdleCapture {
        async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>> {
            let (tx, rx) = mpsc::channel(4);
            *self.feeder.lock().unwrap() = Some(tx);
            self.recording = true;
            Ok(rx)
        }

        async fn stop(&mut self) -> AudioResult<()> {
            self.feeder.lock().unwrap().take();
            self.recording = false;
            Ok(())
        }

        fn is_recording(&self) -> bool {
            self.recording
        }
    }

    struct NullPlayback {
        playing: bool,
    }

    #[async_trait]
    impl AudioPlayback for NullPlayback {
        async fn start(&mut self) -> AudioResult<()> {
            self.playing = true;
            Ok(())
        }

        async fn stop(&mut self) -> AudioResult<()> {
            self.playing = false;
            Ok(())
        }

        async fn play_frame(&mut self, _frame: AudioFrame) -> AudioResult<()> {
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    /// Codec factice : un octet par frame
    struct ByteCodec;

    impl AudioCodec for ByteCodec {
        fn encode(&mut self, frame: &AudioFrame) -> AudioResult<Vec<u8>> {
            Ok(vec![frame.samples[0] as u8])
        }

        fn decode(&mut self, packet: &[u8]) -> AudioResult<Option<AudioFrame>> {
            match packet.first() {
                Some(&b) => Ok(Some(AudioFrame::new(vec![b as i16; 480], 0))),
                None => Err(AudioError::EmptyPacket),
            }
        }

        fn reset(&mut self) -> AudioResult<()> {
            Ok(())
        }

        fn codec_info(&self) -> String {
            "octet".to_string()
        }
    }

    type Feeder = Arc<StdMutex<Option<mpsc::Sender<AudioFrame>>>>;

    fn mock_orchestrator(ptt_rx: mpsc::Receiver<PttEvent>) -> (SessionOrchestrator, Feeder) {
        let feeder: Feeder = Arc::new(StdMutex::new(None));
        let pipeline = AudioPipeline::with_components(
            AudioConfig::default(),
            Box::new(IdleCapture { recording: false, feeder: Arc::clone(&feeder) }),
            Box::new(NullPlayback { playing: false }),
            Box::new(ByteCodec),
            Box::new(ByteCodec),
        );
        let client = Arc::new(ProtocolClient::new(ProtocolConfig::test_config()));
        let orchestrator = SessionOrchestrator::with_ptt_source(
            Settings::default(),
            pipeline,
            client,
            Box::new(ChannelPttSource::new(ptt_rx)),
        );
        (orchestrator, feeder)
    }

    async fn read_line(reader: &mut tokio::io::BufReader<TcpStream>) -> String {
        let mut line = String::new();
        timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("Timeout lecture")
            .unwrap();
        line
    }

    #[tokio::test]
    async fn test_session_start_sends_one_packet_per_ptt_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_udp = UdpSocket::bind(listener.local_addr().unwrap()).await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let (ptt_tx, ptt_rx) = mpsc::channel(4);
        let (mut orchestrator, feeder) = mock_orchestrator(ptt_rx);

        let (started, accepted) = tokio::join!(orchestrator.start(&address, Some("Ace")), listener.accept());
        started.unwrap();
        let mut relay_tcp = tokio::io::BufReader::new(accepted.unwrap().0);

        let sync = read_line(&mut relay_tcp).await;
        assert!(sync.contains("\"MsgType\":\"SYNC\""));
        assert!(sync.contains("\"Name\":\"Ace\""));
        let update = read_line(&mut relay_tcp).await;
        assert!(update.contains("\"MsgType\":\"RADIO_UPDATE\""));
        assert!(orchestrator.is_running().await);

        // PTT1 appuyé pendant la première frame, relâché avant la seconde
        ptt_tx.send(PttEvent::new(PttControl::Ptt1, true)).await.unwrap();
        timeout(Duration::from_secs(1), async {
            while !orchestrator.ptt_state().is_active(PttControl::Ptt1) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("PTT appliqué");

        let frames = feeder.lock().unwrap().clone().expect("Capture démarrée");
        frames.send(AudioFrame::new(vec![11; 480], 0)).await.unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = timeout(Duration::from_secs(2), relay_udp.recv_from(&mut buf))
            .await
            .expect("Paquet voix attendu")
            .unwrap();
        let packet = VoiceFrameCodec::decode_envelope(&buf[..n]).unwrap();
        assert_eq!(packet.sequence, 1);
        assert_eq!(packet.payload, vec![11]);

        ptt_tx.send(PttEvent::new(PttControl::Ptt1, false)).await.unwrap();
        timeout(Duration::from_secs(1), async {
            while orchestrator.ptt_state().is_active(PttControl::Ptt1) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("PTT relâché");

        frames.send(AudioFrame::new(vec![12; 480], 1)).await.unwrap();
        let nothing = timeout(Duration::from_millis(200), relay_udp.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
        assert_eq!(orchestrator.session_stats().await.voice_sent, 1);

        orchestrator.stop().await;
        orchestrator.stop().await;
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn test_start_fails_without_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (_ptt_tx, ptt_rx) = mpsc::channel(1);
        let (mut orchestrator, feeder) = mock_orchestrator(ptt_rx);

        let result = orchestrator.start(&address, None).await;
        assert!(matches!(result, Err(CoreError::ConnectFailed(_))));
        assert!(!orchestrator.is_running().await);
        assert!(feeder.lock().unwrap().is_none());
        assert!(!orchestrator.ptt_source.is_running());

        // Rien à arrêter
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let (_ptt_tx, ptt_rx) = mpsc::channel(1);
        let (mut orchestrator, _feeder) = mock_orchestrator(ptt_rx);

        let result = orchestrator.start("sans-port", None).await;
        assert!(matches!(result, Err(CoreError::InvalidServerAddress(_))));
    }
}
