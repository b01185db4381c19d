//! Client du protocole SRS
//!
//! Ce module gère la session complète avec le relais :
//! - connexion TCP puis socket UDP lié au même port local
//! - handshake (SYNC) et mises à jour radio
//! - envoi des paquets voix
//! - trois boucles de fond : réception TCP, réception UDP, ping
//!
//! La capture micro est la quatrième boucle, pilotée par le pipeline audio.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::{
    ConnectionState, ControlMessage, NetworkError, NetworkResult, ProtocolConfig, Session,
    SessionStats, VoiceFrameCodec,
};

/// Client du relais SRS
///
/// # Architecture
/// - `Session` partagée (drapeau `running` atomique + sockets sous mutex)
/// - Une tâche tokio par boucle, qui ne tient qu'une référence à la session
/// - Paquets voix reçus livrés sur un canal borné, sans jamais bloquer la
///   réception
///
/// Toutes les méthodes prennent `&self` : le client est partagé via `Arc`
/// entre l'orchestrateur et la tâche d'envoi voix.
///
/// # Example
/// ```rust,no_run
/// use network::{ProtocolClient, ProtocolConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ProtocolClient::new(ProtocolConfig::default());
/// let mut voice = client.connect("127.0.0.1", 6002, "LinuxPilot").await?;
///
/// client.send_radio_update(1, 2).await?;
/// while let Some(payload) = voice.recv().await {
///     println!("Reçu {} octets de voix", payload.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ProtocolClient {
    config: ProtocolConfig,

    /// État de connexion actuel
    state: Arc<Mutex<ConnectionState>>,

    /// Session en cours (None si jamais connecté ou déconnecté)
    session: Mutex<Option<Arc<Session>>>,

    /// Tâches des boucles de fond
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProtocolClient {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            session: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// État de connexion actuel
    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// Indique si la session est active
    ///
    /// Passe à false dès que la boucle TCP détecte la fermeture du relais.
    pub async fn is_running(&self) -> bool {
        match self.current_session().await {
            Some(session) => session.is_running(),
            None => false,
        }
    }

    /// Session en cours
    pub async fn current_session(&self) -> Option<Arc<Session>> {
        self.session.lock().await.clone()
    }

    /// Compteurs de la session en cours
    pub async fn stats(&self) -> SessionStats {
        match self.current_session().await {
            Some(session) => session.stats(),
            None => SessionStats::default(),
        }
    }

    /// Se connecte au relais et démarre les boucles
    ///
    /// Retourne le récepteur des payloads voix reçus. Toute erreur pendant la
    /// séquence ferme les sockets déjà ouverts et ramène à `Disconnected`.
    ///
    /// # Erreurs
    /// - `NetworkError::ConnectFailed` / `ConnectionTimeout` : TCP injoignable
    /// - `NetworkError::BindFailed` : port local indisponible pour l'UDP
    /// - `NetworkError::Io` : échec de l'envoi du SYNC
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        pilot_name: &str,
    ) -> NetworkResult<mpsc::Receiver<Vec<u8>>> {
        if self.is_running().await || self.state().await.is_connecting() {
            tracing::warn!(state = %self.state().await.description(), "Client déjà connecté, nouvelle connexion ignorée");
            return Err(NetworkError::ConfigError("client déjà connecté".to_string()));
        }
        // Nettoie une session précédente interrompue par le relais
        self.disconnect().await;

        let target = format!("{}:{}", host, port);
        self.set_state(ConnectionState::Connecting { target: target.clone() }).await;
        tracing::info!(server = %target, "Connexion au serveur SRS");

        match self.establish(host, port, pilot_name, &target).await {
            Ok((session, read_half, udp)) => {
                let (voice_tx, voice_rx) = mpsc::channel(self.config.voice_queue_depth);
                session.set_running(true);

                // Connected et session publiés avant les boucles : la boucle TCP
                // peut constater la fermeture du relais dès son démarrage
                self.set_state(ConnectionState::Connected {
                    server_addr: session.server_addr(),
                    local_addr: session.local_addr(),
                    connected_at: Instant::now(),
                })
                .await;
                *self.session.lock().await = Some(Arc::clone(&session));

                let mut tasks = self.tasks.lock().await;
                tasks.push(tokio::spawn(tcp_receive_loop(
                    Arc::clone(&session),
                    read_half,
                    Arc::clone(&self.state),
                    self.config.clone(),
                )));
                tasks.push(tokio::spawn(udp_receive_loop(
                    Arc::clone(&session),
                    udp,
                    voice_tx,
                    self.config.udp_buffer_size,
                )));
                tasks.push(tokio::spawn(ping_loop(Arc::clone(&session), self.config.clone())));
                drop(tasks);

                tracing::info!(
                    server = %session.server_addr(),
                    local = %session.local_addr(),
                    guid = session.client_guid(),
                    "Client SRS démarré"
                );
                Ok(voice_rx)
            }
            Err(e) => {
                tracing::error!(server = %target, error = %e, "Connexion au serveur SRS impossible");
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Ouvre les deux sockets et envoie le SYNC
    ///
    /// Les sockets sont libérés par drop en cas d'erreur.
    async fn establish(
        &self,
        host: &str,
        port: u16,
        pilot_name: &str,
        target: &str,
    ) -> NetworkResult<(Arc<Session>, OwnedReadHalf, Arc<UdpSocket>)> {
        let connect = TcpStream::connect((host, port));
        let stream = match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                NetworkError::ConnectionTimeout {
                    addr: target.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?,
            None => connect.await,
        }
        .map_err(|e| NetworkError::connect_failed(target, &e))?;
        stream.set_nodelay(true)?;

        let local_addr = stream.local_addr()?;
        let server_addr = stream.peer_addr()?;
        tracing::info!(local = %local_addr, "Connexion TCP établie");

        // Le relais corrèle les deux canaux par le port local
        let udp = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| NetworkError::bind_failed(local_addr, &e))?;
        let udp = Arc::new(udp);
        tracing::debug!(local = %local_addr, "Socket UDP lié");

        self.set_state(ConnectionState::Handshaking { server_addr }).await;

        let (read_half, write_half) = stream.into_split();
        let session = Arc::new(Session::new(
            pilot_name,
            host,
            port,
            server_addr,
            local_addr,
            write_half,
            Arc::clone(&udp),
        ));

        if let Err(e) = session.send_handshake().await {
            session.close().await;
            return Err(e);
        }
        tracing::info!("Handshake (SYNC) envoyé");

        Ok((session, read_half, udp))
    }

    /// Se déconnecte du relais
    ///
    /// Idempotent et non bloquant : ferme les sockets et arrête les boucles
    /// sans attendre leur fin.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();

        if let Some(session) = session {
            if session.close().await {
                tracing::info!(server = %session.server_addr(), "Déconnexion du serveur SRS");
            }
        }
        for task in tasks {
            task.abort();
        }
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Envoie un payload voix compressé
    ///
    /// `radio` n'est pas encodé sur le fil ; il sert uniquement aux logs.
    /// Un échec d'envoi déconnecte la session.
    ///
    /// # Erreurs
    /// - `NetworkError::NotConnected` : aucune session active, rien n'a été fait
    /// - `NetworkError::Io` : échec d'envoi, la session est fermée
    pub async fn send_voice(&self, payload: &[u8], radio: u8) -> NetworkResult<()> {
        let session = self.active_session().await?;
        let udp = session.udp().await.ok_or(NetworkError::NotConnected)?;

        let sequence = session.next_sequence();
        let datagram = VoiceFrameCodec::encode(sequence, session.client_guid(), payload);

        match udp.send_to(&datagram, session.server_addr()).await {
            Ok(_) => {
                session.counters.voice_sent.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(sequence, radio, bytes = datagram.len(), "Paquet voix envoyé");
                Ok(())
            }
            Err(e) => {
                tracing::error!(sequence, error = %e, "Erreur d'envoi du paquet voix");
                self.disconnect().await;
                Err(NetworkError::Io(e))
            }
        }
    }

    /// Envoie l'état des deux radios (`RADIO_UPDATE`)
    pub async fn send_radio_update(&self, radio1_channel: i32, radio2_channel: i32) -> NetworkResult<()> {
        let session = self.active_session().await?;
        let message = ControlMessage::radio_update(session.client_info(), radio1_channel, radio2_channel);

        if let Err(e) = session.send_control(&message).await {
            if e.requires_reconnection() {
                tracing::error!(error = %e, "Erreur d'envoi de la mise à jour radio");
                self.disconnect().await;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn active_session(&self) -> NetworkResult<Arc<Session>> {
        match self.current_session().await {
            Some(session) if session.is_running() => Ok(session),
            _ => Err(NetworkError::NotConnected),
        }
    }

    async fn set_state(&self, new_state: ConnectionState) {
        *self.state.lock().await = new_state;
    }
}

impl Drop for ProtocolClient {
    /// Arrête les boucles d'un client abandonné sans `disconnect()`
    ///
    /// Les tâches tiennent les sockets ; les interrompre les libère.
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.set_running(false);
        }
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Boucle de réception du canal de contrôle
///
/// Seule boucle qui déclare la session morte : fin de flux ou erreur socket
/// remet `running` à false.
async fn tcp_receive_loop(
    session: Arc<Session>,
    mut reader: OwnedReadHalf,
    state: Arc<Mutex<ConnectionState>>,
    config: ProtocolConfig,
) {
    let mut chunk = vec![0u8; config.tcp_read_chunk];
    let mut buffer: Vec<u8> = Vec::with_capacity(config.tcp_read_chunk);

    while session.is_running() {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::info!("Connexion fermée par le serveur");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                if session.is_running() {
                    tracing::error!(error = %e, "Erreur dans la boucle de réception TCP");
                }
                break;
            }
        };
        buffer.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            handle_control_line(&session, &line[..line.len() - 1]);
        }

        if buffer.len() > config.max_line_bytes {
            tracing::warn!(bytes = buffer.len(), "Ligne de contrôle trop longue, abandonnée");
            session.counters.control_decode_errors.fetch_add(1, Ordering::Relaxed);
            buffer.clear();
        }
    }

    session.set_running(false);
    {
        // Ne touche pas à l'état d'une connexion plus récente
        let mut state = state.lock().await;
        if matches!(&*state, ConnectionState::Connected { local_addr, .. } if *local_addr == session.local_addr()) {
            *state = ConnectionState::Disconnected;
        }
    }
    tracing::info!("Boucle de réception TCP arrêtée");
}

fn handle_control_line(session: &Session, line: &[u8]) {
    if line.is_empty() {
        return;
    }
    match ControlMessage::decode(line) {
        Ok(message) => {
            session.counters.control_received.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(msg_type = message.msg_type(), "Message reçu du serveur");
        }
        Err(e) => {
            session.counters.control_decode_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, raw = %String::from_utf8_lossy(line), "Message serveur illisible");
        }
    }
}

/// Boucle de réception du canal voix
async fn udp_receive_loop(
    session: Arc<Session>,
    udp: Arc<UdpSocket>,
    voice_tx: mpsc::Sender<Vec<u8>>,
    buffer_size: usize,
) {
    tracing::debug!("Boucle de réception UDP démarrée");
    let mut buffer = vec![0u8; buffer_size];

    while session.is_running() {
        let n = match udp.recv_from(&mut buffer).await {
            Ok((n, _from)) => n,
            Err(e) => {
                if session.is_running() {
                    tracing::error!(error = %e, "Erreur dans la boucle de réception UDP");
                }
                break;
            }
        };

        match VoiceFrameCodec::decode(&buffer[..n]) {
            Ok(payload) => match voice_tx.try_send(payload.to_vec()) {
                Ok(()) => {
                    session.counters.voice_received.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    session.counters.voice_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("File voix pleine, paquet perdu");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    session.counters.voice_dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            Err(e) => {
                session.counters.voice_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "Datagramme voix ignoré");
            }
        }
    }
    tracing::info!("Boucle de réception UDP arrêtée");
}

/// Boucle de ping
async fn ping_loop(session: Arc<Session>, config: ProtocolConfig) {
    let mut interval = tokio::time::interval(config.ping_interval);
    loop {
        interval.tick().await;
        if !session.is_running() {
            break;
        }
        if let Err(e) = session.send_control(&ControlMessage::Ping(session.client_info())).await {
            tracing::debug!(error = %e, "Arrêt de la boucle de ping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ClientInfo;
    use serde_json::Value;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};

    /// Relais de test : écoute TCP et UDP sur le même port
    struct TestRelay {
        listener: TcpListener,
        udp: UdpSocket,
    }

    impl TestRelay {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let udp = UdpSocket::bind(listener.local_addr().unwrap()).await.unwrap();
            Self { listener, udp }
        }

        fn port(&self) -> u16 {
            self.listener.local_addr().unwrap().port()
        }

        async fn accept(&self) -> tokio::io::BufReader<TcpStream> {
            let (stream, _) = self.listener.accept().await.unwrap();
            tokio::io::BufReader::new(stream)
        }
    }

    async fn read_json_line(reader: &mut tokio::io::BufReader<TcpStream>) -> Value {
        let mut line = String::new();
        timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("Timeout lecture ligne")
            .unwrap();
        assert!(line.ends_with('\n'));
        serde_json::from_str(line.trim_end()).unwrap()
    }

    async fn connected_client(relay: &TestRelay) -> (ProtocolClient, mpsc::Receiver<Vec<u8>>, tokio::io::BufReader<TcpStream>) {
        let client = ProtocolClient::new(ProtocolConfig::test_config());
        let (voice, server_side) = tokio::join!(client.connect("127.0.0.1", relay.port(), "TestPilot"), relay.accept());
        (client, voice.unwrap(), server_side)
    }

    #[tokio::test]
    async fn test_connect_sends_sync() {
        let relay = TestRelay::start().await;
        let (client, _voice, mut server_side) = connected_client(&relay).await;

        let sync = read_json_line(&mut server_side).await;
        assert_eq!(sync["MsgType"], "SYNC");
        assert_eq!(sync["Client"]["Name"], "TestPilot");

        assert!(client.state().await.is_connected());
        assert!(client.is_running().await);

        let session = client.current_session().await.unwrap();
        assert_eq!(sync["Client"]["ClientGuid"], session.client_guid());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_unreachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ProtocolClient::new(ProtocolConfig::test_config());
        let result = client.connect("127.0.0.1", port, "TestPilot").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().requires_reconnection());
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(!client.is_running().await);
        assert!(client.current_session().await.is_none());
        assert!(client.tasks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_before_connect_is_noop() {
        let client = ProtocolClient::new(ProtocolConfig::test_config());

        let result = client.send_voice(&[1, 2, 3], 1).await;
        assert!(matches!(result, Err(NetworkError::NotConnected)));
        let result = client.send_radio_update(1, 2).await;
        assert!(matches!(result, Err(NetworkError::NotConnected)));

        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.stats().await, SessionStats::default());
    }

    #[tokio::test]
    async fn test_voice_sequence_increments() {
        let relay = TestRelay::start().await;
        let (client, _voice, _server_side) = connected_client(&relay).await;
        let guid = client.current_session().await.unwrap().client_guid().to_string();

        for payload in [[10u8], [20], [30]] {
            client.send_voice(&payload, 1).await.unwrap();
        }

        let mut buf = [0u8; 512];
        for expected in 1..=3u64 {
            let (n, _) = timeout(Duration::from_secs(2), relay.udp.recv_from(&mut buf))
                .await
                .expect("Timeout réception voix")
                .unwrap();
            let packet = VoiceFrameCodec::decode_envelope(&buf[..n]).unwrap();
            assert_eq!(packet.sequence, expected);
            assert_eq!(packet.client_id, guid);
            assert_eq!(packet.payload, vec![expected as u8 * 10]);
        }
        assert_eq!(client.stats().await.voice_sent, 3);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_udp_bound_to_tcp_local_port() {
        let relay = TestRelay::start().await;
        let (client, _voice, server_side) = connected_client(&relay).await;

        client.send_voice(&[1], 2).await.unwrap();
        let mut buf = [0u8; 512];
        let (_, from) = timeout(Duration::from_secs(2), relay.udp.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(from, server_side.get_ref().peer_addr().unwrap());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_empty_datagram_is_dropped() {
        let relay = TestRelay::start().await;
        let (client, mut voice, server_side) = connected_client(&relay).await;
        let client_addr = server_side.get_ref().peer_addr().unwrap();

        relay.udp.send_to(&[], client_addr).await.unwrap();
        relay.udp.send_to(&[0xF8, 0x01], client_addr).await.unwrap();

        let payload = timeout(Duration::from_secs(2), voice.recv()).await.unwrap().unwrap();
        assert_eq!(payload, vec![0xF8, 0x01]);
        assert!(voice.try_recv().is_err());

        let stats = client.stats().await;
        assert_eq!(stats.voice_dropped, 1);
        assert_eq!(stats.voice_received, 1);
        assert!(client.is_running().await);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_radio_update_single_write() {
        let relay = TestRelay::start().await;
        let (client, _voice, mut server_side) = connected_client(&relay).await;
        let _sync = read_json_line(&mut server_side).await;

        client.send_radio_update(1, 2).await.unwrap();

        let update = read_json_line(&mut server_side).await;
        assert_eq!(update["MsgType"], "RADIO_UPDATE");
        assert_eq!(update["Client"]["GameState"]["radios"].as_array().unwrap().len(), 2);

        // PING ne doit rien écrire : aucune autre ligne n'arrive
        let mut line = String::new();
        let extra = timeout(Duration::from_millis(300), server_side.read_line(&mut line)).await;
        assert!(extra.is_err());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_bad_control_line_keeps_session() {
        let relay = TestRelay::start().await;
        let (client, _voice, mut server_side) = connected_client(&relay).await;

        let reply = ControlMessage::Update(ClientInfo::new("guid-serveur", "Relais"))
            .encode()
            .unwrap()
            .unwrap();
        let stream = server_side.get_mut();
        tokio::io::AsyncWriteExt::write_all(stream, b"{\"MsgType\": \"SY\n").await.unwrap();
        tokio::io::AsyncWriteExt::write_all(stream, &reply[..10]).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        tokio::io::AsyncWriteExt::write_all(stream, &reply[10..]).await.unwrap();

        sleep(Duration::from_millis(200)).await;
        let stats = client.stats().await;
        assert_eq!(stats.control_decode_errors, 1);
        assert_eq!(stats.control_received, 1);
        assert!(client.is_running().await);
        client.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_server_close_ends_disconnected() {
        let relay = TestRelay::start().await;

        for _ in 0..50 {
            let client = ProtocolClient::new(ProtocolConfig::test_config());
            let (connected, accepted) = tokio::join!(
                client.connect("127.0.0.1", relay.port(), "TestPilot"),
                relay.listener.accept()
            );
            connected.unwrap();
            drop(accepted.unwrap());

            timeout(Duration::from_secs(2), async {
                while client.is_running().await {
                    sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("Fermeture détectée");
            sleep(Duration::from_millis(20)).await;

            assert_eq!(client.state().await, ConnectionState::Disconnected);
        }
    }

    #[tokio::test]
    async fn test_send_failure_disconnects_without_reusing_sequence() {
        let relay = TestRelay::start().await;
        let (client, _voice, _server_side) = connected_client(&relay).await;
        let session = client.current_session().await.unwrap();

        tokio_test::assert_ok!(client.send_voice(&[1], 1).await);

        // Trop grand pour un datagramme UDP
        let oversized = vec![0u8; 70_000];
        let result = client.send_voice(&oversized, 1).await;
        assert!(matches!(result, Err(NetworkError::Io(_))));

        assert_eq!(session.last_sequence(), 2);
        assert!(!client.is_running().await);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(matches!(client.send_voice(&[2], 1).await, Err(NetworkError::NotConnected)));
        assert_eq!(session.last_sequence(), 2);
    }

    #[tokio::test]
    async fn test_dropped_client_releases_sockets() {
        let relay = TestRelay::start().await;
        let (client, mut voice, mut server_side) = connected_client(&relay).await;
        let _sync = read_json_line(&mut server_side).await;

        drop(client);

        // Les boucles sont arrêtées : le canal voix et la connexion se ferment
        let closed = timeout(Duration::from_secs(2), voice.recv()).await.expect("Canal voix fermé");
        assert!(closed.is_none());

        let mut line = String::new();
        let n = timeout(Duration::from_secs(2), server_side.read_line(&mut line))
            .await
            .expect("Connexion fermée")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_server_close_clears_running() {
        let relay = TestRelay::start().await;
        let (client, _voice, server_side) = connected_client(&relay).await;

        drop(server_side);
        sleep(Duration::from_millis(200)).await;

        assert!(!client.is_running().await);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(matches!(client.send_voice(&[1], 1).await, Err(NetworkError::NotConnected)));

        client.disconnect().await;
        client.disconnect().await;
    }
}
