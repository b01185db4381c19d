//! Session SRS partagée entre les boucles réseau
//!
//! Une `Session` couvre un seul cycle connexion/déconnexion : nouveau GUID,
//! nouveaux sockets à chaque connexion. Le drapeau `running` est la seule
//! source de vérité lue par les boucles ; les sockets sont derrière des
//! mutex pour qu'aucune boucle n'observe un socket à moitié fermé.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::{ClientInfo, ControlMessage, NetworkError, NetworkResult, SessionStats};

/// Compteurs mis à jour par les boucles
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub voice_sent: AtomicU64,
    pub voice_received: AtomicU64,
    pub voice_dropped: AtomicU64,
    pub control_received: AtomicU64,
    pub control_decode_errors: AtomicU64,
}

/// État d'une session connectée
pub struct Session {
    client_guid: String,
    pilot_name: String,
    host: String,
    port: u16,
    server_addr: SocketAddr,
    local_addr: SocketAddr,
    running: AtomicBool,
    sequence: AtomicU64,
    tcp_writer: Mutex<Option<OwnedWriteHalf>>,
    udp: Mutex<Option<Arc<UdpSocket>>>,
    pub(crate) counters: SessionCounters,
}

impl Session {
    pub(crate) fn new(
        pilot_name: &str,
        host: &str,
        port: u16,
        server_addr: SocketAddr,
        local_addr: SocketAddr,
        tcp_writer: OwnedWriteHalf,
        udp: Arc<UdpSocket>,
    ) -> Self {
        Self {
            client_guid: uuid::Uuid::new_v4().to_string(),
            pilot_name: pilot_name.to_string(),
            host: host.to_string(),
            port,
            server_addr,
            local_addr,
            running: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            tcp_writer: Mutex::new(Some(tcp_writer)),
            udp: Mutex::new(Some(udp)),
            counters: SessionCounters::default(),
        }
    }

    pub fn client_guid(&self) -> &str {
        &self.client_guid
    }

    pub fn pilot_name(&self) -> &str {
        &self.pilot_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identité envoyée dans chaque message de contrôle
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo::new(&self.client_guid, &self.pilot_name)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Réserve le prochain numéro de séquence (le premier est 1)
    ///
    /// Un numéro réservé n'est jamais réutilisé, même si l'envoi échoue.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Dernier numéro de séquence utilisé
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Socket voix, s'il est encore ouvert
    pub(crate) async fn udp(&self) -> Option<Arc<UdpSocket>> {
        self.udp.lock().await.clone()
    }

    /// Encode et écrit un message de contrôle sur le canal TCP
    pub(crate) async fn send_control(&self, message: &ControlMessage) -> NetworkResult<()> {
        if !self.is_running() {
            return Err(NetworkError::NotConnected);
        }
        let Some(line) = message.encode()? else {
            return Ok(());
        };

        let mut writer = self.tcp_writer.lock().await;
        let stream = writer.as_mut().ok_or(NetworkError::NotConnected)?;
        stream.write_all(&line).await?;
        stream.flush().await?;

        tracing::debug!(msg_type = message.msg_type(), bytes = line.len(), "Message de contrôle envoyé");
        Ok(())
    }

    /// Écrit une ligne de contrôle avant que la session ne soit marquée active
    pub(crate) async fn send_handshake(&self) -> NetworkResult<()> {
        let Some(line) = ControlMessage::Sync(self.client_info()).encode()? else {
            return Ok(());
        };
        let mut writer = self.tcp_writer.lock().await;
        let stream = writer.as_mut().ok_or(NetworkError::NotConnected)?;
        stream.write_all(&line).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Ferme les deux sockets ; retourne true si quelque chose était ouvert
    pub(crate) async fn close(&self) -> bool {
        self.set_running(false);

        let writer = self.tcp_writer.lock().await.take();
        let udp = self.udp.lock().await.take();
        let was_open = writer.is_some() || udp.is_some();

        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }
        was_open
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            voice_sent: self.counters.voice_sent.load(Ordering::Relaxed),
            voice_received: self.counters.voice_received.load(Ordering::Relaxed),
            voice_dropped: self.counters.voice_dropped.load(Ordering::Relaxed),
            control_received: self.counters.control_received.load(Ordering::Relaxed),
            control_decode_errors: self.counters.control_decode_errors.load(Ordering::Relaxed),
        }
    }
}
