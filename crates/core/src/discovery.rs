//! Découverte du serveur SRS depuis les données émises par IL-2
//!
//! Le jeu diffuse en UDP (port 4322 par défaut) des paquets binaires
//! little-endian :
//!
//! ```text
//! [10 octets d'entête]
//! [u8 nb_indicateurs] { [2 octets] [u8 n] [4*n octets] } * nb_indicateurs
//! [u8 nb_événements]  { [u16 type] [u8 taille] [taille octets] } * nb_événements
//! ```
//!
//! Événement 12 : adresse du serveur SRS (ASCII terminé par NUL).
//! Événement 13 : données client (`i32`, `i32`, nom ASCII de 32 octets).

use tokio::net::UdpSocket;

use crate::{CoreError, CoreResult};

/// Port UDP sur lequel IL-2 émet ses données
pub const GAME_DATA_PORT: u16 = 4322;

/// Événement contenant l'adresse du serveur SRS
pub const SRS_ADDRESS_EVENT: u16 = 12;

/// Événement contenant les données du pilote
pub const CLIENT_DATA_EVENT: u16 = 13;

const HEADER_LEN: usize = 10;
const PLAYER_NAME_LEN: usize = 32;
const RECV_BUFFER_SIZE: usize = 2048;

/// Informations trouvées dans un paquet du jeu
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfo {
    pub srs_address: Option<String>,
    pub pilot_name: Option<String>,
}

/// Lecteur borné sur un paquet ; toute lecture hors limites retourne None
struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn skip(&mut self, count: usize) -> Option<()> {
        let end = self.offset.checked_add(count)?;
        // Un saut en fin de paquet est permis, la lecture suivante échouera
        (end <= self.data.len()).then(|| self.offset = end)
    }

    fn bytes_at(&self, start: usize, count: usize) -> Option<&'a [u8]> {
        self.data.get(start..start.checked_add(count)?)
    }

    fn read_u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.offset)?;
        self.offset += 1;
        Some(value)
    }

    fn read_u16_le(&mut self) -> Option<u16> {
        let bytes = self.bytes_at(self.offset, 2)?;
        self.offset += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

/// Texte ASCII jusqu'au premier NUL
fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect()
}

/// Analyse un paquet du jeu
///
/// Retourne None si le paquet est tronqué ou ne vient pas du jeu.
pub fn parse_game_packet(data: &[u8]) -> Option<GameInfo> {
    let mut reader = PacketReader::new(data);
    reader.skip(HEADER_LEN)?;

    let indicator_count = reader.read_u8()?;
    for _ in 0..indicator_count {
        reader.skip(2)?;
        let indicators = reader.read_u8()? as usize;
        reader.skip(4 * indicators)?;
    }

    let event_count = reader.read_u8()?;
    let mut info = GameInfo::default();

    for _ in 0..event_count {
        let event_type = reader.read_u16_le()?;
        let event_size = reader.read_u8()? as usize;
        let payload_start = reader.offset;

        match event_type {
            SRS_ADDRESS_EVENT => {
                let payload = reader.bytes_at(payload_start, event_size)?;
                info.srs_address = Some(nul_terminated(payload));
            }
            CLIENT_DATA_EVENT => {
                // Structure fixe lue au début du payload, quelle que soit la taille annoncée
                let name = reader.bytes_at(payload_start + 8, PLAYER_NAME_LEN)?;
                info.pilot_name = Some(nul_terminated(name));
            }
            _ => {}
        }

        reader.skip(event_size)?;
    }

    Some(info)
}

/// Écoute des données émises par le jeu
pub struct GameListener {
    socket: UdpSocket,
}

impl GameListener {
    /// Ouvre le port d'écoute sur toutes les interfaces
    ///
    /// # Erreurs
    /// `CoreError::DiscoveryBind` si le port est déjà utilisé, typiquement
    /// par un autre client SRS.
    pub async fn bind(port: u16) -> CoreResult<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|e| CoreError::DiscoveryBind { port, reason: e.to_string() })?;
        tracing::info!(port, "En écoute des données IL-2");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> CoreResult<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Attend l'adresse du serveur SRS et le nom du pilote
    ///
    /// Bloque jusqu'à ce que les deux aient été vus, éventuellement dans des
    /// paquets différents. La première valeur vue pour chacun est conservée.
    pub async fn wait_for_game_data(&self) -> CoreResult<(String, String)> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut address: Option<String> = None;
        let mut pilot: Option<String> = None;

        loop {
            let (n, from) = self.socket.recv_from(&mut buffer).await?;
            let Some(info) = parse_game_packet(&buffer[..n]) else {
                tracing::trace!(%from, len = n, "Paquet ignoré");
                continue;
            };

            if address.is_none() {
                if let Some(found) = info.srs_address.filter(|a| !a.is_empty()) {
                    tracing::info!(address = %found, "Adresse du serveur SRS trouvée");
                    address = Some(found);
                }
            }
            if pilot.is_none() {
                if let Some(found) = info.pilot_name.filter(|p| !p.is_empty()) {
                    tracing::info!(pilot = %found, "Nom du pilote trouvé");
                    pilot = Some(found);
                }
            }

            if let (Some(address), Some(pilot)) = (&address, &pilot) {
                return Ok((address.clone(), pilot.clone()));
            }
        }
    }
}

/// Découpe `"hôte:port"` en ses deux parties
pub fn split_server_address(address: &str) -> CoreResult<(String, u16)> {
    network::utils::split_host_port(address)
        .map_err(|_| CoreError::InvalidServerAddress(address.to_string()))
}
