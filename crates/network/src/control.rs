//! Messages de contrôle JSON du canal TCP
//!
//! Un objet JSON par ligne, terminé par `\n`. Forme sortante :
//!
//! ```text
//! {"MsgType":"SYNC","ServerType":"IL2-SRS","Version":"1.0.0.0",
//!  "Client":{"ClientGuid":"...","Name":"...","Coalition":0,"Seat":0}}
//! ```
//!
//! Chaque type de message porte uniquement ses propres champs : seul
//! `RADIO_UPDATE` ajoute `Client.GameState`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NetworkError, NetworkResult};

/// Famille de serveur annoncée au relais
pub const SERVER_TYPE: &str = "IL2-SRS";

/// Version annoncée au relais
pub const CLIENT_VERSION: &str = "1.0.0.0";

/// Types de messages connus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Sync,
    Update,
    RadioUpdate,
    Ping,
}

impl MessageKind {
    /// Valeur du champ `MsgType`
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Sync => "SYNC",
            MessageKind::Update => "UPDATE",
            MessageKind::RadioUpdate => "RADIO_UPDATE",
            MessageKind::Ping => "PING",
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "SYNC" => Some(MessageKind::Sync),
            "UPDATE" => Some(MessageKind::Update),
            "RADIO_UPDATE" => Some(MessageKind::RadioUpdate),
            "PING" => Some(MessageKind::Ping),
            _ => None,
        }
    }
}

/// Identité du client dans les messages de contrôle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "ClientGuid")]
    pub client_guid: String,

    #[serde(rename = "Name")]
    pub name: String,

    /// 0 = spectateur, 1 = alliés, 2 = axe
    #[serde(rename = "Coalition", default)]
    pub coalition: i32,

    #[serde(rename = "Seat", default)]
    pub seat: i32,
}

impl ClientInfo {
    /// Identité d'un client spectateur (coalition 0, siège 0)
    pub fn new(client_guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_guid: client_guid.into(),
            name: name.into(),
            coalition: 0,
            seat: 0,
        }
    }
}

/// Une radio dans `GameState.radios`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadioInfo {
    pub channel: i32,
    #[serde(default)]
    pub freq: i64,
    #[serde(rename = "secFreq", default)]
    pub sec_freq: i64,
    #[serde(default)]
    pub retransmit: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub modulation: i32,
    #[serde(default)]
    pub name: String,
}

fn default_volume() -> f32 {
    1.0
}

impl RadioInfo {
    /// Radio numérotée à partir de 1 réglée sur un canal
    pub fn on_channel(number: u8, channel: i32) -> Self {
        Self {
            channel,
            freq: 0,
            sec_freq: 0,
            retransmit: false,
            volume: 1.0,
            modulation: 0,
            name: format!("Radio {}", number),
        }
    }
}

/// État des radios envoyé avec `RADIO_UPDATE`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub radios: Vec<RadioInfo>,
    #[serde(default)]
    pub control: i32,
    #[serde(default)]
    pub onboard: bool,
    #[serde(default)]
    pub ptt: bool,
}

impl GameState {
    /// État des deux radios du client
    pub fn with_channels(radio1_channel: i32, radio2_channel: i32) -> Self {
        Self {
            radios: vec![
                RadioInfo::on_channel(1, radio1_channel),
                RadioInfo::on_channel(2, radio2_channel),
            ],
            control: 0,
            onboard: false,
            ptt: false,
        }
    }
}

/// Message de contrôle, un variant par `MsgType`
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    Sync(ClientInfo),
    Update(ClientInfo),
    RadioUpdate { client: ClientInfo, game_state: GameState },
    Ping(ClientInfo),
    /// Message du relais dont la forme n'est pas celle d'un message client
    Other { msg_type: String, body: Value },
}

/// Forme sur le fil
#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "MsgType")]
    msg_type: String,
    #[serde(rename = "ServerType", default)]
    server_type: String,
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "Client")]
    client: WireClient,
}

#[derive(Serialize, Deserialize)]
struct WireClient {
    #[serde(flatten)]
    info: ClientInfo,
    #[serde(rename = "GameState", default, skip_serializing_if = "Option::is_none")]
    game_state: Option<GameState>,
}

impl ControlMessage {
    /// Construit un `RADIO_UPDATE` pour les deux radios
    pub fn radio_update(client: ClientInfo, radio1_channel: i32, radio2_channel: i32) -> Self {
        ControlMessage::RadioUpdate {
            client,
            game_state: GameState::with_channels(radio1_channel, radio2_channel),
        }
    }

    /// Type du message tel qu'il apparaît sur le fil
    pub fn msg_type(&self) -> &str {
        match self {
            ControlMessage::Sync(_) => MessageKind::Sync.as_str(),
            ControlMessage::Update(_) => MessageKind::Update.as_str(),
            ControlMessage::RadioUpdate { .. } => MessageKind::RadioUpdate.as_str(),
            ControlMessage::Ping(_) => MessageKind::Ping.as_str(),
            ControlMessage::Other { msg_type, .. } => msg_type,
        }
    }

    /// Encode le message en une ligne JSON terminée par `\n`
    ///
    /// `PING` ne produit aucun octet : le relais se contente du trafic
    /// normal pour sa fenêtre de vivacité.
    pub fn encode(&self) -> NetworkResult<Option<Vec<u8>>> {
        let (info, game_state) = match self {
            ControlMessage::Ping(_) => return Ok(None),
            ControlMessage::Sync(info) | ControlMessage::Update(info) => (info, None),
            ControlMessage::RadioUpdate { client, game_state } => (client, Some(game_state)),
            ControlMessage::Other { body, .. } => {
                let mut line = serde_json::to_vec(body)?;
                line.push(b'\n');
                return Ok(Some(line));
            }
        };

        let wire = WireMessage {
            msg_type: self.msg_type().to_string(),
            server_type: SERVER_TYPE.to_string(),
            version: CLIENT_VERSION.to_string(),
            client: WireClient {
                info: info.clone(),
                game_state: game_state.cloned(),
            },
        };

        let mut line = serde_json::to_vec(&wire)?;
        line.push(b'\n');
        Ok(Some(line))
    }

    /// Décode une ligne (sans son `\n`)
    ///
    /// Une ligne tronquée, non UTF-8 ou qui n'est pas un objet JSON avec un
    /// `MsgType` produit `NetworkError::ControlDecode`.
    pub fn decode(line: &[u8]) -> NetworkResult<Self> {
        let text = std::str::from_utf8(line)
            .map_err(|e| NetworkError::ControlDecode(format!("UTF-8 invalide: {}", e)))?;
        let body: Value = serde_json::from_str(text.trim_end_matches('\r'))
            .map_err(|e| NetworkError::ControlDecode(e.to_string()))?;

        let msg_type = match body.get("MsgType") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(NetworkError::ControlDecode("champ MsgType absent".to_string()));
            }
        };

        let Some(kind) = MessageKind::from_wire(&msg_type) else {
            return Ok(ControlMessage::Other { msg_type, body });
        };

        // Les réponses du relais n'ont pas toujours la forme d'un message client
        let Ok(wire) = serde_json::from_value::<WireMessage>(body.clone()) else {
            return Ok(ControlMessage::Other { msg_type, body });
        };

        let info = wire.client.info;
        Ok(match (kind, wire.client.game_state) {
            (MessageKind::Sync, _) => ControlMessage::Sync(info),
            (MessageKind::Update, _) => ControlMessage::Update(info),
            (MessageKind::Ping, _) => ControlMessage::Ping(info),
            (MessageKind::RadioUpdate, Some(game_state)) => {
                ControlMessage::RadioUpdate { client: info, game_state }
            }
            (MessageKind::RadioUpdate, None) => ControlMessage::Other { msg_type, body },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo::new("0f8fad5b-d9cb-469f-a165-70867728950e", "LinuxPilot")
    }

    fn encode_value(message: &ControlMessage) -> Value {
        let line = message.encode().unwrap().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        serde_json::from_slice(&line[..line.len() - 1]).unwrap()
    }

    #[test]
    fn test_sync_shape() {
        let value = encode_value(&ControlMessage::Sync(client()));

        assert_eq!(value["MsgType"], "SYNC");
        assert_eq!(value["ServerType"], "IL2-SRS");
        assert_eq!(value["Version"], "1.0.0.0");
        assert_eq!(value["Client"]["ClientGuid"], "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(value["Client"]["Name"], "LinuxPilot");
        assert_eq!(value["Client"]["Coalition"], 0);
        assert_eq!(value["Client"]["Seat"], 0);
        assert!(value["Client"].get("GameState").is_none());
    }

    #[test]
    fn test_radio_update_shape() {
        let value = encode_value(&ControlMessage::radio_update(client(), 1, 2));

        assert_eq!(value["MsgType"], "RADIO_UPDATE");
        let radios = value["Client"]["GameState"]["radios"].as_array().unwrap();
        assert_eq!(radios.len(), 2);
        assert_eq!(radios[0]["channel"], 1);
        assert_eq!(radios[0]["name"], "Radio 1");
        assert_eq!(radios[0]["secFreq"], 0);
        assert_eq!(radios[0]["volume"], 1.0);
        assert_eq!(radios[1]["channel"], 2);
        assert_eq!(radios[1]["name"], "Radio 2");
        assert_eq!(value["Client"]["GameState"]["onboard"], false);
    }

    #[test]
    fn test_ping_sends_nothing() {
        assert!(ControlMessage::Ping(client()).encode().unwrap().is_none());
    }

    #[test]
    fn test_decode_client_message() {
        let line = ControlMessage::radio_update(client(), 3, 4).encode().unwrap().unwrap();
        let decoded = ControlMessage::decode(&line[..line.len() - 1]).unwrap();

        match decoded {
            ControlMessage::RadioUpdate { client: info, game_state } => {
                assert_eq!(info, client());
                assert_eq!(game_state.radios[1].channel, 4);
            }
            other => panic!("Message inattendu: {:?}", other),
        }
    }

    #[test]
    fn test_decode_server_reply_without_client() {
        let decoded = ControlMessage::decode(br#"{"MsgType":"SYNC","Clients":[]}"#).unwrap();
        assert!(matches!(decoded, ControlMessage::Other { ref msg_type, .. } if msg_type == "SYNC"));

        let decoded = ControlMessage::decode(br#"{"MsgType":7,"Version":"2"}"#).unwrap();
        assert_eq!(decoded.msg_type(), "7");
    }

    #[test]
    fn test_decode_errors() {
        // Ligne tronquée
        let result = ControlMessage::decode(br#"{"MsgType":"SYNC","Cli"#);
        assert!(matches!(result, Err(NetworkError::ControlDecode(_))));

        // UTF-8 invalide
        let result = ControlMessage::decode(&[b'{', 0xFF, 0xFE, b'}']);
        assert!(matches!(result, Err(NetworkError::ControlDecode(_))));

        // JSON valide sans MsgType
        let result = ControlMessage::decode(br#"{"Client":{}}"#);
        assert!(matches!(result, Err(NetworkError::ControlDecode(_))));

        assert!(ControlMessage::decode(b"").is_err());
    }
}
