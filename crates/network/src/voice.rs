//! Enveloppe binaire des paquets voix
//!
//! Client → relais : `[séquence u64 LE][GUID UTF-8][0x00][payload Opus]`.
//! Relais → client : le datagramme entier est le payload, sans enveloppe.
//!
//! Les deux sens sont volontairement asymétriques : le relais n'attribue pas
//! l'audio mixé à un émetteur.

use crate::{NetworkError, NetworkResult};

/// Taille de l'entête de séquence
pub const SEQUENCE_LEN: usize = 8;

/// Paquet voix avec enveloppe complète, tel que le voit le relais
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoicePacket {
    pub sequence: u64,
    pub client_id: String,
    pub payload: Vec<u8>,
}

/// Codec de l'enveloppe voix
pub struct VoiceFrameCodec;

impl VoiceFrameCodec {
    /// Construit un datagramme sortant
    ///
    /// Pas de préfixe de longueur : le payload court jusqu'à la fin du datagramme.
    pub fn encode(sequence: u64, client_id: &str, payload: &[u8]) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(SEQUENCE_LEN + client_id.len() + 1 + payload.len());
        datagram.extend_from_slice(&sequence.to_le_bytes());
        datagram.extend_from_slice(client_id.as_bytes());
        datagram.push(0);
        datagram.extend_from_slice(payload);
        datagram
    }

    /// Décode un datagramme reçu du relais
    ///
    /// Le datagramme est retourné tel quel ; seul un datagramme vide est rejeté.
    pub fn decode(datagram: &[u8]) -> NetworkResult<&[u8]> {
        if datagram.is_empty() {
            return Err(NetworkError::malformed("datagramme vide"));
        }
        Ok(datagram)
    }

    /// Décode l'enveloppe complète d'un datagramme client
    ///
    /// C'est la lecture faite côté relais ; utilisée pour les outils de
    /// diagnostic et les serveurs de test.
    pub fn decode_envelope(datagram: &[u8]) -> NetworkResult<VoicePacket> {
        if datagram.len() < SEQUENCE_LEN + 1 {
            return Err(NetworkError::malformed(format!(
                "enveloppe trop courte ({} octets)",
                datagram.len()
            )));
        }

        let (seq_bytes, rest) = datagram.split_at(SEQUENCE_LEN);
        let mut seq = [0u8; SEQUENCE_LEN];
        seq.copy_from_slice(seq_bytes);

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| NetworkError::malformed("identifiant client non terminé"))?;

        let client_id = std::str::from_utf8(&rest[..nul])
            .map_err(|e| NetworkError::malformed(format!("identifiant client invalide: {}", e)))?
            .to_string();

        Ok(VoicePacket {
            sequence: u64::from_le_bytes(seq),
            client_id,
            payload: rest[nul + 1..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    #[test]
    fn test_encode_layout() {
        let datagram = VoiceFrameCodec::encode(1, GUID, &[0xAA, 0xBB]);

        assert_eq!(&datagram[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&datagram[8..8 + GUID.len()], GUID.as_bytes());
        assert_eq!(datagram[8 + GUID.len()], 0);
        assert_eq!(&datagram[9 + GUID.len()..], &[0xAA, 0xBB]);
        assert_eq!(datagram.len(), 8 + GUID.len() + 1 + 2);
    }

    #[test]
    fn test_sequence_is_little_endian() {
        let datagram = VoiceFrameCodec::encode(0x0102_0304_0506_0708, "a", &[]);
        assert_eq!(&datagram[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_envelope_recovers_payload() {
        let payload = vec![3u8, 0, 0, 7, 255];
        let datagram = VoiceFrameCodec::encode(42, GUID, &payload);

        let packet = VoiceFrameCodec::decode_envelope(&datagram).unwrap();
        assert_eq!(packet.sequence, 42);
        assert_eq!(packet.client_id, GUID);
        assert_eq!(packet.payload, payload);
    }

    #[test]
    fn test_inbound_decode_is_identity() {
        let datagram = [9u8, 8, 7, 0, 1];
        let payload = tokio_test::assert_ok!(VoiceFrameCodec::decode(&datagram));
        assert_eq!(payload, &datagram);
    }

    #[test]
    fn test_empty_datagram_is_malformed() {
        let result = VoiceFrameCodec::decode(&[]);
        assert!(matches!(result, Err(NetworkError::MalformedPacket { .. })));
    }

    #[test]
    fn test_envelope_without_terminator() {
        let mut datagram = 5u64.to_le_bytes().to_vec();
        datagram.extend_from_slice(b"abc");
        assert!(VoiceFrameCodec::decode_envelope(&datagram).is_err());
        assert!(VoiceFrameCodec::decode_envelope(&[1, 2, 3]).is_err());
    }
}
