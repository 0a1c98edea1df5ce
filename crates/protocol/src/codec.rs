//! Wire framing: one JSON object per frame, UTF-8 text (§6.1).

use crate::{envelope::Envelope, error::CodecError};

/// Serialize an envelope to its wire frame.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse a wire frame into an envelope. This only checks JSON shape against
/// the envelope schema (including `deny_unknown_fields`); payload-shape and
/// semantic checks are [`crate::validate::validate`]'s job.
pub fn decode(frame: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Endpoint, MessageType};

    #[test]
    fn round_trips_a_tell_envelope() {
        let envelope = Envelope::new(
            MessageType::Tell,
            Endpoint::user("Alpha", "ann"),
            Endpoint::user("Beta", "bob"),
            serde_json::json!({"message": "hi"}),
        );
        let frame = encode(&envelope).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.from, envelope.from);
        assert_eq!(decoded.to, envelope.to);
        assert_eq!(decoded.payload, envelope.payload);
    }

    #[test]
    fn rejects_frame_with_unknown_top_level_field() {
        let raw = serde_json::json!({
            "version": "1.0",
            "id": "x",
            "timestamp": "2024-01-01T00:00:00Z",
            "type": "tell",
            "from": {"mud": "Alpha"},
            "to": {"mud": "Beta"},
            "payload": {"message": "hi"},
            "metadata": {"priority": 5, "ttl": 60, "encoding": "utf-8"},
            "bogus": true
        })
        .to_string();
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode("not json").is_err());
    }
}
