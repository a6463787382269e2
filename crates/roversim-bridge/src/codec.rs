//! JSON wire codec and stream framing.
//!
//! The wire protocol is one JSON object per logical message, each carrying
//! a mandatory string field `type`. Frame-oriented transports (WebSocket)
//! deliver exactly one object per frame and decode directly; raw TCP
//! delivers an unframed byte stream, so [`JsonFramer`] reassembles object
//! boundaries by brace-depth counting before anything is decoded.
//!
//! Decode failures are values, never panics: the I/O task logs them and
//! drops the offending message, and nothing unwinds across the queue
//! boundary into the simulation tick.

use roversim_types::{Report, Request, SimError};
use serde_json::Value;

/// Serialize a report for the wire.
pub fn encode_report(report: &Report) -> Result<String, SimError> {
    serde_json::to_string(report).map_err(|e| SimError::MalformedMessage(e.to_string()))
}

/// Decode one complete JSON document into a [`Request`].
///
/// The document is parsed into a tree first and `type` is read with a
/// single field lookup, so a `"type"` substring appearing earlier inside
/// some payload string can never be mistaken for the discriminator.
///
/// # Errors
///
/// * [`SimError::MalformedMessage`] – invalid JSON, missing `type`, or a
///   payload that does not match its discriminator's shape.
/// * [`SimError::UnknownMessageType`] – well-formed JSON whose `type` tag
///   is not part of the protocol.
pub fn decode_request(text: &str) -> Result<Request, SimError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SimError::MalformedMessage(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SimError::MalformedMessage("missing \"type\" field".to_string()))?
        .to_owned();
    if !Request::is_known_type(&tag) {
        return Err(SimError::UnknownMessageType(tag));
    }
    serde_json::from_value(value).map_err(|e| SimError::MalformedMessage(format!("{tag}: {e}")))
}

/// Reassembles complete JSON objects out of an unframed byte stream.
///
/// Feed every chunk read from the socket to [`push`][Self::push]; it
/// returns the complete object spans found so far, in stream order, and
/// buffers any trailing partial object until the next chunk. Brace depth
/// is tracked with JSON string and escape awareness, so braces inside
/// string values do not confuse the framing. Bytes between objects (torn
/// frames, stray separators) are skipped.
#[derive(Debug, Default)]
pub struct JsonFramer {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `bytes` and return every complete object span they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.depth == 0 {
                if byte == b'{' {
                    self.buf.clear();
                    self.buf.push(byte);
                    self.depth = 1;
                }
                continue;
            }

            self.buf.push(byte);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        frames.push(String::from_utf8_lossy(&self.buf).into_owned());
                        self.buf.clear();
                    }
                }
                _ => {}
            }
        }
        frames
    }

    /// Number of bytes buffered for a not-yet-complete object.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roversim_types::LidarPoint;

    // ── codec ────────────────────────────────────────────────────────────

    #[test]
    fn decode_motor_power_request() {
        let request =
            decode_request(r#"{"type":"simMotorPowerRequest","motor":"arm_base","power":0.5}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::MotorPower {
                motor: "arm_base".to_string(),
                power: 0.5,
            }
        );
    }

    #[test]
    fn decode_rejects_unknown_type_by_name() {
        let err = decode_request(r#"{"type":"simWarpDriveRequest","factor":9}"#).unwrap_err();
        match err {
            SimError::UnknownMessageType(tag) => assert_eq!(tag, "simWarpDriveRequest"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = decode_request(r#"{"motor":"arm_base","power":0.5}"#).unwrap_err();
        assert!(matches!(err, SimError::MalformedMessage(_)));
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode_request("{nope").unwrap_err();
        assert!(matches!(err, SimError::MalformedMessage(_)));
    }

    #[test]
    fn decode_rejects_wrong_payload_shape_for_known_type() {
        // Known discriminator, missing required field.
        let err = decode_request(r#"{"type":"simMotorPowerRequest","motor":"arm_base"}"#)
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedMessage(_)));
    }

    #[test]
    fn type_inside_a_payload_string_is_not_the_discriminator() {
        // The substring "type" appears in the note before the real field.
        let request = decode_request(
            r#"{"note":"set \"type\": to drive","type":"emergencyStop","stop":true}"#,
        );
        // Unknown extra fields are tolerated; the real discriminator wins.
        assert_eq!(request.unwrap(), Request::EmergencyStop { stop: true });
    }

    #[test]
    fn encode_decode_roundtrip_through_text() {
        let report = Report::Lidar {
            points: vec![LidarPoint { r: 1.0, theta: 0.5 }],
        };
        let text = encode_report(&report).unwrap();
        let back: Report = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
    }

    // ── framer ───────────────────────────────────────────────────────────

    #[test]
    fn framer_passes_through_a_whole_object() {
        let mut framer = JsonFramer::new();
        let frames = framer.push(br#"{"type":"emergencyStop","stop":true}"#);
        assert_eq!(frames, vec![r#"{"type":"emergencyStop","stop":true}"#]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn framer_reassembles_a_split_object() {
        let mut framer = JsonFramer::new();
        assert!(framer.push(br#"{"type":"simMotorPowerRequest","#).is_empty());
        assert!(framer.push(br#""motor":"arm_base","#).is_empty());
        let frames = framer.push(br#""power":0.5}"#);
        assert_eq!(frames.len(), 1);
        assert!(decode_request(&frames[0]).is_ok());
    }

    #[test]
    fn framer_splits_two_objects_in_one_chunk() {
        let mut framer = JsonFramer::new();
        let frames = framer.push(br#"{"type":"emergencyStop","stop":true}{"type":"drive","straight":1.0,"steer":0.0}"#);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("emergencyStop"));
        assert!(frames[1].contains("drive"));
    }

    #[test]
    fn framer_ignores_braces_inside_strings() {
        let mut framer = JsonFramer::new();
        let frames = framer.push(br#"{"motor":"weird{name}","power":1}"#);
        assert_eq!(frames, vec![r#"{"motor":"weird{name}","power":1}"#]);
    }

    #[test]
    fn framer_handles_escaped_quotes_in_strings() {
        let mut framer = JsonFramer::new();
        let frames = framer.push(br#"{"note":"she said \"{\" loudly"}"#);
        assert_eq!(frames.len(), 1);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn framer_skips_garbage_between_objects() {
        let mut framer = JsonFramer::new();
        let frames = framer.push(b"}}garbage\n{\"type\":\"emergencyStop\",\"stop\":false}junk");
        assert_eq!(frames.len(), 1);
        assert!(decode_request(&frames[0]).is_ok());
    }

    #[test]
    fn framer_recovers_after_a_malformed_object() {
        let mut framer = JsonFramer::new();
        // Balanced but not valid JSON: frames, then fails decode, then the
        // next well-formed object still comes through cleanly.
        let frames = framer.push(br#"{broken}{"type":"emergencyStop","stop":true}"#);
        assert_eq!(frames.len(), 2);
        assert!(decode_request(&frames[0]).is_err());
        assert_eq!(
            decode_request(&frames[1]).unwrap(),
            Request::EmergencyStop { stop: true }
        );
    }

    #[test]
    fn framer_never_emits_from_arbitrary_junk() {
        let mut framer = JsonFramer::new();
        for chunk in [&b"\x00\xffnot json at all"[..], b"]]][[", b"\"{{{\""] {
            for frame in framer.push(chunk) {
                // Anything emitted must at least be brace-balanced.
                assert!(frame.starts_with('{') && frame.ends_with('}'));
            }
        }
    }

    #[test]
    fn framer_buffers_partial_input_across_many_small_chunks() {
        let text = br#"{"type":"simCameraStreamOpenRequest","camera":"front","fps":10.0,"width":320,"height":240}"#;
        let mut framer = JsonFramer::new();
        let mut frames = Vec::new();
        for byte in text.iter() {
            frames.extend(framer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert!(decode_request(&frames[0]).is_ok());
    }
}
