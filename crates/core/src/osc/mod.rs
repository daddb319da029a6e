//! OSC packet decoding and encoding on top of `rosc`.
//!
//! Only the argument kinds a VMC receiver cares about are surfaced: string
//! arguments are collected into [`OscMessage::strings`] and float/double
//! arguments into [`OscMessage::floats`]. Other argument types are dropped.

use rosc::{OscBundle, OscPacket, OscTime, OscType};

const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// Bundle header: the tag followed by an 8-byte timetag.
const BUNDLE_HEADER_LEN: usize = 16;

/// Deepest bundle nesting accepted from the wire. `rosc` decodes bundles
/// recursively, so deeper packets are rejected before they reach it.
pub const MAX_BUNDLE_DEPTH: usize = 8;

/// A decoded OSC message, reduced to its address and the string and float
/// arguments in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub strings: Vec<String>,
    pub floats: Vec<f64>,
}

impl OscMessage {
    /// Creates a message with no arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Appends a string argument.
    pub fn with_string(mut self, value: impl Into<String>) -> Self {
        self.strings.push(value.into());
        self
    }

    /// Appends float arguments in order.
    pub fn with_floats(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.floats.extend(values);
        self
    }
}

/// Failure to turn bytes into messages or messages into bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OscCodecError {
    /// `rosc` rejected the datagram.
    #[error("malformed OSC packet: {0}")]
    Decode(String),
    #[error("failed to encode OSC packet: {0}")]
    Encode(String),
    /// Bundles are nested deeper than [`MAX_BUNDLE_DEPTH`].
    #[error("bundles nested deeper than {0} levels")]
    BundleTooDeep(usize),
}

/// Decodes a datagram into its messages. Bundles are flattened depth-first in
/// element order.
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<OscMessage>, OscCodecError> {
    check_bundle_depth(bytes)?;

    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| OscCodecError::Decode(format!("{e:?}")))?;

    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => {
            let mut decoded = OscMessage::new(message.addr);
            for arg in message.args {
                match arg {
                    OscType::String(value) => decoded.strings.push(value),
                    OscType::Float(value) => decoded.floats.push(f64::from(value)),
                    OscType::Double(value) => decoded.floats.push(value),
                    _ => {}
                }
            }
            out.push(decoded);
        }
        OscPacket::Bundle(bundle) => {
            for element in bundle.content {
                flatten(element, out);
            }
        }
    }
}

/// Walks bundle headers without recursion and rejects excessive nesting.
/// Structural errors are left for the decoder to report.
fn check_bundle_depth(bytes: &[u8]) -> Result<(), OscCodecError> {
    let mut pending = vec![(bytes, 1usize)];

    while let Some((packet, depth)) = pending.pop() {
        if !packet.starts_with(BUNDLE_TAG) {
            continue;
        }
        if depth > MAX_BUNDLE_DEPTH {
            return Err(OscCodecError::BundleTooDeep(MAX_BUNDLE_DEPTH));
        }

        let mut rest = packet.get(BUNDLE_HEADER_LEN..).unwrap_or_default();
        while let Some(size) = rest.get(..4) {
            let size = u32::from_be_bytes([size[0], size[1], size[2], size[3]]) as usize;
            let Some(end) = size.checked_add(4).filter(|end| *end <= rest.len()) else {
                break;
            };
            pending.push((&rest[4..end], depth + 1));
            rest = &rest[end..];
        }
    }

    Ok(())
}

fn to_rosc(message: &OscMessage) -> OscPacket {
    let args = message
        .strings
        .iter()
        .cloned()
        .map(OscType::String)
        .chain(message.floats.iter().map(|value| OscType::Float(*value as f32)))
        .collect();
    OscPacket::Message(rosc::OscMessage {
        addr: message.address.clone(),
        args,
    })
}

fn encode(packet: &OscPacket) -> Result<Vec<u8>, OscCodecError> {
    rosc::encoder::encode(packet).map_err(|e| OscCodecError::Encode(format!("{e:?}")))
}

/// Encodes a message with its string arguments followed by its float
/// arguments (as `f`), the layout VMC senders use.
pub fn encode_message(message: &OscMessage) -> Result<Vec<u8>, OscCodecError> {
    encode(&to_rosc(message))
}

/// Wraps messages into a single bundle with an immediate timetag.
pub fn encode_bundle(messages: &[OscMessage]) -> Result<Vec<u8>, OscCodecError> {
    encode(&OscPacket::Bundle(OscBundle {
        timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
        content: messages.iter().map(to_rosc).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone_message() -> OscMessage {
        OscMessage::new("/VMC/Ext/Bone/Pos")
            .with_string("Hips")
            .with_floats([1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Wraps an encoded packet in a bundle header, `levels` times.
    fn nest(mut packet: Vec<u8>, levels: usize) -> Vec<u8> {
        for _ in 0..levels {
            let mut outer = Vec::from(BUNDLE_TAG);
            outer.extend_from_slice(&[0; 8]);
            outer.extend_from_slice(&(packet.len() as u32).to_be_bytes());
            outer.extend_from_slice(&packet);
            packet = outer;
        }
        packet
    }

    #[test]
    fn decodes_encoded_bone_message() {
        let bytes = encode_message(&bone_message()).unwrap();
        assert_eq!(decode_packet(&bytes).unwrap(), vec![bone_message()]);
    }

    #[test]
    fn flattens_bundles_in_order() {
        let messages = vec![
            bone_message(),
            OscMessage::new("/VMC/Ext/Blend/Val")
                .with_string("Blink")
                .with_floats([0.5]),
            OscMessage::new("/VMC/Ext/OK"),
        ];
        let decoded = decode_packet(&encode_bundle(&messages).unwrap()).unwrap();
        assert_eq!(decoded, messages);
    }

    #[test]
    fn collects_doubles_and_drops_other_arguments() {
        let packet = OscPacket::Message(rosc::OscMessage {
            addr: "/VMC/Ext/Blend/Val".into(),
            args: vec![
                OscType::Int(7),
                OscType::String("Joy".into()),
                OscType::Double(0.25),
                OscType::Bool(true),
                OscType::Blob(vec![1, 2, 3]),
            ],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();

        let decoded = decode_packet(&bytes).unwrap();
        assert_eq!(decoded[0].strings, vec!["Joy".to_string()]);
        assert_eq!(decoded[0].floats, vec![0.25]);
    }

    #[test]
    fn accepts_nesting_up_to_the_limit() {
        let inner = encode_message(&OscMessage::new("/VMC/Ext/T").with_floats([1.5])).unwrap();
        let decoded = decode_packet(&nest(inner, MAX_BUNDLE_DEPTH)).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].floats, vec![1.5]);
    }

    #[test]
    fn rejects_nesting_past_the_limit() {
        let inner = encode_message(&OscMessage::new("/VMC/Ext/T")).unwrap();
        assert_eq!(
            decode_packet(&nest(inner, MAX_BUNDLE_DEPTH + 1)),
            Err(OscCodecError::BundleTooDeep(MAX_BUNDLE_DEPTH))
        );
    }

    #[test]
    fn deeply_nested_datagram_is_rejected_without_recursing() {
        let inner = encode_message(&OscMessage::new("/VMC/Ext/OK")).unwrap();
        let packet = nest(inner, 3_500);
        // Run on a small stack: a recursive walk of this packet would overflow.
        let result = std::thread::Builder::new()
            .stack_size(64 * 1024)
            .spawn(move || decode_packet(&packet))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(result, Err(OscCodecError::BundleTooDeep(MAX_BUNDLE_DEPTH)));
    }

    #[test]
    fn rejects_bundle_with_oversized_element() {
        let mut bytes = Vec::from(BUNDLE_TAG);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(decode_packet(&bytes), Err(OscCodecError::Decode(_))));
    }

    #[test]
    fn rejects_truncated_arguments() {
        let mut bytes = encode_message(&bone_message()).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(decode_packet(&bytes), Err(OscCodecError::Decode(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_packet(b"not osc").is_err());
        assert!(decode_packet(&[]).is_err());
        assert!(decode_packet(b"#bundle\0").is_err());
    }
}
