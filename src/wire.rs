//! Message framing and the `Request`/`Response` wire types.
//!
//! A message on the wire is `[len: u32 LE][payload: len bytes]`, where
//! `len <= MAX_MESSAGE_LEN`. The payload is `[cmd: u8][variant body]`; an
//! unrecognized command byte decodes to [`Request::Unknown`], whose content
//! is the entire payload (the unrecognized byte included).

use crate::codec::{self, command_tag, CodecError, Object};

/// Maximum payload length (not counting the 4-byte header), in bytes.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Size of the frame header, in bytes.
pub const HEADER_LEN: usize = 4;

/// Errors that can occur while framing or decoding a message.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The declared payload length exceeds [`MAX_MESSAGE_LEN`].
    #[error("declared message length {0} exceeds the {1}-byte limit")]
    MessageTooLong(u32, usize),
    /// The buffer doesn't yet contain a complete header or payload.
    #[error("incomplete frame")]
    Incomplete,
}

/// Reads a frame header, returning the declared payload length.
///
/// Returns `Ok(None)` if fewer than [`HEADER_LEN`] bytes are available yet
/// (the caller should wait for more data), or `Err` if the declared length
/// is too large to ever be satisfied.
pub fn read_frame_header(buf: &[u8]) -> Result<Option<u32>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let (len, _) = codec::decode_u32(buf).map_err(|_| FrameError::Incomplete)?;
    if len as usize > MAX_MESSAGE_LEN {
        return Err(FrameError::MessageTooLong(len, MAX_MESSAGE_LEN));
    }
    Ok(Some(len))
}

/// Writes a frame header for a payload of the given length.
pub fn write_frame_header(buf: &mut [u8], payload_len: u32) -> codec::Result<usize> {
    codec::encode_u32(buf, payload_len)
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get { key: Vec<u8> },
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    List,
    /// An unrecognized command; `raw` is the entire payload, including the
    /// unrecognized command byte.
    Unknown { raw: Vec<u8> },
}

/// A response to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `value` is `None` when the key was absent; absence is encoded on the
    /// wire by omitting the value field entirely (see spec Design Notes).
    Get { key: Vec<u8>, value: Option<Vec<u8>> },
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    List { entries: Vec<(Vec<u8>, Vec<u8>)> },
    Unknown { raw: Vec<u8> },
}

/// Decodes a [`Request`] from a payload (the bytes after the frame header).
///
/// If the command byte doesn't match a known command, returns
/// `Request::Unknown` over the whole payload rather than an error -- malformed
/// commands are a normal, well-formed outcome at this layer.
pub fn decode_request(payload: &[u8]) -> Request {
    match codec::decode_command_tag(payload) {
        Err(_) => Request::Unknown { raw: payload.to_vec() },
        Ok((tag, n)) => {
            let body = &payload[n..];
            match decode_request_body(tag, body) {
                Some(req) => req,
                None => Request::Unknown { raw: payload.to_vec() },
            }
        }
    }
}

fn decode_request_body(tag: u8, body: &[u8]) -> Option<Request> {
    match tag {
        command_tag::GET => {
            let (key, _) = codec::decode_string(body).ok()?;
            Some(Request::Get { key: key.to_vec() })
        }
        command_tag::SET => {
            let (key, n) = codec::decode_string(body).ok()?;
            let (value, _) = codec::decode_string(&body[n..]).ok()?;
            Some(Request::Set { key: key.to_vec(), value: value.to_vec() })
        }
        command_tag::DELETE => {
            let (key, _) = codec::decode_string(body).ok()?;
            Some(Request::Delete { key: key.to_vec() })
        }
        command_tag::LIST => Some(Request::List),
        _ => None,
    }
}

/// Encodes a [`Request`] into `buf`, returning the number of bytes written.
pub fn encode_request(buf: &mut [u8], req: &Request) -> codec::Result<usize> {
    match req {
        Request::Get { key } => {
            let mut n = codec::encode_command_tag(buf, command_tag::GET)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            Ok(n)
        }
        Request::Set { key, value } => {
            let mut n = codec::encode_command_tag(buf, command_tag::SET)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            n += codec::encode_string(&mut buf[n..], value)?;
            Ok(n)
        }
        Request::Delete { key } => {
            let mut n = codec::encode_command_tag(buf, command_tag::DELETE)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            Ok(n)
        }
        Request::List => codec::encode_command_tag(buf, command_tag::LIST),
        Request::Unknown { raw } => {
            if buf.len() < raw.len() {
                return Err(CodecError::BufferTooSmall);
            }
            buf[..raw.len()].copy_from_slice(raw);
            Ok(raw.len())
        }
    }
}

/// Decodes a [`Response`] from a payload. Mirrors [`decode_request`]'s
/// permissive fallback: a command byte outside `1..=4` doesn't fail, it
/// yields `Response::Unknown` over the *whole* payload -- this is how a
/// server's echoed-back `Unknown` response is told apart from a malformed
/// one of the four known responses, and it keeps encode/decode symmetric
/// (see [`encode_response`]'s `Unknown` arm, which writes no tag byte of its
/// own either).
pub fn decode_response(payload: &[u8]) -> codec::Result<Response> {
    let (tag, n) = match codec::decode_command_tag(payload) {
        Ok(v) => v,
        Err(_) => return Ok(Response::Unknown { raw: payload.to_vec() }),
    };
    let body = &payload[n..];
    match tag {
        command_tag::GET => {
            let (key, n) = codec::decode_string(body)?;
            let value = codec::decode_string(&body[n..]).ok().map(|(v, _)| v.to_vec());
            Ok(Response::Get { key: key.to_vec(), value })
        }
        command_tag::SET => {
            let (key, n) = codec::decode_string(body)?;
            let (value, _) = codec::decode_string(&body[n..])?;
            Ok(Response::Set { key: key.to_vec(), value: value.to_vec() })
        }
        command_tag::DELETE => {
            let (key, _) = codec::decode_string(body)?;
            Ok(Response::Delete { key: key.to_vec() })
        }
        command_tag::LIST => {
            let mut entries = Vec::new();
            let mut off = 0;
            while off < body.len() {
                let (key, k) = codec::decode_string(&body[off..])?;
                off += k;
                let (value, k) = codec::decode_string(&body[off..])?;
                off += k;
                entries.push((key.to_vec(), value.to_vec()));
            }
            Ok(Response::List { entries })
        }
        _ => unreachable!("decode_command_tag only ever returns GET/SET/DELETE/LIST"),
    }
}

/// Encodes a [`Response`] into `buf`, returning the number of bytes written.
pub fn encode_response(buf: &mut [u8], resp: &Response) -> codec::Result<usize> {
    match resp {
        Response::Get { key, value } => {
            let mut n = codec::encode_command_tag(buf, command_tag::GET)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            if let Some(value) = value {
                n += codec::encode_string(&mut buf[n..], value)?;
            }
            Ok(n)
        }
        Response::Set { key, value } => {
            let mut n = codec::encode_command_tag(buf, command_tag::SET)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            n += codec::encode_string(&mut buf[n..], value)?;
            Ok(n)
        }
        Response::Delete { key } => {
            let mut n = codec::encode_command_tag(buf, command_tag::DELETE)?;
            n += codec::encode_string(&mut buf[n..], key)?;
            Ok(n)
        }
        Response::List { entries } => {
            let mut n = codec::encode_command_tag(buf, command_tag::LIST)?;
            for (key, value) in entries {
                n += codec::encode_string(&mut buf[n..], key)?;
                n += codec::encode_string(&mut buf[n..], value)?;
            }
            Ok(n)
        }
        Response::Unknown { raw } => {
            // `raw` is already the entire original payload (the unrecognized
            // command byte included, per `decode_request`), so it's written
            // back verbatim with no tag byte of its own -- same as
            // `encode_request`'s `Unknown` arm above.
            if buf.len() < raw.len() {
                return Err(CodecError::BufferTooSmall);
            }
            buf[..raw.len()].copy_from_slice(raw);
            Ok(raw.len())
        }
    }
}

/// Converts a borrowed [`Object`] to the equivalent request/response string
/// payload, for callers building values from decoded [`Object`]s rather than
/// raw slices. Not used by the core command path (Get/Set/Delete/List have
/// fixed string-typed fields) but kept for completeness of the Object model
/// described in the data model.
pub fn object_as_string<'a>(obj: &'a Object<'a>) -> Option<&'a [u8]> {
    match obj {
        Object::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frame_header_roundtrip() {
        let mut buf = [0u8; 4];
        write_frame_header(&mut buf, 42).unwrap();
        assert_eq!(read_frame_header(&buf), Ok(Some(42)));
    }

    #[test]
    fn frame_header_incomplete() {
        let buf = [0u8; 2];
        assert_eq!(read_frame_header(&buf), Ok(None));
    }

    #[test]
    fn frame_header_too_long() {
        let mut buf = [0u8; 4];
        write_frame_header(&mut buf, (MAX_MESSAGE_LEN + 1) as u32).unwrap();
        assert_matches::assert_matches!(read_frame_header(&buf), Err(FrameError::MessageTooLong(_, _)));
    }

    #[test]
    fn request_get_roundtrip() {
        let req = Request::Get { key: b"a_key".to_vec() };
        let mut buf = [0u8; 64];
        let n = encode_request(&mut buf, &req).unwrap();
        assert_eq!(decode_request(&buf[..n]), req);
    }

    #[test]
    fn request_set_roundtrip() {
        let req = Request::Set { key: b"a".to_vec(), value: b"1".to_vec() };
        let mut buf = [0u8; 64];
        let n = encode_request(&mut buf, &req).unwrap();
        assert_eq!(decode_request(&buf[..n]), req);
    }

    #[test]
    fn request_list_roundtrip() {
        let req = Request::List;
        let mut buf = [0u8; 8];
        let n = encode_request(&mut buf, &req).unwrap();
        assert_eq!(n, 1);
        assert_eq!(decode_request(&buf[..n]), req);
    }

    #[test]
    fn unknown_command_byte_echoes_whole_payload() {
        let payload = [0xFFu8, 0x01, 0x02, 0x03];
        assert_eq!(decode_request(&payload), Request::Unknown { raw: payload.to_vec() });
    }

    #[test]
    fn response_get_absent_value_omits_field() {
        let resp = Response::Get { key: b"a".to_vec(), value: None };
        let mut buf = [0u8; 64];
        let n = encode_response(&mut buf, &resp).unwrap();
        assert_eq!(decode_response(&buf[..n]).unwrap(), resp);
    }

    #[test]
    fn response_list_empty() {
        let resp = Response::List { entries: vec![] };
        let mut buf = [0u8; 8];
        let n = encode_response(&mut buf, &resp).unwrap();
        assert_eq!(n, 1);
        assert_eq!(decode_response(&buf[..n]).unwrap(), resp);
    }

    #[test]
    fn scenario_s1_get_absent_key() {
        // GET of an absent key "a_key".
        let payload = [0x01u8, 0x05, 0x00, b'a', b'_', b'k', b'e', b'y'];
        assert_eq!(
            decode_request(&payload),
            Request::Get { key: b"a_key".to_vec() }
        );
    }

    #[test]
    fn scenario_s2_set_a_1() {
        let payload = [0x02u8, 0x01, 0x00, b'a', 0x01, 0x00, b'1'];
        assert_eq!(
            decode_request(&payload),
            Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }
        );

        let resp = Response::Set { key: b"a".to_vec(), value: b"1".to_vec() };
        let mut buf = [0u8; 16];
        let n = encode_response(&mut buf, &resp).unwrap();
        assert_eq!(&buf[..n], &payload[..]);
    }

    #[test]
    fn scenario_s7_unknown_echo() {
        let payload = [0xFFu8, 0x01, 0x02, 0x03];
        let req = decode_request(&payload);
        let raw = match req {
            Request::Unknown { raw } => raw,
            _ => panic!("expected Unknown"),
        };
        let resp = Response::Unknown { raw };
        let mut buf = [0u8; 16];
        let n = encode_response(&mut buf, &resp).unwrap();
        assert_eq!(&buf[..n], &payload[..]);
    }

    #[test]
    fn unknown_response_roundtrip_adds_no_tag_byte() {
        let resp = Response::Unknown { raw: vec![0xFF, 1, 2, 3] };
        let mut buf = [0u8; 16];
        let n = encode_response(&mut buf, &resp).unwrap();
        assert_eq!(n, 4, "Unknown must be written back verbatim, with no extra tag byte");
        assert_eq!(decode_response(&buf[..n]).unwrap(), resp);
    }

    #[test]
    fn decode_response_falls_back_to_unknown_for_any_unrecognized_tag() {
        let payload = [0x2Au8, 1, 2, 3];
        assert_eq!(decode_response(&payload).unwrap(), Response::Unknown { raw: payload.to_vec() });
    }

    #[test]
    fn request_response_roundtrip_random_keys_and_values() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xC0FF_EE00_1234_5678 ^ 1);
        let mut buf = [0u8; MAX_MESSAGE_LEN];

        for _ in 0..2_000 {
            let key: Vec<u8> = (0..rng.random_range(1..32)).map(|_| rng.random()).collect();
            let value: Vec<u8> = (0..rng.random_range(0..64)).map(|_| rng.random()).collect();

            let req = match rng.random_range(0..4) {
                0 => Request::Get { key: key.clone() },
                1 => Request::Set { key: key.clone(), value: value.clone() },
                2 => Request::Delete { key: key.clone() },
                _ => Request::List,
            };
            let n = encode_request(&mut buf, &req).unwrap();
            assert_eq!(decode_request(&buf[..n]), req);

            let resp = match rng.random_range(0..4) {
                0 => Response::Get { key: key.clone(), value: Some(value.clone()) },
                1 => Response::Set { key: key.clone(), value: value.clone() },
                2 => Response::Delete { key: key.clone() },
                _ => Response::List { entries: vec![(key, value)] },
            };
            let n = encode_response(&mut buf, &resp).unwrap();
            assert_eq!(decode_response(&buf[..n]).unwrap(), resp);
        }
    }
}
