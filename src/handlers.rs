//! Pure `(Request, &mut Map) -> Response` handlers.
//!
//! Handlers never fail the connection -- every outcome, including a failed
//! allocation or an oversized `List` response, is a well-formed `Response`
//! (see spec §4.4, §7). Encoding the response into the connection's write
//! buffer is a separate step ([`encode_response_with_fallback`]) so the
//! "response too large" fallback can be applied uniformly regardless of
//! which handler produced the oversized value.

use crate::map::Map;
use crate::wire::{self, Request, Response};

/// Applies `req` to `map`, returning the response to send back.
pub fn handle_request(req: &Request, map: &mut Map) -> Response {
    match req {
        Request::Get { key } => {
            let value = map.get(key).map(<[u8]>::to_vec);
            Response::Get { key: key.clone(), value }
        }
        Request::Set { key, value } => handle_set(key, value, map),
        Request::Delete { key } => {
            map.remove(key);
            Response::Delete { key: key.clone() }
        }
        Request::List => {
            let entries = map.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
            Response::List { entries }
        }
        Request::Unknown { raw } => Response::Unknown { raw: raw.clone() },
    }
}

fn handle_set(key: &[u8], value: &[u8], map: &mut Map) -> Response {
    match (try_to_vec(key), try_to_vec(value)) {
        (Ok(_), Ok(_)) => {
            map.put(key, value);
            Response::Set { key: key.to_vec(), value: value.to_vec() }
        }
        _ => Response::Unknown { raw: b"Invalid request".to_vec() },
    }
}

/// Clones `bytes` into a freshly allocated `Vec`, surfacing an allocation
/// failure as `Err` instead of aborting, mirroring the source's explicit
/// allocation discipline (every allocation has a checked failure path).
fn try_to_vec(bytes: &[u8]) -> Result<Vec<u8>, std::collections::TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(bytes.len())?;
    v.extend_from_slice(bytes);
    Ok(v)
}

/// Encodes `resp` into `buf`, falling back to a plain `Unknown` response
/// carrying a short reason if the encoding would overflow `buf` (this can
/// only happen for `List`, since `Get`/`Set`/`Delete` echo request-sized
/// data already bounded by the frame's own length limit).
pub fn encode_response_with_fallback(buf: &mut [u8], resp: &Response) -> usize {
    match wire::encode_response(buf, resp) {
        Ok(n) => n,
        Err(_) => {
            let fallback = Response::Unknown { raw: b"Response too large".to_vec() };
            wire::encode_response(buf, &fallback)
                .expect("fallback Unknown response must always fit the write buffer")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn get_absent_key_has_no_value() {
        let mut map = Map::new();
        let resp = handle_request(&Request::Get { key: b"a".to_vec() }, &mut map);
        assert_eq!(resp, Response::Get { key: b"a".to_vec(), value: None });
    }

    #[test]
    fn set_then_get() {
        let mut map = Map::new();
        let resp = handle_request(&Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }, &mut map);
        assert_eq!(resp, Response::Set { key: b"a".to_vec(), value: b"1".to_vec() });

        let resp = handle_request(&Request::Get { key: b"a".to_vec() }, &mut map);
        assert_eq!(resp, Response::Get { key: b"a".to_vec(), value: Some(b"1".to_vec()) });
    }

    #[test]
    fn delete_is_idempotent() {
        let mut map = Map::new();
        let resp = handle_request(&Request::Delete { key: b"missing".to_vec() }, &mut map);
        assert_eq!(resp, Response::Delete { key: b"missing".to_vec() });

        handle_request(&Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }, &mut map);
        let resp = handle_request(&Request::Delete { key: b"a".to_vec() }, &mut map);
        assert_eq!(resp, Response::Delete { key: b"a".to_vec() });
        let resp = handle_request(&Request::Delete { key: b"a".to_vec() }, &mut map);
        assert_eq!(resp, Response::Delete { key: b"a".to_vec() });
    }

    #[test]
    fn list_reflects_stored_pairs() {
        let mut map = Map::new();
        handle_request(&Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }, &mut map);
        let resp = handle_request(&Request::List, &mut map);
        assert_eq!(resp, Response::List { entries: vec![(b"a".to_vec(), b"1".to_vec())] });
    }

    #[test]
    fn unknown_request_echoes_raw() {
        let raw = vec![0xFF, 1, 2, 3];
        let mut map = Map::new();
        let resp = handle_request(&Request::Unknown { raw: raw.clone() }, &mut map);
        assert_eq!(resp, Response::Unknown { raw });
    }

    #[test]
    fn oversized_list_falls_back_to_unknown() {
        let mut map = Map::new();
        for i in 0..2000u32 {
            map.put(&i.to_le_bytes(), b"some reasonably sized value");
        }
        let resp = handle_request(&Request::List, &mut map);

        let mut buf = [0u8; crate::wire::MAX_MESSAGE_LEN];
        let n = encode_response_with_fallback(&mut buf, &resp);
        let decoded = wire::decode_response(&buf[..n]).unwrap();
        assert_matches!(decoded, Response::Unknown { .. });
    }

    fn encode_resp(resp: &Response) -> Vec<u8> {
        let mut buf = [0u8; wire::MAX_MESSAGE_LEN];
        let n = wire::encode_response(&mut buf, resp).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn s1_get_absent_key() {
        let payload = [0x01u8, 0x05, 0x00, b'a', b'_', b'k', b'e', b'y'];
        let req = wire::decode_request(&payload);
        assert_eq!(req, Request::Get { key: b"a_key".to_vec() });

        let mut map = Map::new();
        let resp = handle_request(&req, &mut map);
        assert_eq!(resp, Response::Get { key: b"a_key".to_vec(), value: None });
        assert_eq!(encode_resp(&resp), vec![0x01, 0x05, 0x00, b'a', b'_', b'k', b'e', b'y']);
    }

    #[test]
    fn s2_set_a_1() {
        let payload = [0x02u8, 0x01, 0x00, b'a', 0x01, 0x00, b'1'];
        let req = wire::decode_request(&payload);
        assert_eq!(req, Request::Set { key: b"a".to_vec(), value: b"1".to_vec() });

        let mut map = Map::new();
        let resp = handle_request(&req, &mut map);
        assert_eq!(resp, Response::Set { key: b"a".to_vec(), value: b"1".to_vec() });
        assert_eq!(encode_resp(&resp), payload.to_vec());
    }

    #[test]
    fn s4_del_a_then_get_omits_value() {
        let mut map = Map::new();
        handle_request(&Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }, &mut map);

        let del_resp = handle_request(&Request::Delete { key: b"a".to_vec() }, &mut map);
        assert_eq!(encode_resp(&del_resp), vec![0x03, 0x01, 0x00, b'a']);

        let get_resp = handle_request(&Request::Get { key: b"a".to_vec() }, &mut map);
        assert_eq!(encode_resp(&get_resp), vec![0x01, 0x01, 0x00, b'a']);
    }

    #[test]
    fn s5_list_on_empty_map() {
        let mut map = Map::new();
        let resp = handle_request(&Request::List, &mut map);
        assert_eq!(encode_resp(&resp), vec![0x04]);
    }

    #[test]
    fn s6_list_after_set() {
        let mut map = Map::new();
        handle_request(&Request::Set { key: b"a".to_vec(), value: b"1".to_vec() }, &mut map);
        let resp = handle_request(&Request::List, &mut map);
        assert_eq!(encode_resp(&resp), vec![0x04, 0x01, 0x00, b'a', 0x01, 0x00, b'1']);
    }

    #[test]
    fn s7_unknown_command_byte_is_echoed() {
        let payload = [0xFFu8, 0x01, 0x02, 0x03];
        let req = wire::decode_request(&payload);
        assert_eq!(req, Request::Unknown { raw: payload.to_vec() });

        let mut map = Map::new();
        let resp = handle_request(&req, &mut map);
        assert_eq!(encode_resp(&resp), payload.to_vec());
    }

    #[test]
    fn s8_ten_thousand_inserts_rehash_starts_and_completes() {
        let mut map = Map::new();
        let mut saw_rehash = false;

        for i in 0..10_000u32 {
            handle_request(&Request::Set { key: i.to_le_bytes().to_vec(), value: b"v".to_vec() }, &mut map);
            if map.is_rehashing() {
                saw_rehash = true;
            }
        }

        assert!(saw_rehash, "expected at least one rehash to have started during the run");
        assert!(!map.is_rehashing(), "rehash must have fully drained by the end");
        assert_eq!(map.size(), 10_000);
    }
}
