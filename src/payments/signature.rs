//! Webhook signature verification.
//!
//! The provider signs the exact request body bytes with HMAC-SHA256 and sends
//! the lowercase hex digest in a header. Verification must run on the bytes as
//! received: parsing and re-serializing the JSON first changes whitespace and
//! key order and produces false negatives.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `payload` keyed by `secret`.
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    hex::encode(mac_bytes(payload, secret))
}

/// Constant-time check of `signature_hex` against the HMAC of `payload`.
/// Malformed hex or a digest of the wrong length is a mismatch.
pub fn verify_signature(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let provided = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let expected = mac_bytes(payload, secret);
    if provided.len() != expected.len() {
        return false;
    }

    expected.ct_eq(&provided).into()
}

fn mac_bytes(payload: &[u8], secret: &str) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1"}}}}"#;

    #[test]
    fn test_valid_signature() {
        let sig = compute_signature(BODY, SECRET);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(BODY, &sig, SECRET));
        assert!(verify_signature(BODY, &sig.to_uppercase(), SECRET));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = compute_signature(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_any_flipped_body_byte_is_rejected() {
        let sig = compute_signature(BODY, SECRET);
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify_signature(&tampered, &sig, SECRET), "byte {} accepted", i);
        }
    }

    #[test]
    fn test_any_flipped_signature_char_is_rejected() {
        let sig = compute_signature(BODY, SECRET);
        for i in 0..sig.len() {
            let mut chars: Vec<char> = sig.chars().collect();
            chars[i] = if chars[i] == '0' { '1' } else { '0' };
            let tampered: String = chars.into_iter().collect();
            assert!(!verify_signature(BODY, &tampered, SECRET), "char {} accepted", i);
        }
    }

    #[test]
    fn test_reserialized_body_is_rejected() {
        let sig = compute_signature(BODY, SECRET);
        let value: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert!(!verify_signature(&pretty, &sig, SECRET));
    }

    #[test]
    fn test_malformed_signatures() {
        assert!(!verify_signature(BODY, "", SECRET));
        assert!(!verify_signature(BODY, "not-hex", SECRET));
        assert!(!verify_signature(BODY, "abcd", SECRET));
        let sig = compute_signature(BODY, "other-secret");
        assert!(!verify_signature(BODY, &sig, SECRET));
    }
}
