//! Token minting helpers shared by the authentication unit tests.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;

use crate::auth::keys::{KeyEntry, StaticKeySet};

pub const RSA_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/rsa_private.pem");
pub const RSA_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/rsa_public.pem");
pub const EC_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/ec_private.pem");
pub const EC_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/ec_public.pem");

pub const HMAC_SECRET: &[u8] = b"test-hmac-secret-0123456789abcdef";

pub const TEST_ISSUER: &str = "http://test.provider.com/";
pub const TEST_AUDIENCE: &str = "test-audience";

/// Key set with one key per family:
/// `test-key` (RS256), `pss-key` (PS256), `ec-key` (ES256), `hmac-key` (HS256).
pub fn test_key_set() -> Arc<StaticKeySet> {
    Arc::new(
        StaticKeySet::new(vec![
            KeyEntry::public_key_pem("test-key", Algorithm::RS256, RSA_PUBLIC_PEM.as_bytes())
                .unwrap(),
            KeyEntry::public_key_pem("pss-key", Algorithm::PS256, RSA_PUBLIC_PEM.as_bytes())
                .unwrap(),
            KeyEntry::public_key_pem("ec-key", Algorithm::ES256, EC_PUBLIC_PEM.as_bytes())
                .unwrap(),
            KeyEntry::hmac("hmac-key", Algorithm::HS256, HMAC_SECRET).unwrap(),
        ])
        .unwrap(),
    )
}

fn encoding_key(algorithm: Algorithm) -> EncodingKey {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            EncodingKey::from_secret(HMAC_SECRET)
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            EncodingKey::from_ec_pem(EC_PRIVATE_PEM.as_bytes()).unwrap()
        }
        _ => EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap(),
    }
}

/// Sign `claims` with the fixture key for `algorithm`.
pub fn sign(algorithm: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(algorithm);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &encoding_key(algorithm)).unwrap()
}

/// Sign with an arbitrary HMAC secret (used to forge algorithm-confusion tokens).
pub fn sign_hmac_with(secret: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

/// Replace the header of `token`, keeping its payload and signature segments.
pub fn with_header(token: &str, header: &Value) -> String {
    let mut parts = token.splitn(3, '.');
    let _ = parts.next();
    let payload = parts.next().unwrap();
    let signature = parts.next().unwrap();
    format!("{}.{}.{}", encode_segment(header), payload, signature)
}

/// Replace the payload of `token`, keeping its header and signature segments.
pub fn with_payload(token: &str, payload: &Value) -> String {
    let mut parts = token.splitn(3, '.');
    let header = parts.next().unwrap();
    let _ = parts.next();
    let signature = parts.next().unwrap();
    format!("{}.{}.{}", header, encode_segment(payload), signature)
}

/// Claims accepted by [`crate::auth::ValidationPolicy`]s built with
/// [`TEST_ISSUER`] and [`TEST_AUDIENCE`].
pub fn valid_claims() -> Value {
    serde_json::json!({
        "sub": "user-1",
        "exp": 9_876_543_210_i64,
        "iss": TEST_ISSUER,
        "aud": [TEST_AUDIENCE],
    })
}
