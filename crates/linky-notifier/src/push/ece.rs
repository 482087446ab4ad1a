//! RFC 8291 message encryption with the RFC 8188 `aes128gcm` content coding.
//!
//! Output is a single record: `salt(16) || rs(4) || idlen(1) || keyid || ciphertext`,
//! where `keyid` is the sender's ephemeral uncompressed P-256 public key.

use aes_gcm::aead::Aead;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{Aes128Gcm, KeyInit};
use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use super::PushError;

/// Base64url accepting both padded and unpadded input, encoding unpadded.
pub const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Record size announced in the header.
pub const RECORD_SIZE: u32 = 4096;

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const TAG_LEN: usize = 16;
/// Delimiter marking the last (and only) record.
const LAST_RECORD: u8 = 0x02;

/// Largest plaintext that fits in one record.
pub const MAX_PLAINTEXT: usize = RECORD_SIZE as usize - TAG_LEN - 1;

/// Encrypt `plaintext` for a subscription's `p256dh` and `auth` keys
/// (base64url, as sent by the browser).
pub fn encrypt(plaintext: &[u8], p256dh: &str, auth: &str) -> Result<Vec<u8>, PushError> {
    let (ua_public, auth_secret) = decode_keys(p256dh, auth)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    encrypt_with(
        plaintext,
        &ua_public,
        &auth_secret,
        &EphemeralSecret::random(&mut OsRng),
        salt,
    )
}

/// Check that `p256dh` is an uncompressed P-256 point and `auth` a 16-byte
/// secret, both base64url.
pub fn validate_keys(p256dh: &str, auth: &str) -> Result<(), PushError> {
    decode_keys(p256dh, auth).map(|_| ())
}

fn decode_keys(p256dh: &str, auth: &str) -> Result<(Vec<u8>, Vec<u8>), PushError> {
    let ua_public = BASE64_URL
        .decode(p256dh)
        .map_err(|e| PushError::InvalidSubscription(format!("p256dh: {e}")))?;
    if ua_public.len() != PUBLIC_KEY_LEN {
        return Err(PushError::InvalidSubscription(format!(
            "p256dh: expected {PUBLIC_KEY_LEN} bytes, got {}",
            ua_public.len()
        )));
    }
    p256::PublicKey::from_sec1_bytes(&ua_public)
        .map_err(|e| PushError::InvalidSubscription(format!("p256dh: {e}")))?;

    let auth_secret = BASE64_URL
        .decode(auth)
        .map_err(|e| PushError::InvalidSubscription(format!("auth: {e}")))?;
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(PushError::InvalidSubscription(format!(
            "auth: expected {AUTH_SECRET_LEN} bytes, got {}",
            auth_secret.len()
        )));
    }
    Ok((ua_public, auth_secret))
}

/// Encrypt with caller-supplied ephemeral key and salt.
pub fn encrypt_with(
    plaintext: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
    as_secret: &EphemeralSecret,
    salt: [u8; SALT_LEN],
) -> Result<Vec<u8>, PushError> {
    if plaintext.len() > MAX_PLAINTEXT {
        return Err(PushError::Crypto(format!(
            "payload of {} bytes exceeds {MAX_PLAINTEXT}",
            plaintext.len()
        )));
    }

    let ua_key = p256::PublicKey::from_sec1_bytes(ua_public)
        .map_err(|e| PushError::InvalidSubscription(format!("p256dh: {e}")))?;
    let ua_public = ua_key.to_encoded_point(false);
    let as_public = as_secret.public_key().to_encoded_point(false);
    let shared = as_secret.diffie_hellman(&ua_key);

    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes(),
        auth_secret,
        ua_public.as_bytes(),
        as_public.as_bytes(),
        &salt,
    )?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD);

    let cipher =
        Aes128Gcm::new_from_slice(&cek).map_err(|e| PushError::Crypto(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), record.as_slice())
        .map_err(|e| PushError::Crypto(e.to_string()))?;

    let keyid = as_public.as_bytes();
    let mut body = Vec::with_capacity(SALT_LEN + 5 + keyid.len() + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    #[allow(clippy::cast_possible_truncation)]
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(keyid);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Derive the content encryption key and nonce (RFC 8291 section 3.4).
pub fn derive_key_and_nonce(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), PushError> {
    let mut key_info = Vec::with_capacity(14 + ua_public.len() + as_public.len());
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|e| PushError::Crypto(e.to_string()))?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    prk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|e| PushError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; 12];
    prk.expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|e| PushError::Crypto(e.to_string()))?;

    Ok((cek, nonce))
}
