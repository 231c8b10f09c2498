//! Cryptographic primitives for the Nearby-compatible wire protocol.
//!
//! Every primitive here is interop-mandated — the peer is a real Nearby
//! Share / Quick Share device we do not control, so the choices below are
//! not preferences, they are the protocol:
//!   1. ECDH key agreement on P-256 (UKEY2's sole supported curve here)
//!   2. HKDF-SHA256 extract-and-expand (RFC 5869) for the UKEY2 key schedule
//!   3. AES-256-CBC with PKCS#7 padding for the SecureMessage envelope
//!   4. HMAC-SHA256 for the SecureMessage signature
//!
//! Key material that is only ever needed transiently (ECDH private keys,
//! derived session keys) is wrapped in `Zeroizing`/`ZeroizeOnDrop` so it is
//! wiped from memory once the handshake or session is torn down.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, PublicKey, SecretKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

// ── Random bytes ─────────────────────────────────────────────────────────────

/// Cryptographically secure random bytes of the requested length.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

// ── ECDH on P-256 ─────────────────────────────────────────────────────────────

/// A P-256 key pair used for one UKEY2 handshake.
///
/// UKEY2 keys are ephemeral — generated fresh per handshake and discarded
/// once the derived session keys exist. The private scalar is zeroized on
/// drop; it never leaves this struct except via [`EcdhKeyPair::agree`].
#[derive(ZeroizeOnDrop)]
pub struct EcdhKeyPair {
    #[zeroize(skip)]
    public: PublicKey,
    secret: SecretKey,
}

impl EcdhKeyPair {
    /// The raw affine public coordinates, each 32 bytes, as the signed
    /// big-endian integers the peer expects (§4.2).
    pub fn public_xy(&self) -> (Vec<u8>, Vec<u8>) {
        public_key_xy(&self.public)
    }

    /// Derive the ECDH shared secret `Z` with a peer's raw affine
    /// coordinates. `Z` is the x-coordinate of the shared point, 32 bytes.
    pub fn agree(&self, peer_x: &[u8], peer_y: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let peer_public = decode_public_xy(peer_x, peer_y)?;
        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());
        let mut z = [0u8; 32];
        z.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(Zeroizing::new(z))
    }
}

/// Generate a P-256 key pair, regenerating until neither affine coordinate
/// would be read as negative under the peer's signed-big-integer encoding
/// (top bit of the most-significant byte set). Required for interop with
/// devices that validate the sign instead of always zero-padding.
pub fn ecdh_p256_generate() -> EcdhKeyPair {
    loop {
        let secret = SecretKey::random(&mut rand::thread_rng());
        let public = secret.public_key();
        let (x, y) = public_key_xy(&public);
        if is_nonnegative(&x) && is_nonnegative(&y) {
            return EcdhKeyPair { public, secret };
        }
    }
}

fn public_key_xy(public: &PublicKey) -> (Vec<u8>, Vec<u8>) {
    let point = public.to_encoded_point(false);
    let x = point.x().expect("uncompressed point always has x");
    let y = point.y().expect("uncompressed point always has y");
    (x.to_vec(), y.to_vec())
}

fn is_nonnegative(coord: &[u8]) -> bool {
    coord.first().is_none_or(|b| b & 0x80 == 0)
}

/// Reconstruct a public key from raw affine coordinates, stripping a
/// leading zero-padding byte if present, and validating the point lies on
/// the P-256 curve.
fn decode_public_xy(x: &[u8], y: &[u8]) -> Result<PublicKey, CryptoError> {
    let x = strip_pad(x)?;
    let y = strip_pad(y)?;
    let encoded = EncodedPoint::from_affine_coordinates(&x.into(), &y.into(), false);
    PublicKey::from_encoded_point(&encoded)
        .into_option()
        .ok_or(CryptoError::InvalidPoint)
}

fn strip_pad(coord: &[u8]) -> Result<[u8; 32], CryptoError> {
    let trimmed = match coord.len() {
        32 => coord,
        33 if coord[0] == 0 => &coord[1..],
        _ => return Err(CryptoError::InvalidPoint),
    };
    trimmed.try_into().map_err(|_| CryptoError::InvalidPoint)
}

/// Zero-pad a raw affine coordinate on the left so it is never read as
/// negative under a signed big-endian interpretation (prepends `0x00` when
/// the top bit of the first byte is set). General-purpose counterpart to
/// the rejection loop in [`ecdh_p256_generate`], used when re-encoding
/// coordinates that were not generated by this implementation.
pub fn signed_be_pad(coord: &[u8]) -> Vec<u8> {
    if coord.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(coord.len() + 1);
        padded.push(0);
        padded.extend_from_slice(coord);
        padded
    } else {
        coord.to_vec()
    }
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// RFC 5869 extract-and-expand in one call.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], length: usize) -> Zeroizing<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new(vec![0u8; length]);
    hk.expand(info, &mut okm)
        .expect("HKDF output length must fit the digest's max expansion");
    okm
}

// ── AES-256-CBC ───────────────────────────────────────────────────────────────

/// Encrypt `plaintext` under AES-256-CBC with PKCS#7 padding.
/// `key` must be 32 bytes, `iv` must be 16 bytes.
pub fn aes256_cbc_encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let enc = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::BadKeyOrIv)?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt `ciphertext` produced by [`aes256_cbc_encrypt`]. Fails on
/// malformed ciphertext (wrong length, bad padding).
pub fn aes256_cbc_decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let dec = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::BadKeyOrIv)?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadCiphertext)
}

// ── HMAC-SHA256 ───────────────────────────────────────────────────────────────

/// Compute the 32-byte HMAC-SHA256 tag of `data` under `key`.
pub fn hmac_sha256(data: &[u8], key: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify a HMAC-SHA256 tag in constant time.
pub fn hmac_sha256_verify(data: &[u8], key: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// SHA-256 digest, used to compute `DHS = SHA-256(Z)` from the raw ECDH
/// output, and to hash the ClientFinish commitment.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-512 digest, used for the UKEY2 cipher commitment over the peer's
/// serialized public key.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    use sha2::Sha512;
    Sha512::digest(data).into()
}

// ── Key schedule (UKEY2 → D2D) ───────────────────────────────────────────────

const SALT_D2D: &str = "82AA55A0D397F88346CA1CEE8D3909B95F13FA7DEB1D4AB38376B8256DA85510";
const SALT_KEY: &str = "BF9D2A53C63616D75DB0A7165B91C1EF73E537F2427405FA23610A4BE657642E";

/// The four symmetric keys and auth string derived at the end of the UKEY2
/// handshake (§4.5 "Key schedule"). Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct KeySchedule {
    pub decrypt_key: Zeroizing<[u8; 32]>,
    pub receive_hmac_key: Zeroizing<[u8; 32]>,
    pub encrypt_key: Zeroizing<[u8; 32]>,
    pub send_hmac_key: Zeroizing<[u8; 32]>,
    #[zeroize(skip)]
    pub auth_string: [u8; 32],
}

/// Run the full UKEY2 → D2D key schedule described in §4.5.
///
/// `z` is the raw ECDH shared secret, `m1m2` is the concatenation of the
/// serialized ClientInit and ServerInit messages exactly as sent on the
/// wire. `is_initiator` selects which pair of derived keys becomes
/// encrypt/decrypt (the two sides are always swapped relative to each
/// other).
pub fn derive_key_schedule(z: &[u8], m1m2: &[u8], is_initiator: bool) -> KeySchedule {
    let dhs = sha256(z);
    let auth_bytes = hkdf_sha256(b"UKEY2 v1 auth", &dhs, m1m2, 32);
    let next_secret = hkdf_sha256(b"UKEY2 v1 next", &dhs, m1m2, 32);

    let salt_d2d = hex::decode(SALT_D2D).expect("SALT_D2D is a fixed valid hex literal");
    let salt_key = hex::decode(SALT_KEY).expect("SALT_KEY is a fixed valid hex literal");

    let d2d_client = hkdf_sha256(&salt_d2d, &next_secret, b"client", 32);
    let d2d_server = hkdf_sha256(&salt_d2d, &next_secret, b"server", 32);

    let client_enc = fixed32(&hkdf_sha256(&salt_key, &d2d_client, b"ENC:2", 32));
    let client_sig = fixed32(&hkdf_sha256(&salt_key, &d2d_client, b"SIG:1", 32));
    let server_enc = fixed32(&hkdf_sha256(&salt_key, &d2d_server, b"ENC:2", 32));
    let server_sig = fixed32(&hkdf_sha256(&salt_key, &d2d_server, b"SIG:1", 32));

    let mut auth_string = [0u8; 32];
    auth_string.copy_from_slice(&auth_bytes);

    // Responder: decrypt=client_enc, receiveHmac=client_sig, encrypt=server_enc, sendHmac=server_sig.
    // Initiator: swapped.
    if is_initiator {
        KeySchedule {
            decrypt_key: Zeroizing::new(server_enc),
            receive_hmac_key: Zeroizing::new(server_sig),
            encrypt_key: Zeroizing::new(client_enc),
            send_hmac_key: Zeroizing::new(client_sig),
            auth_string,
        }
    } else {
        KeySchedule {
            decrypt_key: Zeroizing::new(client_enc),
            receive_hmac_key: Zeroizing::new(client_sig),
            encrypt_key: Zeroizing::new(server_enc),
            send_hmac_key: Zeroizing::new(server_sig),
            auth_string,
        }
    }
}

fn fixed32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("peer public key coordinates do not lie on the P-256 curve")]
    InvalidPoint,

    #[error("key or IV has the wrong length for AES-256-CBC")]
    BadKeyOrIv,

    #[error("malformed ciphertext or bad PKCS#7 padding")]
    BadCiphertext,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
