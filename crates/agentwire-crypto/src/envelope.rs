//! Envelope sealing and opening.
//!
//! The payload is encrypted once under a random content key with
//! XChaCha20-Poly1305, using the encoded protected header as AAD. The content
//! key is then wrapped for every recipient:
//!
//! - Anoncrypt: `encrypted_key = eph_pub || ChaCha20Poly1305(KEK, cek)` with
//!   `KEK = HKDF-SHA256(DH(eph, recipient))`.
//! - Authcrypt: the sender verkey is sealed to the recipient under an
//!   ephemeral KEK (`header.sender`), and the content key is wrapped under
//!   `HKDF-SHA256(DH(eph, recipient) || DH(sender, recipient))` with a random
//!   `header.iv`. Only the holder of the sender secret can produce that wrap.

use bytes::Bytes;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::jwe::{
    b64_decode, b64_encode, Jwe, PackAlg, ProtectedHeader, Recipient, RecipientHeader,
    ENC_XCHACHA20POLY1305, TYP_JWM,
};
use crate::keys::{decode_verkey, KeyPair, KEY_LEN};

const TAG_LEN: usize = 16;
const XNONCE_LEN: usize = 24;

const ANON_KEK_LABEL: &[u8] = b"agentwire_anoncrypt_kek_v1";
const SENDER_KEK_LABEL: &[u8] = b"agentwire_authcrypt_sender_v1";
const AUTH_KEK_LABEL: &[u8] = b"agentwire_authcrypt_kek_v1";

/// Result of opening one envelope.
#[derive(Debug, Clone)]
pub struct Opened {
    pub plaintext: Bytes,
    /// Present only for Authcrypt envelopes
    pub sender_verkey: Option<String>,
    /// The local key that matched
    pub recipient_verkey: String,
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    getrandom::getrandom(&mut out).map_err(|_| CryptoError::EncryptFailed)?;
    Ok(out)
}

fn derive_kek(
    ikm: &[u8],
    label: &[u8],
    context: &[&[u8; KEY_LEN]],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut info = label.to_vec();
    for part in context {
        info.extend_from_slice(&part[..]);
    }

    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut kek = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(&info, &mut kek[..])
        .map_err(|_| CryptoError::Backend("hkdf expand".into()))?;
    Ok(kek)
}

// Every KEK fed through these two is derived from a fresh ephemeral key, so a
// fixed nonce is never reused under the same key.
fn seal_fixed_nonce(kek: &[u8; KEY_LEN], msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
    ChaCha20Poly1305::new(Key::from_slice(kek))
        .encrypt(Nonce::from_slice(&[0u8; 12]), msg)
        .map_err(|_| CryptoError::EncryptFailed)
}

fn open_fixed_nonce(kek: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    ChaCha20Poly1305::new(Key::from_slice(kek))
        .decrypt(Nonce::from_slice(&[0u8; 12]), sealed)
        .map_err(|_| CryptoError::DecryptFailed)
}

fn split_ephemeral(raw: &[u8], field: &str) -> Result<(PublicKey, Vec<u8>), CryptoError> {
    if raw.len() <= KEY_LEN {
        return Err(CryptoError::Malformed(format!("{field} too short")));
    }
    let (eph, rest) = raw.split_at(KEY_LEN);
    let eph: [u8; KEY_LEN] = eph
        .try_into()
        .map_err(|_| CryptoError::Malformed(format!("{field} ephemeral key")))?;
    Ok((PublicKey::from(eph), rest.to_vec()))
}

fn content_key(raw: Vec<u8>) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let raw = Zeroizing::new(raw);
    let cek: [u8; KEY_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Malformed("content key length".into()))?;
    Ok(Zeroizing::new(cek))
}

fn wrap_anoncrypt(
    cek: &[u8; KEY_LEN],
    kid: &str,
    recipient_pub: &PublicKey,
) -> Result<Recipient, CryptoError> {
    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = PublicKey::from(&eph);
    let shared = Zeroizing::new(eph.diffie_hellman(recipient_pub).to_bytes());

    let kek = derive_kek(
        &shared[..],
        ANON_KEK_LABEL,
        &[eph_pub.as_bytes(), recipient_pub.as_bytes()],
    )?;

    let mut encrypted_key = eph_pub.as_bytes().to_vec();
    encrypted_key.extend_from_slice(&seal_fixed_nonce(&kek, cek)?);

    Ok(Recipient {
        encrypted_key: b64_encode(&encrypted_key),
        header: RecipientHeader {
            kid: kid.to_string(),
            sender: None,
            iv: None,
        },
    })
}

fn wrap_authcrypt(
    cek: &[u8; KEY_LEN],
    kid: &str,
    recipient_pub: &PublicKey,
    sender: &KeyPair,
) -> Result<Recipient, CryptoError> {
    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = PublicKey::from(&eph);
    let ephemeral_shared = Zeroizing::new(eph.diffie_hellman(recipient_pub).to_bytes());
    let static_shared = sender.diffie_hellman(recipient_pub);

    // Sender verkey, readable only by this recipient
    let sender_kek = derive_kek(
        &ephemeral_shared[..],
        SENDER_KEK_LABEL,
        &[eph_pub.as_bytes(), recipient_pub.as_bytes()],
    )?;
    let mut sealed_sender = eph_pub.as_bytes().to_vec();
    sealed_sender.extend_from_slice(&seal_fixed_nonce(&sender_kek, sender.verkey().as_bytes())?);

    let mut ikm = Zeroizing::new(Vec::with_capacity(2 * KEY_LEN));
    ikm.extend_from_slice(&ephemeral_shared[..]);
    ikm.extend_from_slice(&static_shared[..]);
    let kek = derive_kek(
        &ikm,
        AUTH_KEK_LABEL,
        &[
            eph_pub.as_bytes(),
            sender.public_key().as_bytes(),
            recipient_pub.as_bytes(),
        ],
    )?;

    let iv = random_bytes::<XNONCE_LEN>()?;
    let wrapped = XChaCha20Poly1305::new(Key::from_slice(&kek[..]))
        .encrypt(XNonce::from_slice(&iv), &cek[..])
        .map_err(|_| CryptoError::EncryptFailed)?;

    Ok(Recipient {
        encrypted_key: b64_encode(&wrapped),
        header: RecipientHeader {
            kid: kid.to_string(),
            sender: Some(b64_encode(&sealed_sender)),
            iv: Some(b64_encode(&iv)),
        },
    })
}

fn unwrap_anoncrypt(
    entry: &Recipient,
    recipient: &KeyPair,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let raw = b64_decode(&entry.encrypted_key, "encrypted_key")?;
    let (eph_pub, wrapped) = split_ephemeral(&raw, "encrypted_key")?;
    let shared = recipient.diffie_hellman(&eph_pub);

    let kek = derive_kek(
        &shared[..],
        ANON_KEK_LABEL,
        &[eph_pub.as_bytes(), recipient.public_key().as_bytes()],
    )?;
    content_key(open_fixed_nonce(&kek, &wrapped)?)
}

fn unwrap_authcrypt(
    entry: &Recipient,
    recipient: &KeyPair,
) -> Result<(Zeroizing<[u8; KEY_LEN]>, String), CryptoError> {
    let sender_field = entry
        .header
        .sender
        .as_deref()
        .ok_or_else(|| CryptoError::Malformed("authcrypt recipient without sender".into()))?;
    let iv_field = entry
        .header
        .iv
        .as_deref()
        .ok_or_else(|| CryptoError::Malformed("authcrypt recipient without iv".into()))?;

    let raw_sender = b64_decode(sender_field, "sender")?;
    let (eph_pub, sealed_sender) = split_ephemeral(&raw_sender, "sender")?;
    let ephemeral_shared = recipient.diffie_hellman(&eph_pub);

    let sender_kek = derive_kek(
        &ephemeral_shared[..],
        SENDER_KEK_LABEL,
        &[eph_pub.as_bytes(), recipient.public_key().as_bytes()],
    )?;
    let sender_verkey = String::from_utf8(open_fixed_nonce(&sender_kek, &sealed_sender)?)
        .map_err(|_| CryptoError::Malformed("sender verkey is not utf-8".into()))?;
    let sender_pub = decode_verkey(&sender_verkey)?;
    let static_shared = recipient.diffie_hellman(&sender_pub);

    let mut ikm = Zeroizing::new(Vec::with_capacity(2 * KEY_LEN));
    ikm.extend_from_slice(&ephemeral_shared[..]);
    ikm.extend_from_slice(&static_shared[..]);
    let kek = derive_kek(
        &ikm,
        AUTH_KEK_LABEL,
        &[
            eph_pub.as_bytes(),
            sender_pub.as_bytes(),
            recipient.public_key().as_bytes(),
        ],
    )?;

    let iv = b64_decode(iv_field, "iv")?;
    if iv.len() != XNONCE_LEN {
        return Err(CryptoError::Malformed("recipient iv length".into()));
    }
    let wrapped = b64_decode(&entry.encrypted_key, "encrypted_key")?;
    let cek = XChaCha20Poly1305::new(Key::from_slice(&kek[..]))
        .decrypt(XNonce::from_slice(&iv), wrapped.as_slice())
        .map_err(|_| CryptoError::DecryptFailed)?;

    Ok((content_key(cek)?, sender_verkey))
}

/// Seal `plaintext` for every verkey in `recipient_verkeys`.
///
/// With `sender` the envelope is Authcrypt and recipients learn the sender
/// verkey; without it the envelope is Anoncrypt.
pub fn seal(
    plaintext: &[u8],
    recipient_verkeys: &[String],
    sender: Option<&KeyPair>,
) -> Result<Jwe, CryptoError> {
    if recipient_verkeys.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let cek = Zeroizing::new(random_bytes::<KEY_LEN>()?);

    let mut recipients = Vec::with_capacity(recipient_verkeys.len());
    for verkey in recipient_verkeys {
        let recipient_pub = decode_verkey(verkey)?;
        let entry = match sender {
            Some(sender) => wrap_authcrypt(&cek, verkey, &recipient_pub, sender)?,
            None => wrap_anoncrypt(&cek, verkey, &recipient_pub)?,
        };
        recipients.push(entry);
    }

    let header = ProtectedHeader {
        enc: ENC_XCHACHA20POLY1305.to_string(),
        typ: TYP_JWM.to_string(),
        alg: if sender.is_some() {
            PackAlg::Authcrypt
        } else {
            PackAlg::Anoncrypt
        },
        recipients,
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| CryptoError::Backend(e.to_string()))?;
    let protected = b64_encode(&header_json);

    let iv = random_bytes::<XNONCE_LEN>()?;
    let mut sealed = XChaCha20Poly1305::new(Key::from_slice(&cek[..]))
        .encrypt(
            XNonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: protected.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::EncryptFailed)?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(Jwe {
        protected,
        iv: b64_encode(&iv),
        ciphertext: b64_encode(&sealed),
        tag: b64_encode(&tag),
    })
}

/// Open an envelope with the first addressed key that `lookup` can supply.
pub fn open<F>(jwe: &Jwe, lookup: F) -> Result<Opened, CryptoError>
where
    F: Fn(&str) -> Option<KeyPair>,
{
    let header = jwe.protected_header()?;
    if header.enc != ENC_XCHACHA20POLY1305 {
        return Err(CryptoError::Malformed(format!(
            "unsupported enc {}",
            header.enc
        )));
    }

    let (entry, recipient) = header
        .recipients
        .iter()
        .find_map(|r| lookup(&r.header.kid).map(|pair| (r, pair)))
        .ok_or_else(|| {
            let kids: Vec<&str> = header
                .recipients
                .iter()
                .map(|r| r.header.kid.as_str())
                .collect();
            CryptoError::KeyNotFound(kids.join(", "))
        })?;

    let (cek, sender_verkey) = match header.alg {
        PackAlg::Anoncrypt => (unwrap_anoncrypt(entry, &recipient)?, None),
        PackAlg::Authcrypt => {
            let (cek, sender) = unwrap_authcrypt(entry, &recipient)?;
            (cek, Some(sender))
        }
    };

    let iv = b64_decode(&jwe.iv, "iv")?;
    if iv.len() != XNONCE_LEN {
        return Err(CryptoError::Malformed("iv length".into()));
    }
    let tag = b64_decode(&jwe.tag, "tag")?;
    if tag.len() != TAG_LEN {
        return Err(CryptoError::Malformed("tag length".into()));
    }
    let mut sealed = b64_decode(&jwe.ciphertext, "ciphertext")?;
    sealed.extend_from_slice(&tag);

    let plaintext = XChaCha20Poly1305::new(Key::from_slice(&cek[..]))
        .decrypt(
            XNonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: jwe.protected.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)?;

    Ok(Opened {
        plaintext: Bytes::from(plaintext),
        sender_verkey,
        recipient_verkey: entry.header.kid.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_for(pairs: &[KeyPair]) -> impl Fn(&str) -> Option<KeyPair> + '_ {
        move |kid: &str| pairs.iter().find(|p| p.verkey() == kid).cloned()
    }

    #[test]
    fn test_anoncrypt_round_trip() {
        let recipient = KeyPair::generate();
        let jwe = seal(b"hello", &[recipient.verkey()], None).unwrap();

        let header = jwe.protected_header().unwrap();
        assert_eq!(header.alg, PackAlg::Anoncrypt);
        assert!(header.recipients[0].header.sender.is_none());

        let opened = open(&jwe, lookup_for(std::slice::from_ref(&recipient))).unwrap();
        assert_eq!(opened.plaintext.as_ref(), b"hello");
        assert_eq!(opened.sender_verkey, None);
        assert_eq!(opened.recipient_verkey, recipient.verkey());
    }

    #[test]
    fn test_authcrypt_reveals_sender() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let jwe = seal(b"signed hello", &[recipient.verkey()], Some(&sender)).unwrap();

        assert_eq!(jwe.protected_header().unwrap().alg, PackAlg::Authcrypt);

        let opened = open(&jwe, lookup_for(std::slice::from_ref(&recipient))).unwrap();
        assert_eq!(opened.plaintext.as_ref(), b"signed hello");
        assert_eq!(opened.sender_verkey, Some(sender.verkey()));
    }

    #[test]
    fn test_multiple_recipients_each_open() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let jwe = seal(b"both", &[a.verkey(), b.verkey()], None).unwrap();

        let opened_b = open(&jwe, lookup_for(std::slice::from_ref(&b))).unwrap();
        assert_eq!(opened_b.recipient_verkey, b.verkey());
        let opened_a = open(&jwe, lookup_for(std::slice::from_ref(&a))).unwrap();
        assert_eq!(opened_a.recipient_verkey, a.verkey());
    }

    #[test]
    fn test_no_local_key() {
        let recipient = KeyPair::generate();
        let stranger = KeyPair::generate();
        let jwe = seal(b"x", &[recipient.verkey()], None).unwrap();

        let err = open(&jwe, lookup_for(std::slice::from_ref(&stranger))).unwrap_err();
        assert_eq!(err, CryptoError::KeyNotFound(recipient.verkey()));
    }

    #[test]
    fn test_empty_recipients_rejected() {
        assert_eq!(seal(b"x", &[], None).unwrap_err(), CryptoError::NoRecipients);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let recipient = KeyPair::generate();
        let mut jwe = seal(b"payload bytes", &[recipient.verkey()], None).unwrap();

        let mut raw = b64_decode(&jwe.ciphertext, "ciphertext").unwrap();
        raw[0] ^= 0x01;
        jwe.ciphertext = b64_encode(&raw);

        let err = open(&jwe, lookup_for(std::slice::from_ref(&recipient))).unwrap_err();
        assert_eq!(err, CryptoError::DecryptFailed);
    }

    #[test]
    fn test_forged_sender_rejected() {
        // Re-sealing the sender field to claim another identity breaks the key wrap.
        let sender = KeyPair::generate();
        let impostor = KeyPair::generate();
        let recipient = KeyPair::generate();

        let genuine = seal(b"x", &[recipient.verkey()], Some(&sender)).unwrap();
        let forged = seal(b"x", &[recipient.verkey()], Some(&impostor)).unwrap();

        let mut header = genuine.protected_header().unwrap();
        let forged_header = forged.protected_header().unwrap();
        header.recipients[0].header.sender = forged_header.recipients[0].header.sender.clone();

        let tampered = Jwe {
            protected: b64_encode(&serde_json::to_vec(&header).unwrap()),
            ..genuine
        };
        let err = open(&tampered, lookup_for(std::slice::from_ref(&recipient))).unwrap_err();
        assert_eq!(err, CryptoError::DecryptFailed);
    }

    #[test]
    fn test_invalid_recipient_verkey() {
        let err = seal(b"x", &["not-a-key".to_string()], None).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }
}
