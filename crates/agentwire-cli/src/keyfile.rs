//! Key files: one key pair per JSON file.
//!
//! ```json
//! { "verkey": "<base58 public key>", "secret": "<base58 secret key>" }
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use agentwire_crypto::{CryptoError, KeyPair, Wallet};

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("failed to access key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {path} is not valid: {reason}")]
    Invalid { path: String, reason: String },

    #[error("key file {path} names verkey {declared} but its secret belongs to {actual}")]
    VerkeyMismatch {
        path: String,
        declared: String,
        actual: String,
    },
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyFile {
    pub verkey: String,
    pub secret: String,
}

impl KeyFile {
    pub fn from_pair(pair: &KeyPair) -> Self {
        Self {
            verkey: pair.verkey(),
            secret: pair.secret_base58().to_string(),
        }
    }

    /// Read a key file and check that its secret matches its verkey.
    pub fn load(path: &Path) -> Result<Self, KeyFileError> {
        let display = path.display().to_string();
        let raw = std::fs::read(path).map_err(|source| KeyFileError::Io {
            path: display.clone(),
            source,
        })?;
        let file: KeyFile = serde_json::from_slice(&raw).map_err(|e| KeyFileError::Invalid {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let pair = file.key_pair().map_err(|e| KeyFileError::Invalid {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        if pair.verkey() != file.verkey {
            return Err(KeyFileError::VerkeyMismatch {
                path: display,
                declared: file.verkey.clone(),
                actual: pair.verkey(),
            });
        }
        Ok(file)
    }

    /// Write the key file. Refuses to overwrite an existing file.
    pub fn save(&self, path: &Path) -> Result<(), KeyFileError> {
        let display = path.display().to_string();
        let json = serde_json::to_vec_pretty(self).map_err(|e| KeyFileError::Invalid {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| KeyFileError::Io {
                path: display.clone(),
                source,
            })?;
        file.write_all(&json)
            .map_err(|source| KeyFileError::Io { path: display, source })
    }

    pub fn key_pair(&self) -> Result<KeyPair, CryptoError> {
        KeyPair::from_base58_secret(&self.secret)
    }
}

/// Build a wallet holding every key in `paths`.
pub fn load_wallet<P: AsRef<Path>>(paths: &[P]) -> Result<Wallet, KeyFileError> {
    let mut wallet = Wallet::new();
    for path in paths {
        let file = KeyFile::load(path.as_ref())?;
        wallet
            .import_secret(&file.secret)
            .map_err(|e| KeyFileError::Invalid {
                path: path.as_ref().display().to_string(),
                reason: e.to_string(),
            })?;
    }
    Ok(wallet)
}
