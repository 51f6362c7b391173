//! # PEM Key Store
//!
//! Persists key pairs as `<owner>_private_key.pem` (SEC1 `EC PRIVATE KEY`)
//! and `<owner>_public_key.pem` (SPKI `PUBLIC KEY`) under one directory.

use crate::ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey};
use crate::errors::{CryptoError, KeyStoreError};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use k256::{PublicKey, SecretKey};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory-backed key store.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Key store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the private key file for `owner`.
    pub fn private_key_path(&self, owner: &str) -> PathBuf {
        self.dir.join(format!("{owner}_private_key.pem"))
    }

    /// Path of the public key file for `owner`.
    pub fn public_key_path(&self, owner: &str) -> PathBuf {
        self.dir.join(format!("{owner}_public_key.pem"))
    }

    /// Write both PEM files for `owner`, replacing existing ones.
    pub fn save(&self, owner: &str, keypair: &Secp256k1KeyPair) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| KeyStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let secret = SecretKey::from_bytes(&keypair.signing_key().to_bytes())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let private_pem = secret
            .to_sec1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Pem(e.to_string()))?;

        let public = PublicKey::from(keypair.signing_key().verifying_key());
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Pem(e.to_string()))?;

        write_file(&self.private_key_path(owner), private_pem.as_bytes())?;
        write_file(&self.public_key_path(owner), public_pem.as_bytes())?;
        Ok(())
    }

    /// Read the key pair for `owner` and check both files describe the same key.
    pub fn load(&self, owner: &str) -> Result<Secp256k1KeyPair, KeyStoreError> {
        let private_path = self.private_key_path(owner);
        let private_pem = read_file(&private_path)?;
        let secret =
            SecretKey::from_sec1_pem(&private_pem).map_err(|e| KeyStoreError::Malformed {
                path: private_path,
                reason: e.to_string(),
            })?;

        let public_path = self.public_key_path(owner);
        let public_pem = read_file(&public_path)?;
        let public =
            PublicKey::from_public_key_pem(&public_pem).map_err(|e| KeyStoreError::Malformed {
                path: public_path,
                reason: e.to_string(),
            })?;

        let keypair = Secp256k1KeyPair::from_signing_key(SigningKey::from(&secret));
        let stored = Secp256k1PublicKey::from_verifying_key(&VerifyingKey::from(&public));
        if keypair.public_key() != stored {
            return Err(KeyStoreError::Mismatch {
                owner: owner.to_string(),
            });
        }
        Ok(keypair)
    }

    /// Load `owner`'s key pair, generating and saving a fresh one if absent.
    pub fn load_or_generate(&self, owner: &str) -> Result<Secp256k1KeyPair, KeyStoreError> {
        if self.private_key_path(owner).exists() {
            return self.load(owner);
        }
        let keypair = Secp256k1KeyPair::generate();
        self.save(owner, &keypair)?;
        Ok(keypair)
    }

    /// Read only the public key for `owner`.
    pub fn load_public(&self, owner: &str) -> Result<Secp256k1PublicKey, KeyStoreError> {
        let path = self.public_key_path(owner);
        let pem = read_file(&path)?;
        let public = PublicKey::from_public_key_pem(&pem).map_err(|e| KeyStoreError::Malformed {
            path,
            reason: e.to_string(),
        })?;
        Ok(Secp256k1PublicKey::from_verifying_key(&VerifyingKey::from(
            &public,
        )))
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), KeyStoreError> {
    fs::write(path, contents).map_err(|source| KeyStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_file(path: &Path) -> Result<String, KeyStoreError> {
    fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
