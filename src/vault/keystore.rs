//! Encrypted wallet keystore
//!
//! Persists the wallet set in a versioned JSON file: public metadata in the
//! clear, private keys sealed with the derived vault key. The file is written
//! only by `create_wallets`; everything else is read-only.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::crypto;

const KEYSTORE_VERSION: &str = "1.0";

/// Public wallet metadata, safe to hand out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Sequence index, assigned at creation, stable forever
    pub id: u32,

    /// EIP-55 checksummed address derived from the signing key
    pub address: String,

    /// When the wallet was created
    pub created_at: DateTime<Utc>,
}

/// On-disk entry: public metadata plus the sealed signing key
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeystoreEntry {
    id: u32,
    address: String,
    /// base64 ChaCha20-Poly1305 nonce for this record
    nonce: String,
    /// base64 ciphertext of the 32-byte private key
    encrypted_secret: String,
    created_at: DateTime<Utc>,
}

/// Keystore file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeystoreFile {
    version: String,
    /// base64 random salt for key derivation
    salt: String,
    kdf_iterations: u32,
    wallets: Vec<KeystoreEntry>,
}

/// Short-lived signing context handed to platform capabilities.
///
/// Holds the decrypted signing key for the duration of a single capability
/// invocation; the key material is wiped when the context drops. Callers
/// never see the raw key bytes.
pub struct SigningContext {
    wallet_id: u32,
    address: String,
    signer: LocalWallet,
}

impl SigningContext {
    pub fn wallet_id(&self) -> u32 {
        self.wallet_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The wallet for signing. The key inside zeroizes on drop.
    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("wallet_id", &self.wallet_id)
            .field("address", &self.address)
            .finish()
    }
}

/// Credential vault over the encrypted keystore file
pub struct Vault {
    path: PathBuf,
    key: Zeroizing<[u8; 32]>,
    salt: [u8; crypto::SALT_LEN],
    kdf_iterations: u32,
    entries: Vec<KeystoreEntry>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open an existing keystore, or initialize an empty vault with a fresh
    /// random salt if none exists yet.
    ///
    /// Opening an existing keystore with the wrong master secret fails with
    /// `InvalidCredential` before anything is written; a malformed file fails
    /// with `VaultCorrupt`.
    pub fn open(path: &Path, master_secret: &str) -> Result<Self> {
        if !path.exists() {
            debug!("No keystore at {}, initializing empty vault", path.display());
            let salt = crypto::generate_salt();
            let key = crypto::derive_key(master_secret, &salt, crypto::KDF_ITERATIONS);
            return Ok(Self {
                path: path.to_path_buf(),
                key,
                salt,
                kdf_iterations: crypto::KDF_ITERATIONS,
                entries: Vec::new(),
            });
        }

        check_permissions(path);

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::VaultCorrupt(format!("failed to read keystore: {}", e)))?;
        let file: KeystoreFile = serde_json::from_str(&content)
            .map_err(|e| Error::VaultCorrupt(format!("failed to parse keystore: {}", e)))?;

        if file.version != KEYSTORE_VERSION {
            return Err(Error::VaultCorrupt(format!(
                "unsupported keystore version: {}",
                file.version
            )));
        }

        let salt_bytes = BASE64
            .decode(&file.salt)
            .map_err(|e| Error::VaultCorrupt(format!("invalid keystore salt: {}", e)))?;
        let salt: [u8; crypto::SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| Error::VaultCorrupt("invalid keystore salt length".to_string()))?;

        let key = crypto::derive_key(master_secret, &salt, file.kdf_iterations);

        let vault = Self {
            path: path.to_path_buf(),
            key,
            salt,
            kdf_iterations: file.kdf_iterations,
            entries: file.wallets,
        };

        // Probe the first record so a wrong master secret surfaces at open
        // time instead of mid-cycle.
        if let Some(first) = vault.entries.first() {
            let id = first.id;
            vault.decrypt_entry(id)?;
        }

        info!(
            "Opened keystore with {} wallets: {}",
            vault.entries.len(),
            path.display()
        );
        Ok(vault)
    }

    /// Generate `count` new wallets, seal their keys, and append them to the
    /// keystore. Returns public records only.
    pub fn create_wallets(&mut self, count: usize) -> Result<Vec<WalletRecord>> {
        if count == 0 {
            return Err(Error::InvalidWalletCount(0));
        }

        let mut created = Vec::with_capacity(count);
        let next_id = self.entries.len() as u32;

        for i in 0..count {
            let wallet = LocalWallet::new(&mut rand::thread_rng());
            let address = to_checksum(&wallet.address(), None);
            let secret = Zeroizing::new(wallet.signer().to_bytes().to_vec());

            let (ciphertext, nonce) = crypto::encrypt(&self.key, &secret)?;

            let entry = KeystoreEntry {
                id: next_id + i as u32,
                address: address.clone(),
                nonce: BASE64.encode(nonce),
                encrypted_secret: BASE64.encode(&ciphertext),
                created_at: Utc::now(),
            };

            info!("Created wallet {}/{}: {}", i + 1, count, address);
            created.push(WalletRecord {
                id: entry.id,
                address,
                created_at: entry.created_at,
            });
            self.entries.push(entry);
        }

        self.save()?;
        info!("Saved {} wallets to encrypted keystore", self.entries.len());

        Ok(created)
    }

    /// Public metadata for every wallet, in creation order
    pub fn list_wallets(&self) -> Vec<WalletRecord> {
        self.entries
            .iter()
            .map(|e| WalletRecord {
                id: e.id,
                address: e.address.clone(),
                created_at: e.created_at,
            })
            .collect()
    }

    pub fn wallet_count(&self) -> usize {
        self.entries.len()
    }

    /// Decrypt a wallet's signing key into a scoped context.
    ///
    /// The decrypted bytes live in a zeroizing buffer that is wiped before
    /// this returns; the resulting context wipes its own key on drop.
    pub fn load_signer(&self, id: u32) -> Result<SigningContext> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(Error::WalletNotFound(id))?;

        let secret = self.decrypt_entry(id)?;
        let signer = LocalWallet::from_bytes(&secret)
            .map_err(|e| Error::VaultCorrupt(format!("stored key for wallet {} invalid: {}", id, e)))?;

        Ok(SigningContext {
            wallet_id: id,
            address: entry.address.clone(),
            signer,
        })
    }

    fn decrypt_entry(&self, id: u32) -> Result<Zeroizing<Vec<u8>>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(Error::WalletNotFound(id))?;

        let nonce = BASE64
            .decode(&entry.nonce)
            .map_err(|e| Error::VaultCorrupt(format!("invalid nonce for wallet {}: {}", id, e)))?;
        let ciphertext = BASE64.decode(&entry.encrypted_secret).map_err(|e| {
            Error::VaultCorrupt(format!("invalid ciphertext for wallet {}: {}", id, e))
        })?;

        crypto::decrypt(&self.key, &nonce, &ciphertext)
    }

    fn save(&self) -> Result<()> {
        let file = KeystoreFile {
            version: KEYSTORE_VERSION.to_string(),
            salt: BASE64.encode(self.salt),
            kdf_iterations: self.kdf_iterations,
            wallets: self.entries.clone(),
        };

        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, json)?;

        // Keystore is operator-only, like any keypair file.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

fn check_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "Keystore {} has permissions {:o}; run 'chmod 600 {}'",
                    path.display(),
                    mode & 0o777,
                    path.display()
                );
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keystore_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("wallets.enc")
    }

    #[test]
    fn empty_vault_has_no_wallets() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(&keystore_path(&dir), "master").unwrap();
        assert_eq!(vault.wallet_count(), 0);
        assert!(vault.list_wallets().is_empty());
    }

    #[test]
    fn create_wallets_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = keystore_path(&dir);

        let mut vault = Vault::open(&path, "master").unwrap();
        let created = vault.create_wallets(3).unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[0].id, 0);
        assert_eq!(created[2].id, 2);

        let reloaded = Vault::open(&path, "master").unwrap();
        let listed = reloaded.list_wallets();
        assert_eq!(listed.len(), 3);
        for (a, b) in created.iter().zip(listed.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.address, b.address);
        }
    }

    #[test]
    fn list_wallets_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut vault = Vault::open(&keystore_path(&dir), "master").unwrap();
        vault.create_wallets(2).unwrap();

        let first: Vec<_> = vault.list_wallets().iter().map(|w| w.address.clone()).collect();
        let second: Vec<_> = vault.list_wallets().iter().map(|w| w.address.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_wallet_count_is_rejected() {
        let dir = tempdir().unwrap();
        let mut vault = Vault::open(&keystore_path(&dir), "master").unwrap();
        let err = vault.create_wallets(0).unwrap_err();
        assert!(matches!(err, Error::InvalidWalletCount(0)));
    }

    #[test]
    fn signer_address_matches_record() {
        let dir = tempdir().unwrap();
        let mut vault = Vault::open(&keystore_path(&dir), "master").unwrap();
        let created = vault.create_wallets(1).unwrap();

        let ctx = vault.load_signer(0).unwrap();
        assert_eq!(ctx.wallet_id(), 0);
        assert_eq!(ctx.address(), created[0].address);
        assert_eq!(to_checksum(&ctx.signer().address(), None), created[0].address);
    }

    #[test]
    fn wrong_master_secret_fails_with_invalid_credential() {
        let dir = tempdir().unwrap();
        let path = keystore_path(&dir);

        let mut vault = Vault::open(&path, "master").unwrap();
        vault.create_wallets(1).unwrap();

        let err = Vault::open(&path, "not-the-master").unwrap_err();
        assert!(matches!(err, Error::InvalidCredential(_)));
    }

    #[test]
    fn malformed_keystore_fails_with_vault_corrupt() {
        let dir = tempdir().unwrap();
        let path = keystore_path(&dir);
        std::fs::write(&path, "{ not json").unwrap();

        let err = Vault::open(&path, "master").unwrap_err();
        assert!(matches!(err, Error::VaultCorrupt(_)));
    }

    #[test]
    fn unknown_wallet_id_is_reported() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(&keystore_path(&dir), "master").unwrap();
        let err = vault.load_signer(42).unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(42)));
    }
}
