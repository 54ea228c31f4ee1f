//! Credential vault
//!
//! Holds the encrypted wallet set and performs key derivation and
//! decrypt-on-use signing. Private keys exist in cleartext only inside a
//! scoped [`SigningContext`], never in the keystore file and never in any
//! value handed to callers.

pub mod crypto;
pub mod keystore;

pub use keystore::{SigningContext, Vault, WalletRecord};
