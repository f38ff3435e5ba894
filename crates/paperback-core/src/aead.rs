//! Passphrase-based authenticated encryption (C12), treated as an opaque primitive.
//!
//! Implemented over `age`'s scrypt passphrase recipient, so a document produced here stays
//! compatible with any other age-v1-aware tool if the caller ever needs that. Decryption
//! collapses every failure mode (wrong passphrase, truncation, tamper) into one
//! [`Error::DecryptionFailed`](crate::Error::DecryptionFailed), per the opaque-primitive contract.

use std::io::{Read, Write};

use age::secrecy::Secret;
use bip39::{Language, Mnemonic};
use rand_core::CryptoRngCore;
use tracing::instrument;

use crate::error::{Error, Result};

/// Valid BIP-39 mnemonic word counts for passphrase generation.
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Default word count when the caller doesn't specify one.
pub const DEFAULT_WORD_COUNTS: usize = 24;

/// Encrypt `plaintext` under `passphrase`. The result is self-describing (an age-v1 file).
#[instrument(level = "trace", skip(plaintext, passphrase))]
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
	let encryptor = age::Encryptor::with_user_passphrase(Secret::new(passphrase.to_string()));
	let mut out = Vec::new();
	let mut writer = encryptor
		.wrap_output(&mut out)
		.map_err(|_| Error::InvalidInput("age encryption setup failed"))?;
	writer.write_all(plaintext).map_err(|_| Error::InvalidInput("age encryption write failed"))?;
	writer.finish().map_err(|_| Error::InvalidInput("age encryption finalize failed"))?;
	Ok(out)
}

/// Decrypt `ciphertext` under `passphrase`.
///
/// Any failure — wrong passphrase, truncated input, or tampered bytes — is reported uniformly as
/// [`Error::DecryptionFailed`]; the caller cannot distinguish the cause, by design.
#[instrument(level = "trace", skip(ciphertext, passphrase))]
pub fn decrypt(ciphertext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
	let decryptor = age::Decryptor::new(ciphertext).map_err(|_| Error::DecryptionFailed)?;
	let age::Decryptor::Passphrase(decryptor) = decryptor else {
		return Err(Error::DecryptionFailed);
	};

	let mut reader = decryptor
		.decrypt(&Secret::new(passphrase.to_string()), None)
		.map_err(|_| Error::DecryptionFailed)?;
	let mut out = Vec::new();
	reader.read_to_end(&mut out).map_err(|_| Error::DecryptionFailed)?;
	Ok(out)
}

/// Generate a BIP-39 English mnemonic passphrase from the platform CSPRNG (or an injected one).
///
/// `word_count` must be one of [`VALID_WORD_COUNTS`].
#[instrument(level = "trace", skip(rng))]
pub fn generate_passphrase<R: CryptoRngCore + ?Sized>(word_count: usize, rng: &mut R) -> Result<String> {
	if !VALID_WORD_COUNTS.contains(&word_count) {
		return Err(Error::InvalidInput("word_count must be one of {12,15,18,21,24}"));
	}

	// Entropy length in bytes is word_count * 11 / 8 bits, rounded per the BIP-39 table.
	let entropy_bytes = match word_count {
		12 => 16,
		15 => 20,
		18 => 24,
		21 => 28,
		24 => 32,
		_ => unreachable!("validated above"),
	};
	let mut entropy = vec![0u8; entropy_bytes];
	rng.fill_bytes(&mut entropy);

	let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy).map_err(|_| Error::InvalidInput("bip39 entropy length invalid"))?;
	Ok(mnemonic.to_string())
}
