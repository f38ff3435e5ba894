//! The backup pipeline (C13): files in, a set of printable frames out.
//!
//! Ties every lower layer together in the order spec'd for producing a paper document: build the
//! manifest and envelope, compress, generate or accept a passphrase, encrypt, derive the
//! document's id and hash from the ciphertext, sign an AUTH frame, chunk the ciphertext into MAIN
//! frames, and optionally Shamir-shard the passphrase and/or the signing seed into KEY frames.

use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Digest};
use rand_core::CryptoRngCore;
use tracing::instrument;

use crate::aead;
use crate::compression::{self, Algorithm};
use crate::envelope;
use crate::error::{Error, Result};
use crate::manifest::{Manifest, ManifestFile};
use crate::shamir::{self, ShardPayload};
use crate::signing::{self, AuthPayload};
use paperback_wire::{Frame, FrameType};

type Blake2b128 = Blake2b<U16>;
type Blake2b256 = Blake2b<U32>;

/// One input file to be backed up: its intended relative path, bytes, and optional mtime.
#[derive(Debug, Clone)]
pub struct InputFile {
	/// POSIX-relative path under which this file will be recorded in the manifest.
	pub relative_path: String,
	/// The file's raw bytes.
	pub data: Vec<u8>,
	/// Modification time in integer seconds, if known.
	pub mtime: Option<i64>,
}

/// How a secret (the passphrase, or the signing seed) is distributed across the document.
#[derive(Debug, Clone)]
pub enum SigningSeedMode {
	/// The signing seed travels inside the manifest, in the clear once decrypted.
	Embedded,
	/// The signing seed is Shamir-sharded into its own KEY frames and never embedded.
	Sharded(ShardingConfig),
}

/// A `(threshold, share_count)` pair for Shamir-sharding a secret.
#[derive(Debug, Clone, Copy)]
pub struct ShardingConfig {
	/// Minimum number of shares required to reconstruct the secret.
	pub threshold: u8,
	/// Total number of shares to produce.
	pub share_count: u8,
}

/// Document-level knobs controlling how a backup is sealed and sharded.
#[derive(Debug, Clone)]
pub struct DocumentPlan {
	/// Whether the manifest is marked sealed (no further shards may be added later).
	pub sealed: bool,
	/// If set, the passphrase itself is additionally Shamir-sharded into KEY frames.
	pub passphrase_sharding: Option<ShardingConfig>,
	/// Where the Ed25519 signing seed lives.
	pub signing_seed_mode: SigningSeedMode,
	/// Target size, in bytes, of each MAIN/KEY frame's payload.
	pub chunk_size: usize,
	/// Zstd compression level; ignored when `compress` is `false`.
	pub zstd_level: i32,
	/// Whether to zstd-compress the envelope before encryption.
	pub compress: bool,
}

impl Default for DocumentPlan {
	fn default() -> Self {
		DocumentPlan {
			sealed: true,
			passphrase_sharding: None,
			signing_seed_mode: SigningSeedMode::Embedded,
			chunk_size: 200,
			zstd_level: 19,
			compress: true,
		}
	}
}

/// Everything produced by [`build_backup`]: the frame sets ready to print, plus the bits needed
/// to tell the caller what they'll need to recover it.
#[derive(Debug, Clone)]
pub struct BackupOutput {
	/// 16-byte id derived from the final ciphertext (BLAKE2b-128).
	pub doc_id: [u8; 16],
	/// 32-byte hash derived from the final ciphertext (BLAKE2b-256), what signatures cover.
	pub doc_hash: [u8; 32],
	/// The final ciphertext (compressed envelope, AEAD-encrypted).
	pub ciphertext: Vec<u8>,
	/// The single AUTH frame covering this document.
	pub auth_frame: Frame,
	/// The MAIN frames carrying the chunked ciphertext, in order.
	pub main_frames: Vec<Frame>,
	/// KEY frames carrying passphrase shards, if `passphrase_sharding` was set.
	pub passphrase_shard_frames: Vec<Frame>,
	/// KEY frames carrying signing-seed shards, if the seed was sharded rather than embedded.
	pub signing_seed_shard_frames: Vec<Frame>,
	/// The passphrase actually used (generated, unless the caller supplied one).
	pub used_passphrase: String,
}

/// Build a complete backup document from `files` according to `plan`.
///
/// If `passphrase` is `None`, a fresh 24-word BIP-39 mnemonic is generated. `created_at` is
/// float seconds since the epoch, supplied by the caller (this module never reads the clock).
#[instrument(level = "trace", skip(files, rng, passphrase), fields(file_count = files.len()))]
pub fn build_backup<R: CryptoRngCore + ?Sized>(
	files: &[InputFile],
	plan: &DocumentPlan,
	created_at: f64,
	passphrase: Option<String>,
	rng: &mut R,
) -> Result<BackupOutput> {
	if files.is_empty() {
		return Err(Error::InvalidInput("a backup must contain at least one file"));
	}

	let (sign_seed, sign_pub) = signing::generate_keypair(rng);

	let embedded_seed = match &plan.signing_seed_mode {
		SigningSeedMode::Embedded => Some(sign_seed),
		SigningSeedMode::Sharded(_) => None,
	};

	let manifest_files: Vec<ManifestFile> = files
		.iter()
		.map(|f| ManifestFile::from_bytes(f.relative_path.clone(), &f.data, f.mtime))
		.collect::<Result<_>>()?;
	let manifest = Manifest::new(created_at, plan.sealed, embedded_seed, manifest_files)?;

	let file_bytes: Vec<&[u8]> = files.iter().map(|f| f.data.as_slice()).collect();
	let envelope_bytes = envelope::encode(&manifest, &file_bytes);

	let algo = if plan.compress { Algorithm::Zstd } else { Algorithm::None };
	let wrapped = compression::wrap(&envelope_bytes, algo, plan.zstd_level)?;

	let used_passphrase = match passphrase {
		Some(p) => p,
		None => aead::generate_passphrase(aead::DEFAULT_WORD_COUNTS, rng)?,
	};
	let ciphertext = aead::encrypt(&wrapped, &used_passphrase)?;

	let doc_id = blake2b128(&ciphertext);
	let doc_hash = blake2b256(&ciphertext);

	let auth_payload = AuthPayload::sign(&sign_seed, sign_pub, doc_hash);
	let auth_frame = Frame::new(FrameType::Auth, &doc_id, 0, 1, auth_payload.to_cbor(), true)?;

	let main_frames = crate::chunking::chunk_payload(&ciphertext, &doc_id, FrameType::MainDocument, plan.chunk_size)?;

	let passphrase_shard_frames = match &plan.passphrase_sharding {
		Some(cfg) => build_shard_frames(
			used_passphrase.as_bytes(),
			"passphrase",
			cfg,
			&sign_seed,
			sign_pub,
			doc_hash,
			&doc_id,
			rng,
		)?,
		None => Vec::new(),
	};

	let signing_seed_shard_frames = match &plan.signing_seed_mode {
		SigningSeedMode::Sharded(cfg) => {
			build_shard_frames(&sign_seed, "signing_seed", cfg, &sign_seed, sign_pub, doc_hash, &doc_id, rng)?
		}
		SigningSeedMode::Embedded => Vec::new(),
	};

	Ok(BackupOutput {
		doc_id,
		doc_hash,
		ciphertext,
		auth_frame,
		main_frames,
		passphrase_shard_frames,
		signing_seed_shard_frames,
		used_passphrase,
	})
}

#[allow(clippy::too_many_arguments)]
fn build_shard_frames<R: CryptoRngCore + ?Sized>(
	secret: &[u8],
	key_type: &str,
	cfg: &ShardingConfig,
	sign_seed: &[u8; 32],
	sign_pub: [u8; 32],
	doc_hash: [u8; 32],
	doc_id: &[u8; 16],
	rng: &mut R,
) -> Result<Vec<Frame>> {
	let shares = shamir::split_secret(secret, cfg.threshold, cfg.share_count, rng)?;
	let mut frames = Vec::with_capacity(shares.len());
	for share in shares {
		let index = share.index;
		let mut payload =
			ShardPayload::sign(sign_seed, sign_pub, doc_hash, cfg.threshold, cfg.share_count, secret.len() as u64, share);
		payload.key_type = key_type.to_string();
		// Re-sign since `key_type` isn't covered by the signature but we want a payload whose
		// fields are all set before serialization; the signature itself only covers doc_hash,
		// share_index, and share bytes, all already fixed above.
		let frame = Frame::new(FrameType::KeyDocument, doc_id, u64::from(index - 1), u64::from(cfg.share_count), payload.to_cbor(), true)?;
		frames.push(frame);
	}
	Ok(frames)
}

fn blake2b128(data: &[u8]) -> [u8; 16] {
	let mut hasher = Blake2b128::new();
	hasher.update(data);
	hasher.finalize().into()
}

fn blake2b256(data: &[u8]) -> [u8; 32] {
	let mut hasher = Blake2b256::new();
	hasher.update(data);
	hasher.finalize().into()
}
