//! Error types for the manifest/envelope/signing/sharding/pipeline layers.

use thiserror::Error;

/// Convenience return type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every fallible outcome the core can produce, matched one-to-one against a distinct cause.
#[derive(Error, Debug)]
pub enum Error {
	/// A lower-level framing error (varint, frame, z-base-32, QR payload, fallback text).
	#[error(transparent)]
	Wire(#[from] paperback_wire::Error),

	/// Input ended mid-structure (envelope, compression wrapper, CBOR body).
	#[error("truncated {0}")]
	Truncated(&'static str),

	/// Wrong 2-byte magic at an envelope or compression boundary.
	#[error("bad magic: expected {expected:?}, got {actual:?}")]
	BadMagic {
		/// Expected magic bytes.
		expected: [u8; 2],
		/// Magic bytes actually found.
		actual: Vec<u8>,
	},

	/// A version tag isn't one this codec understands.
	#[error("unsupported version: {0}")]
	UnsupportedVersion(u64),

	/// A declared length disagrees with the remainder of the buffer.
	#[error("length mismatch: {0}")]
	LengthMismatch(&'static str),

	/// Same `(frame_type, doc_id, index)` seen twice with conflicting bytes, or a duplicate
	/// relative path within a manifest.
	#[error("duplicate key: {0}")]
	DuplicateKey(&'static str),

	/// Reassembly saw fewer than `total` distinct frames.
	#[error("missing frame(s): have {have}, need {need}")]
	MissingFrame {
		/// Frames actually present.
		have: usize,
		/// Frames required.
		need: usize,
	},

	/// Fewer than `threshold` distinct Shamir share indices were available.
	#[error("insufficient shards: have {have}, need {need}")]
	ShardInsufficient {
		/// Distinct share indices actually present.
		have: usize,
		/// Threshold required.
		need: usize,
	},

	/// An Ed25519 AUTH or shard signature failed to verify.
	#[error("signature invalid")]
	SignatureInvalid,

	/// A file's recovered bytes don't hash to its manifest-declared SHA-256.
	#[error("hash mismatch for {0:?}")]
	HashMismatch(String),

	/// AEAD decryption failed: wrong passphrase, truncated, or tampered ciphertext.
	#[error("decryption failed")]
	DecryptionFailed,

	/// Recovery has neither a caller-supplied passphrase nor a decodable KEY-frame quorum.
	#[error("passphrase required")]
	PassphraseRequired,

	/// Caller-side programming error: bad sizes, empty required input, invalid paths, etc.
	#[error("invalid input: {0}")]
	InvalidInput(&'static str),

	/// A manifest file path escaped its intended containment (`..`, absolute, or empty).
	#[error("invalid relative path: {0:?}")]
	InvalidPath(String),

	/// A CBOR structure didn't decode to the fixed shape a payload type expects.
	#[error("cbor decode error: {0}")]
	Cbor(String),
}
