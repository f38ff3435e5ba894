//! Error types shared by the wire-level codecs.

use thiserror::Error;

/// Convenience return type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Decode/encode errors for varints, frames, and paper-transport codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// A varint ran out of bytes before hitting a terminating octet.
	#[error("truncated varint")]
	TruncatedVarint,

	/// A varint's continuation bits implied a value wider than 64 bits.
	#[error("varint overflows u64")]
	OverflowVarint,

	/// A buffer ended before a structure (frame, length-prefixed field) was complete.
	#[error("truncated {0}")]
	Truncated(&'static str),

	/// The fixed 2-byte magic prefix didn't match what was expected.
	#[error("bad magic: expected {expected:?}, got {actual:?}")]
	BadMagic {
		/// Expected magic bytes.
		expected: [u8; 2],
		/// Magic bytes actually found.
		actual: [u8; 2],
	},

	/// The frame's trailing CRC-32 didn't match the computed one.
	#[error("frame CRC mismatch")]
	BadCrc,

	/// A declared length field didn't agree with how much data actually followed.
	#[error("length mismatch: {0}")]
	LengthMismatch(&'static str),

	/// A version tag isn't one this codec understands.
	#[error("unsupported version: {0}")]
	UnsupportedVersion(u64),

	/// `doc_id` wasn't exactly 16 bytes.
	#[error("doc_id must be 16 bytes, got {0}")]
	BadDocIdLength(usize),

	/// `index >= total` for a `total > 0` frame.
	#[error("frame index {index} >= total {total}")]
	IndexOutOfRange {
		/// The offending index.
		index: u64,
		/// The frame's declared total.
		total: u64,
	},

	/// A frame's `data` was empty when the caller required non-empty payloads.
	#[error("frame data cannot be empty")]
	EmptyData,

	/// Trailing bytes were found after a structure that should have consumed the whole buffer.
	#[error("trailing bytes after {0}")]
	TrailingBytes(&'static str),

	/// An unrecognised z-base-32 character (after stripping whitespace and `-`).
	#[error("invalid z-base-32 character: {0:?}")]
	InvalidZbase32Char(char),

	/// An unrecognised QR payload encoding name.
	#[error("unsupported QR payload encoding: {0}")]
	UnsupportedQrEncoding(String),

	/// Malformed base64 in a QR payload.
	#[error("invalid base64 QR payload")]
	InvalidBase64,

	/// A fallback-line encode was asked to respect a line count it couldn't fit in.
	#[error("fallback text exceeds line_count")]
	LineCountExceeded,

	/// Caller-side programming error (non-positive sizes, empty input where required, etc).
	#[error("invalid input: {0}")]
	InvalidInput(&'static str),
}
