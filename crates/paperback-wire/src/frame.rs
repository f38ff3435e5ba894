//! The self-describing frame codec (C3).
//!
//! A frame is the unit that gets printed on paper, one per QR code: a small magic, a version, a
//! type byte, the 16-byte id of the document it belongs to, its position among siblings, its
//! payload, and a CRC-32 covering everything before it. Frames are otherwise anonymous — nothing
//! about envelope, compression, or encryption lives at this layer.

use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::varint;

/// Fixed 2-byte magic prefixing every frame.
pub const MAGIC: [u8; 2] = *b"AP";

/// Frame wire version this codec emits and expects.
pub const VERSION: u64 = 1;

/// `doc_id` is always 16 bytes (BLAKE2b-128 of the document's ciphertext).
pub const DOC_ID_LEN: usize = 16;

/// What kind of payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
	/// A chunk of the main encrypted/compressed envelope payload ("D").
	MainDocument,
	/// A Shamir share of the passphrase or signing seed, carried as a `ShardPayload` ("K").
	KeyDocument,
	/// An authentication payload: `(doc_hash, sign_pub, signature)` ("A").
	Auth,
	/// Reserved: accepted by the source's enum but never emitted by the passphrase pipeline.
	Checksum,
	/// Reserved: the legacy manifest-carrying frame type. Never emitted; decode recognises it
	/// only so old documents don't produce a confusing "unknown frame type" error.
	LegacyManifest,
}

const TYPE_MAIN_DOCUMENT: u8 = 0x44;
const TYPE_KEY_DOCUMENT: u8 = 0x4B;
const TYPE_CHECKSUM: u8 = 0x43;
const TYPE_LEGACY_MANIFEST: u8 = 0x4D;
const TYPE_AUTH: u8 = 0x41;

impl FrameType {
	fn as_byte(self) -> u8 {
		match self {
			FrameType::MainDocument => TYPE_MAIN_DOCUMENT,
			FrameType::KeyDocument => TYPE_KEY_DOCUMENT,
			FrameType::Auth => TYPE_AUTH,
			FrameType::Checksum => TYPE_CHECKSUM,
			FrameType::LegacyManifest => TYPE_LEGACY_MANIFEST,
		}
	}

	fn from_byte(byte: u8) -> Option<Self> {
		match byte {
			TYPE_MAIN_DOCUMENT => Some(FrameType::MainDocument),
			TYPE_KEY_DOCUMENT => Some(FrameType::KeyDocument),
			TYPE_AUTH => Some(FrameType::Auth),
			TYPE_CHECKSUM => Some(FrameType::Checksum),
			TYPE_LEGACY_MANIFEST => Some(FrameType::LegacyManifest),
			_ => None,
		}
	}
}

/// One frame: a self-contained, CRC-checked, position-aware chunk of paper-backup data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	/// What this frame carries.
	pub frame_type: FrameType,
	/// The 16-byte id of the document this frame belongs to.
	pub doc_id: [u8; DOC_ID_LEN],
	/// Zero-based position among sibling frames of the same `(doc_id, frame_type)`.
	pub index: u64,
	/// Total number of sibling frames of the same `(doc_id, frame_type)`.
	pub total: u64,
	/// The payload bytes.
	pub data: Vec<u8>,
}

impl Frame {
	/// Build a new frame, validating `doc_id` length and `index < total`.
	///
	/// `allow_empty` controls whether an empty `data` is accepted: the encode side is permissive
	/// by default (callers should pass `true`), while [`Frame::decode`] always enforces the strict
	/// `allow_empty=false` behavior regardless of what the encoder produced.
	pub fn new(frame_type: FrameType, doc_id: &[u8], index: u64, total: u64, data: Vec<u8>, allow_empty: bool) -> Result<Self> {
		if doc_id.len() != DOC_ID_LEN {
			return Err(Error::BadDocIdLength(doc_id.len()));
		}
		if total == 0 || index >= total {
			return Err(Error::IndexOutOfRange { index, total });
		}
		if !allow_empty && data.is_empty() {
			return Err(Error::EmptyData);
		}
		let mut id = [0u8; DOC_ID_LEN];
		id.copy_from_slice(doc_id);
		Ok(Frame { frame_type, doc_id: id, index, total, data })
	}

	/// Serialize this frame: `magic · version · type · doc_id · index · total · data_len · data · crc32`.
	///
	/// The CRC-32 is big-endian and covers every byte preceding it.
	#[instrument(level = "trace", skip(self))]
	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(32 + self.data.len());
		out.extend_from_slice(&MAGIC);
		varint::encode_into(VERSION, &mut out);
		out.push(self.frame_type.as_byte());
		out.extend_from_slice(&self.doc_id);
		varint::encode_into(self.index, &mut out);
		varint::encode_into(self.total, &mut out);
		varint::encode_into(self.data.len() as u64, &mut out);
		out.extend_from_slice(&self.data);

		let crc = crc32fast::hash(&out);
		out.extend_from_slice(&crc.to_be_bytes());
		trace!(bytes = out.len(), "encoded frame");
		out
	}

	/// Parse a frame from a complete byte buffer (no trailing bytes allowed).
	#[instrument(level = "trace", skip(buf))]
	pub fn decode(buf: &[u8]) -> Result<Self> {
		if buf.len() < 4 {
			return Err(Error::Truncated("frame header"));
		}
		if buf[0..2] != MAGIC {
			let mut actual = [0u8; 2];
			actual.copy_from_slice(&buf[0..2]);
			return Err(Error::BadMagic { expected: MAGIC, actual });
		}
		if buf.len() < 4 {
			return Err(Error::Truncated("frame CRC"));
		}
		let crc_at = buf.len() - 4;
		let declared_crc = u32::from_be_bytes([buf[crc_at], buf[crc_at + 1], buf[crc_at + 2], buf[crc_at + 3]]);
		let computed_crc = crc32fast::hash(&buf[..crc_at]);
		if declared_crc != computed_crc {
			return Err(Error::BadCrc);
		}

		let mut offset = 2;
		let (version, next) = varint::decode(buf, offset)?;
		offset = next;
		if version != VERSION {
			return Err(Error::UnsupportedVersion(version));
		}

		let type_byte = *buf.get(offset).ok_or(Error::Truncated("frame type"))?;
		offset += 1;
		let frame_type = FrameType::from_byte(type_byte).ok_or(Error::Truncated("frame type"))?;

		if offset + DOC_ID_LEN > crc_at {
			return Err(Error::Truncated("doc_id"));
		}
		let mut doc_id = [0u8; DOC_ID_LEN];
		doc_id.copy_from_slice(&buf[offset..offset + DOC_ID_LEN]);
		offset += DOC_ID_LEN;

		let (index, next) = varint::decode(buf, offset)?;
		offset = next;
		let (total, next) = varint::decode(buf, offset)?;
		offset = next;
		if total == 0 || index >= total {
			return Err(Error::IndexOutOfRange { index, total });
		}

		let (data_len, next) = varint::decode(buf, offset)?;
		offset = next;
		let data_len = data_len as usize;

		if offset + data_len != crc_at {
			return Err(Error::LengthMismatch("data_len vs remaining bytes before CRC"));
		}
		let data = buf[offset..offset + data_len].to_vec();
		if data.is_empty() {
			return Err(Error::EmptyData);
		}

		Ok(Frame { frame_type, doc_id, index, total, data })
	}
}
