//! The compression wrapper (C6): an optional zstd layer between the envelope and the cipher.
//!
//! Even when compression is disabled, the wrapper header is always present, so every ciphertext
//! input is preceded by a known, self-describing prefix.

use tracing::instrument;

use crate::error::{Error, Result};
use paperback_wire::varint;

/// Fixed 2-byte magic prefixing every compression wrapper.
pub const MAGIC: [u8; 2] = *b"AZ";

/// Compression wrapper wire version this codec emits and expects.
pub const VERSION: u64 = 1;

/// Which compression algorithm, if any, was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
	/// No compression; `data` is the raw bytes.
	None,
	/// Zstandard.
	Zstd,
}

impl Algorithm {
	fn to_id(self) -> u64 {
		match self {
			Algorithm::None => 0,
			Algorithm::Zstd => 1,
		}
	}

	fn from_id(id: u64) -> Result<Self> {
		match id {
			0 => Ok(Algorithm::None),
			1 => Ok(Algorithm::Zstd),
			_ => Err(Error::UnsupportedVersion(id)),
		}
	}
}

/// Wrap bytes, optionally compressing them with zstd.
///
/// `"AZ" · varint(version) · varint(algo_id) · varint(raw_len) · varint(data_len) · data`
#[instrument(level = "trace", skip(raw))]
pub fn wrap(raw: &[u8], algo: Algorithm, zstd_level: i32) -> Result<Vec<u8>> {
	let data = match algo {
		Algorithm::None => raw.to_vec(),
		Algorithm::Zstd => zstd::bulk::compress(raw, zstd_level).map_err(|_| Error::InvalidInput("zstd compression failed"))?,
	};

	let mut out = Vec::with_capacity(2 + data.len() + 20);
	out.extend_from_slice(&MAGIC);
	varint::encode_into(VERSION, &mut out);
	varint::encode_into(algo.to_id(), &mut out);
	varint::encode_into(raw.len() as u64, &mut out);
	varint::encode_into(data.len() as u64, &mut out);
	out.extend_from_slice(&data);
	Ok(out)
}

/// Unwrap a compression wrapper back to the original bytes.
#[instrument(level = "trace", skip(bytes))]
pub fn unwrap(bytes: &[u8]) -> Result<Vec<u8>> {
	if bytes.len() < 2 || bytes[0..2] != MAGIC {
		let actual = bytes.get(0..2).unwrap_or(bytes).to_vec();
		return Err(Error::BadMagic { expected: MAGIC, actual });
	}

	let mut offset = 2;
	let (version, next) = varint::decode(bytes, offset)?;
	offset = next;
	if version != VERSION {
		return Err(Error::UnsupportedVersion(version));
	}

	let (algo_id, next) = varint::decode(bytes, offset)?;
	offset = next;
	let algo = Algorithm::from_id(algo_id)?;

	let (raw_len, next) = varint::decode(bytes, offset)?;
	offset = next;
	let raw_len = raw_len as usize;

	let (data_len, next) = varint::decode(bytes, offset)?;
	offset = next;
	let data_len = data_len as usize;

	if algo == Algorithm::None && data_len != raw_len {
		return Err(Error::LengthMismatch("raw_len must equal data_len when algo=none"));
	}

	let data_end = offset.checked_add(data_len).ok_or(Error::LengthMismatch("data length overflow"))?;
	if data_end != bytes.len() {
		return Err(Error::LengthMismatch("data_len vs remaining bytes"));
	}
	let data = &bytes[offset..data_end];

	match algo {
		Algorithm::None => Ok(data.to_vec()),
		Algorithm::Zstd => {
			let decoded = zstd::bulk::decompress(data, raw_len).map_err(|_| Error::InvalidInput("zstd decompression failed"))?;
			if decoded.len() != raw_len {
				return Err(Error::LengthMismatch("decompressed length did not match raw_len"));
			}
			Ok(decoded)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn round_trips_uncompressed() {
		let data = b"hello world".to_vec();
		let wrapped = wrap(&data, Algorithm::None, 0).unwrap();
		assert_eq!(unwrap(&wrapped).unwrap(), data);
	}

	#[test]
	fn round_trips_zstd() {
		let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
		let wrapped = wrap(&data, Algorithm::Zstd, 3).unwrap();
		assert_eq!(unwrap(&wrapped).unwrap(), data);
	}

	#[test]
	fn rejects_bad_magic() {
		let data = b"x".to_vec();
		let mut wrapped = wrap(&data, Algorithm::None, 0).unwrap();
		wrapped[0] = b'?';
		assert!(matches!(unwrap(&wrapped), Err(Error::BadMagic { .. })));
	}

	#[test]
	fn none_algo_requires_raw_len_eq_data_len() {
		// Hand-craft a header claiming algo=none with mismatched lengths.
		let mut buf = Vec::new();
		buf.extend_from_slice(&MAGIC);
		paperback_wire::varint::encode_into(VERSION, &mut buf);
		paperback_wire::varint::encode_into(0, &mut buf);
		paperback_wire::varint::encode_into(5, &mut buf);
		paperback_wire::varint::encode_into(1, &mut buf);
		buf.push(b'a');
		assert!(matches!(unwrap(&buf), Err(Error::LengthMismatch(_))));
	}

	proptest! {
		#[test]
		fn round_trip_arbitrary_uncompressed(data in proptest::collection::vec(any::<u8>(), 0..256)) {
			let wrapped = wrap(&data, Algorithm::None, 0).unwrap();
			prop_assert_eq!(unwrap(&wrapped).unwrap(), data);
		}
	}
}
