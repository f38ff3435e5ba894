//! The envelope container (C5): a manifest plus the concatenated bytes of every file it describes.

use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use paperback_wire::varint;

/// Fixed 2-byte magic prefixing every envelope.
pub const MAGIC: [u8; 2] = *b"AY";

/// Envelope wire version this codec emits and expects.
pub const VERSION: u64 = 1;

/// Build an envelope from a manifest and the per-file byte slices, in manifest order.
///
/// `"AY" · varint(version) · varint(len(manifest_bytes)) · manifest_bytes · varint(len(payload)) · payload`
#[instrument(level = "trace", skip(manifest, file_bytes))]
pub fn encode(manifest: &Manifest, file_bytes: &[&[u8]]) -> Vec<u8> {
	let manifest_bytes = manifest.to_cbor();
	let payload: Vec<u8> = file_bytes.iter().flat_map(|b| b.iter().copied()).collect();

	let mut out = Vec::with_capacity(2 + manifest_bytes.len() + payload.len() + 20);
	out.extend_from_slice(&MAGIC);
	varint::encode_into(VERSION, &mut out);
	varint::encode_into(manifest_bytes.len() as u64, &mut out);
	out.extend_from_slice(&manifest_bytes);
	varint::encode_into(payload.len() as u64, &mut out);
	out.extend_from_slice(&payload);
	out
}

/// Parse an envelope into its manifest and the raw concatenated payload.
#[instrument(level = "trace", skip(bytes))]
pub fn decode(bytes: &[u8]) -> Result<(Manifest, Vec<u8>)> {
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

	let (manifest_len, next) = varint::decode(bytes, offset)?;
	offset = next;
	let manifest_len = manifest_len as usize;
	let manifest_end = offset.checked_add(manifest_len).ok_or(Error::LengthMismatch("manifest length overflow"))?;
	if manifest_end > bytes.len() {
		return Err(Error::Truncated("manifest"));
	}
	let manifest = Manifest::from_cbor(&bytes[offset..manifest_end])?;
	offset = manifest_end;

	let (payload_len, next) = varint::decode(bytes, offset)?;
	offset = next;
	let payload_len = payload_len as usize;
	let payload_end = offset.checked_add(payload_len).ok_or(Error::LengthMismatch("payload length overflow"))?;
	if payload_end != bytes.len() {
		return Err(Error::LengthMismatch("payload length vs remaining bytes"));
	}
	let payload = bytes[offset..payload_end].to_vec();

	Ok((manifest, payload))
}

/// Slice the envelope payload back into per-file bytes, verifying each file's SHA-256.
///
/// Fails hard on the first hash mismatch; the total slice length must equal `payload.len()`.
#[instrument(level = "trace", skip(manifest, payload))]
pub fn extract_payloads(manifest: &Manifest, payload: &[u8]) -> Result<Vec<(crate::manifest::ManifestFile, Vec<u8>)>> {
	let mut out = Vec::with_capacity(manifest.files.len());
	let mut offset = 0usize;

	for file in &manifest.files {
		let size = file.size as usize;
		let end = offset.checked_add(size).ok_or(Error::LengthMismatch("file size overflow"))?;
		if end > payload.len() {
			return Err(Error::Truncated("envelope payload"));
		}
		let slice = &payload[offset..end];

		let mut hasher = Sha256::new();
		hasher.update(slice);
		let digest: [u8; 32] = hasher.finalize().into();
		if digest != file.sha256 {
			return Err(Error::HashMismatch(file.path.clone()));
		}

		out.push((file.clone(), slice.to_vec()));
		offset = end;
	}

	if offset != payload.len() {
		return Err(Error::LengthMismatch("payload has bytes beyond the last file"));
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manifest::ManifestFile;
	use proptest::prelude::*;

	fn manifest_with(files_and_data: &[(&str, &[u8])]) -> (Manifest, Vec<&[u8]>) {
		let files: Vec<ManifestFile> =
			files_and_data.iter().map(|(p, d)| ManifestFile::from_bytes(*p, d, None).unwrap()).collect();
		let manifest = Manifest::new(0, false, None, files).unwrap();
		let data: Vec<&[u8]> = files_and_data.iter().map(|(_, d)| *d).collect();
		(manifest, data)
	}

	#[test]
	fn round_trips_and_extracts() {
		let (manifest, data) = manifest_with(&[("a.txt", b"A"), ("b.txt", b"BB")]);
		let encoded = encode(&manifest, &data);
		let (decoded_manifest, payload) = decode(&encoded).unwrap();
		let extracted = extract_payloads(&decoded_manifest, &payload).unwrap();
		assert_eq!(extracted[0].1, b"A");
		assert_eq!(extracted[1].1, b"BB");
	}

	#[test]
	fn rejects_bad_magic() {
		let (manifest, data) = manifest_with(&[("a.txt", b"A")]);
		let mut encoded = encode(&manifest, &data);
		encoded[0] = b'X';
		assert!(matches!(decode(&encoded), Err(Error::BadMagic { .. })));
	}

	#[test]
	fn rejects_trailing_garbage() {
		let (manifest, data) = manifest_with(&[("a.txt", b"A")]);
		let mut encoded = encode(&manifest, &data);
		encoded.push(0xFF);
		assert!(matches!(decode(&encoded), Err(Error::LengthMismatch(_))));
	}

	#[test]
	fn extract_fails_hard_on_hash_mismatch() {
		let (manifest, data) = manifest_with(&[("a.txt", b"A")]);
		let encoded = encode(&manifest, &data);
		let (decoded_manifest, mut payload) = decode(&encoded).unwrap();
		payload[0] ^= 0xFF;
		assert!(matches!(extract_payloads(&decoded_manifest, &payload), Err(Error::HashMismatch(_))));
	}

	proptest! {
		#[test]
		fn round_trip_arbitrary(data in proptest::collection::vec(any::<u8>(), 1..64)) {
			let files = vec![ManifestFile::from_bytes("f.bin", &data, None).unwrap()];
			let manifest = Manifest::new(0, false, None, files).unwrap();
			let encoded = encode(&manifest, &[&data]);
			let (decoded_manifest, payload) = decode(&encoded).unwrap();
			let extracted = extract_payloads(&decoded_manifest, &payload).unwrap();
			prop_assert_eq!(&extracted[0].1, &data);
		}
	}
}
