//! Balanced chunking and reassembly (C7): split a byte string into a frame-sized grid and back.

use tracing::instrument;

use crate::error::{Error, Result};
use paperback_wire::{Frame, FrameType};

/// Split `payload` into frames of `frame_type` belonging to `doc_id`, each at most `chunk_size`
/// bytes and differing in size from any other by at most one byte.
#[instrument(level = "trace", skip(payload))]
pub fn chunk_payload(payload: &[u8], doc_id: &[u8], frame_type: FrameType, chunk_size: usize) -> Result<Vec<Frame>> {
	if payload.is_empty() {
		return Err(Error::InvalidInput("payload cannot be empty"));
	}
	if chunk_size == 0 {
		return Err(Error::InvalidInput("chunk_size must be positive"));
	}

	let total = payload.len().div_ceil(chunk_size) as u64;
	let base = payload.len() as u64 / total;
	let remainder = payload.len() as u64 % total;

	let mut frames = Vec::with_capacity(total as usize);
	let mut offset = 0usize;
	for idx in 0..total {
		let size = (base + u64::from(idx < remainder)) as usize;
		let end = offset + size;
		let frame = Frame::new(frame_type, doc_id, idx, total, payload[offset..end].to_vec(), true)?;
		frames.push(frame);
		offset = end;
	}

	Ok(frames)
}

/// Reassemble a complete set of frames (in any order) into the original byte string.
///
/// All frames must share `doc_id`, `frame_type`, and `total` (taken from the first frame unless
/// overridden); a duplicate `index` with differing bytes is fatal; the count must equal `total`.
#[instrument(level = "trace", skip(frames))]
pub fn reassemble_payload(
	frames: &[Frame],
	expected_doc_id: Option<&[u8; 16]>,
	expected_frame_type: Option<FrameType>,
) -> Result<Vec<u8>> {
	let first = frames.first().ok_or(Error::MissingFrame { have: 0, need: 1 })?;

	let doc_id = expected_doc_id.unwrap_or(&first.doc_id);
	let frame_type = expected_frame_type.unwrap_or(first.frame_type);
	let total = first.total;

	let mut seen: std::collections::HashMap<u64, &Frame> = std::collections::HashMap::new();
	for frame in frames {
		if &frame.doc_id != doc_id || frame.frame_type != frame_type || frame.total != total {
			return Err(Error::InvalidInput("frame does not match doc_id/frame_type/total of the set"));
		}
		match seen.get(&frame.index) {
			Some(existing) if existing.data != frame.data => {
				return Err(Error::DuplicateKey("conflicting frame data at same index"));
			}
			_ => {
				seen.insert(frame.index, frame);
			}
		}
	}

	if seen.len() as u64 != total {
		return Err(Error::MissingFrame { have: seen.len(), need: total as usize });
	}

	let mut out = Vec::new();
	for idx in 0..total {
		out.extend_from_slice(&seen[&idx].data);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn doc_id() -> [u8; 16] {
		let mut id = [0u8; 16];
		for (i, b) in id.iter_mut().enumerate() {
			*b = i as u8;
		}
		id
	}

	#[test]
	fn round_trips() {
		let payload = b"a payload that is split into several frames of roughly equal size".to_vec();
		let frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 10).unwrap();
		let reassembled = reassemble_payload(&frames, None, None).unwrap();
		assert_eq!(reassembled, payload);
	}

	#[test]
	fn frame_sizes_differ_by_at_most_one_byte() {
		let payload = vec![0u8; 103];
		let frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 10).unwrap();
		let min = frames.iter().map(|f| f.data.len()).min().unwrap();
		let max = frames.iter().map(|f| f.data.len()).max().unwrap();
		assert!(max - min <= 1);
		assert!(frames.iter().all(|f| f.data.len() <= 10));
	}

	#[test]
	fn order_invariant_reassembly() {
		let payload = b"order does not matter for reassembly".to_vec();
		let mut frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 6).unwrap();
		frames.reverse();
		assert_eq!(reassemble_payload(&frames, None, None).unwrap(), payload);
	}

	#[test]
	fn missing_frame_is_detected() {
		let payload = b"needs every frame present to reassemble".to_vec();
		let mut frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 6).unwrap();
		frames.pop();
		assert!(matches!(reassemble_payload(&frames, None, None), Err(Error::MissingFrame { .. })));
	}

	#[test]
	fn conflicting_duplicate_is_fatal() {
		let payload = b"duplicate detection must catch tampering".to_vec();
		let frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 6).unwrap();
		let mut tampered = frames[0].clone();
		tampered.data[0] ^= 0xFF;
		let mut set = frames.clone();
		set.push(tampered);
		assert!(matches!(reassemble_payload(&set, None, None), Err(Error::DuplicateKey(_))));
	}

	#[test]
	fn identical_duplicate_is_accepted() {
		let payload = b"identical duplicates are silently dropped".to_vec();
		let frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, 6).unwrap();
		let mut set = frames.clone();
		set.push(frames[0].clone());
		assert_eq!(reassemble_payload(&set, None, None).unwrap(), payload);
	}

	proptest! {
		#[test]
		fn round_trip_arbitrary(
			payload in proptest::collection::vec(any::<u8>(), 1..500),
			chunk_size in 1usize..64,
		) {
			let frames = chunk_payload(&payload, &doc_id(), FrameType::MainDocument, chunk_size).unwrap();
			for f in &frames {
				prop_assert!(f.data.len() <= chunk_size);
			}
			let min = frames.iter().map(|f| f.data.len()).min().unwrap();
			let max = frames.iter().map(|f| f.data.len()).max().unwrap();
			prop_assert!(max - min <= 1);
			let reassembled = reassemble_payload(&frames, None, None).unwrap();
			prop_assert_eq!(reassembled, payload);
		}
	}
}
