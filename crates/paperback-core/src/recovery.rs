//! The recovery pipeline (C14): scanned candidates in, verified files out.
//!
//! Mirrors [`backup`](crate::backup) in reverse, but tolerant of the mess a real scan produces:
//! frames arrive out of order, duplicated, or garbled, and the caller may be missing the AUTH
//! frame (rescue mode) or need to recover the passphrase from a Shamir quorum instead of typing
//! it in.

use std::collections::HashMap;

use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Digest};
use tracing::{instrument, warn};

use crate::chunking;
use crate::compression;
use crate::envelope;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use crate::shamir::{self, ShardPayload};
use crate::signing::AuthPayload;
use paperback_wire::fallback::{self, FallbackConfig};
use paperback_wire::qr_payload::{self, QrEncoding};
use paperback_wire::{Frame, FrameType};

type Blake2b128 = Blake2b<U16>;
type Blake2b256 = Blake2b<U32>;

/// How a scanned candidate was presented, so Stage A knows which codec to try.
#[derive(Debug, Clone)]
pub enum Candidate {
	/// A QR code's raw payload bytes, in the given presentation encoding.
	Qr { encoding: QrEncoding, payload: Vec<u8> },
	/// A block of fallback text lines (one recovery document section).
	FallbackLines(Vec<String>),
}

/// Whether the recovered document's authenticity could be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
	/// An AUTH frame was present and its signature verified.
	Verified,
	/// No AUTH frame was found, but the caller explicitly allowed this (`rescue_mode`).
	MissingAllowed,
	/// An AUTH frame was present but its signature did not verify.
	Invalid,
}

/// The fully recovered, verified contents of a document.
#[derive(Debug, Clone)]
pub struct RecoveredDocument {
	/// The 16-byte id of the recovered document.
	pub doc_id: [u8; 16],
	/// Whether/how authenticity was established.
	pub auth_status: AuthStatus,
	/// Every file in the manifest, with its verified bytes.
	pub files: Vec<(ManifestFile, Vec<u8>)>,
}

/// How the caller wants to supply (or have us derive) the passphrase.
pub enum PassphraseSource<'a> {
	/// Use this passphrase directly.
	Given(&'a str),
	/// Recover the passphrase from a Shamir quorum found among the scanned KEY frames.
	FromShards,
}

/// Stage A: parse every candidate into a [`Frame`], logging (not failing on) rejects.
#[instrument(level = "trace", skip(candidates))]
pub fn parse_candidates(candidates: &[Candidate]) -> Vec<Frame> {
	let mut frames = Vec::with_capacity(candidates.len());
	for candidate in candidates {
		match candidate {
			Candidate::Qr { encoding, payload } => match qr_payload::decode(*encoding, payload) {
				Ok(bytes) => match Frame::decode(&bytes) {
					Ok(frame) => frames.push(frame),
					Err(err) => warn!(?err, "rejected QR candidate: frame decode failed"),
				},
				Err(err) => warn!(?err, "rejected QR candidate: payload decode failed"),
			},
			Candidate::FallbackLines(lines) => match fallback::decode_lines(lines) {
				Ok(bytes) => match Frame::decode(&bytes) {
					Ok(frame) => frames.push(frame),
					Err(err) => warn!(?err, "rejected fallback candidate: frame decode failed"),
				},
				Err(err) => warn!(?err, "rejected fallback candidate: z-base-32 decode failed"),
			},
		}
	}
	frames
}

/// Stage B: bucket frames by `frame_type`, dropping only byte-for-byte identical duplicates.
///
/// Deliberately does *not* collapse by `index` here: a conflicting duplicate (same index,
/// different bytes) must survive to reach [`chunking::reassemble_payload`] and
/// [`shamir::recover_from_shards`], which are what actually detect and reject it.
fn group_frames(frames: Vec<Frame>) -> HashMap<FrameType, Vec<Frame>> {
	let mut grouped: HashMap<FrameType, Vec<Frame>> = HashMap::new();
	for frame in frames {
		let bucket = grouped.entry(frame.frame_type).or_default();
		if !bucket.contains(&frame) {
			bucket.push(frame);
		}
	}
	grouped
}

/// Stages B-D: select the single `doc_id` shared by every MAIN frame and reassemble it.
///
/// Returns an error if MAIN frames disagree on `doc_id` (ambiguous scan) or are incomplete.
#[instrument(level = "trace", skip(frames))]
fn reassemble_main(frames: &HashMap<FrameType, Vec<Frame>>) -> Result<([u8; 16], Vec<u8>)> {
	let main_frames: Vec<Frame> = frames.get(&FrameType::MainDocument).cloned().unwrap_or_default();

	if main_frames.is_empty() {
		return Err(Error::MissingFrame { have: 0, need: 1 });
	}

	let doc_id = main_frames[0].doc_id;
	if main_frames.iter().any(|f| f.doc_id != doc_id) {
		return Err(Error::InvalidInput("scanned MAIN frames belong to more than one document"));
	}

	let ciphertext = chunking::reassemble_payload(&main_frames, Some(&doc_id), Some(FrameType::MainDocument))?;
	Ok((doc_id, ciphertext))
}

/// Stage E: authenticate against the AUTH frame(s) belonging to `doc_id`.
///
/// More than one AUTH frame with differing contents for the same `doc_id` is fatal: an attacker
/// presenting two conflicting signed claims is not something `rescue_mode` should paper over.
#[instrument(level = "trace", skip(frames))]
fn authenticate(
	frames: &HashMap<FrameType, Vec<Frame>>,
	doc_id: [u8; 16],
	doc_hash: [u8; 32],
	rescue_mode: bool,
) -> Result<AuthStatus> {
	let auth_frames: Vec<&Frame> = frames
		.get(&FrameType::Auth)
		.map(|v| v.iter().filter(|f| f.doc_id == doc_id).collect())
		.unwrap_or_default();

	let payloads: Vec<AuthPayload> =
		auth_frames.iter().map(|f| AuthPayload::from_cbor(&f.data)).collect::<Result<_>>()?;

	let mut distinct: Vec<&AuthPayload> = Vec::new();
	for payload in &payloads {
		if !distinct.iter().any(|p| *p == payload) {
			distinct.push(payload);
		}
	}

	match distinct.len() {
		0 if rescue_mode => Ok(AuthStatus::MissingAllowed),
		0 => Err(Error::MissingFrame { have: 0, need: 1 }),
		1 => {
			let payload = distinct[0];
			if payload.doc_hash != doc_hash {
				return Ok(AuthStatus::Invalid);
			}
			if payload.verify() {
				Ok(AuthStatus::Verified)
			} else {
				Ok(AuthStatus::Invalid)
			}
		}
		_ => Err(Error::InvalidInput("conflicting AUTH frames for the same document")),
	}
}

/// Stage F: obtain the passphrase, either directly or by recovering it from scanned KEY frames.
///
/// In `rescue_mode`, shard signature failures are tolerated (structural cross-checks are not) —
/// this mirrors Stage E's handling of a missing/invalid AUTH frame.
#[instrument(level = "trace", skip(frames, source))]
fn resolve_passphrase(
	frames: &HashMap<FrameType, Vec<Frame>>,
	doc_id: [u8; 16],
	doc_hash: [u8; 32],
	source: PassphraseSource<'_>,
	rescue_mode: bool,
) -> Result<String> {
	match source {
		PassphraseSource::Given(p) => Ok(p.to_string()),
		PassphraseSource::FromShards => {
			let shard_payloads: Vec<ShardPayload> = frames
				.get(&FrameType::KeyDocument)
				.into_iter()
				.flatten()
				.filter(|f| f.doc_id == doc_id)
				.map(|f| ShardPayload::from_cbor(&f.data))
				.collect::<Result<_>>()?;

			let passphrase_shards: Vec<ShardPayload> = shard_payloads
				.into_iter()
				.filter(|s| s.key_type == "passphrase" && s.doc_hash == doc_hash)
				.collect();
			if passphrase_shards.is_empty() {
				return Err(Error::PassphraseRequired);
			}

			let secret = shamir::recover_from_shards(&passphrase_shards, rescue_mode)?;
			String::from_utf8(secret).map_err(|_| Error::PassphraseRequired)
		}
	}
}

/// Run the full recovery pipeline over a set of scanned candidates.
///
/// `rescue_mode` allows recovery to proceed with no AUTH frame at all (reporting
/// [`AuthStatus::MissingAllowed`]); it does not relax Shamir signature checks.
#[instrument(level = "trace", skip(candidates, passphrase_source))]
pub fn recover(candidates: &[Candidate], passphrase_source: PassphraseSource<'_>, rescue_mode: bool) -> Result<RecoveredDocument> {
	let parsed = parse_candidates(candidates);
	let grouped = group_frames(parsed);

	let (doc_id, ciphertext) = reassemble_main(&grouped)?;
	let doc_hash = blake2b256(&ciphertext);

	let auth_status = authenticate(&grouped, doc_id, doc_hash, rescue_mode)?;
	if auth_status == AuthStatus::Invalid {
		return Err(Error::SignatureInvalid);
	}

	let passphrase = resolve_passphrase(&grouped, doc_id, doc_hash, passphrase_source, rescue_mode)?;

	let wrapped = crate::aead::decrypt(&ciphertext, &passphrase)?;
	let envelope_bytes = compression::unwrap(&wrapped)?;
	let (manifest, payload) = envelope::decode(&envelope_bytes)?;
	let files = envelope::extract_payloads(&manifest, &payload)?;

	let computed_doc_id = blake2b128(&ciphertext);
	if computed_doc_id != doc_id {
		return Err(Error::HashMismatch("doc_id".to_string()));
	}

	Ok(RecoveredDocument { doc_id, auth_status, files })
}

/// Encode a scanned frame as a [`Candidate::FallbackLines`] the way a combined recovery document
/// would present it, for callers building test fixtures or a text-only transcription path.
pub fn frame_to_fallback_candidate(frame: &Frame, config: &FallbackConfig) -> Result<Candidate> {
	let lines = fallback::encode_lines(&frame.encode(), config)?;
	Ok(Candidate::FallbackLines(lines))
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

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backup::{build_backup, DocumentPlan, InputFile, ShardingConfig, SigningSeedMode};
	use rand::rngs::OsRng;

	fn frame_candidate(frame: &Frame) -> Candidate {
		Candidate::Qr { encoding: QrEncoding::Binary, payload: frame.encode() }
	}

	fn all_candidates(output: &crate::backup::BackupOutput) -> Vec<Candidate> {
		let mut candidates = vec![frame_candidate(&output.auth_frame)];
		candidates.extend(output.main_frames.iter().map(frame_candidate));
		candidates.extend(output.passphrase_shard_frames.iter().map(frame_candidate));
		candidates.extend(output.signing_seed_shard_frames.iter().map(frame_candidate));
		candidates
	}

	#[test]
	fn happy_path_passphrase_backup_recovers() {
		let files = vec![InputFile { relative_path: "notes.txt".to_string(), data: b"Hello, Ethernity.\n".to_vec(), mtime: Some(1700000000) }];
		let plan = DocumentPlan::default();
		let output = build_backup(&files, &plan, 1700000000.0, Some("correct horse battery staple".to_string()), &mut OsRng).unwrap();

		let candidates = all_candidates(&output);
		let recovered = recover(&candidates, PassphraseSource::Given("correct horse battery staple"), false).unwrap();

		assert_eq!(recovered.doc_id, output.doc_id);
		assert_eq!(recovered.auth_status, AuthStatus::Verified);
		assert_eq!(recovered.files.len(), 1);
		assert_eq!(recovered.files[0].1, b"Hello, Ethernity.\n");
	}

	#[test]
	fn multi_file_shared_prefix_recovers_all_paths() {
		let files = vec![
			InputFile { relative_path: "vault/alpha.txt".to_string(), data: b"A".to_vec(), mtime: None },
			InputFile { relative_path: "vault/beta.txt".to_string(), data: b"BB".to_vec(), mtime: None },
			InputFile { relative_path: "vault/nested/gamma.txt".to_string(), data: b"CCC".to_vec(), mtime: None },
		];
		let plan = DocumentPlan::default();
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();

		let candidates = all_candidates(&output);
		let recovered = recover(&candidates, PassphraseSource::Given("pw"), false).unwrap();

		let mut paths: Vec<&str> = recovered.files.iter().map(|(m, _)| m.path.as_str()).collect();
		paths.sort();
		assert_eq!(paths, vec!["vault/alpha.txt", "vault/beta.txt", "vault/nested/gamma.txt"]);
	}

	#[test]
	fn two_of_three_shard_quorum_recovers_passphrase() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"shhh".to_vec(), mtime: None }];
		let plan = DocumentPlan {
			passphrase_sharding: Some(ShardingConfig { threshold: 2, share_count: 3 }),
			..DocumentPlan::default()
		};
		let output = build_backup(&files, &plan, 0.0, Some("a passphrase".to_string()), &mut OsRng).unwrap();

		let mut candidates = vec![frame_candidate(&output.auth_frame)];
		candidates.extend(output.main_frames.iter().map(frame_candidate));
		candidates.extend(output.passphrase_shard_frames[..2].iter().map(frame_candidate));

		let recovered = recover(&candidates, PassphraseSource::FromShards, false).unwrap();
		assert_eq!(recovered.files[0].1, b"shhh");
	}

	#[test]
	fn rescue_mode_tolerates_unverifiable_passphrase_shard_signature() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"shhh".to_vec(), mtime: None }];
		let plan = DocumentPlan {
			passphrase_sharding: Some(ShardingConfig { threshold: 2, share_count: 3 }),
			..DocumentPlan::default()
		};
		let output = build_backup(&files, &plan, 0.0, Some("a passphrase".to_string()), &mut OsRng).unwrap();

		let mut shard_frames: Vec<Frame> = output.passphrase_shard_frames[..2].to_vec();
		let mut tampered = ShardPayload::from_cbor(&shard_frames[0].data).unwrap();
		tampered.signature[0] ^= 0xFF;
		shard_frames[0] = Frame { data: tampered.to_cbor(), ..shard_frames[0].clone() };

		let mut candidates = vec![frame_candidate(&output.auth_frame)];
		candidates.extend(output.main_frames.iter().map(frame_candidate));
		candidates.extend(shard_frames.iter().map(frame_candidate));

		assert!(matches!(
			recover(&candidates, PassphraseSource::FromShards, false),
			Err(Error::SignatureInvalid)
		));

		let recovered = recover(&candidates, PassphraseSource::FromShards, true).unwrap();
		assert_eq!(recovered.files[0].1, b"shhh");
	}

	#[test]
	fn rescue_mode_allows_missing_auth_frame() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"rescue me".to_vec(), mtime: None }];
		let plan = DocumentPlan::default();
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();

		let candidates: Vec<Candidate> = output.main_frames.iter().map(frame_candidate).collect();
		let recovered = recover(&candidates, PassphraseSource::Given("pw"), true).unwrap();
		assert_eq!(recovered.auth_status, AuthStatus::MissingAllowed);
	}

	#[test]
	fn missing_auth_without_rescue_mode_is_rejected() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"data".to_vec(), mtime: None }];
		let plan = DocumentPlan::default();
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();

		let candidates: Vec<Candidate> = output.main_frames.iter().map(frame_candidate).collect();
		assert!(matches!(recover(&candidates, PassphraseSource::Given("pw"), false), Err(Error::MissingFrame { .. })));
	}

	#[test]
	fn conflicting_duplicate_main_frame_is_fatal() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"0123456789abcdef0123456789".to_vec(), mtime: None }];
		let plan = DocumentPlan { chunk_size: 8, ..DocumentPlan::default() };
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();

		let mut tampered = output.main_frames[0].clone();
		tampered.data[0] ^= 0xFF;

		let mut candidates = all_candidates(&output);
		candidates.push(frame_candidate(&tampered));

		assert!(matches!(recover(&candidates, PassphraseSource::Given("pw"), false), Err(Error::DuplicateKey(_))));
	}

	#[test]
	fn out_of_order_duplicated_scan_still_reassembles() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"0123456789abcdef0123456789".to_vec(), mtime: None }];
		let plan = DocumentPlan { chunk_size: 5, ..DocumentPlan::default() };
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();
		assert!(output.main_frames.len() >= 5, "need at least 5 frames to reorder meaningfully");

		let order = [2usize, 5, 2, 1, 4, 3, 0];
		let mut candidates = vec![frame_candidate(&output.auth_frame)];
		for &i in &order {
			if let Some(frame) = output.main_frames.get(i) {
				candidates.push(frame_candidate(frame));
			}
		}
		for frame in &output.main_frames {
			candidates.push(frame_candidate(frame));
		}

		let recovered = recover(&candidates, PassphraseSource::Given("pw"), false).unwrap();
		assert_eq!(recovered.files[0].1, files[0].data);
	}

	#[test]
	fn embedded_signing_seed_mode_still_authenticates() {
		let files = vec![InputFile { relative_path: "a.txt".to_string(), data: b"data".to_vec(), mtime: None }];
		let plan = DocumentPlan { signing_seed_mode: SigningSeedMode::Embedded, ..DocumentPlan::default() };
		let output = build_backup(&files, &plan, 0.0, Some("pw".to_string()), &mut OsRng).unwrap();

		let candidates = all_candidates(&output);
		let recovered = recover(&candidates, PassphraseSource::Given("pw"), false).unwrap();
		assert_eq!(recovered.auth_status, AuthStatus::Verified);
	}
}
