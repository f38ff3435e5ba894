//! GF(2⁸) Shamir secret sharing (C11), applied block-wise over 16-byte chunks.
//!
//! Nothing in the retrieval pack ships a crate with this exact wire shape, so this follows the
//! shape of a hand-rolled `shamir` module the way the real-world paper-backup project in this
//! space keeps its own: arithmetic in GF(2⁸) with the AES reduction polynomial, Lagrange
//! interpolation at `x=0` to recover the secret, and one polynomial per 16-byte block so blocks
//! can be combined independently.

use minicbor::{Decode, Decoder, Encode, Encoder};
use rand_core::CryptoRngCore;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::signing;

const BLOCK_SIZE: usize = 16;

/// CBOR version tag for [`ShardPayload`].
pub const SHARD_VERSION: u64 = 3;

/// One `KEY` frame's worth of a Shamir share, signed and cross-checkable against its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPayload {
	/// 1-based index of this share; 0 is reserved for the secret itself.
	pub share_index: u8,
	/// Minimum number of shares required to reconstruct the secret.
	pub threshold: u8,
	/// Total number of shares produced for this secret.
	pub share_count: u8,
	/// What kind of secret this shares (`"passphrase"` for both passphrase and signing-seed shares).
	pub key_type: String,
	/// This share's bytes; a positive multiple of 16.
	pub share: Vec<u8>,
	/// Original secret length in bytes, before 16-byte block padding.
	pub secret_len: u64,
	/// BLAKE2b-256 of the ciphertext this shard belongs to.
	pub doc_hash: [u8; 32],
	/// Ed25519 public key that produced `signature`.
	pub sign_pub: [u8; 32],
	/// `Ed25519_sign(seed, doc_hash · u8(share_index) · share)`.
	pub signature: [u8; 64],
}

impl ShardPayload {
	/// Build and sign a ShardPayload for one [`Share`].
	pub fn sign(
		seed: &[u8; 32],
		sign_pub: [u8; 32],
		doc_hash: [u8; 32],
		threshold: u8,
		share_count: u8,
		secret_len: u64,
		share: Share,
	) -> Self {
		let signature = signing::sign_shard(seed, &doc_hash, share.index, &share.bytes);
		ShardPayload {
			share_index: share.index,
			threshold,
			share_count,
			key_type: "passphrase".to_string(),
			share: share.bytes,
			secret_len,
			doc_hash,
			sign_pub,
			signature,
		}
	}

	/// Verify this shard's signature over `doc_hash · u8(share_index) · share`.
	pub fn verify(&self) -> bool {
		let mut msg = Vec::with_capacity(32 + 1 + self.share.len());
		msg.extend_from_slice(&self.doc_hash);
		msg.push(self.share_index);
		msg.extend_from_slice(&self.share);
		signing::verify(&self.sign_pub, &msg, &self.signature)
	}

	/// Serialize to CBOR: `[ version=3, key_type, threshold, share_count, share_index, secret_len, share, doc_hash, sign_pub, signature ]`.
	pub fn to_cbor(&self) -> Vec<u8> {
		let mut buf = Vec::new();
		minicbor::encode(self, &mut buf).expect("ShardPayload encoding is infallible for Vec<u8>");
		buf
	}

	/// Decode from CBOR.
	pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
		minicbor::decode(bytes).map_err(|e| Error::Cbor(e.to_string()))
	}
}

impl<C> Encode<C> for ShardPayload {
	fn encode<W: minicbor::encode::write::Write>(
		&self,
		e: &mut Encoder<W>,
		_ctx: &mut C,
	) -> Result<(), minicbor::encode::Error<W::Error>> {
		e.array(10)?;
		e.u64(SHARD_VERSION)?;
		e.str(&self.key_type)?;
		e.u32(self.threshold.into())?;
		e.u32(self.share_count.into())?;
		e.u32(self.share_index.into())?;
		e.u64(self.secret_len)?;
		e.bytes(&self.share)?;
		e.bytes(&self.doc_hash)?;
		e.bytes(&self.sign_pub)?;
		e.bytes(&self.signature)?;
		Ok(())
	}
}

impl<'b, C> Decode<'b, C> for ShardPayload {
	fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
		d.array()?;
		let version = d.u64()?;
		if version != SHARD_VERSION {
			return Err(minicbor::decode::Error::message("unsupported ShardPayload version"));
		}
		let key_type = d.str()?.to_string();
		let threshold = u8::try_from(d.u32()?).map_err(|_| minicbor::decode::Error::message("threshold out of range"))?;
		let share_count = u8::try_from(d.u32()?).map_err(|_| minicbor::decode::Error::message("share_count out of range"))?;
		let share_index = u8::try_from(d.u32()?).map_err(|_| minicbor::decode::Error::message("share_index out of range"))?;
		let secret_len = d.u64()?;
		let share = d.bytes()?.to_vec();
		let doc_hash = fixed_bytes_32(d)?;
		let sign_pub = fixed_bytes_32(d)?;
		let signature = fixed_bytes_64(d)?;
		Ok(ShardPayload {
			share_index,
			threshold,
			share_count,
			key_type,
			share,
			secret_len,
			doc_hash,
			sign_pub,
			signature,
		})
	}
}

fn fixed_bytes_32(d: &mut Decoder<'_>) -> Result<[u8; 32], minicbor::decode::Error> {
	let bytes = d.bytes()?;
	if bytes.len() != 32 {
		return Err(minicbor::decode::Error::message("expected 32 bytes"));
	}
	let mut out = [0u8; 32];
	out.copy_from_slice(bytes);
	Ok(out)
}

fn fixed_bytes_64(d: &mut Decoder<'_>) -> Result<[u8; 64], minicbor::decode::Error> {
	let bytes = d.bytes()?;
	if bytes.len() != 64 {
		return Err(minicbor::decode::Error::message("expected 64 bytes"));
	}
	let mut out = [0u8; 64];
	out.copy_from_slice(bytes);
	Ok(out)
}

/// Verify cross-consistency of a set of shards belonging to the same secret, then recombine.
///
/// Every shard must agree on `threshold`, `share_count`, `secret_len`, `doc_hash`, `sign_pub`;
/// duplicate `share_index` is accepted only when byte-identical. Signature checks are skipped
/// when `rescue_mode` is set, but structural checks are still enforced.
#[instrument(level = "trace", skip(shards))]
pub fn recover_from_shards(shards: &[ShardPayload], rescue_mode: bool) -> Result<Vec<u8>> {
	let first = shards.first().ok_or(Error::ShardInsufficient { have: 0, need: 1 })?;

	let mut by_index: std::collections::HashMap<u8, &ShardPayload> = std::collections::HashMap::new();
	for shard in shards {
		if shard.threshold != first.threshold
			|| shard.share_count != first.share_count
			|| shard.secret_len != first.secret_len
			|| shard.doc_hash != first.doc_hash
			|| shard.sign_pub != first.sign_pub
		{
			return Err(Error::InvalidInput("shards disagree on threshold/share_count/secret_len/doc_hash/sign_pub"));
		}
		match by_index.get(&shard.share_index) {
			Some(existing) if *existing != shard => {
				return Err(Error::DuplicateKey("conflicting shard at same share_index"));
			}
			_ => {
				by_index.insert(shard.share_index, shard);
			}
		}
		if !rescue_mode && !shard.verify() {
			return Err(Error::SignatureInvalid);
		}
	}

	let shares: Vec<Share> = by_index.values().map(|s| Share { index: s.share_index, bytes: s.share.clone() }).collect();
	combine_shares(&shares, first.threshold, first.secret_len as usize)
}

/// GF(2⁸) multiplication using the AES reduction polynomial (0x11B).
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
	let mut p: u8 = 0;
	for _ in 0..8 {
		if b & 1 != 0 {
			p ^= a;
		}
		let hi = a & 0x80;
		a <<= 1;
		if hi != 0 {
			a ^= 0x1B;
		}
		b >>= 1;
	}
	p
}

fn gf_pow(mut a: u8, mut e: u8) -> u8 {
	let mut result: u8 = 1;
	while e > 0 {
		if e & 1 != 0 {
			result = gf_mul(result, a);
		}
		a = gf_mul(a, a);
		e >>= 1;
	}
	result
}

/// GF(2⁸) multiplicative inverse (0 maps to 0, matching the convention that 0 is never divided by
/// in this module's call sites).
fn gf_inv(a: u8) -> u8 {
	if a == 0 {
		return 0;
	}
	// a^254 == a^-1 since the field has 255 nonzero elements.
	gf_pow(a, 254)
}

fn gf_add(a: u8, b: u8) -> u8 {
	a ^ b
}

/// Evaluate a polynomial (coefficients low-to-high, `coeffs[0]` is the secret byte) at `x` in GF(2⁸).
fn poly_eval(coeffs: &[u8], x: u8) -> u8 {
	let mut result = 0u8;
	let mut power = 1u8;
	for &c in coeffs {
		result = gf_add(result, gf_mul(c, power));
		power = gf_mul(power, x);
	}
	result
}

/// Split one 16-byte block into `share_count` shares such that any `threshold` reconstruct it.
fn split_block<R: CryptoRngCore + ?Sized>(
	block: &[u8; BLOCK_SIZE],
	threshold: u8,
	share_count: u8,
	rng: &mut R,
) -> Vec<[u8; BLOCK_SIZE]> {
	let mut shares = vec![[0u8; BLOCK_SIZE]; share_count as usize];

	for byte_idx in 0..BLOCK_SIZE {
		let mut coeffs = vec![block[byte_idx]];
		for _ in 1..threshold {
			let mut buf = [0u8; 1];
			rng.fill_bytes(&mut buf);
			coeffs.push(buf[0]);
		}
		for share_idx in 0..share_count {
			let x = share_idx + 1; // x=0 is reserved for the secret itself
			shares[share_idx as usize][byte_idx] = poly_eval(&coeffs, x);
		}
	}

	shares
}

/// Recombine one 16-byte block from `(x, block_share)` pairs via Lagrange interpolation at `x=0`.
fn combine_block(points: &[(u8, [u8; BLOCK_SIZE])]) -> [u8; BLOCK_SIZE] {
	let mut out = [0u8; BLOCK_SIZE];
	for byte_idx in 0..BLOCK_SIZE {
		let mut acc = 0u8;
		for (i, &(xi, ref yi)) in points.iter().enumerate() {
			let mut numerator = 1u8;
			let mut denominator = 1u8;
			for (j, &(xj, _)) in points.iter().enumerate() {
				if i == j {
					continue;
				}
				numerator = gf_mul(numerator, xj);
				denominator = gf_mul(denominator, gf_add(xj, xi));
			}
			let lagrange_coeff = gf_mul(numerator, gf_inv(denominator));
			acc = gf_add(acc, gf_mul(yi[byte_idx], lagrange_coeff));
		}
		out[byte_idx] = acc;
	}
	out
}

/// One share of a secret split by [`split_secret`]: `(share_index, share_bytes)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
	/// 1-based share index (0 is reserved for the secret itself).
	pub index: u8,
	/// The share's bytes: one block-share per 16-byte block of the (padded) secret.
	pub bytes: Vec<u8>,
}

/// Split `secret` into `share_count` shares, any `threshold` of which reconstruct it.
///
/// `secret` is right-padded with zero bytes to a multiple of 16; the caller is responsible for
/// recording the true `secret_len` (this module doesn't do that bookkeeping itself).
#[instrument(level = "trace", skip(secret, rng))]
pub fn split_secret<R: CryptoRngCore + ?Sized>(
	secret: &[u8],
	threshold: u8,
	share_count: u8,
	rng: &mut R,
) -> Result<Vec<Share>> {
	if threshold == 0 {
		return Err(Error::InvalidInput("threshold must be at least 1"));
	}
	if share_count < threshold {
		return Err(Error::InvalidInput("share_count must be at least threshold"));
	}
	if share_count == 0 || share_count > 255 {
		return Err(Error::InvalidInput("share_count must be in 1..=255"));
	}

	let mut padded = secret.to_vec();
	let pad = (BLOCK_SIZE - padded.len() % BLOCK_SIZE) % BLOCK_SIZE;
	padded.extend(std::iter::repeat(0u8).take(pad));

	let mut per_share_bytes: Vec<Vec<u8>> = vec![Vec::with_capacity(padded.len()); share_count as usize];

	for block in padded.chunks(BLOCK_SIZE) {
		let mut block_arr = [0u8; BLOCK_SIZE];
		block_arr.copy_from_slice(block);
		let block_shares = split_block(&block_arr, threshold, share_count, rng);
		for (share_idx, share_block) in block_shares.into_iter().enumerate() {
			per_share_bytes[share_idx].extend_from_slice(&share_block);
		}
	}

	Ok(per_share_bytes
		.into_iter()
		.enumerate()
		.map(|(i, bytes)| Share { index: (i + 1) as u8, bytes })
		.collect())
}

/// Recombine a secret of `secret_len` bytes from at least `threshold` distinct shares.
#[instrument(level = "trace", skip(shares))]
pub fn combine_shares(shares: &[Share], threshold: u8, secret_len: usize) -> Result<Vec<u8>> {
	let mut distinct: std::collections::HashMap<u8, &Share> = std::collections::HashMap::new();
	for share in shares {
		distinct.entry(share.index).or_insert(share);
	}
	if distinct.len() < threshold as usize {
		return Err(Error::ShardInsufficient { have: distinct.len(), need: threshold as usize });
	}

	let mut chosen: Vec<&Share> = distinct.into_values().collect();
	chosen.sort_by_key(|s| s.index);
	let block_count = chosen[0].bytes.len() / BLOCK_SIZE;

	let mut out = Vec::with_capacity(block_count * BLOCK_SIZE);
	for block_idx in 0..block_count {
		let points: Vec<(u8, [u8; BLOCK_SIZE])> = chosen
			.iter()
			.take(threshold as usize)
			.map(|s| {
				let mut block = [0u8; BLOCK_SIZE];
				block.copy_from_slice(&s.bytes[block_idx * BLOCK_SIZE..(block_idx + 1) * BLOCK_SIZE]);
				(s.index, block)
			})
			.collect();
		out.extend_from_slice(&combine_block(&points));
	}

	out.truncate(secret_len);
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rand::rngs::OsRng;

	#[test]
	fn two_of_three_recovers_secret() {
		let secret = b"correct horse battery staple!!!".to_vec();
		let shares = split_secret(&secret, 2, 3, &mut OsRng).unwrap();
		assert_eq!(shares.len(), 3);

		let subset = vec![shares[0].clone(), shares[2].clone()];
		let recovered = combine_shares(&subset, 2, secret.len()).unwrap();
		assert_eq!(recovered, secret);
	}

	#[test]
	fn below_threshold_fails() {
		let secret = b"a secret".to_vec();
		let shares = split_secret(&secret, 3, 5, &mut OsRng).unwrap();
		let subset = vec![shares[0].clone(), shares[1].clone()];
		assert!(matches!(
			combine_shares(&subset, 3, secret.len()),
			Err(Error::ShardInsufficient { .. })
		));
	}

	#[test]
	fn mutated_share_byte_does_not_silently_recover_original() {
		let secret = b"0123456789abcdef".to_vec();
		let shares = split_secret(&secret, 2, 3, &mut OsRng).unwrap();
		let mut tampered = shares[0].clone();
		tampered.bytes[0] ^= 0xFF;
		let subset = vec![tampered, shares[1].clone()];
		let recovered = combine_shares(&subset, 2, secret.len()).unwrap();
		assert_ne!(recovered, secret);
	}

	proptest! {
		#[test]
		fn k_of_n_round_trip(
			secret in proptest::collection::vec(any::<u8>(), 1..64),
			threshold in 1u8..5,
			extra in 0u8..4,
		) {
			let share_count = threshold + extra;
			let shares = split_secret(&secret, threshold, share_count, &mut OsRng).unwrap();
			let recovered = combine_shares(&shares[..threshold as usize], threshold, secret.len()).unwrap();
			prop_assert_eq!(recovered, secret);
		}
	}

	#[test]
	fn shard_payload_round_trips_and_verifies() {
		let (seed, sign_pub) = signing::generate_keypair(&mut OsRng);
		let secret = b"correct horse battery staple".to_vec();
		let shares = split_secret(&secret, 2, 3, &mut OsRng).unwrap();
		let doc_hash = [5u8; 32];

		let payloads: Vec<ShardPayload> = shares
			.into_iter()
			.map(|share| ShardPayload::sign(&seed, sign_pub, doc_hash, 2, 3, secret.len() as u64, share))
			.collect();

		for payload in &payloads {
			assert!(payload.verify());
			let decoded = ShardPayload::from_cbor(&payload.to_cbor()).unwrap();
			assert_eq!(&decoded, payload);
		}

		let recovered = recover_from_shards(&payloads[..2], false).unwrap();
		assert_eq!(recovered, secret);
	}

	#[test]
	fn recover_from_shards_rejects_insufficient_quorum() {
		let (seed, sign_pub) = signing::generate_keypair(&mut OsRng);
		let secret = b"another secret".to_vec();
		let shares = split_secret(&secret, 3, 3, &mut OsRng).unwrap();
		let doc_hash = [6u8; 32];
		let payloads: Vec<ShardPayload> = shares
			.into_iter()
			.map(|share| ShardPayload::sign(&seed, sign_pub, doc_hash, 3, 3, secret.len() as u64, share))
			.collect();

		assert!(matches!(recover_from_shards(&payloads[..2], false), Err(Error::ShardInsufficient { .. })));
	}

	#[test]
	fn recover_from_shards_rejects_conflicting_duplicate_index() {
		let (seed, sign_pub) = signing::generate_keypair(&mut OsRng);
		let secret = b"yet another secret".to_vec();
		let shares = split_secret(&secret, 2, 3, &mut OsRng).unwrap();
		let doc_hash = [7u8; 32];
		let mut payloads: Vec<ShardPayload> = shares
			.into_iter()
			.map(|share| ShardPayload::sign(&seed, sign_pub, doc_hash, 2, 3, secret.len() as u64, share))
			.collect();

		let mut conflicting = payloads[0].clone();
		conflicting.share[0] ^= 0xFF;
		payloads.push(conflicting);

		assert!(matches!(recover_from_shards(&payloads, false), Err(Error::DuplicateKey(_))));
	}
}
