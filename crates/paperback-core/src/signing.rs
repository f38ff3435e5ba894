//! Ed25519 signing (C10): the AUTH payload and the signature shape shared with Shamir shards.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use minicbor::{Decode, Decoder, Encode, Encoder};
use rand_core::CryptoRngCore;
use tracing::instrument;

use crate::error::{Error, Result};

/// CBOR version tag for [`AuthPayload`].
pub const AUTH_VERSION: u64 = 1;

/// Generate a fresh Ed25519 signing keypair from `rng`.
pub fn generate_keypair<R: CryptoRngCore + ?Sized>(rng: &mut R) -> ([u8; 32], [u8; 32]) {
	let signing_key = SigningKey::generate(rng);
	(signing_key.to_bytes(), signing_key.verifying_key().to_bytes())
}

/// `sig = Ed25519_sign(seed, doc_hash)`.
pub fn sign_auth(seed: &[u8; 32], doc_hash: &[u8; 32]) -> [u8; 64] {
	let signing_key = SigningKey::from_bytes(seed);
	signing_key.sign(doc_hash).to_bytes()
}

/// `msg = doc_hash · u8(share_index) · share`; `sig = Ed25519_sign(seed, msg)`.
pub fn sign_shard(seed: &[u8; 32], doc_hash: &[u8; 32], share_index: u8, share: &[u8]) -> [u8; 64] {
	let signing_key = SigningKey::from_bytes(seed);
	let mut msg = Vec::with_capacity(32 + 1 + share.len());
	msg.extend_from_slice(doc_hash);
	msg.push(share_index);
	msg.extend_from_slice(share);
	signing_key.sign(&msg).to_bytes()
}

/// Verify a signature over an arbitrary message with an embedded public key.
#[instrument(level = "trace", skip(message, signature))]
pub fn verify(sign_pub: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
	let Ok(verifying_key) = VerifyingKey::from_bytes(sign_pub) else {
		return false;
	};
	let sig = Signature::from_bytes(signature);
	verifying_key.verify(message, &sig).is_ok()
}

/// The single frame proving the MAIN set has not been altered: `(doc_hash, sign_pub, signature)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
	/// BLAKE2b-256 of the ciphertext this AUTH frame covers.
	pub doc_hash: [u8; 32],
	/// Ed25519 public key that produced `signature`.
	pub sign_pub: [u8; 32],
	/// `Ed25519_sign(seed, doc_hash)`.
	pub signature: [u8; 64],
}

impl AuthPayload {
	/// Build and sign an AuthPayload for `doc_hash`.
	pub fn sign(seed: &[u8; 32], sign_pub: [u8; 32], doc_hash: [u8; 32]) -> Self {
		let signature = sign_auth(seed, &doc_hash);
		AuthPayload { doc_hash, sign_pub, signature }
	}

	/// Verify `self.signature` against `self.sign_pub` over `self.doc_hash`.
	pub fn verify(&self) -> bool {
		verify(&self.sign_pub, &self.doc_hash, &self.signature)
	}

	/// Serialize to CBOR: `[ version=1, doc_hash, sign_pub, signature ]`.
	pub fn to_cbor(&self) -> Vec<u8> {
		let mut buf = Vec::new();
		minicbor::encode(self, &mut buf).expect("AuthPayload encoding is infallible for Vec<u8>");
		buf
	}

	/// Decode from CBOR.
	pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
		minicbor::decode(bytes).map_err(|e| Error::Cbor(e.to_string()))
	}
}

impl<C> Encode<C> for AuthPayload {
	fn encode<W: minicbor::encode::write::Write>(
		&self,
		e: &mut Encoder<W>,
		_ctx: &mut C,
	) -> Result<(), minicbor::encode::Error<W::Error>> {
		e.array(4)?;
		e.u64(AUTH_VERSION)?;
		e.bytes(&self.doc_hash)?;
		e.bytes(&self.sign_pub)?;
		e.bytes(&self.signature)?;
		Ok(())
	}
}

impl<'b, C> Decode<'b, C> for AuthPayload {
	fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
		d.array()?;
		let version = d.u64()?;
		if version != AUTH_VERSION {
			return Err(minicbor::decode::Error::message("unsupported AuthPayload version"));
		}
		let doc_hash = fixed_bytes::<32>(d, "doc_hash")?;
		let sign_pub = fixed_bytes::<32>(d, "sign_pub")?;
		let signature = fixed_bytes::<64>(d, "signature")?;
		Ok(AuthPayload { doc_hash, sign_pub, signature })
	}
}

fn fixed_bytes<const N: usize>(d: &mut Decoder<'_>, field: &'static str) -> Result<[u8; N], minicbor::decode::Error> {
	let bytes = d.bytes()?;
	if bytes.len() != N {
		return Err(minicbor::decode::Error::message(field));
	}
	let mut out = [0u8; N];
	out.copy_from_slice(bytes);
	Ok(out)
}
