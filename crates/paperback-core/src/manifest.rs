//! The manifest (C4): an ordered file list with a directory-prefix dictionary.
//!
//! Paths repeat their parent directories often (`vault/a.txt`, `vault/b.txt`), so before CBOR
//! encoding we factor out every directory prefix shared by two or more files into a small table,
//! and store each file as `(prefix_index, suffix)` instead of its full path.

use std::collections::HashMap;

use minicbor::data::Type;
use minicbor::{Decode, Decoder, Encode, Encoder};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::{Error, Result};

/// Manifest CBOR array version tag.
pub const FORMAT_VERSION: u64 = 5;

/// One file recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
	/// POSIX-relative path; non-empty, no `..` component, no leading `/`.
	pub path: String,
	/// Size of the file's bytes in the envelope payload.
	pub size: u64,
	/// SHA-256 of the file's bytes.
	pub sha256: [u8; 32],
	/// Modification time in integer seconds, if known.
	pub mtime: Option<i64>,
}

impl ManifestFile {
	/// Build a `ManifestFile` from raw bytes, computing its SHA-256.
	pub fn from_bytes(path: impl Into<String>, data: &[u8], mtime: Option<i64>) -> Result<Self> {
		let path = path.into();
		validate_relative_path(&path)?;
		let mut hasher = Sha256::new();
		hasher.update(data);
		let sha256: [u8; 32] = hasher.finalize().into();
		Ok(ManifestFile { path, size: data.len() as u64, sha256, mtime })
	}
}

/// Reject paths that are empty, absolute, or contain a `..` component.
pub fn validate_relative_path(path: &str) -> Result<()> {
	if path.is_empty() || path.starts_with('/') {
		return Err(Error::InvalidPath(path.to_string()));
	}
	if path.split('/').any(|segment| segment == ".." || segment.is_empty()) {
		return Err(Error::InvalidPath(path.to_string()));
	}
	Ok(())
}

/// The structured list of files within an envelope, plus its prefix dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
	/// Format version; always [`FORMAT_VERSION`] for documents this crate produces.
	pub format_version: u64,
	/// Seconds since the epoch, as a float (matches the source's CBOR float encoding).
	pub created_at: f64,
	/// Whether this document is sealed (no further shards may be added).
	pub sealed: bool,
	/// The Ed25519 signing seed, present unless sealed or the seed is shard-only.
	pub signing_seed: Option<[u8; 32]>,
	/// Files in manifest order.
	pub files: Vec<ManifestFile>,
}

impl Manifest {
	/// Build a manifest, rejecting duplicate relative paths.
	pub fn new(
		created_at: f64,
		sealed: bool,
		signing_seed: Option<[u8; 32]>,
		files: Vec<ManifestFile>,
	) -> Result<Self> {
		let mut seen = std::collections::HashSet::new();
		for file in &files {
			if !seen.insert(file.path.as_str()) {
				return Err(Error::DuplicateKey("duplicate relative path in manifest"));
			}
		}
		Ok(Manifest { format_version: FORMAT_VERSION, created_at, sealed, signing_seed, files })
	}

	/// Serialize this manifest to CBOR.
	#[instrument(level = "trace", skip(self))]
	pub fn to_cbor(&self) -> Vec<u8> {
		let mut buf = Vec::new();
		minicbor::encode(self, &mut buf).expect("manifest encoding is infallible for Vec<u8>");
		buf
	}

	/// Decode a manifest from CBOR.
	#[instrument(level = "trace", skip(bytes))]
	pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
		minicbor::decode(bytes).map_err(|e| Error::Cbor(e.to_string()))
	}
}

/// Build the prefix dictionary for a set of paths: every `/`-delimited directory prefix that
/// occurs in at least two paths, sorted by `(length, prefix)`, with the empty string prepended
/// as entry 0.
fn build_prefix_table(paths: &[&str]) -> Vec<String> {
	let mut counts: HashMap<&str, usize> = HashMap::new();
	for path in paths {
		for prefix in directory_prefixes(path) {
			*counts.entry(prefix).or_insert(0) += 1;
		}
	}

	let mut prefixes: Vec<String> = counts
		.into_iter()
		.filter(|(_, count)| *count >= 2)
		.map(|(prefix, _)| prefix.to_string())
		.collect();
	prefixes.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

	let mut table = vec![String::new()];
	table.extend(prefixes);
	table
}

/// All `/`-delimited directory prefixes of `path` (not including the path itself).
fn directory_prefixes(path: &str) -> Vec<&str> {
	let mut out = Vec::new();
	for (i, b) in path.bytes().enumerate() {
		if b == b'/' && i > 0 {
			out.push(&path[..i]);
		}
	}
	out
}

/// Pick the longest prefix in `table` (which must be sorted length-descending to be checked in
/// that order by the caller) that is a `/`-bounded prefix of `path`.
fn longest_applicable_prefix<'a>(path: &str, sorted_desc: &'a [(usize, &str)]) -> (usize, &'a str) {
	for &(index, prefix) in sorted_desc {
		if prefix.is_empty() {
			continue;
		}
		if path.len() > prefix.len() && path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'/' {
			return (index, prefix);
		}
	}
	(0, "")
}

struct PrefixAssignment {
	prefix_index: usize,
	suffix: String,
}

fn assign_prefixes(files: &[ManifestFile], table: &[String]) -> Vec<PrefixAssignment> {
	let mut sorted_desc: Vec<(usize, &str)> = table.iter().enumerate().map(|(i, p)| (i, p.as_str())).collect();
	sorted_desc.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

	files
		.iter()
		.map(|file| {
			let (index, prefix) = longest_applicable_prefix(&file.path, &sorted_desc);
			let suffix = if prefix.is_empty() {
				file.path.clone()
			} else {
				file.path[prefix.len() + 1..].to_string()
			};
			PrefixAssignment { prefix_index: index, suffix }
		})
		.collect()
}

fn rebuild_path(table: &[String], prefix_index: usize, suffix: &str) -> Result<String> {
	let prefix = table.get(prefix_index).ok_or(Error::InvalidInput("prefix index out of range"))?;
	if prefix.is_empty() {
		Ok(suffix.to_string())
	} else {
		Ok(format!("{prefix}/{suffix}"))
	}
}

impl<C> Encode<C> for Manifest {
	fn encode<W: minicbor::encode::write::Write>(
		&self,
		e: &mut Encoder<W>,
		_ctx: &mut C,
	) -> Result<(), minicbor::encode::Error<W::Error>> {
		let paths: Vec<&str> = self.files.iter().map(|f| f.path.as_str()).collect();
		let table = build_prefix_table(&paths);
		let assignments = assign_prefixes(&self.files, &table);

		e.array(6)?;
		e.u64(self.format_version)?;
		e.f64(self.created_at)?;
		e.bool(self.sealed)?;
		match &self.signing_seed {
			Some(seed) => {
				e.bytes(seed)?;
			}
			None => {
				e.null()?;
			}
		}

		e.array(table.len() as u64)?;
		for prefix in &table {
			e.str(prefix)?;
		}

		e.array(self.files.len() as u64)?;
		for (file, assignment) in self.files.iter().zip(&assignments) {
			e.array(5)?;
			e.u64(assignment.prefix_index as u64)?;
			e.str(&assignment.suffix)?;
			e.u64(file.size)?;
			e.bytes(&file.sha256)?;
			match file.mtime {
				Some(mtime) => {
					e.i64(mtime)?;
				}
				None => {
					e.null()?;
				}
			}
		}

		Ok(())
	}
}

impl<'b, C> Decode<'b, C> for Manifest {
	fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
		let len = d.array()?;
		let _ = len;

		let format_version = d.u64()?;
		let created_at = d.f64()?;
		let sealed = d.bool()?;
		let signing_seed = match d.datatype()? {
			Type::Null => {
				d.null()?;
				None
			}
			_ => {
				let bytes = d.bytes()?;
				let mut seed = [0u8; 32];
				if bytes.len() != 32 {
					return Err(minicbor::decode::Error::message("signing_seed must be 32 bytes"));
				}
				seed.copy_from_slice(bytes);
				Some(seed)
			}
		};

		let prefix_count = d.array()?.ok_or_else(|| minicbor::decode::Error::message("expected definite-length prefixes array"))?;
		let mut table = Vec::with_capacity(prefix_count as usize);
		for _ in 0..prefix_count {
			table.push(d.str()?.to_string());
		}

		let file_count = d.array()?.ok_or_else(|| minicbor::decode::Error::message("expected definite-length files array"))?;
		let mut files = Vec::with_capacity(file_count as usize);
		for _ in 0..file_count {
			d.array()?;
			let prefix_index = d.u64()? as usize;
			let suffix = d.str()?.to_string();
			let size = d.u64()?;
			let sha256_bytes = d.bytes()?;
			if sha256_bytes.len() != 32 {
				return Err(minicbor::decode::Error::message("sha256 must be 32 bytes"));
			}
			let mut sha256 = [0u8; 32];
			sha256.copy_from_slice(sha256_bytes);
			let mtime = match d.datatype()? {
				Type::Null => {
					d.null()?;
					None
				}
				_ => Some(d.i64()?),
			};

			let path = rebuild_path(&table, prefix_index, &suffix)
				.map_err(|_| minicbor::decode::Error::message("prefix index out of range"))?;

			files.push(ManifestFile { path, size, sha256, mtime });
		}

		Ok(Manifest { format_version, created_at, sealed, signing_seed, files })
	}
}
