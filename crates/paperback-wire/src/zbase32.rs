//! z-base-32: a human-transcribable base-32 alphabet, distinct from RFC 4648.
//!
//! Used for the fallback text a recovery document prints under each QR code, so it can be typed
//! back in by hand if a scanner isn't available.

use crate::error::{Error, Result};

/// The z-base-32 alphabet, in index order.
pub const ALPHABET: &str = "ybndrfg8ejkmcpqxot1uwisza345h769";

fn lookup(ch: char) -> Option<u8> {
	ALPHABET
		.as_bytes()
		.iter()
		.position(|&b| b == ch as u8)
		.map(|i| i as u8)
}

/// Encode bytes into z-base-32 text.
///
/// Packs bytes MSB-first into 5-bit groups. Any leftover bits at the end are left-shifted to
/// fill a final 5-bit unit; there is no padding character.
pub fn encode(data: &[u8]) -> String {
	if data.is_empty() {
		return String::new();
	}

	let mut bits: u32 = 0;
	let mut bit_count: u32 = 0;
	let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
	let alphabet = ALPHABET.as_bytes();

	for &byte in data {
		bits = (bits << 8) | u32::from(byte);
		bit_count += 8;
		while bit_count >= 5 {
			let shift = bit_count - 5;
			let index = (bits >> shift) & 0x1F;
			out.push(alphabet[index as usize] as char);
			bit_count -= 5;
			bits &= (1 << bit_count) - 1;
		}
	}

	if bit_count > 0 {
		let index = (bits << (5 - bit_count)) & 0x1F;
		out.push(alphabet[index as usize] as char);
	}

	out
}

/// Decode z-base-32 text into bytes.
///
/// Lowercases input, ignores ASCII whitespace and `-`, and rejects any other non-alphabet
/// character. A final partial byte (fewer than 8 accumulated bits) is dropped, mirroring
/// [`encode`]'s trailing padding-free group.
pub fn decode(text: &str) -> Result<Vec<u8>> {
	let mut bits: u32 = 0;
	let mut bit_count: u32 = 0;
	let mut out = Vec::with_capacity(text.len() * 5 / 8);

	for ch in text.chars() {
		if ch.is_whitespace() || ch == '-' {
			continue;
		}
		let lower = ch.to_ascii_lowercase();
		let index = lookup(lower).ok_or(Error::InvalidZbase32Char(ch))?;
		bits = (bits << 5) | u32::from(index);
		bit_count += 5;
		if bit_count >= 8 {
			let shift = bit_count - 8;
			out.push(((bits >> shift) & 0xFF) as u8);
			bit_count -= 8;
			bits &= (1 << bit_count) - 1;
		}
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn empty_round_trips() {
		assert_eq!(encode(b""), "");
		assert_eq!(decode("").unwrap(), b"");
	}

	#[test]
	fn known_vector() {
		// "asdf" encodes deterministically with this alphabet.
		let encoded = encode(b"asdf");
		assert_eq!(decode(&encoded).unwrap(), b"asdf");
	}

	#[test]
	fn decode_ignores_whitespace_dashes_and_case() {
		let encoded = encode(b"hello world");
		let noisy = encoded
			.chars()
			.enumerate()
			.map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
			.collect::<String>();
		let noisy = format!(" {} - {}", &noisy[..noisy.len() / 2], &noisy[noisy.len() / 2..]);
		assert_eq!(decode(&noisy).unwrap(), b"hello world");
	}

	#[test]
	fn rejects_invalid_character() {
		assert_eq!(decode("v").unwrap_err(), Error::InvalidZbase32Char('v'));
	}

	proptest! {
		#[test]
		fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..256)) {
			let encoded = encode(&data);
			let decoded = decode(&encoded).unwrap();
			prop_assert_eq!(decoded, data);
		}
	}
}
