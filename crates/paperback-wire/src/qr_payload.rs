//! QR payload presentation codec (C8).
//!
//! A frame's encoded bytes can go into a QR code two ways: as raw binary (if the scanner/printer
//! pipeline supports a binary QR segment) or as base64 text (the safe default, since most QR
//! tooling is happiest with printable payloads). This module only converts between a frame's
//! bytes and the chosen presentation; it doesn't know anything about frames itself.

use crate::error::{Error, Result};

/// How a frame's bytes are represented inside a QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrEncoding {
	/// The frame's bytes go into the QR code unmodified.
	Binary,
	/// The frame's bytes are base64-encoded (standard alphabet, no padding) first.
	Base64,
}

impl QrEncoding {
	/// Parse a QR encoding name, as it would appear in a `DocumentPlan`/config value.
	///
	/// `"raw"` is an alias for `"binary"`; `"b64"` is an alias for `"base64"`.
	pub fn parse(name: &str) -> Result<Self> {
		match name {
			"binary" | "raw" => Ok(QrEncoding::Binary),
			"base64" | "b64" => Ok(QrEncoding::Base64),
			other => Err(Error::UnsupportedQrEncoding(other.to_string())),
		}
	}
}

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(data: &[u8]) -> String {
	let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
	for chunk in data.chunks(3) {
		let b0 = chunk[0];
		let b1 = chunk.get(1).copied();
		let b2 = chunk.get(2).copied();

		let n = (u32::from(b0) << 16) | (u32::from(b1.unwrap_or(0)) << 8) | u32::from(b2.unwrap_or(0));

		out.push(BASE64_ALPHABET[((n >> 18) & 0x3F) as usize] as char);
		out.push(BASE64_ALPHABET[((n >> 12) & 0x3F) as usize] as char);
		if b1.is_some() {
			out.push(BASE64_ALPHABET[((n >> 6) & 0x3F) as usize] as char);
		}
		if b2.is_some() {
			out.push(BASE64_ALPHABET[(n & 0x3F) as usize] as char);
		}
	}
	out
}

fn base64_value(byte: u8) -> Option<u32> {
	BASE64_ALPHABET.iter().position(|&b| b == byte).map(|i| i as u32)
}

fn base64_decode(text: &str) -> Result<Vec<u8>> {
	let stripped: Vec<u8> = text
		.bytes()
		.filter(|b| !b.is_ascii_whitespace())
		.take_while(|&b| b != b'=')
		.collect();

	let mut out = Vec::with_capacity(stripped.len() * 3 / 4);
	for chunk in stripped.chunks(4) {
		let values: Vec<u32> = chunk
			.iter()
			.map(|&b| base64_value(b).ok_or(Error::InvalidBase64))
			.collect::<Result<_>>()?;

		match values.len() {
			4 => {
				let n = (values[0] << 18) | (values[1] << 12) | (values[2] << 6) | values[3];
				out.push((n >> 16) as u8);
				out.push((n >> 8) as u8);
				out.push(n as u8);
			}
			3 => {
				let n = (values[0] << 18) | (values[1] << 12) | (values[2] << 6);
				out.push((n >> 16) as u8);
				out.push((n >> 8) as u8);
			}
			2 => {
				let n = (values[0] << 18) | (values[1] << 12);
				out.push((n >> 16) as u8);
			}
			0 => {}
			_ => return Err(Error::InvalidBase64),
		}
	}
	Ok(out)
}

/// Render a frame's encoded bytes for QR presentation.
pub fn encode(encoding: QrEncoding, frame_bytes: &[u8]) -> Vec<u8> {
	match encoding {
		QrEncoding::Binary => frame_bytes.to_vec(),
		QrEncoding::Base64 => base64_encode(frame_bytes).into_bytes(),
	}
}

/// Recover a frame's encoded bytes from its QR presentation.
///
/// Tolerates missing `=` padding and surrounding whitespace when decoding base64, since both are
/// common after OCR/manual transcription.
pub fn decode(encoding: QrEncoding, payload: &[u8]) -> Result<Vec<u8>> {
	match encoding {
		QrEncoding::Binary => Ok(payload.to_vec()),
		QrEncoding::Base64 => {
			let text = std::str::from_utf8(payload).map_err(|_| Error::InvalidBase64)?;
			base64_decode(text)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn binary_passes_through() {
		let data = vec![1, 2, 3, 4, 5];
		let encoded = encode(QrEncoding::Binary, &data);
		assert_eq!(encoded, data);
		assert_eq!(decode(QrEncoding::Binary, &encoded).unwrap(), data);
	}

	#[test]
	fn base64_round_trips_and_strips_padding() {
		let data = b"hello, world!".to_vec();
		let encoded = encode(QrEncoding::Base64, &data);
		let text = std::str::from_utf8(&encoded).unwrap();
		assert!(!text.contains('='), "trailing padding should be stripped");
		assert_eq!(decode(QrEncoding::Base64, &encoded).unwrap(), data);
	}

	#[test]
	fn base64_decode_tolerates_whitespace_and_restored_padding() {
		let data = b"ab".to_vec();
		let encoded = encode(QrEncoding::Base64, &data);
		let mut text = std::str::from_utf8(&encoded).unwrap().to_string();
		text.push_str("==");
		text.insert(1, '\n');
		assert_eq!(decode(QrEncoding::Base64, text.as_bytes()).unwrap(), data);
	}

	#[test]
	fn parse_rejects_unknown_encoding() {
		assert!(matches!(QrEncoding::parse("jpeg"), Err(Error::UnsupportedQrEncoding(_))));
	}

	#[test]
	fn parse_accepts_raw_and_b64_aliases() {
		assert_eq!(QrEncoding::parse("raw").unwrap(), QrEncoding::Binary);
		assert_eq!(QrEncoding::parse("b64").unwrap(), QrEncoding::Base64);
	}

	proptest! {
		#[test]
		fn round_trip_binary(data in proptest::collection::vec(any::<u8>(), 0..256)) {
			let encoded = encode(QrEncoding::Binary, &data);
			prop_assert_eq!(decode(QrEncoding::Binary, &encoded).unwrap(), data);
		}

		#[test]
		fn round_trip_base64(data in proptest::collection::vec(any::<u8>(), 0..256)) {
			let encoded = encode(QrEncoding::Base64, &data);
			prop_assert_eq!(decode(QrEncoding::Base64, &encoded).unwrap(), data);
		}
	}
}
