//! The fallback text transport (C9): z-base-32 line groups a human can type back in.
//!
//! A recovery document prints this under (or instead of) each QR code. Bytes are z-base-32
//! encoded, cut into fixed-width groups, and the groups are greedily packed onto lines no wider
//! than `line_length`. A recovery document combining an AUTH and a MAIN transcription separates
//! them with an all-caps marker line so a human (or the parser) can tell which is which.

use crate::error::{Error, Result};
use crate::zbase32;

/// Default group width in z-base-32 characters.
pub const DEFAULT_GROUP_SIZE: usize = 4;
/// Default maximum line width in characters.
pub const DEFAULT_LINE_LENGTH: usize = 80;
/// Default maximum number of lines before encoding is rejected.
pub const DEFAULT_LINE_COUNT: usize = 6;

/// Marker line introducing an AUTH frame's fallback transcription.
pub const AUTH_SECTION_MARKER: &str = "AUTH FRAME";
/// Marker line introducing a MAIN frame's fallback transcription.
pub const MAIN_SECTION_MARKER: &str = "MAIN FRAME";

/// Knobs controlling how fallback text is grouped and wrapped.
#[derive(Debug, Clone, Copy)]
pub struct FallbackConfig {
	/// Characters per group.
	pub group_size: usize,
	/// Maximum characters per line (groups are separated by single spaces).
	pub line_length: usize,
	/// Optional cap on the number of lines produced; exceeding it is an error.
	pub line_count: Option<usize>,
}

impl Default for FallbackConfig {
	fn default() -> Self {
		FallbackConfig {
			group_size: DEFAULT_GROUP_SIZE,
			line_length: DEFAULT_LINE_LENGTH,
			line_count: Some(DEFAULT_LINE_COUNT),
		}
	}
}

/// Encode bytes (typically an encoded [`Frame`](crate::Frame)) as wrapped z-base-32 lines.
pub fn encode_lines(data: &[u8], config: &FallbackConfig) -> Result<Vec<String>> {
	if config.group_size == 0 {
		return Err(Error::InvalidInput("group_size must be positive"));
	}
	if config.line_length == 0 {
		return Err(Error::InvalidInput("line_length must be positive"));
	}
	if let Some(0) = config.line_count {
		return Err(Error::InvalidInput("line_count must be positive"));
	}

	let encoded = zbase32::encode(data);
	let chars: Vec<char> = encoded.chars().collect();
	let groups: Vec<String> = chars.chunks(config.group_size).map(|c| c.iter().collect()).collect();

	let mut lines = Vec::new();
	let mut current = String::new();
	for group in groups {
		let candidate_len = if current.is_empty() { group.len() } else { current.len() + 1 + group.len() };
		if candidate_len > config.line_length {
			lines.push(std::mem::take(&mut current));
			current = group;
		} else {
			if !current.is_empty() {
				current.push(' ');
			}
			current.push_str(&group);
		}
	}
	if !current.is_empty() {
		lines.push(current);
	}

	if let Some(max) = config.line_count {
		if lines.len() > max {
			return Err(Error::LineCountExceeded);
		}
	}

	Ok(lines)
}

/// Recover the original bytes from wrapped fallback lines.
///
/// Concatenates the lines, strips whitespace and `-`, and z-base-32-decodes the rest.
pub fn decode_lines<I, S>(lines: I) -> Result<Vec<u8>>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut text = String::new();
	for line in lines {
		text.push_str(line.as_ref());
	}
	zbase32::decode(&text)
}

/// Find the line ranges for AUTH and MAIN sections in a combined recovery document.
///
/// Returns `(auth_lines, main_lines)`, where each is the slice of lines between its marker and
/// the next marker (or end of input). MAIN must be present; AUTH is optional.
pub fn split_sections<'a>(lines: &'a [String]) -> Result<(Option<&'a [String]>, &'a [String])> {
	let is_auth_marker = |l: &str| l.to_ascii_uppercase().contains(AUTH_SECTION_MARKER);
	let is_main_marker = |l: &str| l.to_ascii_uppercase().contains(MAIN_SECTION_MARKER);

	let auth_start = lines.iter().position(|l| is_auth_marker(l));
	let main_start = lines.iter().position(|l| is_main_marker(l));

	let main_start = main_start.ok_or(Error::InvalidInput("no MAIN FRAME section marker found"))?;

	let main_end = match auth_start {
		Some(a) if a > main_start => a,
		_ => lines.len(),
	};
	let main_lines = &lines[main_start + 1..main_end];

	let auth_lines = match auth_start {
		Some(a) if a > main_start => {
			let auth_end = lines.len();
			Some(&lines[a + 1..auth_end])
		}
		Some(a) => {
			let auth_end = main_start;
			Some(&lines[a + 1..auth_end])
		}
		None => None,
	};

	Ok((auth_lines, main_lines))
}
