//! Low-level binary framing for paper-durable backups.
//!
//! This crate has no notion of manifests, encryption, or Shamir shares — it only knows how to
//! turn bytes into [`Frame`][frame::Frame]s and back, and how to represent a frame's payload as
//! something that can be put on paper (a QR code's binary/base64 payload, or a z-base-32
//! fallback transcription).
//!
//! [Spec](https://github.com/passcod/zarc/blob/main/SPEC.md) inspired the module split, but the
//! wire format itself follows this project's own specification, not Zarc's.

pub mod error;
pub mod fallback;
pub mod frame;
pub mod qr_payload;
pub mod varint;
pub mod zbase32;

#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use frame::{Frame, FrameType};
