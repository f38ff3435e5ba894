//! Paperback: encrypted, paper-durable backups.
//!
//! A manifest and its files are bundled into an envelope, optionally zstd-compressed, sealed
//! with a passphrase, signed, and split across print-sized frames — QR codes and a z-base-32
//! fallback transcription, via [`paperback_wire`]. This crate knows nothing about the frame wire
//! format itself; it builds and consumes [`paperback_wire::Frame`]s.
//!
//! See [`backup::build_backup`] and [`recovery::recover`] for the two pipeline entry points.

#![warn(clippy::unwrap_used, missing_docs)]
#![deny(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod aead;
pub mod backup;
pub mod chunking;
pub mod compression;
pub mod envelope;
pub mod error;
pub mod manifest;
pub mod recovery;
pub mod shamir;
pub mod signing;

#[doc(inline)]
pub use error::{Error, Result};
