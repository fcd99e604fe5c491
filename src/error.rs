//! Domain error kinds for the decoding core.
//!
//! The CLI and extraction glue use `anyhow::Result`; anything that a
//! decoder itself can raise and that forensic callers need to tell apart
//! (to decide whether to keep scanning or abort) goes through this enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("image I/O error at offset {offset:#x}: {source}")]
	ImageIo {
		offset: u64,
		#[source]
		source: std::io::Error,
	},

	#[error("unexpected magic at offset {offset:#x}: version and compat bytes were both zero")]
	UnexpectedMagic { offset: u64 },

	#[error("BlueStore label failed validation at offset {offset:#x}: {reason}")]
	UnexpectedLabel { offset: u64, reason: String },

	#[error("value out of range: {what} = {value:#x}, limit = {limit:#x}")]
	OutOfRange {
		what: String,
		value: u64,
		limit: u64,
	},

	#[error("decoder at offset {offset:#x} ended at {actual:#x}, expected {expected:#x}")]
	DecodeMismatch {
		offset: u64,
		expected: u64,
		actual: u64,
	},

	#[error("unknown sub-key {subkey:?} under prefix {prefix:?}")]
	UnknownSubkey { prefix: char, subkey: String },

	#[error("{what} version {version} is not implemented (minimum supported is {minimum})")]
	NotImplementedVersion {
		what: String,
		version: u8,
		minimum: u8,
	},
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// True for errors that forensic callers (BlueFS replay, KV prefix
	/// handlers, structured-decoder scans) should swallow and continue
	/// past, per spec's failure-semantics section.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			Error::UnexpectedMagic { .. }
				| Error::DecodeMismatch { .. }
				| Error::UnknownSubkey { .. }
				| Error::NotImplementedVersion { .. }
		)
	}
}
