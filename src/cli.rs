use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

#[derive(Parser)]
pub struct ImageArgs {
	/// Path to a file containing an image of an unencrypted OSD.
	pub image: PathBuf,

	/// Offset of the OSD within the image file. Decimal or 0x-prefixed hex.
	#[arg(long, value_parser = parse_offset, default_value = "0")]
	pub offset: u64,
}

fn parse_offset(s: &str) -> Result<u64, String> {
	match s.strip_prefix("0x") {
		Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string()),
		None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
	}
}

#[derive(Subcommand)]
pub enum Command {
	/// Print BlueStore label and BlueFS superblock information.
	Info {
		#[command(flatten)]
		image: ImageArgs,
	},
	/// Sweep the image in fixed windows for osdmap/inc_osdmap/osd_superblock
	/// structures, independent of BlueFS or the KV store.
	Scan {
		#[command(flatten)]
		image: ImageArgs,
		/// Output directory for decoded hits.
		out: PathBuf,
	},
	/// Replay the BlueFS transaction log and extract its files (this is
	/// where the embedded RocksDB database lives).
	Bluefs {
		#[command(flatten)]
		image: ImageArgs,
		out: PathBuf,
	},
	/// Full pipeline: BlueFS replay, KV store load, object reconstruction.
	Extract {
		#[command(flatten)]
		image: ImageArgs,

		/// Path of the `ldb` executable from RocksDB. Must be in PATH if
		/// omitted.
		#[arg(long, default_value = "ldb")]
		ldb: String,

		/// Output directory.
		out: PathBuf,

		/// Only extract objects whose oid matches this regex.
		#[arg(long)]
		objfilter: Option<String>,

		/// Remove `out` first if it already exists.
		#[arg(long)]
		clear: bool,

		/// Also extract unallocated physical extents to
		/// `<out>/unallocated`.
		#[arg(long)]
		extract_unallocated: bool,
	},
	/// Stitch `object_<hex>` files produced by `extract` back into one
	/// `rebuild` file, by seeking each to `stripe * blocksize`.
	Rebuild {
		/// Directory containing `object_<hex>` files.
		dir: PathBuf,

		/// Size of one object/stripe, in bytes.
		#[arg(long, default_value_t = 4 * 1024 * 1024)]
		blocksize: u64,
	},
}

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	#[command(flatten)]
	pub verbose: Verbosity<WarnLevel>,
}
