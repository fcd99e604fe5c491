//! BlueFS: the log-structured filesystem embedded in BlueStore that holds
//! the RocksDB files the KV store is built from.

mod extract;
mod ops;
mod replay;

pub use extract::extract_files;
pub use ops::{Op, OpCode, Transaction};
pub use replay::{BlockOutcome, Replay, State};

use crate::{
	cursor::{
		read_block_header, read_fixed_int, read_list, read_utime, read_uuid, read_varint,
		read_varint_lowz, ByteCursor, UTime, Uuid,
	},
	error::{Error, Result},
};

const SUPERBLOCK_OFFSET: u64 = 0x1000;
const SUPERBLOCK_RESERVED_END: u64 = 0x2000;

/// `{offset, length, bdev}`. Compared by `offset` only, per the design note
/// on operator-overloaded equality: two extents that happen to cover the
/// same range from different replay points are the "same" extent for the
/// purposes of allocated/deallocated bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct Extent {
	pub offset: u64,
	pub length: u64,
	pub bdev: u8,
}

impl PartialEq for Extent {
	fn eq(&self, other: &Self) -> bool {
		self.offset == other.offset
	}
}
impl Eq for Extent {}

impl Extent {
	fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let offset = crate::cursor::read_lba(c)?;
		let length = read_varint_lowz(c)?;
		let bdev = crate::cursor::read_u8(c)?;
		header.finish(c, start)?;
		Ok(Self {
			offset,
			length,
			bdev,
		})
	}
}

impl std::fmt::Display for Extent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"{:#x}+{:#x} (bdev {})",
			self.offset, self.length, self.bdev
		)
	}
}

/// `{ino, size, mtime, preferred_device, extents[]}`.
#[derive(Debug, Clone)]
pub struct FNode {
	pub ino: u64,
	pub size: u64,
	pub mtime: UTime,
	pub prefer_bdev: u8,
	pub extents: Vec<Extent>,
}

impl FNode {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let ino = read_varint(c)?;
		let size = read_varint(c)?;
		let mtime = read_utime(c)?;
		let prefer_bdev = crate::cursor::read_u8(c)?;
		let extents = read_list(c, Extent::parse)?;
		header.finish(c, start)?;
		Ok(Self {
			ino,
			size,
			mtime,
			prefer_bdev,
			extents,
		})
	}
}

#[derive(Debug, Clone)]
pub struct Superblock {
	pub start: u64,
	pub end: u64,
	pub bluefs_uuid: Uuid,
	pub osd_uuid: Uuid,
	pub version: u64,
	pub block_size: u64,
	pub log_fnode: FNode,
	pub crc: u32,
	pub slack: Vec<u8>,
}

impl Superblock {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		c.seek(SUPERBLOCK_OFFSET)?;
		let start = c.tell();
		let header = read_block_header(c)?;
		let bluefs_uuid = read_uuid(c)?;
		let osd_uuid = read_uuid(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		let block_size = read_fixed_int(c, 4, false)? as u64;
		let log_fnode = FNode::parse(c)?;
		header.finish(c, start)?;
		let end = c.tell();
		let crc = read_fixed_int(c, 4, false)? as u32;

		let tail = c.tell();
		if SUPERBLOCK_RESERVED_END < tail {
			return Err(Error::OutOfRange {
				what: "bluefs superblock slack".into(),
				value: tail,
				limit: SUPERBLOCK_RESERVED_END,
			});
		}
		let slack = c.read((SUPERBLOCK_RESERVED_END - tail) as usize)?;

		Ok(Self {
			start,
			end,
			bluefs_uuid,
			osd_uuid,
			version,
			block_size,
			log_fnode,
			crc,
			slack,
		})
	}
}

impl std::fmt::Display for Superblock {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "------------------------------")?;
		writeln!(f, "BlueFS Superblock Information:")?;
		writeln!(f, "------------------------------")?;
		writeln!(f, "BlueFS UUID: {}", self.bluefs_uuid)?;
		writeln!(f, "OSD UUID:    {}", self.osd_uuid)?;
		writeln!(f, "Version: {}", self.version)?;
		writeln!(f, "Block size: {:#x}", self.block_size)?;
		writeln!(f, "Log fnode ino {}, size {:#x}", self.log_fnode.ino, self.log_fnode.size)?;
		for e in &self.log_fnode.extents {
			writeln!(f, "  - {e}")?;
		}
		writeln!(f, "CRC32 checksum: {:#010x}", self.crc)
	}
}
