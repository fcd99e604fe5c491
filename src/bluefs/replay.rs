//! BlueFS transaction log replay: reconstructs the in-memory filesystem
//! state (directories, files, allocator regions, live/dead extents) from
//! the on-disk log, as a fixpoint over the log file's own extents.

use std::collections::HashMap;

use super::{Extent, FNode, Op, Superblock, Transaction};
use crate::{
	cursor::{read_fixed_int, read_uuid, ByteCursor},
	error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
	Applied,
	Skipped,
	Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct Dir {
	pub name: String,
	pub ino_to_file: HashMap<u64, String>,
}

impl Dir {
	fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			ino_to_file: HashMap::new(),
		}
	}

	/// A filename must be unique per directory at any time: drop any prior
	/// occupant of `filename` before linking the new ino.
	fn link(&mut self, filename: &str, ino: u64) {
		self.ino_to_file.retain(|_, v| v != filename);
		self.ino_to_file.insert(ino, filename.to_string());
	}

	fn unlink(&mut self, filename: &str) {
		self.ino_to_file.retain(|_, v| v != filename);
	}
}

#[derive(Debug, Clone, Default)]
pub struct State {
	pub initialized: bool,
	pub allocator_regions: HashMap<u8, (u64, u64)>,
	pub directories: Vec<Dir>,
	pub files: HashMap<u64, FNode>,
	pub allocated_extents: Vec<Extent>,
	pub deallocated_extents: Vec<Extent>,
}

impl State {
	fn dir_mut(&mut self, name: &str) -> Option<&mut Dir> {
		self.directories.iter_mut().find(|d| d.name == name)
	}

	/// Applies one operation's effect. Ops other than NONE/INIT require
	/// `initialized`; applying one beforehand fails, which the caller
	/// treats as the whole enclosing block being ignored.
	fn apply(&mut self, op: &Op) -> Result<()> {
		if matches!(op, Op::None) {
			return Ok(());
		}
		if matches!(op, Op::Init) {
			self.initialized = true;
			return Ok(());
		}
		if !self.initialized {
			return Err(Error::DecodeMismatch {
				offset: 0,
				expected: 1,
				actual: 0,
			});
		}
		match op {
			Op::None | Op::Init => unreachable!(),
			Op::AllocAdd { id, offset, length } => {
				self.allocator_regions.insert(*id, (*offset, *length));
			}
			Op::AllocRm { .. } => {
				return Err(Error::NotImplementedVersion {
					what: "BlueFS ALLOC_RM".into(),
					version: 0,
					minimum: 1,
				})
			}
			Op::DirLink { dir, file, ino } => {
				if let Some(d) = self.dir_mut(dir) {
					d.link(file, *ino);
				}
			}
			Op::DirUnlink { dir, file } => {
				if let Some(d) = self.dir_mut(dir) {
					d.unlink(file);
				}
			}
			Op::DirCreate { dir } => {
				if self.dir_mut(dir).is_none() {
					self.directories.push(Dir::new(dir.clone()));
				}
			}
			Op::DirRemove { .. } => {
				return Err(Error::NotImplementedVersion {
					what: "BlueFS DIR_REMOVE".into(),
					version: 0,
					minimum: 1,
				})
			}
			Op::FileUpdate(fnode) => {
				for e in &fnode.extents {
					if !self.allocated_extents.contains(e) {
						self.allocated_extents.push(*e);
					}
					self.deallocated_extents.retain(|d| d != e);
				}
				self.files.insert(fnode.ino, fnode.clone());
			}
			Op::FileRemove { ino } => {
				if let Some(f) = self.files.remove(ino) {
					for e in &f.extents {
						self.allocated_extents.retain(|a| a != e);
						if !self.deallocated_extents.contains(e) {
							self.deallocated_extents.push(*e);
						}
					}
				}
			}
			Op::Jump { .. } | Op::JumpSeq { .. } => {
				return Err(Error::NotImplementedVersion {
					what: "BlueFS JUMP_SEQ".into(),
					version: 0,
					minimum: 1,
				})
			}
		}
		Ok(())
	}
}

pub struct Replay {
	pub state: State,
	pub block_size: u64,
	pub next_offset: u64,
	/// `(block offset, seq)` for blocks that were decoded and applied.
	pub applied: Vec<(u64, u64)>,
	/// `(block offset, seq)` for blocks decoded while `next_offset >
	/// logical_offset` — retained for historical/fork diagnosis only.
	pub skipped: Vec<(u64, u64)>,
}

impl Replay {
	pub fn run(image: &mut dyn ByteCursor, superblock: &Superblock) -> Result<Self> {
		let mut state = State::default();
		state
			.files
			.insert(superblock.log_fnode.ino, superblock.log_fnode.clone());

		let mut replay = Self {
			state,
			block_size: superblock.block_size,
			next_offset: 0,
			applied: Vec::new(),
			skipped: Vec::new(),
		};

		let mut extents = superblock.log_fnode.extents.clone();
		if extents.is_empty() {
			return Err(Error::DecodeMismatch {
				offset: superblock.start,
				expected: 1,
				actual: 0,
			});
		}

		let mut old_extents: Vec<Extent> = Vec::new();
		let mut logical_offset = 0u64;
		loop {
			old_extents.extend(extents.iter().copied());
			logical_offset = replay.read_extents(image, &extents, logical_offset, superblock)?;
			let new_extents = replay
				.state
				.files
				.get(&1)
				.map(|f| f.extents.clone())
				.unwrap_or_default();
			extents = new_extents
				.into_iter()
				.filter(|e| !old_extents.contains(e))
				.collect();
			if extents.is_empty() {
				break;
			}
		}

		replay.validate_extent_locations()?;
		Ok(replay)
	}

	fn read_extents(
		&mut self,
		image: &mut dyn ByteCursor,
		extents: &[Extent],
		mut logical_offset: u64,
		superblock: &Superblock,
	) -> Result<u64> {
		for e in extents {
			let mut block = 0u64;
			while block * self.block_size < e.length {
				let this_off = e.offset + block * self.block_size;
				if self.next_offset > logical_offset {
					let _ = self.read_transaction(image, this_off, true, superblock);
				} else {
					self.next_offset = 0;
					let _ = self.read_transaction(image, this_off, false, superblock);
				}
				block += 1;
				logical_offset += self.block_size;
			}
		}
		Ok(logical_offset)
	}

	/// Decodes one block at `offset`. Any failure (bad magic, UUID
	/// mismatch, truncated transaction, mismatched end offset) yields
	/// `Ignored` and leaves state untouched beyond whatever partial op
	/// application happened before the failing op — matching the
	/// source's block-level `try/except` tolerance.
	fn read_transaction(
		&mut self,
		image: &mut dyn ByteCursor,
		offset: u64,
		skip: bool,
		superblock: &Superblock,
	) -> Result<BlockOutcome> {
		image.seek(offset)?;
		let header = crate::cursor::read_block_header(image)?;
		if header.body_len as u64 > self.block_size {
			return Err(Error::DecodeMismatch {
				offset,
				expected: self.block_size,
				actual: header.body_len as u64,
			});
		}
		let uuid = read_uuid(image)?;
		if uuid != superblock.bluefs_uuid {
			return Err(Error::UnexpectedMagic { offset });
		}
		let seq = read_fixed_int(image, 8, false)? as u64;
		let tx = Transaction::parse(image)?;
		let _crc = read_fixed_int(image, 4, false)? as u32;
		header.finish(image, offset)?;
		let _unused = image.read(16)?;

		if skip {
			self.skipped.push((offset, seq));
			return Ok(BlockOutcome::Skipped);
		}

		for op in &tx.ops {
			if let Op::Jump { offset: jump_to, .. } = op {
				if self.next_offset == 0 {
					self.next_offset = *jump_to;
				}
				continue;
			}
			self.state.apply(op)?;
		}
		self.applied.push((offset, seq));
		Ok(BlockOutcome::Applied)
	}

	/// Every extent in `allocated_extents` must lie inside some declared
	/// allocator region.
	fn validate_extent_locations(&self) -> Result<()> {
		for e in &self.state.allocated_extents {
			let ok = self.state.allocator_regions.values().any(|(off, len)| {
				e.offset >= *off && e.offset + e.length <= off + len
			});
			if !ok {
				return Err(Error::OutOfRange {
					what: "bluefs extent outside allocator regions".into(),
					value: e.offset,
					limit: 0,
				});
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		bluefs::{Extent, FNode},
		cursor::{BufferCursor, UTime, Uuid},
	};

	fn encode_block_header(v: u8, compat: u8, body: &[u8]) -> Vec<u8> {
		let mut out = vec![v, compat];
		out.extend_from_slice(&(body.len() as u32).to_le_bytes());
		out.extend_from_slice(body);
		out
	}

	fn encode_varint(mut v: u64) -> Vec<u8> {
		let mut out = vec![];
		loop {
			let mut b = (v & 0x7f) as u8;
			v >>= 7;
			if v != 0 {
				b |= 0x80;
			}
			out.push(b);
			if v == 0 {
				break;
			}
		}
		out
	}

	fn encode_lba(offset: u64) -> Vec<u8> {
		// Emit the w&7==0 form: value = (w & 0x7ffffffe) << 11, no
		// extension bytes, requiring offset to be a multiple of 1<<11 and
		// representable in the low 31 bits after the shift.
		let w = ((offset >> 11) as u32) & 0x7ffffffe;
		w.to_le_bytes().to_vec()
	}

	fn encode_varint_lowz(v: u64) -> Vec<u8> {
		encode_varint(v << 2)
	}

	fn encode_extent(offset: u64, length: u64, bdev: u8) -> Vec<u8> {
		let mut body = encode_lba(offset);
		body.extend_from_slice(&encode_varint_lowz(length));
		body.push(bdev);
		encode_block_header(1, 1, &body)
	}

	fn encode_fnode(ino: u64, size: u64, extents: &[(u64, u64, u8)]) -> Vec<u8> {
		let mut body = encode_varint(ino);
		body.extend_from_slice(&encode_varint(size));
		body.extend_from_slice(&0u32.to_le_bytes()); // mtime.sec
		body.extend_from_slice(&0u32.to_le_bytes()); // mtime.nsec
		body.push(1); // prefer_bdev
		body.extend_from_slice(&(extents.len() as u32).to_le_bytes());
		for (o, l, b) in extents {
			body.extend_from_slice(&encode_extent(*o, *l, *b));
		}
		encode_block_header(1, 1, &body)
	}

	fn encode_string(s: &str) -> Vec<u8> {
		let mut out = (s.len() as u32).to_le_bytes().to_vec();
		out.extend_from_slice(s.as_bytes());
		out
	}

	fn encode_op_init() -> Vec<u8> {
		vec![1]
	}
	fn encode_op_alloc_add(id: u8, offset: u64, length: u64) -> Vec<u8> {
		let mut out = vec![2, id];
		out.extend_from_slice(&offset.to_le_bytes());
		out.extend_from_slice(&length.to_le_bytes());
		out
	}
	fn encode_op_dir_create(dir: &str) -> Vec<u8> {
		let mut out = vec![6];
		out.extend_from_slice(&encode_string(dir));
		out
	}
	fn encode_op_file_update(ino: u64, size: u64, extents: &[(u64, u64, u8)]) -> Vec<u8> {
		let mut out = vec![8];
		out.extend_from_slice(&encode_fnode(ino, size, extents));
		out
	}
	fn encode_op_dir_link(dir: &str, file: &str, ino: u64) -> Vec<u8> {
		let mut out = vec![4];
		out.extend_from_slice(&encode_string(dir));
		out.extend_from_slice(&encode_string(file));
		out.extend_from_slice(&ino.to_le_bytes());
		out
	}

	fn encode_transaction(ops: &[Vec<u8>]) -> Vec<u8> {
		let body: Vec<u8> = ops.concat();
		let mut out = (body.len() as u32).to_le_bytes().to_vec();
		out.extend_from_slice(&body);
		out
	}

	fn encode_block(uuid: Uuid, seq: u64, ops: &[Vec<u8>]) -> Vec<u8> {
		let mut body = uuid.0.to_vec();
		body.extend_from_slice(&seq.to_le_bytes());
		body.extend_from_slice(&encode_transaction(ops));
		body.extend_from_slice(&0u32.to_le_bytes()); // crc
		let mut out = encode_block_header(1, 1, &body);
		out.extend_from_slice(&[0u8; 16]); // trailer, outside the declared body
		out
	}

	#[test]
	fn replay_synthetic_log_creates_directory_and_file() {
		let uuid = Uuid([7u8; 16]);
		let block_size = 0x1000u64;

		let ops = vec![
			encode_op_init(),
			encode_op_alloc_add(1, 0x10000, 0x10000),
			encode_op_dir_create("db"),
			encode_op_file_update(100, 10, &[(0x10000, 0x1000, 1)]),
			encode_op_dir_link("db", "CURRENT", 100),
		];
		let mut block0 = encode_block(uuid, 1, &ops);
		block0.resize(block_size as usize, 0);

		let superblock = Superblock {
			start: 0x1000,
			end: 0x1000,
			bluefs_uuid: uuid,
			osd_uuid: uuid,
			version: 1,
			block_size,
			log_fnode: FNode {
				ino: 1,
				size: block_size,
				mtime: UTime { sec: 0, nsec: 0 },
				prefer_bdev: 0,
				extents: vec![Extent {
					offset: 0,
					length: block_size,
					bdev: 1,
				}],
			},
			crc: 0,
			slack: vec![],
		};

		let mut image = BufferCursor::new(block0);
		let replay = Replay::run(&mut image, &superblock).unwrap();

		assert!(replay.state.initialized);
		let dir = replay
			.state
			.directories
			.iter()
			.find(|d| d.name == "db")
			.unwrap();
		assert_eq!(dir.ino_to_file.get(&100).map(String::as_str), Some("CURRENT"));
		let file = replay.state.files.get(&100).unwrap();
		assert_eq!(file.size, 10);
		assert_eq!(file.extents[0].offset, 0x10000);
	}
}
