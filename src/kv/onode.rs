//! Onodes, blobs, and the extent-map indirection chain that turns an
//! object's byte range into physical bytes on the image. Grounded on
//! `original_source/src/vampyr/kv.py`'s `KVObjectNameKey`, `KVONode`,
//! `KVExtentMap`, `KVBlob`, and `CephPExtent`.

use std::{collections::HashMap, rc::Rc};

use crate::{
	cursor::{read_block_header, read_fixed_int, read_list, read_u8, read_varint, ByteCursor},
	error::{Error, Result},
	kv::types::{FileLayout, InodeBacktrace, Lock, ObjectInfo, ShardInfo, SnapSet},
};

/// The key half of an `O`-prefix row: `KVObjectNameKey`.
#[derive(Debug, Clone)]
pub struct ObjectKey {
	pub shard: i8,
	pub poolid: i64,
	pub hash: u32,
	pub ns: String,
	pub key: String,
	pub name: String,
	pub snap: u64,
	pub generation: u64,
	/// Everything before the last `.`-separated stripe suffix, or the
	/// whole key when it has none.
	pub oid: String,
	pub stripe: Option<String>,
}

impl ObjectKey {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let shard = read_u8(c)? as i16 - 0x80;
		let poolid = read_fixed_int(c, 8, true)? as i128 - 0x8000_0000_0000_0000i128;
		let hash = read_fixed_int(c, 4, true)? as u32;
		let ns = crate::cursor::read_escaped_string(c)?;
		let key = crate::cursor::read_escaped_string(c)?;
		let (oid, stripe) = split_oid_and_stripe(&key);
		let op = read_u8(c)?;
		if op != b'<' && op != b'=' && op != b'>' {
			return Err(Error::DecodeMismatch {
				offset: c.tell(),
				expected: b'=' as u64,
				actual: op as u64,
			});
		}
		let name = if op == b'=' {
			key.clone()
		} else {
			crate::cursor::read_escaped_string(c)?
		};
		let snap = read_fixed_int(c, 8, true)? as u64;
		let generation = read_fixed_int(c, 8, true)? as u64;
		let trailing = read_u8(c)?;
		if trailing != b'o' {
			return Err(Error::DecodeMismatch {
				offset: c.tell(),
				expected: b'o' as u64,
				actual: trailing as u64,
			});
		}
		Ok(Self {
			shard: shard as i8,
			poolid: poolid as i64,
			hash,
			ns,
			key,
			name,
			snap,
			generation,
			oid,
			stripe,
		})
	}
}

impl std::fmt::Display for ObjectKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"shard: {:#x}, ns: {}, key: {}, name: {}, poolid: {:#x}, snap: {:#x}, gen: {:#x}",
			self.shard, self.ns, self.key, self.name, self.poolid, self.snap, self.generation
		)
	}
}

/// Identity used by the onode/oid maps: the raw key string only, matching
/// the original's `__eq__`/`__hash__` (which ignores shard/pool/snap/
/// generation despite the Data Model listing them as part of the key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentity(pub String);

impl From<&ObjectKey> for ObjectIdentity {
	fn from(k: &ObjectKey) -> Self {
		Self(k.key.clone())
	}
}

fn split_oid_and_stripe(key: &str) -> (String, Option<String>) {
	if !key.contains('.') {
		return (key.to_string(), None);
	}
	let parts: Vec<&str> = key.split('.').collect();
	if key.ends_with(".inode") {
		let oid = parts[..parts.len() - 2].join(".");
		let stripe = parts[parts.len() - 2..].join(".");
		(oid, Some(stripe))
	} else {
		let oid = parts[..parts.len() - 1].join(".");
		let stripe = parts[parts.len() - 1].to_string();
		(oid, Some(stripe))
	}
}

/// `CephPExtent`: one physical disk range backing a blob, or a hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PExtent {
	pub offset: u64,
	pub length: u64,
	pub valid: bool,
}

/// In-memory hole marker, distinct from the 80-bit all-ones wire sentinel
/// actually matched against while decoding.
pub const PEXTENT_INVALID_OFFSET: u64 = 0xf_ffff_ffff;
const PEXTENT_WIRE_SENTINEL: u128 = 0x01FF_FFFF_FFFF_FFFF_FFFF;

impl PExtent {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let readahead = read_fixed_int(c, 10, false)?;
		let (offset, valid) = if readahead == PEXTENT_WIRE_SENTINEL {
			(PEXTENT_INVALID_OFFSET, false)
		} else {
			c.seek(start)?;
			(crate::cursor::read_lba(c)?, true)
		};
		let length = crate::cursor::read_varint_lowz(c)?;
		Ok(Self {
			offset,
			length,
			valid,
		})
	}

	pub fn read(&self, c: &mut dyn ByteCursor) -> Result<Vec<u8>> {
		if !self.valid {
			return Err(Error::OutOfRange {
				what: "read of a hole physical extent".into(),
				value: self.offset,
				limit: 0,
			});
		}
		c.seek(self.offset)?;
		c.read(self.length as usize)
	}
}

impl std::fmt::Display for PExtent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:#x}-{:#x}", self.offset, self.length)
	}
}

const BLOB_COMPRESSED: u64 = 0x2;
const BLOB_CSUM: u64 = 0x4;
const BLOB_HAS_UNUSED: u64 = 0x8;
const BLOB_SHARED: u64 = 0x10;

/// `KVBlob`: a set of physical extents shared (possibly) across logical
/// extents, with optional compression/checksum/ref-count metadata.
#[derive(Debug, Clone)]
pub struct Blob {
	pub extents: Vec<PExtent>,
	pub flags: u64,
	pub logical_length: u64,
	pub compressed_length: Option<u64>,
	pub csum_type: Option<u8>,
	pub csum_chunk_order: Option<u8>,
	pub unused: Option<u16>,
	pub shared_blob_id: Option<u64>,
}

impl Blob {
	/// `include_ref_map` mirrors the original's `(v, bool)` pair: spanning
	/// blobs read and discard a per-allocation-unit reference-count map
	/// after their own fields when the enclosing onode's spanning-blob
	/// section version is greater than 1.
	pub fn parse(c: &mut dyn ByteCursor, include_ref_map: Option<u8>) -> Result<Self> {
		let num_extents = read_varint(c)?;
		let mut extents = Vec::new();
		for _ in 0..num_extents {
			let pe = PExtent::parse(c)?;
			if pe.valid {
				extents.push(pe);
			}
		}
		let flags = read_varint(c)?;

		let (logical_length, compressed_length) = if flags & BLOB_COMPRESSED != 0 {
			let logical_length = crate::cursor::read_varint_lowz(c)?;
			let compressed_length = crate::cursor::read_varint_lowz(c)?;
			(logical_length, Some(compressed_length))
		} else {
			(extents.iter().map(|e| e.length).sum(), None)
		};

		let (csum_type, csum_chunk_order) = if flags & BLOB_CSUM != 0 {
			let csum_type = read_u8(c)?;
			let csum_chunk_order = read_u8(c)?;
			let csum_len = read_varint(c)? as usize;
			let _csum_data = c.read(csum_len)?;
			(Some(csum_type), Some(csum_chunk_order))
		} else {
			(None, None)
		};

		let unused = if flags & BLOB_HAS_UNUSED != 0 {
			Some(read_fixed_int(c, 2, false)? as u16)
		} else {
			None
		};

		let shared_blob_id = if flags & BLOB_SHARED != 0 {
			Some(read_fixed_int(c, 8, false)? as u64)
		} else {
			None
		};

		if let Some(v) = include_ref_map {
			if v <= 1 {
				return Err(Error::NotImplementedVersion {
					what: "spanning blob ref map".into(),
					version: v,
					minimum: 2,
				});
			}
			let au_size = read_varint(c)?;
			if au_size > 0 {
				let num_au = read_varint(c)?;
				if num_au == 0 {
					let _total_bytes = read_varint(c)?;
				} else {
					for _ in 0..num_au {
						let _byte_per_au = read_varint(c)?;
					}
				}
			}
		}

		Ok(Self {
			extents,
			flags,
			logical_length,
			compressed_length,
			csum_type,
			csum_chunk_order,
			unused,
			shared_blob_id,
		})
	}
}

impl std::fmt::Display for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let exts = self
			.extents
			.iter()
			.map(|e| e.to_string())
			.collect::<Vec<_>>()
			.join(", ");
		if let Some(c) = self.compressed_length {
			write!(
				f,
				"llength: {:#x}, clength: {:#x}, extents: [{}]",
				self.logical_length, c, exts
			)
		} else {
			write!(f, "llength: {:#x}, extents: [{}]", self.logical_length, exts)
		}
	}
}

/// One entry in an onode's extent map: a logical byte range backed by a
/// (possibly shared) blob.
#[derive(Debug, Clone)]
pub struct LExtent {
	pub logical_offset: u64,
	pub blob_offset: u64,
	pub length: u64,
	pub blob: Rc<Blob>,
}

impl LExtent {
	/// Returns `(content, slack)`: `content` is the first `length` bytes of
	/// the blob's stored content, `slack` is whatever trails it.
	pub fn read(&self, c: &mut dyn ByteCursor) -> Result<(Vec<u8>, Vec<u8>)> {
		let mut full = Vec::new();
		for pe in &self.blob.extents {
			full.extend(pe.read(c)?);
		}
		let end = (self.length as usize).min(full.len());
		let content = full.get(..end).unwrap_or(&[]).to_vec();
		let slack = full.get(end..).unwrap_or(&[]).to_vec();
		Ok((content, slack))
	}
}

const EXT_CONTIGUOUS: u64 = 0x1;
const EXT_ZEROOFFSET: u64 = 0x2;
const EXT_SAMELENGTH: u64 = 0x4;
const EXT_SPANNING: u64 = 0x8;
const EXT_SHIFTBITS: u32 = 4;

/// Decode one extent-map shard (`KVExtentMap`), appending its logical
/// extents to `lextents` and any newly-parsed inline blobs to
/// `local_blobs` (indexed by parse position, per the original's
/// position-indexed slot reuse rather than blob-id indexing).
pub fn decode_extent_map_shard(
	c: &mut dyn ByteCursor,
	spanning_blob_map: &HashMap<u64, Rc<Blob>>,
	lextents: &mut Vec<LExtent>,
	has_length_header: bool,
) -> Result<()> {
	let start = c.tell();
	let remaining = c.len().saturating_sub(c.tell());
	if remaining.min(0x20) < 4 {
		c.seek(c.len())?;
		return Ok(());
	}

	let end_offset = if has_length_header {
		let extentmap_length = read_fixed_int(c, 4, false)? as u64;
		c.tell() + extentmap_length
	} else {
		c.len()
	};

	let v = read_u8(c)?;
	if v != 2 {
		return Err(Error::NotImplementedVersion {
			what: "extent map shard".into(),
			version: v,
			minimum: 2,
		});
	}

	let num = read_varint(c)? as usize;
	let mut local_blobs: Vec<Option<Rc<Blob>>> = vec![None; num];
	let mut pos = 0u64;
	let mut prev_len = 0u64;

	for n in 0..num {
		let blobid = read_varint(c)?;

		if blobid & EXT_CONTIGUOUS == 0 {
			pos += crate::cursor::read_varint_lowz(c)?;
		}
		let logical_offset = pos;

		let blob_offset = if blobid & EXT_ZEROOFFSET == 0 {
			crate::cursor::read_varint_lowz(c)?
		} else {
			0
		};

		if blobid & EXT_SAMELENGTH == 0 {
			prev_len = crate::cursor::read_varint_lowz(c)?;
		}
		let length = prev_len;

		let blob = if blobid & EXT_SPANNING != 0 {
			let blobshift = blobid >> EXT_SHIFTBITS;
			spanning_blob_map
				.get(&blobshift)
				.cloned()
				.ok_or(Error::OutOfRange {
					what: "spanning blob reference".into(),
					value: blobshift,
					limit: spanning_blob_map.len() as u64,
				})?
		} else {
			let idx = blobid >> EXT_SHIFTBITS;
			if idx != 0 {
				local_blobs
					.get((idx - 1) as usize)
					.and_then(|b| b.clone())
					.ok_or(Error::OutOfRange {
						what: "inline blob back-reference".into(),
						value: idx,
						limit: num as u64,
					})?
			} else {
				let b = Rc::new(Blob::parse(c, None)?);
				local_blobs[n] = Some(b.clone());
				b
			}
		};

		lextents.push(LExtent {
			logical_offset,
			blob_offset,
			length,
			blob,
		});
		pos += prev_len;
	}

	let end = c.tell();
	if has_length_header && end != end_offset {
		return Err(Error::DecodeMismatch {
			offset: start,
			expected: end_offset,
			actual: end,
		});
	}
	Ok(())
}

/// Typed xattrs recognized on an onode; anything else is kept raw since
/// the onode's `attrs_raw` dict doesn't tell us the value's shape ahead of
/// time.
#[derive(Debug, Clone)]
pub enum Xattr {
	Parent(InodeBacktrace),
	ObjectInfo(ObjectInfo),
	SnapSet(SnapSet),
	Layout(FileLayout),
	RbdLock(Lock),
	Raw(Vec<u8>),
}

/// `KVONode`: the onode header row (`o`-prefixed numeric-oid key).
#[derive(Debug, Clone)]
pub struct Onode {
	pub oid: u64,
	pub size: u64,
	pub attrs: HashMap<String, Xattr>,
	pub flags: u8,
	pub extent_map_shards: Vec<ShardInfo>,
	pub expected_object_size: u64,
	pub expected_write_size: u64,
	pub alloc_hint_flags: u64,
	pub spanning_blob_map: HashMap<u64, Rc<Blob>>,
	pub lextents: Vec<LExtent>,
}

impl Onode {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let oid = read_varint(c)?;
		let size = read_varint(c)?;

		let attrs_raw = read_list(c, |c| -> Result<(String, Vec<u8>)> {
			let k = crate::cursor::read_string(c)?;
			let v = crate::cursor::read_bufferlist(c)?.into_vec();
			Ok((k, v))
		})?;

		let mut attrs = HashMap::new();
		for (name, raw) in attrs_raw {
			let mut vc = crate::cursor::BufferCursor::new(raw.clone());
			let decoded = match name.as_str() {
				"_parent" => InodeBacktrace::parse(&mut vc).map(Xattr::Parent),
				"_" => ObjectInfo::parse(&mut vc).map(Xattr::ObjectInfo),
				"snapset" => SnapSet::parse(&mut vc).map(Xattr::SnapSet),
				"_layout" => FileLayout::parse(&mut vc).map(Xattr::Layout),
				"_lock.rbd_lock" => Lock::parse(&mut vc).map(Xattr::RbdLock),
				_ => Ok(Xattr::Raw(raw.clone())),
			};
			match decoded {
				Ok(x) => {
					attrs.insert(name, x);
				}
				Err(_) => {
					attrs.insert(name, Xattr::Raw(raw));
				}
			}
		}

		let flags = read_u8(c)?;
		let extent_map_shards = read_list(c, ShardInfo::parse)?;
		let expected_object_size = read_varint(c)?;
		let expected_write_size = read_varint(c)?;
		let alloc_hint_flags = read_varint(c)?;
		header.finish(c, start)?;

		let spanning_version = read_u8(c)?;
		if spanning_version != 2 {
			return Err(Error::NotImplementedVersion {
				what: "spanning blob map".into(),
				version: spanning_version,
				minimum: 2,
			});
		}
		let mut spanning_blob_map = HashMap::new();
		let n = read_varint(c)?;
		for _ in 0..n {
			let bid = read_varint(c)?;
			let b = Blob::parse(c, Some(spanning_version))?;
			spanning_blob_map.insert(bid, Rc::new(b));
		}

		Ok(Self {
			oid,
			size,
			attrs,
			flags,
			extent_map_shards,
			expected_object_size,
			expected_write_size,
			alloc_hint_flags,
			spanning_blob_map,
			lextents: Vec::new(),
		})
	}
}

impl std::fmt::Display for Onode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "oid: {}, object_size: {:#x}", self.oid, self.size)
	}
}
