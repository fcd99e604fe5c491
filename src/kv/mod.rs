//! Loads a textual RocksDB dump (`ldb idump --db=<dir> --hex` stdout) and
//! dispatches each row to its prefix handler. Grounded on
//! `original_source/src/vampyr/kv.py`'s `RDBKV` and `PrefixHandler*`
//! classes.

pub mod onode;
pub mod types;

use std::collections::HashMap;

use onode::{ObjectIdentity, ObjectKey, Onode};
use types::{DirFNode, INode, PastIntervals, PgFastinfo, PgLogDup, PgLogEntry};

use crate::{
	cursor::{read_u8, read_utime, BufferCursor, ByteCursor},
	error::Result,
	structured::Pg,
};

/// One decoded row out of the dump: `{prefix, raw_key, raw_value, sequence}`.
#[derive(Debug, Clone)]
pub struct KvRow {
	pub prefix: u8,
	pub raw_key: Vec<u8>,
	pub raw_value: Vec<u8>,
	pub sequence: u64,
}

/// Parse one line of `'HEXKEY' seq:N, type:T => HEXVALUE` output. Lines
/// that don't match the shape are not rows from this store (headers,
/// blank lines, diagnostics printed by the dump tool) and are skipped by
/// the caller.
fn parse_dump_line(line: &str) -> Option<(Vec<u8>, Vec<u8>, u64)> {
	let rest = line.strip_prefix('\'')?;
	let (hexkey, rest) = rest.split_once('\'')?;
	let rest = rest.strip_prefix(" seq:")?;
	let (seqstr, rest) = rest.split_once(", type:")?;
	let (_typestr, rest) = rest.split_once(" => ")?;
	let hexvalue = rest;

	if hexkey.len() < 4 || &hexkey[2..4] != "00" {
		return None;
	}
	let key = decode_hex(hexkey)?;
	let value = decode_hex(hexvalue)?;
	let sequence: u64 = seqstr.parse().ok()?;
	Some((key, value, sequence))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
	if s.len() % 2 != 0 {
		return None;
	}
	(0..s.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
		.collect()
}

/// Run the external dump tool and parse its stdout into deduplicated
/// rows, keeping only the highest `sequence` per exact raw key.
pub fn load_dump(ldb_path: &str, db_dir: &std::path::Path) -> anyhow::Result<Vec<KvRow>> {
	let output = std::process::Command::new(ldb_path)
		.arg("idump")
		.arg(format!("--db={}", db_dir.display()))
		.arg("--hex")
		.output();

	let output = match output {
		Ok(o) if o.status.success() => o,
		Ok(o) => {
			log::error!(
				"{ldb_path} idump exited with status {}; proceeding with an empty KV store",
				o.status
			);
			return Ok(Vec::new());
		}
		Err(e) => {
			log::error!("could not run {ldb_path} idump: {e}; proceeding with an empty KV store");
			return Ok(Vec::new());
		}
	};

	let stdout = String::from_utf8_lossy(&output.stdout);
	let mut by_key: HashMap<Vec<u8>, KvRow> = HashMap::new();
	for line in stdout.lines() {
		let Some((raw_key, raw_value, sequence)) = parse_dump_line(line) else {
			log::debug!("not matching: {line}");
			continue;
		};
		let prefix = raw_key[0];
		match by_key.get(&raw_key) {
			Some(existing) if existing.sequence > sequence => continue,
			_ => {
				by_key.insert(
					raw_key.clone(),
					KvRow {
						prefix,
						raw_key,
						raw_value,
						sequence,
					},
				);
			}
		}
	}
	Ok(by_key.into_values().collect())
}

/// `O`-prefix table: onodes keyed by identity, plus a numeric-oid index
/// used by the `M`/`P` cross-linker.
#[derive(Debug, Default)]
pub struct ObjectTable {
	pub onode_map: HashMap<ObjectIdentity, (ObjectKey, Option<Onode>)>,
	pub oid_map: HashMap<u64, ObjectIdentity>,
	pub poolids: Vec<i64>,
}

impl ObjectTable {
	pub fn load(rows: &[KvRow]) -> Self {
		let mut t = Self::default();
		for row in rows.iter().filter(|r| r.prefix == b'O') {
			if let Err(e) = t.parse_row(row) {
				log::warn!("skipping malformed O row: {e}");
			}
		}
		t
	}

	fn parse_row(&mut self, row: &KvRow) -> Result<()> {
		let mut k = BufferCursor::new(row.raw_key.clone());
		k.seek(2)?;
		let key = ObjectKey::parse(&mut k)?;
		let identity = ObjectIdentity::from(&key);
		if !self.poolids.contains(&key.poolid) {
			self.poolids.push(key.poolid);
		}

		let at_end = k.tell() == k.len();

		if row.raw_value.is_empty() {
			self.onode_map.insert(identity, (key, None));
			return Ok(());
		}

		if at_end {
			let mut v = BufferCursor::new(row.raw_value.clone());
			let mut onode = Onode::parse(&mut v)?;
			onode::decode_extent_map_shard(&mut v, &onode.spanning_blob_map, &mut onode.lextents, true)?;
			self.oid_map.insert(onode.oid, identity.clone());
			self.onode_map.insert(identity, (key, Some(onode)));
		} else {
			let offset = crate::cursor::read_fixed_int(&mut k, 4, true)? as u64;
			let tail = read_u8(&mut k)?;
			if tail != b'x' {
				return Err(crate::error::Error::DecodeMismatch {
					offset: k.tell(),
					expected: b'x' as u64,
					actual: tail as u64,
				});
			}
			let Some((_, Some(onode))) = self.onode_map.get_mut(&identity) else {
				return Ok(());
			};
			for s in &mut onode.extent_map_shards {
				if s.offset == offset && s.bytes == row.raw_value.len() as u64 {
					s.used = true;
					break;
				}
			}
			let mut v = BufferCursor::new(row.raw_value.clone());
			let spanning = onode.spanning_blob_map.clone();
			onode::decode_extent_map_shard(&mut v, &spanning, &mut onode.lextents, false)?;
		}
		Ok(())
	}
}

/// `S`-prefix OSD metadata rows.
#[derive(Debug, Clone)]
pub enum SValue {
	FixedString(String),
	BluefsExtents(Vec<(u64, u64)>),
	Integer(u64),
	Raw(Vec<u8>),
}

pub fn load_s_table(rows: &[KvRow]) -> HashMap<String, SValue> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'S') {
		let key = String::from_utf8_lossy(&row.raw_key[2..]).into_owned();
		let mut v = BufferCursor::new(row.raw_value.clone());
		let value = match key.as_str() {
			"freelist_type" => SValue::FixedString(String::from_utf8_lossy(v.as_slice()).into_owned()),
			"bluefs_extents" => {
				let n = v.len() / 16;
				let mut pairs = Vec::with_capacity(n as usize);
				for _ in 0..n {
					let a = crate::cursor::read_fixed_int(&mut v, 8, false).unwrap_or(0) as u64;
					let b = crate::cursor::read_fixed_int(&mut v, 8, false).unwrap_or(0) as u64;
					pairs.push((a, b));
				}
				SValue::BluefsExtents(pairs)
			}
			"blobid_max" | "ondisk_format" | "min_compat_ondisk_format" | "nid_max" | "min_alloc_size" => {
				let len = v.len() as usize;
				match crate::cursor::read_fixed_int(&mut v, len, false) {
					Ok(n) => SValue::Integer(n as u64),
					Err(_) => SValue::Raw(row.raw_value.clone()),
				}
			}
			_ => SValue::Raw(row.raw_value.clone()),
		};
		map.insert(key, value);
	}
	map
}

/// `T`-prefix statfs rows.
pub fn load_t_table(rows: &[KvRow]) -> HashMap<String, types::Statfs> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'T') {
		let key = String::from_utf8_lossy(&row.raw_key[2..]).into_owned();
		let mut v = BufferCursor::new(row.raw_value.clone());
		match types::Statfs::parse(&mut v) {
			Ok(s) => {
				map.insert(key, s);
			}
			Err(e) => log::warn!("T row {key}: {e}"),
		}
	}
	map
}

/// `C`-prefix collection rows, keyed either by `"meta"` or by a PG
/// identifier parsed out of the `<pool>.<hex_seed>_<suffix>` key string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CKey {
	Meta,
	Pg(Pg),
}

pub fn load_c_table(rows: &[KvRow]) -> HashMap<CKey, Option<types::CNode>> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'C') {
		let keystr = String::from_utf8_lossy(&row.raw_key[2..]).into_owned();
		let ckey = if keystr == "meta" {
			CKey::Meta
		} else {
			match parse_collection_name(&keystr) {
				Some(pg) => CKey::Pg(pg),
				None => {
					log::warn!("unparsable C key: {keystr}");
					continue;
				}
			}
		};
		let value = if row.raw_value.is_empty() {
			None
		} else {
			let mut v = BufferCursor::new(row.raw_value.clone());
			match types::CNode::parse(&mut v) {
				Ok(c) => Some(c),
				Err(e) => {
					log::warn!("C row {keystr}: {e}");
					None
				}
			}
		};
		map.insert(ckey, value);
	}
	map
}

fn parse_collection_name(s: &str) -> Option<Pg> {
	let head = s.split('_').next()?;
	let (pool_str, seed_str) = head.split_once('.')?;
	let pool: i64 = pool_str.parse().ok()?;
	let seed = u32::from_str_radix(seed_str, 16).ok()?;
	Some(Pg::from_collection_name(pool, seed))
}

/// Decoded values recognized under an `M`/`P` sub-key.
#[derive(Debug, Clone)]
pub enum MetaValue {
	MayIncludeDeletesInMissing,
	Inode(INode),
	PgInfo(types::PgInfo),
	BigInfo(PastIntervals, Vec<(u64, u64)>),
	Order(u8),
	InfoVer(u8),
	Epoch(u32),
	ObjectPrefix(String),
	CreateTimestamp(crate::cursor::UTime),
	Size(u64),
	Flags(u64),
	SnapSeq(u64),
	Features(u64),
	Dup(PgLogDup),
	LogEntry(PgLogEntry),
	FastInfo(PgFastinfo),
	Missing,
	Raw(Vec<u8>),
}

/// A directory's header plus its decoded sub-keys (dentries and PG
/// metadata), keyed by the 8-byte big-endian object id in the row key.
#[derive(Debug, Default)]
pub struct DirMeta {
	pub fnode: Option<DirFNode>,
	pub entries: HashMap<String, MetaValue>,
	pub dentries: HashMap<String, INode>,
}

/// `M`/`P`-prefix directory metadata / PG log table.
#[derive(Debug, Default)]
pub struct DirMetaTable {
	pub by_oid: HashMap<u64, DirMeta>,
}

impl DirMetaTable {
	pub fn load(rows: &[KvRow], prefix: u8) -> Self {
		let mut t = Self::default();
		for row in rows.iter().filter(|r| r.prefix == prefix) {
			if let Err(e) = t.parse_row(row) {
				log::warn!("skipping malformed {} row: {e}", prefix as char);
			}
		}
		t
	}

	fn parse_row(&mut self, row: &KvRow) -> anyhow::Result<()> {
		let mut k = BufferCursor::new(row.raw_key.clone());
		k.seek(2)?;
		let oid = crate::cursor::read_fixed_int(&mut k, 8, true)? as u64;
		let sep = read_u8(&mut k)?;

		if sep == b'-' {
			if row.raw_value.is_empty() {
				return Ok(());
			}
			let mut v = BufferCursor::new(row.raw_value.clone());
			let fnode = DirFNode::parse(&mut v)?;
			self.by_oid.entry(oid).or_default().fnode = Some(fnode);
			return Ok(());
		}

		let rest = &row.raw_key[k.tell() as usize..];
		let key = String::from_utf8_lossy(rest).into_owned();
		let has_value = !row.raw_value.is_empty();
		let mut v = BufferCursor::new(row.raw_value.clone());

		let value = if key == "may_include_deletes_in_missing" {
			MetaValue::MayIncludeDeletesInMissing
		} else if let Some(fname) = key.strip_suffix("_head") {
			if has_value {
				let _opaque = v.read(8)?;
				let ntype = read_u8(&mut v)?;
				if ntype != b'I' {
					anyhow::bail!("dentry {fname} has unsupported node type {ntype:#x}");
				}
				let inode = INode::parse(&mut v)?;
				self.by_oid
					.entry(oid)
					.or_default()
					.dentries
					.insert(fname.to_string(), inode.clone());
				MetaValue::Inode(inode)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "_info" {
			if has_value {
				MetaValue::PgInfo(types::PgInfo::parse(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "_biginfo" {
			if has_value {
				let intervals = PastIntervals::parse(&mut v)?;
				let counts = crate::cursor::read_dict(
					&mut v,
					|c| Ok(crate::cursor::read_fixed_int(c, 8, false)? as u64),
					|c| Ok(crate::cursor::read_fixed_int(c, 8, false)? as u64),
				)?;
				MetaValue::BigInfo(intervals, counts)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "_infover" || key == "order" {
			if has_value {
				MetaValue::InfoVer(read_u8(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "_epoch" {
			if has_value {
				MetaValue::Epoch(crate::cursor::read_fixed_int(&mut v, 4, false)? as u32)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "object_prefix" || key.starts_with("name_") || key.starts_with("id_") {
			if has_value {
				MetaValue::ObjectPrefix(crate::cursor::read_string(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "create_timestamp" {
			if has_value {
				MetaValue::CreateTimestamp(read_utime(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "size" || key == "flags" || key == "snap_seq" || key == "features" {
			if has_value {
				let n = crate::cursor::read_fixed_int(&mut v, 8, false)? as u64;
				match key.as_str() {
					"size" => MetaValue::Size(n),
					"flags" => MetaValue::Flags(n),
					"snap_seq" => MetaValue::SnapSeq(n),
					_ => MetaValue::Features(n),
				}
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key.starts_with("dup_") {
			if has_value {
				MetaValue::Dup(PgLogDup::parse(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if is_log_entry_key(&key) {
			if has_value {
				let entry = PgLogEntry::parse(&mut v, true)?;
				if entry.version.key_name() != key {
					log::warn!("PG log entry key {key} does not match decoded version {}", entry.version);
				}
				MetaValue::LogEntry(entry)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key == "_fastinfo" {
			if has_value {
				MetaValue::FastInfo(PgFastinfo::parse(&mut v)?)
			} else {
				MetaValue::Raw(Vec::new())
			}
		} else if key.starts_with("missing/") {
			MetaValue::Missing
		} else {
			log::error!("unknown sub-key {oid:#x},{key}");
			MetaValue::Raw(row.raw_value.clone())
		};

		self.by_oid.entry(oid).or_default().entries.insert(key, value);
		Ok(())
	}
}

fn is_log_entry_key(key: &str) -> bool {
	let Some((epoch, version)) = key.split_once('.') else {
		return false;
	};
	epoch.len() == 10
		&& version.len() == 20
		&& epoch.bytes().all(|b| b.is_ascii_digit())
		&& version.bytes().all(|b| b.is_ascii_digit())
}

/// `B`-prefix bitmap-allocator metadata (fixed string keys, u64 values).
pub fn load_b_table(rows: &[KvRow]) -> HashMap<String, u64> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'B') {
		let key = String::from_utf8_lossy(&row.raw_key[2..]).into_owned();
		let mut v = BufferCursor::new(row.raw_value.clone());
		if let Ok(n) = crate::cursor::read_fixed_int(&mut v, 8, false) {
			map.insert(key, n as u64);
		}
	}
	map
}

/// `b`-prefix per-granule bitmasks, keyed by the granule's big-endian byte
/// offset; the value is the same-length big-endian bitmask itself (one
/// bit per `bytes_per_block`). Granules with no row are fully unallocated.
pub fn load_lowercase_b_table(rows: &[KvRow]) -> HashMap<u64, Vec<u8>> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'b') {
		let mut k = BufferCursor::new(row.raw_key.clone());
		if k.seek(2).is_err() {
			continue;
		}
		match crate::cursor::read_fixed_int(&mut k, 8, true) {
			Ok(offset) => {
				map.insert(offset as u64, row.raw_value.clone());
			}
			Err(e) => log::warn!("malformed b row: {e}"),
		}
	}
	map
}

/// `L`-prefix deferred transaction log: retained opaque, one entry per
/// 8-byte big-endian key.
pub fn load_l_table(rows: &[KvRow]) -> HashMap<u64, Vec<u8>> {
	let mut map = HashMap::new();
	for row in rows.iter().filter(|r| r.prefix == b'L') {
		let mut k = BufferCursor::new(row.raw_key.clone());
		if k.seek(2).is_err() {
			continue;
		}
		if let Ok(key) = crate::cursor::read_fixed_int(&mut k, 8, true) {
			if !row.raw_value.is_empty() {
				log::debug!("deferred transaction decoding not implemented for L key {key:#x}");
			}
			map.insert(key as u64, row.raw_value.clone());
		}
	}
	map
}

/// `X`-prefix rows: fully opaque, retained verbatim.
pub fn load_x_table(rows: &[KvRow]) -> Vec<(Vec<u8>, Vec<u8>)> {
	rows.iter()
		.filter(|r| r.prefix == b'X')
		.map(|r| (r.raw_key.clone(), r.raw_value.clone()))
		.collect()
}
