//! Small value types decoded out of `M`/`P` directory-metadata rows and out
//! of onode xattrs. Grounded on `original_source/src/vampyr/kv.py`'s
//! `KV*`/`Ceph*` classes (the ones not big enough to deserve their own
//! module, i.e. everything except the onode/extent-map/blob graph in
//! [`super::onode`]).

use crate::{
	cursor::{
		read_block_header, read_bufferlist, read_fixed_int, read_list, read_string, read_u8,
		read_utime, read_varint, ByteCursor, UTime,
	},
	error::{Error, Result},
};

/// `CephEversion`: `{version: u64, epoch: u32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EVersion {
	pub version: u64,
	pub epoch: u32,
}

impl EVersion {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let version = read_fixed_int(c, 8, false)? as u64;
		let epoch = read_fixed_int(c, 4, false)? as u32;
		Ok(Self { version, epoch })
	}

	/// PG log entry key name: `%010d.%020d % (epoch, version)`.
	pub fn key_name(&self) -> String {
		format!("{:010}.{:020}", self.epoch, self.version)
	}
}

impl std::fmt::Display for EVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.epoch, self.version)
	}
}

/// `CephReqID`.
#[derive(Debug, Clone, Copy)]
pub struct ReqId {
	pub name_type: u8,
	pub name_num: u64,
	pub tid: u64,
	pub incarnation: u32,
}

impl ReqId {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let name_type = read_u8(c)?;
		let name_num = read_fixed_int(c, 8, false)? as u64;
		let tid = read_fixed_int(c, 8, false)? as u64;
		let incarnation = read_fixed_int(c, 4, false)? as u32;
		header.finish(c, start)?;
		Ok(Self {
			name_type,
			name_num,
			tid,
			incarnation,
		})
	}
}

impl std::fmt::Display for ReqId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"type {} num {} tid {} inc {}",
			self.name_type, self.name_num, self.tid, self.incarnation
		)
	}
}

/// `CephHObject`: a hashed object reference embedded in PG-log entries and
/// object info.
#[derive(Debug, Clone)]
pub struct HObject {
	pub key: String,
	pub oid: String,
	pub snap: u64,
	pub hash: u32,
	pub max: Option<u8>,
	pub nspace: Option<String>,
	pub pool: Option<u64>,
}

impl HObject {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let key = read_string(c)?;
		let oid = read_string(c)?;
		let snap = read_fixed_int(c, 8, false)? as u64;
		let hash = read_fixed_int(c, 4, false)? as u32;
		let max = if header.v >= 2 {
			Some(read_u8(c)?)
		} else {
			None
		};
		let (nspace, pool) = if header.v >= 4 {
			(Some(read_string(c)?), Some(read_fixed_int(c, 8, false)? as u64))
		} else {
			(None, None)
		};
		header.finish(c, start)?;
		Ok(Self {
			key,
			oid,
			snap,
			hash,
			max,
			nspace,
			pool,
		})
	}
}

impl std::fmt::Display for HObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "key {} oid {} snap {:#x}", self.key, self.oid, self.snap)
	}
}

/// `KVObjectInfo`, the `_` xattr: version history and size for an object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
	pub soid: HObject,
	pub version: EVersion,
	pub prior_version: EVersion,
	pub last_reqid: ReqId,
	pub size: u64,
	pub mtime: UTime,
}

impl ObjectInfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let soid = HObject::parse(c)?;
		let oloc_header = read_block_header(c)?;
		c.seek(oloc_header.end_offset)?;
		let _unused = c.read(4)?;
		let version = EVersion::parse(c)?;
		let prior_version = EVersion::parse(c)?;
		let last_reqid = ReqId::parse(c)?;
		let size = read_fixed_int(c, 8, false)? as u64;
		let mtime = read_utime(c)?;
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		Ok(Self {
			soid,
			version,
			prior_version,
			last_reqid,
			size,
			mtime,
		})
	}
}

impl std::fmt::Display for ObjectInfo {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "size {:#x} mtime {} soid {}", self.size, self.mtime, self.soid)
	}
}

/// `KVSnapSet`, the `snapset` xattr.
#[derive(Debug, Clone)]
pub struct SnapSet {
	pub snapid: u64,
	pub snaps: Vec<u64>,
	pub clones: Vec<u64>,
}

impl SnapSet {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let snapid = read_fixed_int(c, 8, false)? as u64;
		let _unused = read_u8(c)?;
		let snaps = read_list(c, |c| Ok(read_fixed_int(c, 8, false)? as u64))?;
		let clones = read_list(c, |c| Ok(read_fixed_int(c, 8, false)? as u64))?;
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		Ok(Self {
			snapid,
			snaps,
			clones,
		})
	}
}

/// `KVLock`, the `_lock.rbd_lock` xattr.
#[derive(Debug, Clone)]
pub struct Lock {
	pub desc: String,
	pub kind: u8,
	pub tag: String,
}

impl Lock {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let desc = read_string(c)?;
		let kind = read_u8(c)?;
		let tag = read_string(c)?;
		header.finish(c, start)?;
		Ok(Self { desc, kind, tag })
	}
}

/// `KVShardInfo`: an onode's `extent_map_shards[]` entry. Header-less.
#[derive(Debug, Clone)]
pub struct ShardInfo {
	pub offset: u64,
	pub bytes: u64,
	pub used: bool,
}

impl ShardInfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let offset = read_varint(c)?;
		let bytes = read_varint(c)?;
		Ok(Self {
			offset,
			bytes,
			used: false,
		})
	}
}

/// `KVFileLayout`, the `_layout` xattr.
#[derive(Debug, Clone)]
pub struct FileLayout {
	pub stripe_unit: u32,
	pub stripe_count: u32,
	pub object_size: u32,
	pub poolid: u64,
	pub pool_ns: String,
}

impl FileLayout {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let stripe_unit = read_fixed_int(c, 4, false)? as u32;
		let stripe_count = read_fixed_int(c, 4, false)? as u32;
		let object_size = read_fixed_int(c, 4, false)? as u32;
		let poolid = read_fixed_int(c, 8, false)? as u64;
		let pool_ns = read_string(c)?;
		header.finish(c, start)?;
		Ok(Self {
			stripe_unit,
			stripe_count,
			object_size,
			poolid,
			pool_ns,
		})
	}
}

/// `KVINodeBackpointer`: one `(inode, dname)` hop in a CephFS backtrace.
#[derive(Debug, Clone)]
pub struct InodeBackpointer {
	pub inode: u64,
	pub dname: String,
	pub version: u64,
}

impl InodeBackpointer {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let inode = read_fixed_int(c, 8, false)? as u64;
		let dname = read_string(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		header.finish(c, start)?;
		Ok(Self {
			inode,
			dname,
			version,
		})
	}
}

/// `KVINodeBacktrace`, the `_parent` xattr: the chain of ancestor
/// `(inode, dname)` pairs used by the directory-tree builder.
#[derive(Debug, Clone)]
pub struct InodeBacktrace {
	pub inode: u64,
	pub ancestors: Vec<InodeBackpointer>,
	pub pool: u64,
	pub old_pools: Vec<u64>,
}

impl InodeBacktrace {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let inode = read_fixed_int(c, 8, false)? as u64;
		let ancestors = read_list(c, InodeBackpointer::parse)?;
		let pool = read_fixed_int(c, 8, false)? as u64;
		let old_pools = read_list(c, |c| Ok(read_fixed_int(c, 8, false)? as u64))?;
		header.finish(c, start)?;
		Ok(Self {
			inode,
			ancestors,
			pool,
			old_pools,
		})
	}

	/// Path relative to the containing directory, oldest ancestor first,
	/// dropping this inode's own dname (the first ancestor).
	pub fn path(&self) -> String {
		self.ancestors
			.iter()
			.skip(1)
			.rev()
			.map(|a| a.dname.as_str())
			.collect::<Vec<_>>()
			.join("/")
	}

	pub fn filename(&self) -> Option<&str> {
		self.ancestors.first().map(|a| a.dname.as_str())
	}

	pub fn fullpath(&self) -> String {
		let p = self
			.ancestors
			.iter()
			.rev()
			.map(|a| a.dname.as_str())
			.collect::<Vec<_>>()
			.join("/");
		format!("<CephFSroot>/{p}")
	}
}

/// `KVCNode`: collection metadata under the `C` prefix.
#[derive(Debug, Clone, Copy)]
pub struct CNode {
	pub bits: u32,
}

impl CNode {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let bits = read_fixed_int(c, 4, false)? as u32;
		header.finish(c, start)?;
		Ok(Self { bits })
	}
}

/// `CephFragInfo`.
#[derive(Debug, Clone, Copy)]
pub struct FragInfo {
	pub version: u64,
	pub mtime: UTime,
	pub nfiles: u64,
	pub nsubdirs: u64,
	pub change_attr: u64,
}

impl FragInfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		let mtime = read_utime(c)?;
		let nfiles = read_fixed_int(c, 8, false)? as u64;
		let nsubdirs = read_fixed_int(c, 8, false)? as u64;
		let change_attr = read_fixed_int(c, 8, false)? as u64;
		header.finish(c, start)?;
		Ok(Self {
			version,
			mtime,
			nfiles,
			nsubdirs,
			change_attr,
		})
	}
}

/// `CephNestInfo`. One ignored u64 ("ranchors") sits between `rsubdirs` and
/// `rsnaprealms`.
#[derive(Debug, Clone, Copy)]
pub struct NestInfo {
	pub version: u64,
	pub rbytes: u64,
	pub rfiles: u64,
	pub rsubdirs: u64,
	pub rsnaprealms: u64,
	pub rctime: UTime,
}

impl NestInfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		let rbytes = read_fixed_int(c, 8, false)? as u64;
		let rfiles = read_fixed_int(c, 8, false)? as u64;
		let rsubdirs = read_fixed_int(c, 8, false)? as u64;
		let _ranchors = read_fixed_int(c, 8, false)?;
		let rsnaprealms = read_fixed_int(c, 8, false)? as u64;
		let rctime = read_utime(c)?;
		header.finish(c, start)?;
		Ok(Self {
			version,
			rbytes,
			rfiles,
			rsubdirs,
			rsnaprealms,
			rctime,
		})
	}
}

/// `KVFNode`: CephFS directory metadata, the `-` header row under `M`/`P`.
/// Not to be confused with [`crate::bluefs::FNode`], BlueFS's own file
/// descriptor — this one describes a CephFS directory inode.
#[derive(Debug, Clone)]
pub struct DirFNode {
	pub version: u64,
	pub snap_purged_thru: u64,
	pub fragstat: FragInfo,
	pub accounted_fragstat: FragInfo,
	pub rstat: NestInfo,
	pub accounted_rstat: NestInfo,
	pub damage_flags: Option<u32>,
	pub recursive_scrub: Option<(u64, u64, u64, u64)>,
	/// Dentry name -> decoded inode, filled in as `<name>_head` sub-keys
	/// are processed for this directory's oid.
	pub dentries: std::collections::HashMap<String, INode>,
}

impl DirFNode {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		let snap_purged_thru = read_fixed_int(c, 8, false)? as u64;
		let fragstat = FragInfo::parse(c)?;
		let accounted_fragstat = FragInfo::parse(c)?;
		let rstat = NestInfo::parse(c)?;
		let accounted_rstat = NestInfo::parse(c)?;
		let damage_flags = if header.v >= 3 {
			Some(read_fixed_int(c, 4, false)? as u32)
		} else {
			None
		};
		let recursive_scrub = if header.v >= 4 {
			Some((
				read_fixed_int(c, 8, false)? as u64,
				read_fixed_int(c, 8, false)? as u64,
				read_fixed_int(c, 8, false)? as u64,
				read_fixed_int(c, 8, false)? as u64,
			))
		} else {
			None
		};
		header.finish(c, start)?;
		Ok(Self {
			version,
			snap_purged_thru,
			fragstat,
			accounted_fragstat,
			rstat,
			accounted_rstat,
			damage_flags,
			recursive_scrub,
			dentries: std::collections::HashMap::new(),
		})
	}
}

/// `KVINode`: a CephFS inode, decoded from a dentry's `_head` sub-key.
#[derive(Debug, Clone)]
pub struct INode {
	pub inode: u64,
	pub rdev: u32,
	pub ctime: UTime,
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub nlink: u32,
	pub dir_layout: u64,
	pub layout: FileLayout,
	pub size: u64,
	pub truncate_seq: u32,
	pub truncate_size: u64,
	pub truncate_from: u64,
	pub truncate_pending: u32,
	pub mtime: UTime,
	pub atime: UTime,
	pub time_warp_seq: u32,
	pub dirstat: FragInfo,
	pub rstat: NestInfo,
	pub accounted_rstat: NestInfo,
	pub version: u64,
	pub file_data_version: u64,
	pub xattr_version: u64,
}

impl INode {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let inode = read_fixed_int(c, 8, false)? as u64;
		let rdev = read_fixed_int(c, 4, false)? as u32;
		let ctime = read_utime(c)?;
		let mode = read_fixed_int(c, 4, false)? as u32;
		let uid = read_fixed_int(c, 4, false)? as u32;
		let gid = read_fixed_int(c, 4, false)? as u32;
		let nlink = read_fixed_int(c, 4, false)? as u32;
		let _forget_anchored = read_u8(c)?;
		if header.v < 4 {
			return Err(Error::NotImplementedVersion {
				what: "CephFS inode".into(),
				version: header.v,
				minimum: 4,
			});
		}
		let dir_layout = read_fixed_int(c, 8, false)? as u64;
		let layout = FileLayout::parse(c)?;
		let size = read_fixed_int(c, 8, false)? as u64;
		let truncate_seq = read_fixed_int(c, 4, false)? as u32;
		let truncate_size = read_fixed_int(c, 8, false)? as u64;
		let truncate_from = read_fixed_int(c, 8, false)? as u64;
		let truncate_pending = if header.v >= 5 {
			read_fixed_int(c, 4, false)? as u32
		} else {
			0
		};
		let mtime = read_utime(c)?;
		let atime = read_utime(c)?;
		let time_warp_seq = read_fixed_int(c, 4, false)? as u32;
		if header.v < 3 {
			return Err(Error::NotImplementedVersion {
				what: "CephFS inode client ranges".into(),
				version: header.v,
				minimum: 3,
			});
		}
		let number_client_ranges = read_fixed_int(c, 4, false)? as u32;
		if number_client_ranges > 0 {
			return Err(Error::NotImplementedVersion {
				what: "CephFS inode client ranges".into(),
				version: header.v,
				minimum: u8::MAX,
			});
		}
		let dirstat = FragInfo::parse(c)?;
		let rstat = NestInfo::parse(c)?;
		let accounted_rstat = NestInfo::parse(c)?;
		let version = read_fixed_int(c, 8, false)? as u64;
		let file_data_version = read_fixed_int(c, 8, false)? as u64;
		let xattr_version = read_fixed_int(c, 8, false)? as u64;
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		Ok(Self {
			inode,
			rdev,
			ctime,
			mode,
			uid,
			gid,
			nlink,
			dir_layout,
			layout,
			size,
			truncate_seq,
			truncate_size,
			truncate_from,
			truncate_pending,
			mtime,
			atime,
			time_warp_seq,
			dirstat,
			rstat,
			accounted_rstat,
			version,
			file_data_version,
			xattr_version,
		})
	}
}

impl std::fmt::Display for INode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"inode {:#x} size {} mode {:o} uid {} gid {} nlink {}",
			self.inode, self.size, self.mode, self.uid, self.gid, self.nlink
		)
	}
}

/// `CephStatfs`, the `T`-prefix row value. Header-less.
#[derive(Debug, Clone, Copy)]
pub struct Statfs {
	pub allocated: u64,
	pub stored: u64,
	pub compressed_original: u64,
	pub compressed: u64,
	pub compressed_allocated: u64,
}

impl Statfs {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		Ok(Self {
			allocated: read_fixed_int(c, 8, false)? as u64,
			stored: read_fixed_int(c, 8, false)? as u64,
			compressed_original: read_fixed_int(c, 8, false)? as u64,
			compressed: read_fixed_int(c, 8, false)? as u64,
			compressed_allocated: read_fixed_int(c, 8, false)? as u64,
		})
	}
}

/// `CephPGShard`.
#[derive(Debug, Clone, Copy)]
pub struct PgShard {
	pub osd: u32,
	pub shard: u8,
}

impl PgShard {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let osd = read_fixed_int(c, 4, false)? as u32;
		let shard = read_u8(c)?;
		header.finish(c, start)?;
		Ok(Self { osd, shard })
	}
}

/// `CephCompactIntervals`.
#[derive(Debug, Clone)]
pub struct CompactInterval {
	pub first: u32,
	pub last: u32,
	pub acting: Vec<PgShard>,
}

impl CompactInterval {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let first = read_fixed_int(c, 4, false)? as u32;
		let last = read_fixed_int(c, 4, false)? as u32;
		let acting = read_list(c, PgShard::parse)?;
		header.finish(c, start)?;
		Ok(Self { first, last, acting })
	}
}

/// `CephPastIntervals`, the first half of a `_biginfo` value. Trailing
/// bytes to the end of the block are opaque and dropped, matching the
/// original's commented-out tail fields.
#[derive(Debug, Clone)]
pub struct PastIntervals {
	pub first: u32,
	pub last: u32,
	pub all_participants: Vec<PgShard>,
	pub intervals: Vec<CompactInterval>,
}

impl PastIntervals {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let _type = read_u8(c)?;
		let header2_start = c.tell();
		let header2 = read_block_header(c)?;
		let first = read_fixed_int(c, 4, false)? as u32;
		let last = read_fixed_int(c, 4, false)? as u32;
		let all_participants = read_list(c, PgShard::parse)?;
		let intervals = read_list(c, CompactInterval::parse)?;
		header2.finish(c, header2_start).ok();
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		Ok(Self {
			first,
			last,
			all_participants,
			intervals,
		})
	}
}

/// `CephPGLogEntry`. `op == 5` ("lost revert") at `v >= 6` reads a
/// `revert_to` eversion in place of `prior_version`, then always re-reads
/// `prior_version` afterward.
#[derive(Debug, Clone)]
pub struct PgLogEntry {
	pub op: u32,
	pub soid: HObject,
	pub version: EVersion,
	pub prior_version: EVersion,
	pub revert_to: Option<EVersion>,
	pub reqid: ReqId,
	pub mtime: UTime,
	pub snaps: Vec<u8>,
	pub user_version: u64,
}

const PG_LOG_OP_LOST_REVERT: u32 = 5;

impl PgLogEntry {
	pub fn parse(c: &mut dyn ByteCursor, checksummed: bool) -> Result<Self> {
		let start = c.tell();
		let entry_len = if checksummed {
			Some(read_fixed_int(c, 4, false)? as u32)
		} else {
			None
		};
		let header = read_block_header(c)?;
		let op = read_fixed_int(c, 4, false)? as u32;
		if header.v < 2 {
			return Err(Error::NotImplementedVersion {
				what: "PG log entry".into(),
				version: header.v,
				minimum: 2,
			});
		}
		let soid = HObject::parse(c)?;
		let version = EVersion::parse(c)?;
		let mut revert_to = None;
		let prior_version = if header.v >= 6 && op == PG_LOG_OP_LOST_REVERT {
			revert_to = Some(EVersion::parse(c)?);
			EVersion::parse(c)?
		} else {
			EVersion::parse(c)?
		};
		let reqid = ReqId::parse(c)?;
		let mtime = read_utime(c)?;
		let prior_version = if op == PG_LOG_OP_LOST_REVERT {
			EVersion::parse(c)?
		} else {
			prior_version
		};
		let snaps = read_bufferlist(c)?.into_vec();
		let user_version = read_fixed_int(c, 8, false)? as u64;
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		if let Some(entry_len) = entry_len {
			if c.tell() != start + 4 + entry_len as u64 {
				return Err(Error::DecodeMismatch {
					offset: start,
					expected: start + 4 + entry_len as u64,
					actual: c.tell(),
				});
			}
			let _crc = read_fixed_int(c, 4, false)? as u32;
		}
		Ok(Self {
			op,
			soid,
			version,
			prior_version,
			revert_to,
			reqid,
			mtime,
			snaps,
			user_version,
		})
	}
}

/// `CephPGLogDup`.
#[derive(Debug, Clone)]
pub struct PgLogDup {
	pub reqid: ReqId,
	pub version: EVersion,
	pub user_version: u64,
	pub return_code: i32,
}

impl PgLogDup {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let reqid = ReqId::parse(c)?;
		let version = EVersion::parse(c)?;
		let user_version = read_fixed_int(c, 8, false)? as u64;
		let return_code = read_fixed_int(c, 4, false)? as i32;
		header.finish(c, start)?;
		Ok(Self {
			reqid,
			version,
			user_version,
			return_code,
		})
	}
}

/// `CephPGInfo`, the `_info` value. The embedded hobject block is skipped
/// over rather than decoded, matching the original's commented-out field.
#[derive(Debug, Clone)]
pub struct PgInfo {
	pub pgid: crate::structured::Pg,
	pub last_update: EVersion,
	pub last_complete: EVersion,
	pub log_tail: EVersion,
}

impl PgInfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let pgid = crate::structured::Pg::parse(c)?;
		let last_update = EVersion::parse(c)?;
		let last_complete = EVersion::parse(c)?;
		let log_tail = EVersion::parse(c)?;
		let hdr_start = c.tell();
		let hobject_header = read_block_header(c)?;
		c.seek(hobject_header.end_offset)?;
		hobject_header.finish(c, hdr_start).ok();
		c.seek(header.end_offset)?;
		header.finish(c, start)?;
		Ok(Self {
			pgid,
			last_update,
			last_complete,
			log_tail,
		})
	}
}

/// `CephPGFastinfo`, the `_fastinfo` value.
#[derive(Debug, Clone)]
pub struct PgFastinfo {
	pub last_update: EVersion,
	pub last_complete: EVersion,
	pub last_user_version: u64,
	pub stats_version: EVersion,
	pub stats_reported_seq: u64,
	pub stats_last_fresh: UTime,
	pub stats_last_active: UTime,
	pub stats_last_peered: UTime,
	pub stats_last_clean: UTime,
	pub stats_last_unstable: UTime,
	pub stats_last_undegraded: UTime,
	pub stats_fullsized: UTime,
	pub stats_log_size: u64,
	pub num_bytes: u64,
	pub num_objects: u64,
	pub num_object_copies: u64,
	pub num_rd: u64,
	pub num_rd_kb: u64,
	pub num_wr: u64,
	pub num_wr_kb: u64,
	pub num_objects_dirty: u64,
}

impl PgFastinfo {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let start = c.tell();
		let header = read_block_header(c)?;
		let last_update = EVersion::parse(c)?;
		let last_complete = EVersion::parse(c)?;
		let last_user_version = read_fixed_int(c, 8, false)? as u64;
		let stats_version = EVersion::parse(c)?;
		let stats_reported_seq = read_fixed_int(c, 8, false)? as u64;
		let stats_last_fresh = read_utime(c)?;
		let stats_last_active = read_utime(c)?;
		let stats_last_peered = read_utime(c)?;
		let stats_last_clean = read_utime(c)?;
		let stats_last_unstable = read_utime(c)?;
		let stats_last_undegraded = read_utime(c)?;
		let stats_fullsized = read_utime(c)?;
		let stats_log_size = read_fixed_int(c, 8, false)? as u64;
		let num_bytes = read_fixed_int(c, 8, false)? as u64;
		let num_objects = read_fixed_int(c, 8, false)? as u64;
		let num_object_copies = read_fixed_int(c, 8, false)? as u64;
		let num_rd = read_fixed_int(c, 8, false)? as u64;
		let num_rd_kb = read_fixed_int(c, 8, false)? as u64;
		let num_wr = read_fixed_int(c, 8, false)? as u64;
		let num_wr_kb = read_fixed_int(c, 8, false)? as u64;
		let num_objects_dirty = read_fixed_int(c, 8, false)? as u64;
		header.finish(c, start)?;
		Ok(Self {
			last_update,
			last_complete,
			last_user_version,
			stats_version,
			stats_reported_seq,
			stats_last_fresh,
			stats_last_active,
			stats_last_peered,
			stats_last_clean,
			stats_last_unstable,
			stats_last_undegraded,
			stats_fullsized,
			stats_log_size,
			num_bytes,
			num_objects,
			num_object_copies,
			num_rd,
			num_rd_kb,
			num_wr,
			num_wr_kb,
			num_objects_dirty,
		})
	}
}
