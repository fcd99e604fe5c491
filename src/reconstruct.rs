//! Object body/slack/digest extraction, the CephFS backtrace symlink tree,
//! and allocated/unallocated-area accounting. Grounded on
//! `original_source/src/vampyr/kv.py`'s `KVONode.extract`/`create_tree` and
//! `CephPExtent._init_alloc_state`/`extract_unallocated`.

use std::{
	fs,
	io::Write,
	path::{Path, PathBuf},
};

use md5::{Digest, Md5};
use regex::Regex;

use crate::{
	cursor::{BufferCursor, ByteCursor},
	kv::{onode::Onode, DirMetaTable, MetaValue, ObjectTable},
	structured,
};

/// Concatenates an onode's logical extents in order, dropping slack —
/// used to feed the structured decoders a contiguous view of the object.
fn object_content(image: &mut dyn ByteCursor, onode: &Onode) -> anyhow::Result<Vec<u8>> {
	let mut out = Vec::new();
	let mut lextents: Vec<_> = onode.lextents.iter().collect();
	lextents.sort_by_key(|le| le.logical_offset);
	for le in lextents {
		let (content, _slack) = le.read(image)?;
		out.extend(content);
	}
	Ok(out)
}

fn write_object_body(
	image: &mut dyn ByteCursor,
	onode: &Onode,
	fstripe: &Path,
	fslack: &Path,
	fmd5: &Path,
) -> anyhow::Result<()> {
	let mut w = fs::File::create(fstripe)?;
	let mut s = fs::File::create(fslack)?;
	let mut hasher = Md5::new();
	let mut written = 0u64;

	let mut lextents: Vec<_> = onode.lextents.iter().collect();
	lextents.sort_by_key(|le| le.logical_offset);
	for le in lextents {
		let (content, slack) = le.read(image)?;
		hasher.update(&content);
		if !slack.is_empty() {
			s.write_all(&slack)?;
		}
		w.write_all(&content)?;
		written += content.len() as u64;
	}

	if written < onode.size {
		let pad = vec![0u8; (onode.size - written) as usize];
		hasher.update(&pad);
		w.write_all(&pad)?;
		written += pad.len() as u64;
	}
	anyhow::ensure!(written == onode.size, "wrote {written} bytes for onode of size {}", onode.size);

	let digest = hasher.finalize();
	writeln!(fs::File::create(fmd5)?, "{digest:x}")?;
	Ok(())
}

/// Builds `<out>/<inode-hex>/{parent,child_<name>}` symlinks and
/// `self_<name>` markers from an object's `_parent` CephFS backtrace.
fn create_tree(out_dir: &Path, onode: &Onode) -> anyhow::Result<()> {
	let Some(crate::kv::onode::Xattr::Parent(backtrace)) = onode.attrs.get("_parent") else {
		return Ok(());
	};

	let mut child_inode = backtrace.inode;
	for a in &backtrace.ancestors {
		let path = out_dir.join(format!("{:x}", a.inode));
		let child = out_dir.join(format!("{child_inode:x}"));
		fs::create_dir_all(&path)?;
		fs::create_dir_all(&child)?;

		let self_marker = child.join(format!("self_{}", a.dname));
		if !self_marker.exists() {
			fs::File::create(&self_marker)?;
		}

		let child_link = path.join(format!("child_{}", a.dname));
		if !child_link.exists() {
			let _ = std::os::unix::fs::symlink(PathBuf::from("..").join(format!("{child_inode:x}")), &child_link);
		}

		let parent_link = child.join("parent");
		if !parent_link.exists() {
			let _ = std::os::unix::fs::symlink(PathBuf::from("..").join(format!("{:x}", a.inode)), &parent_link);
		}

		child_inode = a.inode;
	}
	Ok(())
}

enum Decoded {
	OsdMap(structured::OsdMap),
	IncOsdMap(structured::IncOsdMap),
	OsdSuper(structured::OsdSuper),
	RbdId(structured::RbdId),
}

/// Runs the structured decoder matching `oid`'s well-known name, if any.
/// Returns the decoded report text plus an optional raw crush blob.
fn decode_structured(oid: &str, content: &[u8]) -> Option<(Decoded, Option<Vec<u8>>)> {
	let mut c = BufferCursor::new(content.to_vec());
	match oid {
		"osdmap" => structured::decode_osdmap(&mut c)
			.ok()
			.map(|m| {
				let crush = m.crush_raw.clone();
				(Decoded::OsdMap(m), if crush.is_empty() { None } else { Some(crush) })
			}),
		"inc_osdmap" => structured::decode_inc_osdmap(&mut c)
			.ok()
			.map(|m| {
				let crush = m.crush_raw.clone();
				(Decoded::IncOsdMap(m), if crush.is_empty() { None } else { Some(crush) })
			}),
		"osd_superblock" => structured::decode_osd_super(&mut c).ok().map(|m| (Decoded::OsdSuper(m), None)),
		"rbd_id" => structured::decode_rbd_id(&mut c).ok().map(|m| (Decoded::RbdId(m), None)),
		_ => None,
	}
}

/// Walks every `O` row matching `filter`, extracting object bodies, slack,
/// digests, metadata reports, structured decodes and the CephFS tree under
/// `out_dir`.
pub fn extract_objects(
	image: &mut dyn ByteCursor,
	out_dir: &Path,
	objects: &ObjectTable,
	dir_meta: &DirMetaTable,
	filter: &Regex,
) -> anyhow::Result<()> {
	let mut keys: Vec<_> = objects.onode_map.iter().collect();
	keys.sort_by_key(|(_, (key, _))| key.key.clone());

	for (_, (key, onode)) in keys {
		if !filter.is_match(&key.oid) {
			continue;
		}
		log::debug!("extracting {key}");

		let stripe = key.stripe.clone().unwrap_or_default();
		let oedir = out_dir.join(&key.oid);
		fs::create_dir_all(&oedir)?;

		let fstripe = oedir.join(format!("object_{stripe}"));
		let fmd5 = oedir.join(format!("md5_object_{stripe}"));
		let fmeta = oedir.join(format!("vampyrmeta_{stripe}"));
		let fslack = oedir.join(format!("slack_{stripe}"));
		let fdec = oedir.join(format!("decoded_{stripe}"));
		let fdata = oedir.join(format!("data_{stripe}"));
		let fcrush = oedir.join(format!("crush_{stripe}"));

		let mut decoded_report: Option<String> = None;
		if let Some(onode) = onode {
			match object_content(image, onode) {
				Ok(content) => {
					if let Some((decoded, crush)) = decode_structured(&key.oid, &content) {
						match &decoded {
							Decoded::OsdMap(m) => decoded_report = Some(m.to_string()),
							Decoded::IncOsdMap(m) => decoded_report = Some(m.to_string()),
							Decoded::OsdSuper(m) => decoded_report = Some(m.to_string()),
							Decoded::RbdId(m) => {
								decoded_report = Some(m.to_string());
								let dest = out_dir.join(format!("rbd_data.{}", m.rbd_id));
								fs::create_dir_all(&dest)?;
								if !fdata.exists() {
									let _ = std::os::unix::fs::symlink(
										PathBuf::from("..").join(format!("rbd_data.{}", m.rbd_id)),
										&fdata,
									);
								}
								fs::File::create(dest.join(format!("rbd_id_{stripe}")))?;
							}
						}
						if let Some(crush) = crush {
							fs::write(&fcrush, crush)?;
						}
					}
				}
				Err(e) => log::warn!("could not read content of {key}: {e}"),
			}

			if let Err(e) = write_object_body(image, onode, &fstripe, &fslack, &fmd5) {
				log::warn!("could not extract object body for {key}: {e}");
			}
			if let Err(e) = create_tree(out_dir, onode) {
				log::warn!("could not build CephFS tree for {key}: {e}");
			}
		}

		if let Some(report) = decoded_report {
			fs::write(&fdec, report)?;
		}

		write_meta_report(&fmeta, key, onode, dir_meta)?;
	}
	Ok(())
}

fn write_meta_report(
	fmeta: &Path,
	key: &crate::kv::onode::ObjectKey,
	onode: &Option<Onode>,
	dir_meta: &DirMetaTable,
) -> anyhow::Result<()> {
	let mut w = fs::File::create(fmeta)?;
	writeln!(w, "Key: {key}")?;
	writeln!(w, "Value:")?;
	let Some(onode) = onode else {
		return Ok(());
	};
	writeln!(w, "{onode}")?;
	let mut attrs: Vec<_> = onode.attrs.iter().collect();
	attrs.sort_by_key(|(name, _)| (*name).clone());
	for (name, attr) in attrs {
		writeln!(w, "{name:>10}: {}", describe_xattr(attr))?;
	}

	if let Some(crate::kv::onode::Xattr::Parent(backtrace)) = onode.attrs.get("_parent") {
		let inodes: Vec<String> = backtrace.ancestors.iter().rev().map(|a| format!("{:x}", a.inode)).collect();
		writeln!(w, "Filename: {}", backtrace.filename().unwrap_or_default())?;
		writeln!(w, "Fullpath: {}", backtrace.fullpath())?;
		writeln!(w, "Own inode: {:#x}", backtrace.inode)?;
		writeln!(w, "Inodes in path: {}", inodes.join("/"))?;
	}

	if !onode.lextents.is_empty() {
		writeln!(w, "\nLogical extents:")?;
		let mut lextents: Vec<_> = onode.lextents.iter().collect();
		lextents.sort_by_key(|le| le.logical_offset);
		for le in lextents {
			writeln!(
				w,
				"logical_offset: {:#x}, blob_offset: {:#x}, length: {:#x}, blob: {}",
				le.logical_offset, le.blob_offset, le.length, le.blob
			)?;
		}
	}

	if let Some(meta) = dir_meta.by_oid.get(&onode.oid) {
		writeln!(w, "\nAdditional Metadata from KV Store (M prefix)")?;
		let mut entries: Vec<_> = meta.entries.iter().collect();
		entries.sort_by_key(|(k, _)| (*k).clone());
		for (k, v) in entries {
			writeln!(w, "{k}: {}", describe_meta_value(v))?;
		}
		let mut dentries: Vec<_> = meta.dentries.iter().collect();
		dentries.sort_by_key(|(k, _)| (*k).clone());
		for (name, inode) in dentries {
			writeln!(w, "{name}_head: {inode}")?;
		}
	}
	Ok(())
}

fn describe_xattr(attr: &crate::kv::onode::Xattr) -> String {
	use crate::kv::onode::Xattr;
	match attr {
		Xattr::Parent(b) => b.fullpath().to_string(),
		Xattr::ObjectInfo(o) => format!("{} size {:#x}", o.soid, o.size),
		Xattr::SnapSet(s) => format!("snapid {:#x}, {} clones", s.snapid, s.clones.len()),
		Xattr::Layout(l) => format!("stripe_unit {:#x}, object_size {:#x}", l.stripe_unit, l.object_size),
		Xattr::RbdLock(l) => format!("lock {} ({})", l.desc, l.tag),
		Xattr::Raw(raw) => format!("{} raw bytes", raw.len()),
	}
}

fn describe_meta_value(v: &MetaValue) -> String {
	match v {
		MetaValue::MayIncludeDeletesInMissing => "true".to_string(),
		MetaValue::Inode(i) => i.to_string(),
		MetaValue::PgInfo(p) => format!("last_update {}", p.last_update),
		MetaValue::BigInfo(p, counts) => format!("({} intervals, {} counts)", p.intervals.len(), counts.len()),
		MetaValue::Order(n) | MetaValue::InfoVer(n) => n.to_string(),
		MetaValue::Epoch(n) => n.to_string(),
		MetaValue::ObjectPrefix(s) => s.clone(),
		MetaValue::CreateTimestamp(t) => format!("{t}"),
		MetaValue::Size(n) | MetaValue::Flags(n) | MetaValue::SnapSeq(n) | MetaValue::Features(n) => n.to_string(),
		MetaValue::Dup(d) => format!("{} user_version {}", d.reqid, d.user_version),
		MetaValue::LogEntry(e) => format!("{} op {}", e.soid, e.op),
		MetaValue::FastInfo(f) => format!("last_update {}", f.last_update),
		MetaValue::Missing => "missing".to_string(),
		MetaValue::Raw(raw) => format!("{} raw bytes", raw.len()),
	}
}

/// Accumulates valid physical extents observed while decoding the KV
/// store, replacing the original's process-wide class registry with an
/// explicit value threaded through the extraction pipeline.
/// `(offset, length)` interval.
type Interval = (u64, u64);

#[derive(Debug, Default)]
pub struct AllocAccumulator {
	extents: Vec<Interval>,
}

impl AllocAccumulator {
	pub fn record(&mut self, offset: u64, length: u64) {
		self.extents.push((offset, length));
	}

	pub fn record_onode(&mut self, onode: &Onode) {
		for le in &onode.lextents {
			for pe in &le.blob.extents {
				self.record(pe.offset, pe.length);
			}
		}
	}

	/// Reserved `(0, 0x2000)` region plus every recorded extent, merged
	/// into the allocated/unallocated interval lists.
	pub fn compute(&self, osd_length: u64) -> anyhow::Result<(Vec<Interval>, Vec<Interval>)> {
		let mut sorted = self.extents.clone();
		sorted.sort();
		sorted.dedup();

		let mut alloc = vec![(0u64, 0x2000u64)];
		let mut unalloc = Vec::new();

		for (offset, length) in sorted {
			let (last_off, last_len) = *alloc.last().unwrap();
			let last_end = last_off + last_len;
			if offset > last_end {
				unalloc.push((last_end, offset - last_end));
				alloc.push((offset, length));
			} else if offset == last_end {
				*alloc.last_mut().unwrap() = (last_off, last_len + length);
			} else {
				anyhow::bail!("physical extent {offset:#x}+{length:#x} overlaps prior allocated region");
			}
		}

		let (last_off, last_len) = *alloc.last().unwrap();
		let last_end = last_off + last_len;
		if last_end < osd_length {
			unalloc.push((last_end, osd_length - last_end));
		} else if last_end > osd_length {
			anyhow::bail!("allocated area extends past end of image ({last_end:#x} > {osd_length:#x})");
		}

		Ok((alloc, unalloc))
	}

	/// Writes every unallocated region to `<out>/unallocated/0x<offset>`.
	pub fn extract_unallocated(
		&self,
		image: &mut dyn ByteCursor,
		osd_length: u64,
		out_dir: &Path,
	) -> anyhow::Result<()> {
		let (_, unalloc) = self.compute(osd_length)?;
		fs::create_dir_all(out_dir)?;
		const CHUNK: u64 = 0x2000_0000;
		for (offset, length) in unalloc {
			let fname = out_dir.join(format!("0x{offset:016x}"));
			let mut w = fs::File::create(fname)?;
			image.seek(offset)?;
			let mut remaining = length;
			while remaining > 0 {
				let chunk = remaining.min(CHUNK);
				w.write_all(&image.read(chunk as usize)?)?;
				remaining -= chunk;
			}
		}
		Ok(())
	}
}

/// Sweeps the image in fixed `0x10000`-byte windows attempting the three
/// structured decoders independent of the KV store, writing any success
/// to `<out>/<kind>/decoded_<epoch>`.
pub fn scan_image(image: &mut dyn ByteCursor, out_dir: &Path) -> anyhow::Result<()> {
	const WINDOW: u64 = 0x10000;
	let size = image.len();
	let mut offset = 0u64;
	while offset < size {
		let remaining = (size - offset).min(WINDOW);
		image.seek(offset)?;
		if let Ok(buf) = image.read(remaining as usize) {
			try_scan_window(&buf, out_dir)?;
		}
		offset += WINDOW;
	}
	Ok(())
}

fn try_scan_window(buf: &[u8], out_dir: &Path) -> anyhow::Result<()> {
	let mut c = BufferCursor::new(buf.to_vec());
	if let Ok(m) = structured::decode_osdmap(&mut c) {
		write_scan_hit(out_dir, "osdmap", m.epoch, &m.to_string())?;
	}
	let mut c = BufferCursor::new(buf.to_vec());
	if let Ok(m) = structured::decode_inc_osdmap(&mut c) {
		write_scan_hit(out_dir, "inc_osdmap", m.epoch, &m.to_string())?;
	}
	let mut c = BufferCursor::new(buf.to_vec());
	if let Ok(m) = structured::decode_osd_super(&mut c) {
		write_scan_hit(out_dir, "osd_superblock", m.current_epoch, &m.to_string())?;
	}
	Ok(())
}

fn write_scan_hit(out_dir: &Path, kind: &str, epoch: u32, report: &str) -> anyhow::Result<()> {
	let dir = out_dir.join(kind);
	fs::create_dir_all(&dir)?;
	fs::write(dir.join(format!("decoded_{epoch}")), report)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn alloc_accumulator_merges_contiguous_extents() {
		let mut acc = AllocAccumulator::default();
		acc.record(0x2000, 0x1000);
		acc.record(0x3000, 0x1000);
		acc.record(0x10000, 0x1000);
		let (alloc, unalloc) = acc.compute(0x20000).unwrap();
		assert_eq!(alloc, vec![(0, 0x4000), (0x10000, 0x1000)]);
		assert_eq!(unalloc, vec![(0x4000, 0xc000), (0x11000, 0xf000)]);
	}
}
