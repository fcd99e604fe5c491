//! BlueStore label: the fixed-position header at logical offset 0 that
//! gates everything else (image length, volume UUID, last-mount time).

use crate::{
	cursor::{
		read_block_header, read_fixed_int, read_fixed_string, read_string, read_utime, read_uuid,
		ByteCursor, UTime, Uuid,
	},
	error::{Error, Result},
};

const MAGIC: &[u8; 23] = b"bluestore block device\n";
const LABEL_TAG_LEN: usize = 60;
const BLUEFS_SUPERBLOCK_OFFSET: u64 = 0x1000;

#[derive(Debug, Clone)]
pub struct BlueStoreLabel {
	pub uuid: Uuid,
	pub osd_length: u64,
	pub last_mount: UTime,
	pub main_type: String,
	pub metadata: Vec<(String, String)>,
	pub crc: u32,
	pub label_slack: Vec<u8>,
	/// Set when `osd_length` is strictly less than the remaining image
	/// size, marking the start of the unused tail of the volume.
	pub volume_slack_start: Option<u64>,
}

impl BlueStoreLabel {
	pub fn parse(c: &mut dyn ByteCursor, image_size: u64) -> Result<Self> {
		let start = c.tell();
		let tag = read_fixed_string(c, LABEL_TAG_LEN)?;
		let tag_bytes = tag.as_bytes();
		if tag_bytes.len() < LABEL_TAG_LEN || &tag_bytes[0..23] != MAGIC {
			return Err(Error::UnexpectedLabel {
				offset: start,
				reason: "first 23 bytes do not match the BlueStore magic tag".into(),
			});
		}
		if tag_bytes[59] != b'\n' {
			return Err(Error::UnexpectedLabel {
				offset: start,
				reason: "byte 60 of the label tag is not a newline".into(),
			});
		}
		let tag_uuid_str = std::str::from_utf8(&tag_bytes[23..59]).map_err(|_| Error::UnexpectedLabel {
			offset: start,
			reason: "UUID embedded in the label tag is not valid UTF-8".into(),
		})?;
		let tag_uuid = Uuid::parse(tag_uuid_str).ok_or_else(|| Error::UnexpectedLabel {
			offset: start,
			reason: "UUID embedded in the label tag is not well-formed".into(),
		})?;

		let header = read_block_header(c)?;
		let uuid = read_uuid(c)?;
		if uuid != tag_uuid {
			return Err(Error::UnexpectedLabel {
				offset: start,
				reason: format!("tag UUID {tag_uuid} does not match binary UUID {uuid}"),
			});
		}

		let osd_length = read_fixed_int(c, 8, false)? as u64;
		if osd_length > image_size {
			return Err(Error::OutOfRange {
				what: "osd_length".into(),
				value: osd_length,
				limit: image_size,
			});
		}
		let volume_slack_start = if osd_length < image_size {
			Some(osd_length)
		} else {
			None
		};

		let last_mount = read_utime(c)?;
		let main_type = read_string(c)?;

		let meta_start = c.tell();
		let metadata = match read_string_dict(c) {
			Ok(m) => m,
			Err(_) => {
				c.seek(meta_start)?;
				Vec::new()
			}
		};

		header.finish(c, start)?;

		let crc = read_fixed_int(c, 4, false)? as u32;
		let end = c.tell();

		if BLUEFS_SUPERBLOCK_OFFSET < end {
			return Err(Error::OutOfRange {
				what: "bluestore label slack".into(),
				value: end,
				limit: BLUEFS_SUPERBLOCK_OFFSET,
			});
		}
		let label_slack = c.read((BLUEFS_SUPERBLOCK_OFFSET - end) as usize)?;

		Ok(Self {
			uuid,
			osd_length,
			last_mount,
			main_type,
			metadata,
			crc,
			label_slack,
			volume_slack_start,
		})
	}
}

fn read_string_dict(c: &mut dyn ByteCursor) -> Result<Vec<(String, String)>> {
	let count = read_fixed_int(c, 4, false)? as usize;
	let mut out = Vec::with_capacity(count);
	for _ in 0..count {
		let k = read_string(c)?;
		let v = read_string(c)?;
		out.push((k, v));
	}
	Ok(out)
}

impl std::fmt::Display for BlueStoreLabel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "---------------------------------")?;
		writeln!(f, "BlueStore Superblock Information:")?;
		writeln!(f, "---------------------------------")?;
		writeln!(f, "OSD UUID: {}", self.uuid)?;
		writeln!(
			f,
			"OSD length: {:#x} B = ~ {} GiB",
			self.osd_length,
			self.osd_length / (1 << 30)
		)?;
		writeln!(f, "Last used at: {}", self.last_mount)?;
		writeln!(f, "Metadata information:")?;
		for (k, v) in &self.metadata {
			writeln!(f, "- {k}: {v}")?;
		}
		writeln!(f, "---------------------------------")?;
		if let Some(off) = self.volume_slack_start {
			writeln!(f, "Volume slack starts at offset {off:#x} of image file")?;
			writeln!(f, "---------------------------------")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cursor::BufferCursor;

	fn build_label(uuid: &str, osd_length: u64) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(b"bluestore block device\n");
		out.extend_from_slice(uuid.as_bytes());
		out.push(b'\n');
		assert_eq!(out.len(), 60);

		let mut body = Vec::new();
		body.extend_from_slice(&Uuid::parse(uuid).unwrap().0);
		body.extend_from_slice(&osd_length.to_le_bytes());
		body.extend_from_slice(&0u32.to_le_bytes()); // seconds
		body.extend_from_slice(&0u32.to_le_bytes()); // nanos
		body.extend_from_slice(&4u32.to_le_bytes());
		body.extend_from_slice(b"bdev");
		body.extend_from_slice(&0u32.to_le_bytes()); // empty metadata dict

		out.push(2); // v
		out.push(1); // compat
		out.extend_from_slice(&(body.len() as u32).to_le_bytes());
		out.extend_from_slice(&body);
		out.extend_from_slice(&0xdeadbeefu32.to_le_bytes()); // crc

		while out.len() < 0x1000 {
			out.push(0);
		}
		out
	}

	#[test]
	fn parses_label_and_computes_slack() {
		let uuid = "11111111-2222-3333-4444-555555555555";
		let bytes = build_label(uuid, 0x1_0000_0000);
		let mut c = BufferCursor::new(bytes.clone());
		let label = BlueStoreLabel::parse(&mut c, 0x1_0000_0000).unwrap();
		assert_eq!(label.uuid, Uuid::parse(uuid).unwrap());
		assert_eq!(label.osd_length, 0x1_0000_0000);
		assert!(label.volume_slack_start.is_none());
		assert_eq!(c.tell(), 0x1000);
		assert!(format!("{label}").contains("OSD length: 0x100000000 B"));
	}
}
