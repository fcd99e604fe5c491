//! Read-only, offsetted view over the backing block-device image.

use std::{
	fs::File,
	io::{Read, Seek, SeekFrom},
	path::Path,
};

use crate::{
	cursor::ByteCursor,
	error::{Error, Result},
};

/// A read-only handle on the OSD image. `base_offset` lets the analyzer
/// operate on an image embedded at some offset within a larger container
/// (e.g. a partition inside a disk image) without every decoder needing to
/// know about it: all positions passed to and returned from this type are
/// logical, relative to `base_offset`.
pub struct Image {
	file: File,
	base_offset: u64,
	size: u64,
	pos: u64,
}

impl Image {
	pub fn open(path: &Path, base_offset: u64) -> Result<Self> {
		let file = File::open(path).map_err(|source| Error::ImageIo { offset: 0, source })?;
		let total = file
			.metadata()
			.map_err(|source| Error::ImageIo { offset: 0, source })?
			.len();
		let size = total.saturating_sub(base_offset);
		let mut img = Self {
			file,
			base_offset,
			size,
			pos: 0,
		};
		img.seek(0)?;
		Ok(img)
	}

	pub fn base_offset(&self) -> u64 {
		self.base_offset
	}

	/// Size of the image in logical (post-offset) bytes.
	pub fn image_size(&self) -> u64 {
		self.size
	}
}

impl ByteCursor for Image {
	fn tell(&self) -> u64 {
		self.pos
	}

	fn seek(&mut self, pos: u64) -> Result<()> {
		self.file
			.seek(SeekFrom::Start(self.base_offset + pos))
			.map_err(|source| Error::ImageIo { offset: pos, source })?;
		self.pos = pos;
		Ok(())
	}

	fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
		let offset = self.pos;
		self.file
			.read_exact(buf)
			.map_err(|source| Error::ImageIo { offset, source })?;
		self.pos += buf.len() as u64;
		Ok(())
	}

	fn len(&self) -> u64 {
		self.size
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn base_offset_shifts_logical_positions() {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		f.write_all(&[0u8; 16]).unwrap();
		f.write_all(b"hello world").unwrap();
		f.flush().unwrap();

		let mut img = Image::open(f.path(), 16).unwrap();
		assert_eq!(img.image_size(), 11);
		assert_eq!(img.tell(), 0);
		let data = img.read(5).unwrap();
		assert_eq!(&data, b"hello");
		assert_eq!(img.tell(), 5);
		img.seek(6).unwrap();
		let data = img.read(5).unwrap();
		assert_eq!(&data, b"world");
	}
}
