//! Writes the files reconstructed by [`super::replay::Replay`] out to
//! disk: one subdirectory per BlueFS directory, one body/slack/digest
//! triple per file, with mtime restored from the fnode.

use std::{
	fs,
	io::Write,
	path::Path,
	time::{Duration, SystemTime},
};

use md5::{Digest, Md5};

use crate::{
	bluefs::{FNode, State},
	cursor::ByteCursor,
};

/// Reads an fnode's extents in order and returns `(body, slack)`: `body`
/// is exactly `fnode.size` bytes (truncating any excess read from the
/// last extent), `slack` is whatever trails it.
fn read_fnode(image: &mut dyn ByteCursor, fnode: &FNode) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
	let mut full = Vec::new();
	for e in &fnode.extents {
		image.seek(e.offset)?;
		full.extend(image.read(e.length as usize)?);
	}
	let size = fnode.size as usize;
	let body = full.get(..size.min(full.len())).unwrap_or(&[]).to_vec();
	let slack = full.get(size.min(full.len())..).unwrap_or(&[]).to_vec();
	Ok((body, slack))
}

/// Extracts every live file in `state` under `out_dir`, laid out as
/// `<out_dir>/<directory>/<filename>` plus `_slack`/`.md5` siblings.
pub fn extract_files(image: &mut dyn ByteCursor, state: &State, out_dir: &Path) -> anyhow::Result<()> {
	for dir in &state.directories {
		let ddir = out_dir.join(&dir.name);
		fs::create_dir_all(&ddir)?;
		for (ino, filename) in &dir.ino_to_file {
			let Some(fnode) = state.files.get(ino) else {
				log::warn!("directory {} references unknown ino {ino}", dir.name);
				continue;
			};
			if let Err(e) = extract_one_file(image, &ddir, filename, fnode) {
				log::warn!("could not extract {}/{filename}: {e}", dir.name);
			}
		}
	}
	Ok(())
}

fn extract_one_file(image: &mut dyn ByteCursor, ddir: &Path, filename: &str, fnode: &FNode) -> anyhow::Result<()> {
	let (body, slack) = read_fnode(image, fnode)?;

	let fpath = ddir.join(filename);
	let file = fs::File::create(&fpath)?;
	{
		let mut w = &file;
		w.write_all(&body)?;
	}
	if !slack.is_empty() {
		fs::write(ddir.join(format!("{filename}_slack")), &slack)?;
	}

	let mut hasher = Md5::new();
	hasher.update(&body);
	let digest = hasher.finalize();
	writeln!(fs::File::create(ddir.join(format!("{filename}.md5")))?, "{digest:x}")?;

	let mtime = SystemTime::UNIX_EPOCH + Duration::new(fnode.mtime.sec as u64, fnode.mtime.nsec);
	file.set_modified(mtime)?;
	Ok(())
}
