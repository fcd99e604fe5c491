use std::{
	fs,
	io::{Seek, SeekFrom, Write},
	path::Path,
};

use anyhow::{Context, Result};
use bluestore_vampyr::{image::Image, osd::Osd, reconstruct};
use clap::Parser;
use regex::Regex;

use crate::cli::{Cli, Command, ImageArgs};

mod cli;

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	match cli.command {
		Command::Info { image } => cmd_info(&image),
		Command::Scan { image, out } => cmd_scan(&image, &out),
		Command::Bluefs { image, out } => cmd_bluefs(&image, &out),
		Command::Extract {
			image,
			ldb,
			out,
			objfilter,
			clear,
			extract_unallocated,
		} => cmd_extract(&image, &ldb, &out, objfilter.as_deref(), clear, extract_unallocated),
		Command::Rebuild { dir, blocksize } => cmd_rebuild(&dir, blocksize),
	}
}

fn cmd_info(image: &ImageArgs) -> Result<()> {
	let osd = Osd::open(&image.image, image.offset)?;
	println!("{}", osd.label);
	println!("{}", osd.superblock);
	Ok(())
}

fn cmd_scan(image: &ImageArgs, out: &Path) -> Result<()> {
	let mut img = Image::open(&image.image, image.offset)?;
	fs::create_dir_all(out)?;
	reconstruct::scan_image(&mut img, out)
}

fn cmd_bluefs(image: &ImageArgs, out: &Path) -> Result<()> {
	let mut osd = Osd::open(&image.image, image.offset)?;
	osd.write_label_slack(out)?;
	osd.extract_bluefs(out)
}

fn cmd_extract(
	image: &ImageArgs,
	ldb: &str,
	out: &Path,
	objfilter: Option<&str>,
	clear: bool,
	extract_unallocated: bool,
) -> Result<()> {
	if clear && out.exists() {
		log::info!("removing existing output directory {}", out.display());
		fs::remove_dir_all(out)?;
	}
	fs::create_dir_all(out)?;

	let mut osd = Osd::open(&image.image, image.offset)?;
	osd.write_label_slack(out)?;

	log::info!("loading KV store via {ldb} idump");
	let (tables, _tmp) = osd.load_kv(ldb)?;
	let filter = Regex::new(objfilter.unwrap_or(".*")).context("invalid --objfilter regex")?;

	let osd_length = osd.label.osd_length;
	let image = osd.image_mut();

	let mut alloc = reconstruct::AllocAccumulator::default();
	for onode in tables.objects.onode_map.values().filter_map(|(_, o)| o.as_ref()) {
		alloc.record_onode(onode);
	}

	let (objects, dir_meta) = tables.into_objects_and_dir_meta();
	reconstruct::extract_objects(image, out, &objects, &dir_meta, &filter)?;

	if extract_unallocated {
		log::info!("extracting unallocated physical extents");
		alloc.extract_unallocated(image, osd_length, &out.join("unallocated"))?;
	}

	Ok(())
}

fn cmd_rebuild(dir: &Path, blocksize: u64) -> Result<()> {
	let mut files: Vec<(u64, std::path::PathBuf)> = Vec::new();
	for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
		let entry = entry?;
		let name = entry.file_name();
		let name = name.to_string_lossy();
		let Some(hex) = name.strip_prefix("object_") else {
			continue;
		};
		let Ok(stripe) = u64::from_str_radix(hex, 16) else {
			log::warn!("{name} does not have a hex stripe suffix, skipping");
			continue;
		};
		let size = entry.metadata()?.len();
		if size > blocksize {
			anyhow::bail!("{name} is {size} bytes, larger than blocksize {blocksize}");
		}
		files.push((stripe, entry.path()));
	}
	files.sort_by_key(|(stripe, _)| *stripe);

	let out_path = dir.join("rebuild");
	let mut out = fs::File::create(&out_path)?;
	for (stripe, path) in files {
		log::debug!("applying stripe {stripe:#x}");
		out.seek(SeekFrom::Start(stripe * blocksize))?;
		out.write_all(&fs::read(&path)?)?;
	}
	log::info!("wrote {}", out_path.display());
	Ok(())
}
