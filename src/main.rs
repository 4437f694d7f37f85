//! CLI front-end over the `imgfs_core` library: format, mount and operate on a single-file
//! disk image.
//!
//! Command line parsing follows `mkfs`/`fdisk`'s style: a hand-rolled `parse_args` plus a
//! `match` dispatch, no argument-parsing crate.

use imgfs_core::error::Error;
use imgfs_core::inode::Kind;
use imgfs_core::superblock::DEFAULT_BLOCK_SIZE;
use imgfs_core::Session;
use std::env;
use std::path::PathBuf;
use std::process::exit;
use utils::prompt::prompt;

const DEFAULT_IMAGE: &str = "image.img";
const DEFAULT_SIZE: u64 = 16 * 1024 * 1024;
const DEFAULT_CACHE_CAPACITY: u32 = 64;

struct Args {
	prog: String,
	image: PathBuf,
	command: Option<String>,
	rest: Vec<String>,
}

fn parse_args() -> Args {
	let mut iter = env::args();
	let prog = iter.next().unwrap_or_else(|| "imgfs".to_owned());
	let mut image = PathBuf::from(DEFAULT_IMAGE);
	let mut positional = Vec::new();

	let mut iter = iter.peekable();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"--image" => {
				if let Some(path) = iter.next() {
					image = PathBuf::from(path);
				}
			},
			_ => positional.push(arg),
		}
	}

	let command = if positional.is_empty() {
		None
	} else {
		Some(positional.remove(0))
	};

	Args {
		prog,
		image,
		command,
		rest: positional,
	}
}

fn usage(prog: &str) {
	eprintln!(
		"usage: {prog} [--image <path>] <command> [args...]

commands:
    format [size_bytes]              create a fresh image (default size 16 MiB)
    list                              list files
    create <name> <contents>          create a file with the given text contents
    read <name>                       print a file's contents
    edit <name> <contents>            replace a file's contents
    delete <name>                     delete a file
    snapshot-create <name> <snap>     snapshot a file
    snapshot-restore <name> <snap>    restore a file from a snapshot
    snapshot-delete <snap>            delete a snapshot
    snapshot-list                     list snapshots
    info                              print superblock counters"
	);
}

fn die(prog: &str, err: impl std::fmt::Display) -> ! {
	eprintln!("{prog}: {err}");
	exit(1);
}

fn main() {
	let args = parse_args();
	let Some(command) = args.command else {
		usage(&args.prog);
		exit(1);
	};

	if command == "format" {
		let size = args
			.rest
			.first()
			.map(|s| s.parse::<u64>().unwrap_or_else(|_| die(&args.prog, "invalid size")))
			.unwrap_or(DEFAULT_SIZE);

		if args.image.exists() {
			let msg = format!("overwrite existing image `{}`? (y/n) ", args.image.display());
			match prompt(Some(&msg), false) {
				Some(answer) if answer.trim().eq_ignore_ascii_case("y") => {},
				_ => {
					eprintln!("{}: aborted", args.prog);
					exit(1);
				},
			}
		}

		Session::format(&args.image, size, DEFAULT_BLOCK_SIZE, false, DEFAULT_CACHE_CAPACITY)
			.unwrap_or_else(|e| die(&args.prog, e));
		return;
	}

	let mut session = Session::mount(&args.image, None).unwrap_or_else(|e| die(&args.prog, e));

	let result = match command.as_str() {
		"list" => run_list(&mut session),
		"create" => run_create(&mut session, &args.rest),
		"read" => run_read(&mut session, &args.rest),
		"edit" => run_edit(&mut session, &args.rest),
		"delete" => run_delete(&mut session, &args.rest),
		"snapshot-create" => run_snapshot_create(&mut session, &args.rest),
		"snapshot-restore" => run_snapshot_restore(&mut session, &args.rest),
		"snapshot-delete" => run_snapshot_delete(&mut session, &args.rest),
		"snapshot-list" => run_snapshot_list(&mut session),
		"info" => run_info(&mut session),
		other => {
			eprintln!("{}: unknown command `{other}`", args.prog);
			usage(&args.prog);
			exit(1);
		},
	};

	if let Err(e) = result {
		die(&args.prog, e);
	}
}

fn run_list(session: &mut Session) -> Result<(), Error> {
	for (index, inode) in session.list_files()? {
		if inode.name == "/" {
			continue;
		}
		let tag = if inode.kind == Kind::Directory { "d" } else { "f" };
		println!("{index}\t{tag}\t{}\t{}", inode.size, inode.name);
	}
	Ok(())
}

fn run_create(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name, contents] = require::<2>(rest);
	session.create(name, contents.as_bytes())
}

fn run_read(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name] = require::<1>(rest);
	let bytes = session.read(name)?;
	print!("{}", String::from_utf8_lossy(&bytes));
	Ok(())
}

fn run_edit(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name, contents] = require::<2>(rest);
	session.edit(name, contents.as_bytes())
}

fn run_delete(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name] = require::<1>(rest);
	session.delete(name)
}

fn run_snapshot_create(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name, snap] = require::<2>(rest);
	session.create_snapshot(name, snap)
}

fn run_snapshot_restore(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [name, snap] = require::<2>(rest);
	session.restore_snapshot(name, snap)
}

fn run_snapshot_delete(session: &mut Session, rest: &[String]) -> Result<(), Error> {
	let [snap] = require::<1>(rest);
	session.delete_snapshot(snap)
}

fn run_snapshot_list(session: &mut Session) -> Result<(), Error> {
	for entry in session.snapshots() {
		println!("{}\t{}\t{}", entry.name, entry.original_inode, entry.timestamp);
	}
	Ok(())
}

fn run_info(session: &mut Session) -> Result<(), Error> {
	let sb = session.info();
	println!("block size:      {}", sb.block_size);
	println!("total blocks:    {}", sb.total_blocks);
	println!("free blocks:     {}", sb.free_blocks);
	println!("inode count:     {}", sb.inode_count);
	println!("free inodes:     {}", sb.free_inodes);
	println!("snapshot count:  {}", sb.snapshot_count);
	Ok(())
}

/// Pulls exactly `N` positional arguments out of `rest`, exiting with a usage error if there
/// are fewer.
fn require<const N: usize>(rest: &[String]) -> [&str; N] {
	if rest.len() < N {
		eprintln!("imgfs: missing arguments");
		exit(1);
	}
	std::array::from_fn(|i| rest[i].as_str())
}
