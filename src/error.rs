//! Error type returned by every core operation.

/// An error produced by the filesystem core.
///
/// Every variant is recoverable except [`Error::Io`]: a short or failed read/write on the
/// persistent-metadata path leaves the session unable to assume consistent state, so the caller
/// should treat it as fatal. All other variants mean the operation was rolled back (any
/// just-allocated blocks or inodes were freed) before the error was returned.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The superblock's magic number did not match.
	#[error("bad magic number")]
	BadMagic,
	/// The block bitmap has no free bit left.
	#[error("no free blocks")]
	NoSpace,
	/// The inode bitmap has no free bit left.
	#[error("no free inodes")]
	NoInode,
	/// A used inode with that name already exists.
	#[error("file '{0}' already exists")]
	NameExists(String),
	/// No used inode (or snapshot) with that name exists.
	#[error("'{0}' not found")]
	NotFound(String),
	/// A filename longer than the inode's name field was given.
	#[error("name too long")]
	NameTooLong,
	/// The snapshot table already holds the maximum number of entries.
	#[error("snapshot table is full")]
	TooManySnapshots,
	/// The cache is at capacity and every entry is pinned.
	#[error("cache overflow: all entries pinned")]
	CacheOverflow,
	/// A read or write on the backing image failed or was short.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Shorthand result type used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
