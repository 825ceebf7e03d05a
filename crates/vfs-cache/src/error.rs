use thiserror::Error;

use super::{entry::FileId, store::StoreError};

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	InvalidName(#[from] InvalidNameError),
	#[error("directory is no longer valid <id='{id}'>: {reason}")]
	InvalidDirectory { id: FileId, reason: String },
	#[error("entry is no longer valid <id='{id}'>: {reason}")]
	InvalidEntry { id: FileId, reason: String },
	#[error("entry is not a directory <id='{0}'>")]
	NotADirectory(FileId),
	#[error("entry is not known to the cache <id='{0}'>")]
	UnknownEntry(FileId),

	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Consistency(#[from] ConsistencyViolation),
}

/// A name that was meant to be a single path segment but isn't one
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
	#[error("empty file name")]
	Empty,
	#[error("file name contains a path separator <name='{0}'>")]
	ContainsSeparator(String),
}

/// A broken directory index. These are defects, never recoverable conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsistencyViolation {
	#[error(
		"children of <dir='{dir}'> are not strictly sorted at index {index}: '{left}' >= '{right}'"
	)]
	Unsorted {
		dir: FileId,
		index: usize,
		left: String,
		right: String,
	},
	#[error("child <id='{child}'> appears more than once in <dir='{dir}'>")]
	DuplicateChild { dir: FileId, child: FileId },
	#[error("name '{name}' is both a child and an adopted name of <dir='{dir}'>")]
	AdoptedChild { dir: FileId, name: String },
}
