use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::{directory::CaseSensitivity, store::AttributeBits};

bitflags! {
	/// Packed per-entry flags.
	///
	/// The two `KIND_SPECIFIC` bits mean different things for files and directories, always go
	/// through [`FileAttributes`] or [`DirectoryAttributes`] to read them.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct EntryFlags: u32 {
		const WRITABLE = 1 << 0;
		const HIDDEN = 1 << 1;
		const SYMLINK = 1 << 2;
		const HAS_SYMLINK_PARENT = 1 << 3;
		const INDEXED = 1 << 4;
		const DIRTY = 1 << 5;
		/// file: special file, directory: children are case sensitive
		const KIND_SPECIFIC_0 = 1 << 6;
		/// file: unused, directory: case sensitivity is known
		const KIND_SPECIFIC_1 = 1 << 7;
		const INVALID = 1 << 8;
	}
}

impl EntryFlags {
	pub(crate) fn from_store(bits: AttributeBits) -> Self {
		let mut flags = Self::empty();

		flags.set(Self::WRITABLE, bits.contains(AttributeBits::WRITABLE));
		flags.set(Self::HIDDEN, bits.contains(AttributeBits::HIDDEN));
		flags.set(Self::SYMLINK, bits.contains(AttributeBits::SYMLINK));

		if bits.is_directory() {
			flags |= Self::for_case_sensitivity(CaseSensitivity::from_store(bits));
		} else {
			flags.set(Self::KIND_SPECIFIC_0, bits.contains(AttributeBits::SPECIAL));
		}

		flags
	}

	pub(crate) fn for_case_sensitivity(sensitivity: CaseSensitivity) -> Self {
		match sensitivity {
			CaseSensitivity::Unknown => Self::empty(),
			CaseSensitivity::Sensitive => Self::KIND_SPECIFIC_0 | Self::KIND_SPECIFIC_1,
			CaseSensitivity::Insensitive => Self::KIND_SPECIFIC_1,
		}
	}
}

/// Read-modify-write access to [`EntryFlags`] shared between threads
#[derive(Debug, Default)]
#[repr(transparent)]
pub(crate) struct AtomicEntryFlags(AtomicU32);

impl AtomicEntryFlags {
	pub fn new(flags: EntryFlags) -> Self {
		Self(AtomicU32::new(flags.bits()))
	}

	pub fn load(&self) -> EntryFlags {
		EntryFlags::from_bits_retain(self.0.load(Ordering::Acquire))
	}

	/// Returns the flags as they were before the update
	pub fn set(&self, flags: EntryFlags, value: bool) -> EntryFlags {
		let previous = if value {
			self.0.fetch_or(flags.bits(), Ordering::AcqRel)
		} else {
			self.0.fetch_and(!flags.bits(), Ordering::AcqRel)
		};

		EntryFlags::from_bits_retain(previous)
	}

	/// Replaces every bit in `mask` with the matching bit of `flags`
	pub fn replace(&self, mask: EntryFlags, flags: EntryFlags) -> EntryFlags {
		let previous = self
			.0
			.try_update(Ordering::AcqRel, Ordering::Acquire, |current| {
				Some((current & !mask.bits()) | (flags.bits() & mask.bits()))
			})
			.unwrap_or_else(|current| current);

		EntryFlags::from_bits_retain(previous)
	}
}

/// Accessors valid for both files and directories
pub trait CommonAttributes {
	fn flags(&self) -> EntryFlags;

	fn is_writable(&self) -> bool {
		self.flags().contains(EntryFlags::WRITABLE)
	}

	fn is_hidden(&self) -> bool {
		self.flags().contains(EntryFlags::HIDDEN)
	}

	fn is_symlink(&self) -> bool {
		self.flags().contains(EntryFlags::SYMLINK)
	}

	fn has_symlink_parent(&self) -> bool {
		self.flags().contains(EntryFlags::HAS_SYMLINK_PARENT)
	}

	fn is_indexed(&self) -> bool {
		self.flags().contains(EntryFlags::INDEXED)
	}

	fn is_dirty(&self) -> bool {
		self.flags().contains(EntryFlags::DIRTY)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes(EntryFlags);

impl FileAttributes {
	#[must_use]
	pub const fn is_special(&self) -> bool {
		self.0.contains(EntryFlags::KIND_SPECIFIC_0)
	}
}

impl CommonAttributes for FileAttributes {
	fn flags(&self) -> EntryFlags {
		self.0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryAttributes(EntryFlags);

impl DirectoryAttributes {
	#[must_use]
	pub const fn case_sensitivity(&self) -> CaseSensitivity {
		match (
			self.0.contains(EntryFlags::KIND_SPECIFIC_1),
			self.0.contains(EntryFlags::KIND_SPECIFIC_0),
		) {
			(false, _) => CaseSensitivity::Unknown,
			(true, true) => CaseSensitivity::Sensitive,
			(true, false) => CaseSensitivity::Insensitive,
		}
	}
}

impl CommonAttributes for DirectoryAttributes {
	fn flags(&self) -> EntryFlags {
		self.0
	}
}

/// Typed view over an entry's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
	File(FileAttributes),
	Directory(DirectoryAttributes),
}

impl Attributes {
	pub(crate) const fn new(flags: EntryFlags, is_directory: bool) -> Self {
		if is_directory {
			Self::Directory(DirectoryAttributes(flags))
		} else {
			Self::File(FileAttributes(flags))
		}
	}

	#[must_use]
	pub fn common(&self) -> &dyn CommonAttributes {
		match self {
			Self::File(attributes) => attributes,
			Self::Directory(attributes) => attributes,
		}
	}
}
