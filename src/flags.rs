//! Change-event flag bits and their human readable rendering.
//!
//! Bit values follow the FSEvents layout so events coming from a macOS
//! stream can be carried without translation; the native backend maps
//! `notify` event kinds onto the same bits.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-event change flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EventFlags: u32 {
        /// Subdirectories must be rescanned, events were coalesced.
        const MUST_SCAN_SUB_DIRS = 0x0000_0001;
        /// Events were dropped in user space.
        const USER_DROPPED = 0x0000_0002;
        /// Events were dropped by the kernel.
        const KERNEL_DROPPED = 0x0000_0004;
        /// The event id counter wrapped around.
        const EVENT_IDS_WRAPPED = 0x0000_0008;
        /// Sentinel marking the end of a history replay.
        const HISTORY_DONE = 0x0000_0010;
        /// A watched root path changed.
        const ROOT_CHANGED = 0x0000_0020;
        /// A volume was mounted under a watched path.
        const MOUNT = 0x0000_0040;
        /// A volume was unmounted under a watched path.
        const UNMOUNT = 0x0000_0080;
        const ITEM_CREATED = 0x0000_0100;
        const ITEM_REMOVED = 0x0000_0200;
        const ITEM_INODE_META_MOD = 0x0000_0400;
        const ITEM_RENAMED = 0x0000_0800;
        const ITEM_MODIFIED = 0x0000_1000;
        const ITEM_FINDER_INFO_MOD = 0x0000_2000;
        const ITEM_CHANGE_OWNER = 0x0000_4000;
        const ITEM_XATTR_MOD = 0x0000_8000;
        const ITEM_IS_FILE = 0x0001_0000;
        const ITEM_IS_DIR = 0x0002_0000;
        const ITEM_IS_SYMLINK = 0x0004_0000;
    }
}

bitflags! {
    /// Flags requested when a watch stream is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CreateFlags: u32 {
        const NO_DEFER = 0x0000_0002;
        /// Report changes to the watched roots themselves.
        const WATCH_ROOT = 0x0000_0004;
        const IGNORE_SELF = 0x0000_0008;
        /// Report file-level events instead of directory-level ones.
        const FILE_EVENTS = 0x0000_0010;
    }
}

impl Default for CreateFlags {
    fn default() -> Self {
        Self::FILE_EVENTS | Self::WATCH_ROOT
    }
}

/// Canonical rendering order. One bit per entry.
pub const NOTE_TOKENS: [(EventFlags, &str); 19] = [
    (EventFlags::MUST_SCAN_SUB_DIRS, "MustScanSubdirs"),
    (EventFlags::USER_DROPPED, "UserDropped"),
    (EventFlags::KERNEL_DROPPED, "KernelDropped"),
    (EventFlags::EVENT_IDS_WRAPPED, "EventIDsWrapped"),
    (EventFlags::HISTORY_DONE, "HistoryDone"),
    (EventFlags::ROOT_CHANGED, "RootChanged"),
    (EventFlags::MOUNT, "Mount"),
    (EventFlags::UNMOUNT, "Unmount"),
    (EventFlags::ITEM_CREATED, "Created"),
    (EventFlags::ITEM_REMOVED, "Removed"),
    (EventFlags::ITEM_INODE_META_MOD, "InodeMetaMod"),
    (EventFlags::ITEM_RENAMED, "Renamed"),
    (EventFlags::ITEM_MODIFIED, "Modified"),
    (EventFlags::ITEM_FINDER_INFO_MOD, "FinderInfoMod"),
    (EventFlags::ITEM_CHANGE_OWNER, "ChangeOwner"),
    (EventFlags::ITEM_XATTR_MOD, "XAttrMod"),
    (EventFlags::ITEM_IS_FILE, "IsFile"),
    (EventFlags::ITEM_IS_DIR, "IsDir"),
    (EventFlags::ITEM_IS_SYMLINK, "IsSymLink"),
];

/// Rendered description of an event's flags.
///
/// Every token is followed by a single space, so a non-empty note ends with
/// a trailing space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(String);

impl Note {
    /// The rendered note text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the note and returns its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Iterates over the tokens in rendering order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }

    /// Returns true if `token` was rendered.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens().any(|t| t == token)
    }

    /// True if no token was rendered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Note {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Renders `flags` into a note. Bits with no token are ignored.
#[must_use]
pub fn decode(flags: EventFlags) -> Note {
    let mut note = String::new();
    for (bit, token) in NOTE_TOKENS {
        if flags.contains(bit) {
            note.push_str(token);
            note.push(' ');
        }
    }
    Note(note)
}
