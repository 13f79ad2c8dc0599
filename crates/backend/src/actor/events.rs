//! inotify event masks as carried on the command channel.

pub const IN_MODIFY: u32 = 0x0000_0002;
pub const IN_CLOSE_WRITE: u32 = 0x0000_0008;
pub const IN_MOVED_FROM: u32 = 0x0000_0040;
pub const IN_MOVED_TO: u32 = 0x0000_0080;
pub const IN_CREATE: u32 = 0x0000_0100;
pub const IN_DELETE: u32 = 0x0000_0200;
pub const IN_ISDIR: u32 = 0x4000_0000;

/// The event kinds the processor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Modify,
  CloseWrite,
  MovedFrom,
  MovedTo,
  Create,
  Delete,
}

impl EventKind {
  /// Decode the kind from a mask. Flags like `IN_ISDIR` are ignored.
  pub fn from_mask(mask: u32) -> Option<Self> {
    [
      (IN_CLOSE_WRITE, EventKind::CloseWrite),
      (IN_MOVED_FROM, EventKind::MovedFrom),
      (IN_MOVED_TO, EventKind::MovedTo),
      (IN_CREATE, EventKind::Create),
      (IN_DELETE, EventKind::Delete),
      (IN_MODIFY, EventKind::Modify),
    ]
    .into_iter()
    .find(|(bit, _)| mask & bit != 0)
    .map(|(_, kind)| kind)
  }

  pub fn mask(self) -> u32 {
    match self {
      EventKind::Modify => IN_MODIFY,
      EventKind::CloseWrite => IN_CLOSE_WRITE,
      EventKind::MovedFrom => IN_MOVED_FROM,
      EventKind::MovedTo => IN_MOVED_TO,
      EventKind::Create => IN_CREATE,
      EventKind::Delete => IN_DELETE,
    }
  }
}
