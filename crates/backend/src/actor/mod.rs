//! The repository processor and what feeds it
//!
//! # Components
//!
//! - [`Processor`]: turns file events and remote calls into catalog rows and
//!   index updates, under per-architecture and per-package locks
//! - [`WatcherTask`]: watches the repository tree and relays raw events
//! - [`ProcessorHandle`]: reaches a processor in this process or behind its socket
//!
//! Rename halves are paired by cookie in [`moves`]; locking lives in [`locks`].

pub mod events;
pub mod handle;
pub mod locks;
pub mod moves;
mod processor;
pub mod watcher;

#[cfg(test)]
pub(crate) mod __tests__;

pub use handle::{ProcessorHandle, SendError};
pub use processor::{Completion, Processor, ProcessorError};
pub use watcher::{WatcherError, WatcherTask};
