pub mod actor;
pub mod cursor;
pub mod db;
pub mod dirs;
pub mod ipc;
pub mod server;
pub mod service;
pub mod tools;

mod domain;
pub use domain::{config, owner, package, version};

mod daemon;
pub use daemon::{Attached, Daemon, DaemonError, attach, run_watch_relay};
