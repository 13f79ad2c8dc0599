pub(crate) mod helpers;
mod processor;
mod watcher;
