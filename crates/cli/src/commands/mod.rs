//! CLI command implementations

mod admin;
mod config;
mod query;
mod serve;
mod sync;

pub use admin::{cmd_adopt, cmd_flag, cmd_user_add, cmd_user_alias, cmd_user_show};
pub use config::{cmd_config_init, cmd_config_show};
pub use query::{QueryArgs, cmd_query};
pub use serve::{cmd_serve, cmd_watch};
pub use sync::{cmd_date_sync, cmd_sync};
