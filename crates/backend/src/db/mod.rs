//! Package catalog (SQLite)

mod connection;
mod packages;
mod schema;
mod users;

pub use connection::{CatalogDb, DbError, Result};
pub use packages::{OrphanRow, PackageRecord, PackageRow, VersionRow};
pub use users::UserRow;
