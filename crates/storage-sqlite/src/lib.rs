//! SQLite persistence for formsync.
//!
//! Form tables are created and evolved at runtime from table layouts, so
//! their statements are built as raw SQL. The sync entry registry is a regular
//! diesel table with an embedded migration.

pub mod db;
pub mod errors;
pub mod forms;
pub mod schema;
pub mod sync_entries;

pub use db::{create_pool, get_connection, init, init_file, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
pub use forms::FormTableRepository;
pub use sync_entries::SyncEntryRepository;
