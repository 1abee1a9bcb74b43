mod model;
mod repository;

pub use model::{NewSyncEntryDB, SyncEntryDB};
pub use repository::SyncEntryRepository;
