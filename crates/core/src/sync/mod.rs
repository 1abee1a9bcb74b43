//! Sync orchestration: paging, batch loading, drift audit and the run itself.

mod batch_loader;
mod drift_auditor;
mod form_sync_service;
mod submission_pager;
mod sync_model;
mod sync_scheduler;
mod sync_traits;

pub use batch_loader::*;
pub use drift_auditor::*;
pub use form_sync_service::*;
pub use submission_pager::*;
pub use sync_model::*;
pub use sync_scheduler::*;
pub use sync_traits::*;

#[cfg(test)]
pub(crate) mod test_support;
