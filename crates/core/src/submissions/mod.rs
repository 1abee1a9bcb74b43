//! Submission pages and the row transformer.

mod row_transformer;
mod submissions_model;

pub use row_transformer::*;
pub use submissions_model::*;
