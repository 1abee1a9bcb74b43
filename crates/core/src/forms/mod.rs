//! Form definitions, derived schemas and table layouts.

mod definition;
mod forms_model;
mod layout;

pub use definition::*;
pub use forms_model::*;
pub use layout::*;
