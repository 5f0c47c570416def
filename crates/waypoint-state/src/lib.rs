pub mod error;
pub mod patch;
pub mod pointer;
pub mod schema;

pub use error::StateError;
pub use patch::{apply_patch_value, deep_copy, from_value, to_value};
