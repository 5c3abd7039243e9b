mod json_store;

pub use json_store::{create_json_store, JsonFileStore};
pub(crate) use json_store::write_atomic;
