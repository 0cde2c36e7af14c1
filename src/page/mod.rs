pub mod document;
pub mod store;
pub mod types;
