pub mod error;
pub mod file;
pub mod sink;
pub mod source;
pub mod sql;
