pub mod chunk;
pub mod format;
