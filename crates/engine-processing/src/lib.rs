pub mod error;
pub mod pipeline;
pub mod retry;
pub mod tracker;
