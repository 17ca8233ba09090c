pub mod error;
pub mod memory;
pub mod progress;
pub mod retry;
pub mod serializer;
pub mod snapshot;
pub mod state;
