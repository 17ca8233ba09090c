pub mod executor;
pub mod factory;
pub mod preview;
pub mod queue;
pub mod reset;
pub mod resume;
pub mod status;
pub mod workers;
