pub mod error;
pub mod naming;
pub mod plan;
