use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The planner was given settings it cannot build a plan from.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
