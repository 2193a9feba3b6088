use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DisturbanceError {
    #[error("disturbance `{0}`: {1}")]
    Invalid(String, String),

    #[error("disturbance `{id}` already registered")]
    Duplicate { id: String },

    #[error("disturbance `{new}` overlaps `{existing}` on `{target}` ({category})")]
    Conflict { new: String, existing: String, target: String, category: &'static str },

    #[error("disturbance `{0}` not found")]
    Unknown(String),

    #[error("disturbance `{id}` targets unknown component `{target}`")]
    UnknownTarget { id: String, target: String },
}

pub type DisturbanceResult<T> = Result<T, DisturbanceError>;
