use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid persona field `{field}`: {reason}")]
    InvalidPersona { field: &'static str, reason: String },

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    #[error("malformed bracket schedule `{schedule}`: {reason}")]
    InvalidBrackets { schedule: String, reason: String },

    #[error("invalid simulation config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("projection produced no yearly results")]
    EmptyResult,
}

impl EngineError {
    /// True for errors caused by caller input rather than engine configuration.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidPersona { .. } | EngineError::UnknownScenario(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
