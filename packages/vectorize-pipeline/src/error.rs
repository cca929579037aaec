use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("State error: {0}")]
    State(#[from] vectorize_state::StateError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported service: {0}")]
    UnsupportedService(String),

    #[error("Unsupported step: {0}")]
    UnsupportedStep(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error calling '{service}' after {attempts} attempts: {message}")]
    Transport {
        service: String,
        attempts: u32,
        message: String,
    },

    #[error("Step '{step}' failed: {message}")]
    StepExecutionFailed { step: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn configuration<E: std::fmt::Display>(e: E) -> Self {
        Self::Configuration(e.to_string())
    }

    pub fn step_failed(step: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::StepExecutionFailed {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// True when the underlying cause is a cancellation, regardless of the
    /// layer that surfaced it.
    pub fn is_cancellation(&self) -> bool {
        match self {
            PipelineError::Cancelled => true,
            PipelineError::State(e) => e.kind == vectorize_state::ErrorKind::Cancelled,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = PipelineError::Transport {
            service: "embedding".to_string(),
            attempts: 3,
            message: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("embedding"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn test_state_error_conversion() {
        let state_err = vectorize_state::StateError::cancelled("save");
        let err: PipelineError = state_err.into();
        assert!(err.is_cancellation());

        assert!(PipelineError::Cancelled.is_cancellation());
        assert!(!PipelineError::Configuration("x".to_string()).is_cancellation());
    }
}
