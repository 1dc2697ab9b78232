//! Structured error types for cmdprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Channel;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilingError {
    #[error("Failed to create {channel} output {}: {source}", path.display())]
    CreateOutput {
        channel: Channel,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {channel} output {}: {source}", path.display())]
    WriteOutput {
        channel: Channel,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is already active in this process")]
    AlreadyActive(Channel),

    #[error("Execution tracer cannot attach: another global tracing subscriber is installed")]
    TracerUnavailable,

    #[error("CPU sampler failed: {0}")]
    Sampler(#[from] pprof::Error),

    #[error("Failed to encode execution trace: {0}")]
    TraceEncode(#[from] serde_json::Error),

    #[error("{} channels failed to stop: {}", .0.len(), join_messages(.0))]
    Teardown(Vec<ProfilingError>),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VarError {
    #[error("Reuse of exported var name: {0}")]
    Duplicate(String),

    #[error("Var name {0} is reserved")]
    Reserved(String),
}

impl ProfilingError {
    /// Channel the error belongs to, if it is attributable to exactly one
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::CreateOutput { channel, .. } | Self::WriteOutput { channel, .. } => {
                Some(*channel)
            }
            Self::AlreadyActive(channel) => Some(*channel),
            Self::TracerUnavailable | Self::TraceEncode(_) => Some(Channel::Trace),
            Self::Sampler(_) => Some(Channel::Cpu),
            Self::Teardown(_) => None,
        }
    }

    /// Fold the errors collected while stopping into a single result
    pub(crate) fn collect(mut errors: Vec<ProfilingError>) -> Result<(), ProfilingError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Teardown(errors)),
        }
    }
}

fn join_messages(errors: &[ProfilingError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_output_names_path() {
        let err = ProfilingError::CreateOutput {
            channel: Channel::Cpu,
            path: PathBuf::from("/nonexistent/cpu.out"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert!(msg.contains("CPU profile"));
        assert!(msg.contains("/nonexistent/cpu.out"));
        assert_eq!(err.channel(), Some(Channel::Cpu));
    }

    #[test]
    fn test_already_active_display() {
        let err = ProfilingError::AlreadyActive(Channel::Trace);
        assert_eq!(err.to_string(), "execution trace is already active in this process");
    }

    #[test]
    fn test_var_error_display() {
        let err = VarError::Duplicate("requests".to_string());
        assert_eq!(err.to_string(), "Reuse of exported var name: requests");
    }

    #[test]
    fn test_collect_single_error_is_unwrapped() {
        let result = ProfilingError::collect(vec![ProfilingError::TracerUnavailable]);
        assert!(matches!(result, Err(ProfilingError::TracerUnavailable)));
        assert!(ProfilingError::collect(Vec::new()).is_ok());
    }

    #[test]
    fn test_collect_many_errors_into_teardown() {
        let result = ProfilingError::collect(vec![
            ProfilingError::AlreadyActive(Channel::Cpu),
            ProfilingError::TracerUnavailable,
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("2 channels failed to stop"));
        assert!(err.channel().is_none());
    }
}
