//! Error context for aborted runs.
//!
//! Provider failures are not retried here; the run ends with a single
//! `error` event and the details below are written to the log.

use serde::Serialize;
use tether_providers::ProviderError;
use tracing::error;

/// Error context information for detailed logging
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    /// The operation that was being performed
    pub operation: String,
    pub provider: String,
    pub model: String,
    pub session_id: String,
    /// Turn number (1-based) the failure happened in
    pub turn: u32,
    /// The last user prompt (truncated for logging)
    pub last_prompt: String,
    pub timestamp: String,
}

impl ErrorContext {
    pub fn new(
        operation: &str,
        provider: &str,
        model: &str,
        session_id: &str,
        turn: u32,
        last_prompt: &str,
    ) -> Self {
        Self {
            operation: operation.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            session_id: session_id.to_string(),
            turn,
            last_prompt: truncate_for_logging(last_prompt, 1000),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Log the error context with ERROR level
    pub fn log_error(&self, err: &anyhow::Error) {
        error!("=== TETHER RUN ABORTED ===");
        error!("Operation: {}", self.operation);
        error!("Provider: {} | Model: {}", self.provider, self.model);
        error!("Session: {} | Turn: {}", self.session_id, self.turn);
        error!("Error: {:#}", err);
        error!("Timestamp: {}", self.timestamp);
        error!("Last Prompt: {}", self.last_prompt);
    }
}

/// Broad category of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-success HTTP status
    Status,
    /// Error event reported inside the stream
    Api,
    /// Connection dropped mid-stream
    Interrupted,
    Other,
}

pub fn classify_failure(err: &anyhow::Error) -> FailureKind {
    match err.downcast_ref::<ProviderError>() {
        Some(ProviderError::Status { .. }) => FailureKind::Status,
        Some(ProviderError::Api { .. }) => FailureKind::Api,
        Some(ProviderError::Interrupted(_)) => FailureKind::Interrupted,
        None => FailureKind::Other,
    }
}

/// One-line message for the terminal `error` event.
pub fn user_message(err: &anyhow::Error) -> String {
    match classify_failure(err) {
        FailureKind::Status => format!("Provider request failed: {}", err),
        FailureKind::Api => format!("Provider reported an error: {}", err),
        FailureKind::Interrupted => format!("Provider stream ended unexpectedly: {}", err),
        FailureKind::Other => format!("{:#}", err),
    }
}

/// Truncate a string for logging purposes
pub fn truncate_for_logging(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_provider_errors() {
        let status: anyhow::Error = ProviderError::Status {
            status: 529,
            body: "overloaded".into(),
        }
        .into();
        assert_eq!(classify_failure(&status), FailureKind::Status);
        assert!(user_message(&status).contains("529"));

        let dropped: anyhow::Error = ProviderError::Interrupted("eof".into()).into();
        assert_eq!(classify_failure(&dropped), FailureKind::Interrupted);

        assert_eq!(classify_failure(&anyhow::anyhow!("other")), FailureKind::Other);
    }

    #[test]
    fn test_truncate_for_logging() {
        assert_eq!(truncate_for_logging("short", 10), "short");
        let long = "é".repeat(10);
        let cut = truncate_for_logging(&long, 5);
        assert!(cut.starts_with("éé..."));
        assert!(cut.contains("20 total bytes"));
    }
}
