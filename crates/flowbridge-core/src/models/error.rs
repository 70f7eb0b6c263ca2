use crate::models::{AdapterOperation, BackendKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    Validation,
    InvalidVersion,
    DuplicateVersion,
    NotFound,
    UnsupportedCapability,
    Connection,
    Execution,
    Migration,
    Timeout,
    Cancelled,
    StorageFailure,
    Internal,
}

impl CoreErrorKind {
    /// Only transport-level faults are worth another attempt; everything else
    /// fails the same way on every call.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub backend: Option<BackendKind>,
    pub workflow: Option<String>,
    pub operation: Option<AdapterOperation>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend: None,
            workflow: None,
            operation: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    pub fn with_operation(mut self, operation: AdapterOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Fills in attribution that the error does not carry yet.
    pub fn attribute(
        self,
        backend: BackendKind,
        workflow: Option<&str>,
        operation: AdapterOperation,
    ) -> Self {
        Self {
            backend: self.backend.or(Some(backend)),
            workflow: self.workflow.or_else(|| workflow.map(str::to_string)),
            operation: self.operation.or(Some(operation)),
            kind: self.kind,
            message: self.message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_keeps_existing_fields() {
        let error = CoreError::new(CoreErrorKind::Connection, "refused")
            .with_backend(BackendKind::JobQueue)
            .attribute(
                BackendKind::DurableWorkflow,
                Some("ingest@1.0.0"),
                AdapterOperation::Execute,
            );

        assert_eq!(error.backend, Some(BackendKind::JobQueue));
        assert_eq!(error.workflow.as_deref(), Some("ingest@1.0.0"));
        assert_eq!(error.operation, Some(AdapterOperation::Execute));
        assert_eq!(error.to_string(), "Connection: refused");
    }

    #[test]
    fn only_transport_faults_are_retryable() {
        assert!(CoreErrorKind::Connection.is_retryable());
        assert!(CoreErrorKind::Timeout.is_retryable());
        assert!(!CoreErrorKind::Validation.is_retryable());
        assert!(!CoreErrorKind::DuplicateVersion.is_retryable());
        assert!(!CoreErrorKind::Execution.is_retryable());
    }
}
