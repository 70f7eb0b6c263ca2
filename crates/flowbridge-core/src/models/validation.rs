use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    MissingId,
    NoTasks,
    DuplicateTaskId,
    InvalidDependency,
    CyclicDependency,
    InvalidOutputTask,
    InvalidVersion,
    TooManyTasks,
    UnsupportedHook,
    IsolatedTask,
    IdentifierFormat,
    UnrepresentableField,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: ValidationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings never block deployment.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, code: ValidationCode, message: impl Into<String>, path: Option<String>) {
        self.errors.push(ValidationError {
            code,
            message: message.into(),
            path,
        });
    }

    pub fn warning(
        &mut self,
        code: ValidationCode,
        message: impl Into<String>,
        path: Option<String>,
    ) {
        self.warnings.push(ValidationWarning {
            code,
            message: message.into(),
            path,
        });
    }

    pub fn has_error(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|error| error.code == code)
    }

    pub fn has_warning(&self, code: ValidationCode) -> bool {
        self.warnings.iter().any(|warning| warning.code == code)
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|error| format!("{:?}: {}", error.code, error.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
