use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationIssue
// ---------------------------------------------------------------------------

/// Category of a collected validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Schema,
    Reference,
    Validation,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Schema => "schema",
            IssueKind::Reference => "reference",
            IssueKind::Validation => "validation",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem found by the validator. The validator collects every
/// issue rather than stopping at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn schema(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Schema,
            message: message.into(),
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Reference,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Validation,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// BlueprintError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("manifest not found: {0} (run from a project root or pass --root)")]
    ManifestNotFound(PathBuf),

    #[error("parse error at byte {offset}: {message}")]
    Parse { message: String, offset: usize },

    #[error("manifest is invalid ({} issue(s))", .0.len())]
    Invalid(Vec<ValidationIssue>),

    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("unknown environment '{0}': expected dev, staging, or production")]
    UnknownSlot(String),

    #[error("path escapes the project root: {0}")]
    PathEscape(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template {template}: {message}")]
    Template { template: String, message: String },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` exited with code {code}: {stderr}")]
    Subprocess {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("secret error: {0}")]
    Secret(String),

    #[error("missing resource output {resource}.{output} for {slot}")]
    MissingOutput {
        resource: String,
        output: String,
        slot: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Fs(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BlueprintError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BlueprintError::Io {
            path: path.into(),
            source,
        }
    }

    /// Collected validation issues, if this error carries any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            BlueprintError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, BlueprintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_display_includes_kind() {
        let issue = ValidationIssue::reference("bad ref");
        assert_eq!(issue.to_string(), "[reference] bad ref");
    }

    #[test]
    fn invalid_error_counts_issues() {
        let err = BlueprintError::Invalid(vec![
            ValidationIssue::schema("a"),
            ValidationIssue::validation("b"),
        ]);
        assert_eq!(err.to_string(), "manifest is invalid (2 issue(s))");
        assert_eq!(err.issues().len(), 2);
    }
}
