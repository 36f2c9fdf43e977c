use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type SimbatchResult<T> = Result<T, SimbatchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

pub const UNKNOWN_CATEGORY: &str = "INPUT.UNKNOWN_CATEGORY";
pub const PATH_COLLISION: &str = "IO.PATH_COLLISION";
pub const EXTERNAL_TOOL_FAILURE: &str = "RUN.EXTERNAL_TOOL";
pub const MISSING_UPSTREAM_ARTIFACT: &str = "IO.MISSING_UPSTREAM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimbatchError {
    category: ErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl SimbatchError {
    pub fn new(
        category: ErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InputValidationError, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InternalError, placeholder, message)
    }

    pub fn unknown_category(kind: &str, key: &str, accepted: &[&str]) -> Self {
        Self::input_validation(
            UNKNOWN_CATEGORY,
            format!(
                "unknown {} '{}'; expected one of: {}",
                kind,
                key,
                accepted.join(", ")
            ),
        )
    }

    pub fn path_collision(path: &Path, reason: impl Display) -> Self {
        Self::io_system(
            PATH_COLLISION,
            format!("refusing to reset '{}': {}", path.display(), reason),
        )
    }

    pub fn external_tool_failure(stage: impl Display, command_line: &str, exit: Option<i32>) -> Self {
        let status = exit.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit code {}", code),
        );
        Self::computation(
            EXTERNAL_TOOL_FAILURE,
            format!("stage {} failed with {}: {}", stage, status, command_line),
        )
    }

    pub fn missing_upstream_artifact(stage: impl Display, path: &Path) -> Self {
        Self::io_system(
            MISSING_UPSTREAM_ARTIFACT,
            format!(
                "stage {} cannot start: input artifact '{}' does not exist",
                stage,
                path.display()
            ),
        )
    }

    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for SimbatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for SimbatchError {}
