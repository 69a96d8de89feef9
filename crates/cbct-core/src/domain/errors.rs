use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CbctResult<T> = Result<T, CbctError>;

/// Dotted diagnostic codes, grouped by the category they are raised with.
/// No code maps to exit code 4.
pub mod codes {
    // InputValidationError
    pub const INPUT_CLI_USAGE: &str = "INPUT.CLI_USAGE";
    pub const INPUT_CONFIG_PARSE: &str = "INPUT.CONFIG_PARSE";
    pub const INPUT_DELTA_TRANSPORT: &str = "INPUT.DELTA_TRANSPORT";
    pub const INPUT_GEOMETRY: &str = "INPUT.GEOMETRY";
    pub const INPUT_INTERPOLATION_GRID: &str = "INPUT.INTERPOLATION_GRID";
    pub const INPUT_MAX_STACK: &str = "INPUT.MAX_STACK";
    pub const INPUT_MEDIA: &str = "INPUT.MEDIA";
    pub const INPUT_PARALLEL: &str = "INPUT.PARALLEL";
    pub const INPUT_RUN_CONTROL: &str = "INPUT.RUN_CONTROL";
    pub const INPUT_SCORING_PLANE: &str = "INPUT.SCORING_PLANE";
    pub const INPUT_SOURCE: &str = "INPUT.SOURCE";
    pub const INPUT_SPLITTER: &str = "INPUT.SPLITTER";
    pub const INPUT_SPLITTING: &str = "INPUT.SPLITTING";
    /// More intersections along one ray than the walker may hold.
    pub const RUN_INTERSECTION_CEILING: &str = "RUN.INTERSECTION_CEILING";

    // IoSystemError
    pub const IO_CONFIG_READ: &str = "IO.CONFIG_READ";
    pub const IO_CHECKPOINT_READ: &str = "IO.CHECKPOINT_READ";
    pub const IO_CHECKPOINT_WRITE: &str = "IO.CHECKPOINT_WRITE";
    pub const IO_CHECKPOINT_TRAILING: &str = "IO.CHECKPOINT_TRAILING";
    pub const IO_COMBINE: &str = "IO.COMBINE";
    pub const IO_JCF_CREATE: &str = "IO.JCF_CREATE";
    pub const IO_JCF_OPEN: &str = "IO.JCF_OPEN";
    pub const IO_JCF_LOCK: &str = "IO.JCF_LOCK";
    pub const IO_JCF_READ: &str = "IO.JCF_READ";
    pub const IO_JCF_WRITE: &str = "IO.JCF_WRITE";
    pub const IO_OUTPUT_WRITE: &str = "IO.OUTPUT_WRITE";

    // ResourceExhausted
    pub const RUN_STACK_OVERFLOW: &str = "RUN.STACK_OVERFLOW";

    // InternalError
    pub const RUN_JCF_STATE: &str = "RUN.JCF_STATE";
    pub const SYS_CLI: &str = "SYS.CLI";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CbctErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ResourceExhausted,
    InternalError,
}

impl CbctErrorCategory {
    pub const fn exit_mapping(self) -> ExitMapping {
        match self {
            Self::Success => ExitMapping {
                exit_code: 0,
                rust_category: "Success",
                legacy_class: "SUCCESS",
            },
            Self::InputValidationError => ExitMapping {
                exit_code: 2,
                rust_category: "InputValidationError",
                legacy_class: "INPUT_FATAL",
            },
            Self::IoSystemError => ExitMapping {
                exit_code: 3,
                rust_category: "IoSystemError",
                legacy_class: "IO_FATAL",
            },
            Self::ResourceExhausted => ExitMapping {
                exit_code: 5,
                rust_category: "ResourceExhausted",
                legacy_class: "STACK_FATAL",
            },
            Self::InternalError => ExitMapping {
                exit_code: 6,
                rust_category: "InternalError",
                legacy_class: "SYS_FATAL",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_mapping().exit_code
    }

    pub const fn rust_category(self) -> &'static str {
        self.exit_mapping().rust_category
    }

    pub const fn legacy_class(self) -> &'static str {
        self.exit_mapping().legacy_class
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitMapping {
    pub exit_code: i32,
    pub rust_category: &'static str,
    pub legacy_class: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbctError {
    category: CbctErrorCategory,
    code: &'static str,
    message: String,
}

impl CbctError {
    pub fn new(category: CbctErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn input_validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CbctErrorCategory::InputValidationError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CbctErrorCategory::IoSystemError, code, message)
    }

    pub fn resource_exhausted(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CbctErrorCategory::ResourceExhausted, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CbctErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> CbctErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
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
        format!("{}: [{}] {}", severity, self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for CbctError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.rust_category(),
            self.code,
            self.message
        )
    }
}

impl Error for CbctError {}

impl From<crate::serialization::CheckpointError> for CbctError {
    fn from(error: crate::serialization::CheckpointError) -> Self {
        Self::io_system(codes::IO_CHECKPOINT_READ, error.to_string())
    }
}
