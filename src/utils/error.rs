use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowMapError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data file '{file}' is unavailable: {reason}")]
    DataUnavailable { file: String, reason: String },

    #[error("Data file '{file}' has no column '{column}'")]
    SchemaError { file: String, column: String },

    #[error("No coordinates for {role} country '{code}'")]
    UnknownCoordinate { code: String, role: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code for a run that failed with this severity; never 0.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl FlowMapError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlowMapError::ApiError(_) | FlowMapError::DataUnavailable { .. } => {
                ErrorCategory::Network
            }
            FlowMapError::CsvError(_)
            | FlowMapError::SchemaError { .. }
            | FlowMapError::UnknownCoordinate { .. }
            | FlowMapError::ProcessingError { .. } => ErrorCategory::Data,
            FlowMapError::ConfigError { .. }
            | FlowMapError::ConfigValidationError { .. }
            | FlowMapError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            FlowMapError::IoError(_) | FlowMapError::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            FlowMapError::DataUnavailable { file, .. } => {
                format!("Could not obtain the data file '{}'", file)
            }
            FlowMapError::SchemaError { file, column } => {
                format!("The file '{}' is missing the required column '{}'", file, column)
            }
            FlowMapError::UnknownCoordinate { code, .. } => {
                format!("The country '{}' has no map coordinates", code)
            }
            FlowMapError::ApiError(_) => "The remote data folder could not be reached".to_string(),
            FlowMapError::IoError(_) => "A local file operation failed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            FlowMapError::ApiError(_) | FlowMapError::DataUnavailable { .. } => {
                "Check the base URL and network connection, or place the files in the cache directory"
            }
            FlowMapError::SchemaError { .. } => {
                "Check the [schema] column settings against the file header"
            }
            FlowMapError::UnknownCoordinate { .. } => {
                "Add the country to the routes file or set render.missing_coordinates = \"drop\""
            }
            FlowMapError::CsvError(_) | FlowMapError::ProcessingError { .. } => {
                "Check that the data files are well-formed CSV"
            }
            FlowMapError::ConfigError { .. }
            | FlowMapError::ConfigValidationError { .. }
            | FlowMapError::InvalidConfigValueError { .. } => {
                "Review the command line flags and the TOML configuration"
            }
            FlowMapError::IoError(_) | FlowMapError::SerializationError(_) => {
                "Check permissions and free space for the cache and output directories"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_unavailable_is_network_error() {
        let err = FlowMapError::DataUnavailable {
            file: "nace.csv".to_string(),
            reason: "HTTP 404".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().contains("nace.csv"));
    }

    #[test]
    fn test_schema_error_message_names_column() {
        let err = FlowMapError::SchemaError {
            file: "flows.csv".to_string(),
            column: "obsValue".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.to_string(), "Data file 'flows.csv' has no column 'obsValue'");
    }

    #[test]
    fn test_every_error_exits_with_failure_code() {
        let errors = [
            FlowMapError::DataUnavailable {
                file: "flows.csv".to_string(),
                reason: "timeout".to_string(),
            },
            FlowMapError::InvalidConfigValueError {
                field: "selection.top_n".to_string(),
                value: "0".to_string(),
                reason: "out of range".to_string(),
            },
            FlowMapError::IoError(std::io::Error::other("disk full")),
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.severity().exit_code()).collect();
        assert_eq!(codes, vec![2, 1, 3]);
    }
}
