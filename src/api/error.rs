//! SCORM 1.2 error records and the standard code table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SCORM 1.2 error codes, as strings per the runtime convention.
pub mod codes {
    /// No error.
    pub const NO_ERROR: &str = "0";
    /// General exception.
    pub const GENERAL_EXCEPTION: &str = "101";
    /// Invalid argument error.
    pub const INVALID_ARGUMENT: &str = "201";
    /// Element cannot have children.
    pub const NO_CHILDREN: &str = "202";
    /// Element not an array, cannot have count.
    pub const NO_COUNT: &str = "203";
    /// Not initialized.
    pub const NOT_INITIALIZED: &str = "301";
    /// Not implemented error.
    pub const NOT_IMPLEMENTED: &str = "401";
    /// Invalid set value, element is a keyword.
    pub const KEYWORD_SET: &str = "402";
    /// Element is read only.
    pub const READ_ONLY: &str = "403";
    /// Element is write only.
    pub const WRITE_ONLY: &str = "404";
    /// Incorrect data type.
    pub const INCORRECT_TYPE: &str = "405";

    /// Standard text for a code, empty for anything unknown.
    pub fn describe(code: &str) -> &'static str {
        match code {
            NO_ERROR => "No error",
            GENERAL_EXCEPTION => "General exception",
            INVALID_ARGUMENT => "Invalid argument error",
            NO_CHILDREN => "Element cannot have children",
            NO_COUNT => "Element not an array - cannot have count",
            NOT_INITIALIZED => "Not initialized",
            NOT_IMPLEMENTED => "Not implemented error",
            KEYWORD_SET => "Invalid set value, element is a keyword",
            READ_ONLY => "Element is read only",
            WRITE_ONLY => "Element is write only",
            INCORRECT_TYPE => "Incorrect data type",
            _ => "",
        }
    }
}

/// The `{code, string, diagnostic}` triple assembled from
/// `LMSGetLastError` / `LMSGetErrorString` / `LMSGetDiagnostic`, and pushed
/// downward inside `ErrorHandler` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Numeric error code as a string.
    pub code: String,
    /// Standard text for the code.
    pub string: String,
    /// Vendor diagnostic text.
    pub diagnostic: String,
}

impl ErrorRecord {
    /// The "nothing wrong" sentinel returned by healthy paths.
    pub fn no_error() -> Self {
        Self {
            code: codes::NO_ERROR.to_owned(),
            string: "No Error".to_owned(),
            diagnostic: "No Error".to_owned(),
        }
    }

    /// The sentinel used when no API adapter could be located at all.
    pub fn general_exception() -> Self {
        Self {
            code: codes::GENERAL_EXCEPTION.to_owned(),
            string: "General Exception".to_owned(),
            diagnostic: "General Exception".to_owned(),
        }
    }

    /// True for any code other than `"0"`.
    pub fn is_error(&self) -> bool {
        self.code != codes::NO_ERROR
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.string)?;
        if !self.diagnostic.is_empty() && self.diagnostic != self.string {
            write!(f, " ({})", self.diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_values() {
        let ok = ErrorRecord::no_error();
        assert_eq!(ok.code, "0");
        assert_eq!(ok.string, "No Error");
        assert!(!ok.is_error());

        let boom = ErrorRecord::general_exception();
        assert_eq!(boom.code, "101");
        assert_eq!(boom.diagnostic, "General Exception");
        assert!(boom.is_error());
    }

    #[test]
    fn test_code_table() {
        assert_eq!(codes::describe("301"), "Not initialized");
        assert_eq!(codes::describe("402"), "Invalid set value, element is a keyword");
        assert_eq!(codes::describe("999"), "");
    }

    #[test]
    fn test_record_round_trips_with_wire_field_names() {
        let record = ErrorRecord {
            code: "201".to_owned(),
            string: "Invalid argument error".to_owned(),
            diagnostic: "bad element".to_owned(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""code":"201""#));
        assert!(json.contains(r#""string":"Invalid argument error""#));
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_display_folds_duplicate_diagnostic() {
        assert_eq!(
            ErrorRecord::general_exception().to_string(),
            "101 General Exception"
        );
        let with_diag = ErrorRecord {
            code: "201".to_owned(),
            string: "Invalid argument error".to_owned(),
            diagnostic: "unknown element cmi.bogus".to_owned(),
        };
        assert_eq!(
            with_diag.to_string(),
            "201 Invalid argument error (unknown element cmi.bogus)"
        );
    }
}
