//! Exit codes for the `bnet` CLI.
//!
//! Codes are stable so scripts can branch on them without parsing output.

use bn_common::Error;

/// Exit codes for bnet operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    /// Configuration or model construction error
    ConfigError = 10,

    /// Name did not resolve to a node or data column
    LookupError = 20,

    /// Evidence or inference failure
    InferenceError = 30,

    /// I/O or (de)serialization error
    IoError = 60,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::LookupError,
            30..=39 => ExitCode::InferenceError,
            60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}
