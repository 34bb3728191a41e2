//! Process-level error type.
//!
//! Every fatal condition carries an exit code so callers (and scripts wrapping
//! the binary) can distinguish failure classes:
//!
//! - `1` — usage (no subcommand given)
//! - `2` — configuration (missing FRED_API_KEY, unwritable directory)
//! - `3` — cache miss while network access is disabled
//! - `4` — data-quality or numerical failure (empty series, degenerate fit)

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
