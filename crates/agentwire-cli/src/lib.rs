//! agentwire command line tool.
//!
//! Wraps the envelope service and mediator relay around key files and JSON
//! files so envelopes can be produced and inspected from a shell.

pub mod cli;
pub mod keyfile;

pub use cli::Cli;

use agentwire_core::EnvelopeError;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Encryption or decryption failed
    CryptoFailed = 2,
    /// Bad keys, config or input files
    InvalidInput = 3,
}

impl ExitCode {
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Pick the exit code for an error returned by a command.
    pub fn for_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<EnvelopeError>() {
            return match e {
                EnvelopeError::CryptoOperation { .. } => ExitCode::CryptoFailed,
                EnvelopeError::Configuration(_)
                | EnvelopeError::MalformedMessage(_)
                | EnvelopeError::UnsupportedOperation(_) => ExitCode::InvalidInput,
                EnvelopeError::Serialization(_) => ExitCode::GeneralError,
            };
        }
        if err.downcast_ref::<keyfile::KeyFileError>().is_some()
            || err.downcast_ref::<agentwire_core::config::ConfigError>().is_some()
        {
            return ExitCode::InvalidInput;
        }
        ExitCode::GeneralError
    }
}
