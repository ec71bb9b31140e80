//! Extraction engine: walks a connected station share and copies the
//! matching files into a fresh folder per target.
//!
//! The walk uses walkdir and the match pass runs on rayon; copying is
//! sequential so progress arrives in order.

mod engine;
mod filter;
mod progress;

pub use engine::{destination_folder_name, ExtractOptions, ExtractionJob, Extractor, FileError};
pub use filter::ExtractionFilter;
pub use progress::ExtractProgress;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop an extraction before any file is copied.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The filter selects no file types
    #[error("no file types selected")]
    NoFileTypesSelected,

    /// The session isn't open
    #[error("session to {address} is not connected")]
    NotConnected {
        /// Address of the target
        address: String,
    },

    /// The destination folder could not be created
    #[error("cannot create destination {path}: {source}")]
    Destination {
        /// The folder that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ExtractError::NoFileTypesSelected.to_string(), "no file types selected");

        let err = ExtractError::NotConnected {
            address: "10.0.0.5".to_string(),
        };
        assert_eq!(err.to_string(), "session to 10.0.0.5 is not connected");
    }

    #[test]
    fn test_destination_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExtractError::Destination {
            path: PathBuf::from("/out/Station-h"),
            source: io_err,
        };

        assert!(err.to_string().contains("/out/Station-h"));
        assert!(err.to_string().contains("denied"));
    }
}
