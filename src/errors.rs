//! This module defines the error types used by the merge tool using `thiserror`.

use pest::error::Error as PestError;
use std::io;
use thiserror::Error;

use crate::map::{ObjectId, VmfClass};

/// Represents an error that occurred while loading, inspecting, or mutating a VMF.
#[derive(Error, Debug)]
pub enum VmfError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A parsing error occurred during the Pest parsing phase.
    #[error("VDF parse error: {0}")]
    Parse(#[from] Box<PestError<crate::vdf::Rule>>),

    /// The file is not a usable VMF: wrong extension, unparseable, or
    /// missing its `world` entry.
    #[error("{path}: invalid VMF: {reason}")]
    InvalidMap { path: String, reason: String },

    /// A lookup for an object that is not present in the map. Indicates a
    /// malformed delta list or a logic error upstream.
    #[error("object with class '{class}' and id {id} does not exist")]
    ObjectDoesNotExist { class: VmfClass, id: ObjectId },

    /// A nested property path was accessed through a segment that is not an
    /// object.
    #[error("no value at property path '{0}'")]
    Key(String),

    /// The VDF structure or content is invalid or unexpected.
    #[error("Invalid VDF format: {0}")]
    InvalidFormat(String),
}

/// A type alias for `Result` that uses `VmfError` as the error type.
pub type VmfResult<T> = Result<T, VmfError>;

impl VmfError {
    pub(crate) fn invalid_map(path: Option<&std::path::Path>, reason: impl Into<String>) -> Self {
        VmfError::InvalidMap {
            path: path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(no path)".to_string()),
            reason: reason.into(),
        }
    }

    pub(crate) fn no_object(class: VmfClass, id: ObjectId) -> Self {
        VmfError::ObjectDoesNotExist { class, id }
    }
}
