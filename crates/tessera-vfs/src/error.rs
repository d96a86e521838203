//! Filesystem error taxonomy.
//!
//! Errors split at the type level into [`FallthroughError`] (another
//! delegate may still serve the request) and everything else (fatal).
//! Every variant has a stable [`code`](FsError::code) so it survives being
//! marshalled across the RPC boundary and rebuilt with
//! [`FsError::from_code`].

use std::fmt::Display;

use thiserror::Error;

/// Errors after which a layered filesystem tries the next delegate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallthroughError {
    /// Nothing exists at the path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path exists but may not be accessed or written.
    #[error("no permission: {0}")]
    NoPermission(String),

    /// The delegate cannot serve the path at all.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Filesystem errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// A recoverable error; see [`FallthroughError`].
    #[error(transparent)]
    Fallthrough(#[from] FallthroughError),

    /// The target already exists.
    #[error("file exists: {0}")]
    FileExists(String),

    /// A file was expected but the path is a directory.
    #[error("file is a directory: {0}")]
    FileIsADirectory(String),

    /// A directory was expected but the path is a file.
    #[error("file is not a directory: {0}")]
    FileNotADirectory(String),

    /// A scheme already has a provider.
    #[error("a provider is already registered for scheme '{0}'")]
    SchemeTaken(String),

    /// The scheme map no longer accepts registrations.
    #[error("filesystem registry already started")]
    RegistryStarted,

    /// Anything else.
    #[error("{0}")]
    Unknown(String),
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// `NotFound` for `path`.
    pub fn not_found(path: impl Display) -> Self {
        FallthroughError::NotFound(path.to_string()).into()
    }

    /// `NoPermission` for `path`.
    pub fn no_permission(path: impl Display) -> Self {
        FallthroughError::NoPermission(path.to_string()).into()
    }

    /// `Unavailable` for `path`.
    pub fn unavailable(path: impl Display) -> Self {
        FallthroughError::Unavailable(path.to_string()).into()
    }

    /// True for errors after which the next delegate is tried.
    #[must_use]
    pub fn is_fallthrough(&self) -> bool {
        matches!(self, Self::Fallthrough(_))
    }

    /// True for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fallthrough(FallthroughError::NotFound(_)))
    }

    /// Stable wire code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fallthrough(FallthroughError::NotFound(_)) => "FileNotFound",
            Self::Fallthrough(FallthroughError::NoPermission(_)) => "NoPermissions",
            Self::Fallthrough(FallthroughError::Unavailable(_)) => "Unavailable",
            Self::FileExists(_) => "FileExists",
            Self::FileIsADirectory(_) => "FileIsADirectory",
            Self::FileNotADirectory(_) => "FileNotADirectory",
            Self::SchemeTaken(_) => "SchemeTaken",
            Self::RegistryStarted => "RegistryStarted",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// The detail carried by the error, without the kind prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Fallthrough(
                FallthroughError::NotFound(d)
                | FallthroughError::NoPermission(d)
                | FallthroughError::Unavailable(d),
            )
            | Self::FileExists(d)
            | Self::FileIsADirectory(d)
            | Self::FileNotADirectory(d)
            | Self::SchemeTaken(d)
            | Self::Unknown(d) => d.clone(),
            Self::RegistryStarted => String::new(),
        }
    }

    /// Rebuild an error from its wire code and detail. Unrecognized codes
    /// become [`FsError::Unknown`].
    #[must_use]
    pub fn from_code(code: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match code {
            "FileNotFound" => FallthroughError::NotFound(detail).into(),
            "NoPermissions" => FallthroughError::NoPermission(detail).into(),
            "Unavailable" => FallthroughError::Unavailable(detail).into(),
            "FileExists" => Self::FileExists(detail),
            "FileIsADirectory" => Self::FileIsADirectory(detail),
            "FileNotADirectory" => Self::FileNotADirectory(detail),
            "SchemeTaken" => Self::SchemeTaken(detail),
            "RegistryStarted" => Self::RegistryStarted,
            _ => Self::Unknown(detail),
        }
    }

    /// Map a host IO error for `path`.
    pub fn from_io(err: &std::io::Error, path: impl Display) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(path),
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => Self::no_permission(path),
            ErrorKind::AlreadyExists => Self::FileExists(path.to_string()),
            ErrorKind::IsADirectory => Self::FileIsADirectory(path.to_string()),
            ErrorKind::NotADirectory => Self::FileNotADirectory(path.to_string()),
            _ => Self::Unknown(format!("{path}: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallthrough_split() {
        assert!(FsError::not_found("/a").is_fallthrough());
        assert!(FsError::no_permission("/a").is_fallthrough());
        assert!(FsError::unavailable("/a").is_fallthrough());
        assert!(!FsError::FileExists("/a".into()).is_fallthrough());
        assert!(!FsError::Unknown("boom".into()).is_fallthrough());
    }

    #[test]
    fn code_round_trip() {
        let errors = [
            FsError::not_found("/a"),
            FsError::no_permission("/a"),
            FsError::unavailable("/a"),
            FsError::FileExists("/a".into()),
            FsError::FileIsADirectory("/a".into()),
            FsError::FileNotADirectory("/a".into()),
            FsError::Unknown("/a".into()),
        ];
        for err in errors {
            assert_eq!(FsError::from_code(err.code(), err.detail()), err);
        }
        assert_eq!(
            FsError::from_code("Bogus", "x"),
            FsError::Unknown("x".into())
        );
    }

    #[test]
    fn io_mapping() {
        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(FsError::from_io(&err, "/x").is_not_found());
        let err = std::io::Error::from(std::io::ErrorKind::AlreadyExists);
        assert_eq!(FsError::from_io(&err, "/x"), FsError::FileExists("/x".into()));
    }
}
