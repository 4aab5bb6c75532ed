use std::fmt;

/// Errors that can occur during blob storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The namespace for the todo already exists.
    NamespaceExists(i64),
    /// The namespace for the todo does not exist.
    NamespaceNotFound(i64),
    /// A blob with this key is already stored for the todo.
    AlreadyExists { todo_id: i64, key: String },
    /// The requested blob was not found.
    NotFound { todo_id: i64, key: String },
    /// The provided storage key is not a valid token.
    InvalidKey(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The operation was cancelled before it completed.
    Cancelled,
    /// A failure injected by a test double.
    Injected(&'static str),
    /// A batch write failed and some of its moves could not be reverted.
    ///
    /// The listed keys may still resolve to final files that no metadata row
    /// references.
    Inconsistent {
        todo_id: i64,
        source: Box<StorageError>,
        unreverted: Vec<String>,
    },
    /// Removing a namespace failed after it had started; some of its blobs
    /// may already be gone.
    PartialRemoval {
        todo_id: i64,
        source: std::io::Error,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamespaceExists(todo_id) => {
                write!(f, "storage namespace already exists for todo {todo_id}")
            }
            Self::NamespaceNotFound(todo_id) => {
                write!(f, "storage namespace does not exist for todo {todo_id}")
            }
            Self::AlreadyExists { todo_id, key } => {
                write!(f, "blob {key} already exists for todo {todo_id}")
            }
            Self::NotFound { todo_id, key } => {
                write!(f, "blob {key} not found for todo {todo_id}")
            }
            Self::InvalidKey(msg) => write!(f, "invalid storage key: {msg}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::Cancelled => write!(f, "storage operation cancelled"),
            Self::Injected(op) => write!(f, "injected storage failure on {op}"),
            Self::Inconsistent {
                todo_id,
                source,
                unreverted,
            } => write!(
                f,
                "batch write for todo {todo_id} failed ({source}) and could not revert {}",
                unreverted.join(", ")
            ),
            Self::PartialRemoval { todo_id, source } => {
                write!(f, "namespace of todo {todo_id} may be partially removed: {source}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Inconsistent { source, .. } => Some(source.as_ref()),
            Self::PartialRemoval { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
