use std::fmt;

/// Errors surfaced by the B+ tree's public operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Raised by construction when the requested degree is too small to
    /// support a well-formed node (degree must be at least 3).
    DegreeTooSmall(usize),
    /// Raised by `insert` when the key already appears somewhere in the
    /// tree, either as a leaf key or as an internal separator.
    KeyConflict(String),
    /// An invariant was violated mid-algorithm. Fatal: the tree must not
    /// be used again once this is observed.
    StructuralError(String),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::DegreeTooSmall(d) => {
                write!(f, "degree {} is too small; minimum degree is 3", d)
            }
            TreeError::KeyConflict(k) => write!(f, "key conflict: {}", k),
            TreeError::StructuralError(msg) => write!(f, "structural invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for TreeError {}
