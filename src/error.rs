//! Error types for hewn.
//!
//! Every public mutator returns a tagged [`Result`]; precondition failures
//! leave the mesh untouched. Bulk operators report per-item outcomes instead
//! of failing the whole batch.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// A handle whose generation no longer matches the pool.
    #[error("stale {kind} handle (index {index})")]
    StaleHandle {
        /// The element kind the handle refers to.
        kind: &'static str,
        /// The raw index of the stale handle.
        index: u32,
    },

    /// Fewer than 3 vertices, a repeated vertex, or a would-be non-manifold
    /// face insertion.
    #[error("bad polygon: {0}")]
    BadPolygon(&'static str),

    /// An edit that would place a third face on a full edge, or zip edges
    /// whose endpoints are incompatible.
    #[error("non-manifold result: {0}")]
    NonManifold(&'static str),

    /// Triangulation, plane fit, or texture-basis solve lost rank.
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),

    /// Operator called with an empty element set.
    #[error("empty selection")]
    Empty,

    /// A numeric argument outside its documented domain.
    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// The offending value, formatted.
        value: String,
        /// Description of the accepted domain.
        expected: &'static str,
    },
}

impl MeshError {
    /// Create an out-of-range error from any displayable value.
    pub fn out_of_range<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        expected: &'static str,
    ) -> Self {
        MeshError::OutOfRange {
            name,
            value: value.to_string(),
            expected,
        }
    }
}

/// Outcome of one item inside a bulk operator.
///
/// Bulk operators (`bevel_faces`, `quad_slice_faces`, ...) keep going when a
/// single item fails; the caller gets the per-item picture back.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    /// The item was processed.
    Ok,
    /// The item was skipped with the given error.
    Skipped(MeshError),
}

impl ItemStatus {
    /// True if the item was processed.
    pub fn is_ok(&self) -> bool {
        matches!(self, ItemStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = MeshError::StaleHandle {
            kind: "vertex",
            index: 7,
        };
        assert_eq!(format!("{}", e), "stale vertex handle (index 7)");

        let e = MeshError::out_of_range("distance", -1.0, "must be >= 0");
        assert!(format!("{}", e).contains("distance"));
    }

    #[test]
    fn test_item_status() {
        assert!(ItemStatus::Ok.is_ok());
        assert!(!ItemStatus::Skipped(MeshError::Empty).is_ok());
    }
}
