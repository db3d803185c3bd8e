use crate::diff::{DiffBackend, DiffError, DiffResult};
use crate::store::types::ContentBlob;

/// Backend for non-text content
///
/// Declares the `BinaryDeltaMeta` result shape but has no algorithm behind
/// it; every call fails with `UnsupportedDiff`.
pub struct BinaryDiff;

impl DiffBackend for BinaryDiff {
    fn diff(&self, old: &ContentBlob, _new: &ContentBlob) -> Result<DiffResult, DiffError> {
        Err(DiffError::UnsupportedDiff(old.mime_type()))
    }
}
