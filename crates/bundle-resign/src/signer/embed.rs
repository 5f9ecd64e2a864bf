//! Access to the executable file format.
//!
//! Locating the code to hash and writing the signature into the binary are
//! specific to the container format. [`SignatureEmbedder`] is the seam
//! behind which that work lives.

use crate::Result;
use std::path::Path;

/// The bytes a code directory hashes, and where executable code ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    /// Everything that precedes the signature, hashed page by page.
    pub code: Vec<u8>,
    /// Size of the executable segment (`__TEXT`).
    pub exec_seg_limit: u64,
}

pub trait SignatureEmbedder: Send + Sync {
    /// Read the region of `executable` the signature must cover.
    ///
    /// An existing signature is not part of the region.
    fn code_region(&self, executable: &Path) -> Result<CodeRegion>;

    /// Replace the signature of `executable` with `signature`.
    fn embed(&self, executable: &Path, signature: &[u8]) -> Result<()>;
}
