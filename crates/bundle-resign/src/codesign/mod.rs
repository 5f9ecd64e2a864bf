//! Embedded code signature blobs: building them for the signer and reading
//! them back for inspection.

pub mod code_directory;
pub mod constants;
pub mod der;
pub mod inspect;
pub mod requirements;
pub mod superblob;

pub use code_directory::{CodeDirectoryBuilder, DigestType};
pub use inspect::{CodeDirectory, EmbeddedSignature, SealSummary};
pub use requirements::DesignatedRequirement;
pub use superblob::SuperBlobBuilder;
