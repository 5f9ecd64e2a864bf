//! Executable signing seam.
//!
//! The orchestrator never touches signature bytes itself. It hands each
//! executable to an [`ExecutableSigner`] together with the bundle that owns
//! it, the [`SignerIdentity`] and, for a bundle's main executable, the seal
//! computed just before.

pub mod code_signature;
pub mod embed;

pub use code_signature::CodeSignatureSigner;
pub use embed::{CodeRegion, SignatureEmbedder};

use crate::bundle::{Bundle, SealReference};
use crate::Result;
use std::path::Path;

/// Key and certificate material of the signer.
///
/// Shared read-only by every bundle of a run.
pub trait SignerIdentity: Send + Sync {
    /// Team identifier written into code directories and entitlements.
    fn team_id(&self) -> &str;

    /// Subject common name of the signing certificate, pinned by the
    /// designated requirement when present.
    fn common_name(&self) -> Option<&str> {
        None
    }

    /// Produce the CMS signature over a serialized code directory.
    fn sign(&self, code_directory: &[u8]) -> Result<Vec<u8>>;
}

/// Signer variant, selected by the kind of the owning bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableKind {
    /// A loose dylib, or the executable of a generic bundle.
    Generic,
    Framework,
    /// Main executable of an app; carries entitlements.
    App,
}

/// Everything a signer needs for one executable.
#[derive(Clone, Copy)]
pub struct SigningRequest<'a> {
    pub kind: ExecutableKind,
    pub executable: &'a Path,
    pub owner: &'a Bundle,
    pub identity: &'a dyn SignerIdentity,
    /// Seal of `owner`; only a bundle's main executable binds it.
    pub seal: Option<&'a SealReference>,
}

impl std::fmt::Debug for SigningRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningRequest")
            .field("kind", &self.kind)
            .field("executable", &self.executable)
            .field("owner", &self.owner.path())
            .field("team_id", &self.identity.team_id())
            .field("seal", &self.seal)
            .finish()
    }
}

/// Embeds a new code signature into an executable, in place.
pub trait ExecutableSigner: Send + Sync {
    fn sign(&self, request: &SigningRequest<'_>) -> Result<()>;
}
