//! Signing configuration shared by a whole re-signing run.

use crate::bundle::{CodeResourcesSealer, ResourceSealer};
use crate::signer::{ExecutableSigner, SignerIdentity};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// The collaborators a run signs with: identity, resource sealer and
/// executable signer.
///
/// # Example
///
/// ```no_run
/// use bundle_resign::signer::{CodeRegion, CodeSignatureSigner, SignatureEmbedder, SignerIdentity};
/// use bundle_resign::{Bundle, BundleKind, Result, SigningContext};
/// use std::path::Path;
///
/// struct Identity;
/// impl SignerIdentity for Identity {
///     fn team_id(&self) -> &str { "ABCDE12345" }
///     fn sign(&self, _cd: &[u8]) -> Result<Vec<u8>> { Ok(Vec::new()) }
/// }
///
/// struct MachO;
/// impl SignatureEmbedder for MachO {
///     fn code_region(&self, _exe: &Path) -> Result<CodeRegion> { unimplemented!() }
///     fn embed(&self, _exe: &Path, _sig: &[u8]) -> Result<()> { unimplemented!() }
/// }
///
/// let ctx = SigningContext::builder(Identity)
///     .signer(CodeSignatureSigner::new(MachO))
///     .build()?;
/// Bundle::open("Payload/Lib.framework", BundleKind::Framework)?.resign(&ctx)?;
/// # Ok::<(), bundle_resign::Error>(())
/// ```
#[derive(Clone)]
pub struct SigningContext {
    identity: Arc<dyn SignerIdentity>,
    sealer: Arc<dyn ResourceSealer>,
    signer: Arc<dyn ExecutableSigner>,
}

impl SigningContext {
    pub fn builder(identity: impl SignerIdentity + 'static) -> SigningContextBuilder {
        SigningContextBuilder::new(Arc::new(identity))
    }

    pub fn identity(&self) -> &dyn SignerIdentity {
        self.identity.as_ref()
    }

    pub fn sealer(&self) -> &dyn ResourceSealer {
        self.sealer.as_ref()
    }

    pub fn signer(&self) -> &dyn ExecutableSigner {
        self.signer.as_ref()
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("team_id", &self.identity.team_id())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SigningContext`].
///
/// The sealer defaults to [`CodeResourcesSealer`]. There is no default
/// executable signer.
pub struct SigningContextBuilder {
    identity: Arc<dyn SignerIdentity>,
    sealer: Option<Arc<dyn ResourceSealer>>,
    signer: Option<Arc<dyn ExecutableSigner>>,
}

impl SigningContextBuilder {
    /// Start from an identity that may already be shared elsewhere.
    pub fn new(identity: Arc<dyn SignerIdentity>) -> Self {
        Self {
            identity,
            sealer: None,
            signer: None,
        }
    }

    pub fn sealer(mut self, sealer: impl ResourceSealer + 'static) -> Self {
        self.sealer = Some(Arc::new(sealer));
        self
    }

    pub fn signer(mut self, signer: impl ExecutableSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Validate and build the context.
    ///
    /// Fails with [`Error::Config`] when no executable signer was set.
    pub fn build(self) -> Result<SigningContext> {
        let signer = self
            .signer
            .ok_or_else(|| Error::Config("no executable signer configured".into()))?;
        let sealer: Arc<dyn ResourceSealer> = match self.sealer {
            Some(sealer) => sealer,
            None => Arc::new(CodeResourcesSealer),
        };

        Ok(SigningContext {
            identity: self.identity,
            sealer,
            signer,
        })
    }
}
