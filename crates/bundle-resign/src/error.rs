//! Error types for bundle re-signing.
//!
//! This module defines the [`enum@Error`] enum covering every fatal failure
//! of a re-signing run. Apart from [`Error::NotNativeBundle`], which only the
//! strict [`crate::Bundle::open`] constructor produces, every variant aborts
//! the run and is propagated unchanged to the caller.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::path::PathBuf;
use thiserror::Error;

/// Error type for bundle re-signing operations.
///
/// There is no rollback: when a run fails part way through, the bundle
/// directory may already be partially rewritten.
///
/// # Examples
///
/// ```no_run
/// use bundle_resign::{Bundle, BundleKind, Error};
///
/// match Bundle::open("Payload/MyApp.app", BundleKind::Generic) {
///     Ok(bundle) => println!("executable: {:?}", bundle.executable_path()),
///     Err(Error::NotNativeBundle { path }) => eprintln!("not an iOS bundle: {}", path.display()),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Occurs when reading directories or files during signing that are not
    /// covered by a more specific variant.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The directory's Info.plist does not declare iOS platform support.
    #[error("not a native iOS bundle: {}", path.display())]
    NotNativeBundle { path: PathBuf },

    /// The bundle's main executable does not exist.
    ///
    /// The name comes from `CFBundleExecutable`, or the bundle directory's
    /// stem when that key is absent.
    #[error("could not find executable {} for bundle {}", executable.display(), bundle.display())]
    ExecutableNotFound { bundle: PathBuf, executable: PathBuf },

    /// A property list could not be read or decoded.
    #[error("failed to read plist {}: {source}", path.display())]
    PlistRead {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    /// A property list could not be encoded or written.
    #[error("failed to write plist {}: {source}", path.display())]
    PlistWrite {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    /// The provisioning profile could not be copied into the app bundle.
    #[error("failed to copy provisioning profile {} to {}: {source}", from.display(), to.display())]
    ProvisioningCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resource sealer, executable signer, or signing identity failed.
    #[error("signing backend failed for {}: {message}", path.display())]
    SignerBackend { path: PathBuf, message: String },

    /// An app bundle was re-signed without a provisioning profile.
    ///
    /// Use [`crate::Bundle::resign_app`] for bundles of kind
    /// [`crate::BundleKind::App`].
    #[error("app bundle {} requires a provisioning profile to be re-signed", path.display())]
    ProvisioningProfileRequired { path: PathBuf },

    /// An app-only operation was requested on a framework or generic bundle.
    #[error("{} is not an app bundle", path.display())]
    NotAnApp { path: PathBuf },

    /// The signing context is incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// An embedded signature blob could not be decoded.
    #[error("malformed code signature: {0}")]
    MalformedSignature(String),
}

impl Error {
    /// Build a [`Error::SignerBackend`] for a failing path.
    pub fn signer(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SignerBackend {
            path: path.into(),
            message: message.into(),
        }
    }
}
