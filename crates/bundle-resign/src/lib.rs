//! Re-signing of iOS application bundles.
//!
//! Given an app (or framework) directory that was signed by someone else,
//! this crate rewrites every code signature in it for a new identity: nested
//! frameworks and dylibs first, then the bundle's resource seal, then its
//! main executable. Apps additionally get a new provisioning profile and
//! entitlements for the identity's team.
//!
//! The signing identity and the executable container format are supplied by
//! the caller through [`signer::SignerIdentity`] and
//! [`signer::SignatureEmbedder`]. [`report`] decodes the textual output of
//! signature verifiers, and [`codesign::inspect`] produces that output from
//! an embedded signature.

pub mod bundle;
pub mod codesign;
pub mod context;
pub mod error;
pub mod plist_codec;
pub mod report;
pub mod signer;

pub use bundle::{AppPaths, Bundle, BundleKind, NotABundle, Probe, SealReference};
pub use context::{SigningContext, SigningContextBuilder};
pub use error::Error;
pub use signer::{ExecutableKind, ExecutableSigner, SignerIdentity, SigningRequest};

pub type Result<T> = std::result::Result<T, Error>;
