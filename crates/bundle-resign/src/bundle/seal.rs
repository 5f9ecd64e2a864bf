//! Resource sealing.

use super::code_resources::{ResourceManifest, CODE_RESOURCES_PATH};
use crate::{plist_codec, Error, Result};
use log::info;
use plist::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a bundle's resource seal was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealReference {
    /// Location of the seal manifest.
    pub path: PathBuf,
    /// Number of resources covered by the seal.
    pub file_count: usize,
}

/// Produces the resource seal of a bundle.
///
/// Implementations must leave the bundle's main executable out of the seal,
/// since the executable is signed after the seal is computed.
pub trait ResourceSealer: Send + Sync {
    fn make_seal(&self, executable: &Path, bundle: &Path) -> Result<SealReference>;
}

/// Writes `_CodeSignature/CodeResources` from a fresh scan of the bundle.
///
/// The manifest is rebuilt from scratch on every call, so resigning a bundle
/// never carries entries over from an earlier run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeResourcesSealer;

impl ResourceSealer for CodeResourcesSealer {
    fn make_seal(&self, executable: &Path, bundle: &Path) -> Result<SealReference> {
        let manifest = ResourceManifest::scan(bundle, executable)?;
        let path = bundle.join(CODE_RESOURCES_PATH);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::signer(dir, e.to_string()))?;
        }
        plist_codec::write(&Value::Dictionary(manifest.to_dictionary()), &path, false)
            .map_err(|e| Error::signer(&path, e.to_string()))?;

        info!("sealed {} resources of {}", manifest.len(), bundle.display());

        Ok(SealReference {
            path,
            file_count: manifest.len(),
        })
    }
}
