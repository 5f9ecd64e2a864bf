//! Signable bundles and the recursive re-signing walk.
//!
//! A [`Bundle`] is one directory with an `Info.plist` that declares iOS
//! support and a main executable. Bundles nest: an app carries frameworks
//! and loose dylibs under `Frameworks/`, and each framework is itself a
//! bundle signed on its own before the app that embeds it.
//!
//! # Signing order
//!
//! [`Bundle::sign`] walks the tree depth first:
//!
//! 1. every framework under `Frameworks/`, fully resigned;
//! 2. every `*.dylib` under `Frameworks/`;
//! 3. this bundle's resource seal;
//! 4. this bundle's main executable.
//!
//! The seal hashes the children's files, so it must see them in their final
//! signed state, and the executable's signature binds the seal.
//!
//! # Examples
//!
//! ```no_run
//! use bundle_resign::{Bundle, SigningContext};
//! # fn run(ctx: &SigningContext) -> bundle_resign::Result<()> {
//! let mut app = Bundle::open_app("Payload/MyApp.app")?;
//! app.resign_app(ctx, "profiles/AdHoc.mobileprovision")?;
//! # Ok(())
//! # }
//! ```

pub mod code_resources;
pub mod entitlements;
pub mod seal;
mod signing;

pub use code_resources::ResourceManifest;
pub use seal::{CodeResourcesSealer, ResourceSealer, SealReference};

use crate::signer::ExecutableKind;
use crate::{plist_codec, Error, Result};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

/// Platform name an iOS bundle lists in `CFBundleSupportedPlatforms`.
pub const NATIVE_PLATFORM: &str = "iPhoneOS";

pub const INFO_PLIST: &str = "Info.plist";
pub const ENTITLEMENTS_FILE: &str = "Entitlements.plist";
pub const PROVISION_FILE: &str = "embedded.mobileprovision";

/// Fixed locations an app writes during re-signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub entitlements: PathBuf,
    pub provision: PathBuf,
}

impl AppPaths {
    /// The fixed entitlements and profile locations inside `bundle`.
    pub fn within(bundle: impl AsRef<Path>) -> Self {
        let bundle = bundle.as_ref();
        Self {
            entitlements: bundle.join(ENTITLEMENTS_FILE),
            provision: bundle.join(PROVISION_FILE),
        }
    }
}

/// What kind of bundle a directory is signed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleKind {
    Generic,
    Framework,
    App(AppPaths),
}

impl BundleKind {
    /// Signer variant used for the bundle's main executable.
    pub fn executable_kind(&self) -> ExecutableKind {
        match self {
            BundleKind::Generic => ExecutableKind::Generic,
            BundleKind::Framework => ExecutableKind::Framework,
            BundleKind::App(_) => ExecutableKind::App,
        }
    }
}

/// Why a directory was not taken as a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotABundle {
    MissingInfoPlist,
    UnreadableInfoPlist(String),
    NotNative,
}

/// Outcome of speculatively opening a directory as a bundle.
#[derive(Debug)]
pub enum Probe {
    Bundle(Bundle),
    NotABundle(NotABundle),
}

/// One signable directory.
#[derive(Debug, Clone)]
pub struct Bundle {
    path: PathBuf,
    kind: BundleKind,
    info: Dictionary,
    seal: Option<SealReference>,
}

/// Whether `info` lists the iOS platform among its supported platforms.
pub fn is_native(info: &Dictionary) -> bool {
    info.get("CFBundleSupportedPlatforms")
        .and_then(Value::as_array)
        .is_some_and(|platforms| {
            platforms
                .iter()
                .any(|p| p.as_string() == Some(NATIVE_PLATFORM))
        })
}

impl Bundle {
    /// Open `path` as a bundle of the given kind.
    ///
    /// Fails with [`Error::PlistRead`] when `Info.plist` is missing or
    /// malformed, and with [`Error::NotNativeBundle`] when it does not
    /// declare iOS support.
    pub fn open(path: impl AsRef<Path>, kind: BundleKind) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let info = plist_codec::read_dictionary(path.join(INFO_PLIST))?;
        if !is_native(&info) {
            return Err(Error::NotNativeBundle { path });
        }

        Ok(Self {
            path,
            kind,
            info,
            seal: None,
        })
    }

    /// Open `path` as an app, with its entitlements and profile locations
    /// derived from the path.
    pub fn open_app(path: impl AsRef<Path>) -> Result<Self> {
        let paths = AppPaths::within(&path);
        Self::open(path, BundleKind::App(paths))
    }

    /// Like [`Bundle::open`], but reports a directory that is not a bundle
    /// as a value instead of an error.
    pub fn probe(path: impl AsRef<Path>, kind: BundleKind) -> Probe {
        let path = path.as_ref();
        if !path.join(INFO_PLIST).is_file() {
            return Probe::NotABundle(NotABundle::MissingInfoPlist);
        }

        match Self::open(path, kind) {
            Ok(bundle) => Probe::Bundle(bundle),
            Err(Error::NotNativeBundle { .. }) => Probe::NotABundle(NotABundle::NotNative),
            Err(e) => Probe::NotABundle(NotABundle::UnreadableInfoPlist(e.to_string())),
        }
    }

    /// The bundle directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Which executable signer the main executable goes through.
    pub fn kind(&self) -> &BundleKind {
        &self.kind
    }

    /// Decoded `Info.plist`, as read when the bundle was opened.
    pub fn info(&self) -> &Dictionary {
        &self.info
    }

    pub fn info_plist_path(&self) -> PathBuf {
        self.path.join(INFO_PLIST)
    }

    /// Seal written by the last [`Bundle::sign`], if any.
    pub fn seal(&self) -> Option<&SealReference> {
        self.seal.as_ref()
    }

    fn info_string(&self, key: &str) -> Option<&str> {
        self.info.get(key).and_then(Value::as_string)
    }

    /// Main executable name: `CFBundleExecutable`, else the directory name
    /// without its extension.
    pub fn executable_name(&self) -> String {
        match self.info_string("CFBundleExecutable") {
            Some(name) => name.to_string(),
            None => self
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Resolve the main executable, which must exist.
    pub fn executable_path(&self) -> Result<PathBuf> {
        let executable = self.path.join(self.executable_name());
        if !executable.is_file() {
            return Err(Error::ExecutableNotFound {
                bundle: self.path.clone(),
                executable,
            });
        }
        Ok(executable)
    }

    /// Code signing identifier: `CFBundleIdentifier`, else the executable
    /// name.
    pub fn identifier(&self) -> String {
        self.info_string("CFBundleIdentifier")
            .map(str::to_string)
            .unwrap_or_else(|| self.executable_name())
    }
}
