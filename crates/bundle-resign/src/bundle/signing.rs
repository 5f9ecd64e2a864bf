use super::{entitlements, Bundle, BundleKind, Probe};
use crate::signer::{ExecutableKind, SigningRequest};
use crate::{Error, Result, SigningContext};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory of nested frameworks and dylibs, relative to a bundle.
pub const FRAMEWORKS_DIR: &str = "Frameworks";

const DYLIB_EXTENSION: &str = "dylib";

fn io_at(path: &Path, e: io::Error) -> Error {
    Error::Io(io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

/// Immediate entries of `dir`, sorted by file name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| io_at(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| io_at(dir, e))?;
    entries.sort();
    Ok(entries)
}

fn is_dylib(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == DYLIB_EXTENSION)
}

impl Bundle {
    /// Sign this bundle and everything nested in it, in place.
    ///
    /// Nested frameworks and dylibs are signed first, then the resource seal
    /// is written, then the main executable is signed against it. Entries of
    /// `Frameworks/` that are not iOS bundles are left untouched. The first
    /// failure aborts the walk; files already rewritten stay rewritten.
    pub fn sign(&mut self, ctx: &SigningContext) -> Result<()> {
        info!("signing {}", self.path.display());
        self.seal = None;

        let frameworks = self.path.join(FRAMEWORKS_DIR);
        if frameworks.is_dir() {
            let entries = sorted_entries(&frameworks)?;

            for path in entries.iter().filter(|p| p.is_dir()) {
                match Bundle::probe(path, BundleKind::Framework) {
                    Probe::Bundle(mut framework) => framework.resign(ctx)?,
                    Probe::NotABundle(reason) => {
                        debug!("skipping {}: {reason:?}", path.display());
                    }
                }
            }

            for dylib in entries.iter().filter(|p| is_dylib(p)) {
                debug!("signing dylib {}", dylib.display());
                ctx.signer().sign(&SigningRequest {
                    kind: ExecutableKind::Generic,
                    executable: dylib,
                    owner: self,
                    identity: ctx.identity(),
                    seal: None,
                })?;
            }
        }

        let executable = self.executable_path()?;
        self.seal = Some(ctx.sealer().make_seal(&executable, &self.path)?);

        ctx.signer().sign(&SigningRequest {
            kind: self.kind.executable_kind(),
            executable: &executable,
            owner: self,
            identity: ctx.identity(),
            seal: self.seal.as_ref(),
        })
    }

    /// Re-sign a framework or generic bundle in place.
    ///
    /// Apps need a provisioning profile and go through
    /// [`Bundle::resign_app`] instead.
    pub fn resign(&mut self, ctx: &SigningContext) -> Result<()> {
        if let BundleKind::App(_) = self.kind {
            return Err(Error::ProvisioningProfileRequired {
                path: self.path.clone(),
            });
        }

        self.sign(ctx)?;
        info!("resigned bundle at {}", self.path.display());
        Ok(())
    }

    /// Re-sign an app in place with a new provisioning profile.
    ///
    /// The profile is copied to `embedded.mobileprovision` and
    /// `Entitlements.plist` is regenerated for the identity's team, both
    /// replacing whatever was there, before the bundle is signed.
    pub fn resign_app(&mut self, ctx: &SigningContext, profile: impl AsRef<Path>) -> Result<()> {
        let BundleKind::App(ref paths) = self.kind else {
            return Err(Error::NotAnApp {
                path: self.path.clone(),
            });
        };
        let paths = paths.clone();
        let profile = profile.as_ref();

        fs::copy(profile, &paths.provision).map_err(|source| Error::ProvisioningCopy {
            from: profile.to_path_buf(),
            to: paths.provision.clone(),
            source,
        })?;
        info!("copied provisioning profile to {}", paths.provision.display());

        let team_id = ctx.identity().team_id();
        entitlements::write_for_team(team_id, &paths.entitlements)?;
        info!("wrote entitlements for team {team_id} to {}", paths.entitlements.display());

        self.sign(ctx)?;
        info!("resigned app at {}", self.path.display());
        Ok(())
    }
}
