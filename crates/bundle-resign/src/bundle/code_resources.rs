//! `_CodeSignature/CodeResources` manifest generation.
//!
//! The manifest lists a hash for every resource in the bundle so the
//! signature of the main executable can cover them through special slot -3.

use crate::{Error, Result};
use log::debug;
use plist::{Dictionary, Value};
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory holding the seal, relative to the bundle root.
pub const CODE_SIGNATURE_DIR: &str = "_CodeSignature";

/// Seal manifest location, relative to the bundle root.
pub const CODE_RESOURCES_PATH: &str = "_CodeSignature/CodeResources";

/// Paths left out of `files2` but still hashed into `files`.
const FILES2_OMITTED: &[&str] = &["Info.plist", "PkgInfo"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    File { sha1: [u8; 20], sha256: [u8; 32] },
    Symlink { target: String },
}

/// Resource manifest of one bundle, keyed by bundle-relative path.
#[derive(Debug, Clone, Default)]
pub struct ResourceManifest {
    resources: BTreeMap<String, Resource>,
}

/// A rule dictionary with the given weight and flags.
fn rule(weight: f64, omit: bool, optional: bool) -> Value {
    let mut dict = Dictionary::new();
    if omit {
        dict.insert("omit".to_string(), Value::Boolean(true));
    }
    if optional {
        dict.insert("optional".to_string(), Value::Boolean(true));
    }
    dict.insert("weight".to_string(), Value::Real(weight));
    Value::Dictionary(dict)
}

fn legacy_rules() -> Dictionary {
    let mut rules = Dictionary::new();
    rules.insert("^.*".to_string(), Value::Boolean(true));
    rules.insert("^.*\\.lproj/".to_string(), rule(1000.0, false, true));
    rules.insert("^.*\\.lproj/locversion.plist$".to_string(), rule(1100.0, true, false));
    rules.insert("^Base\\.lproj/".to_string(), rule(1010.0, false, false));
    rules.insert("^version.plist$".to_string(), Value::Boolean(true));
    rules
}

fn rules2() -> Dictionary {
    let mut rules = Dictionary::new();
    rules.insert("^.*".to_string(), Value::Boolean(true));
    rules.insert(".*\\.dSYM($|/)".to_string(), rule(11.0, false, false));
    rules.insert("^(.*/)?\\.DS_Store$".to_string(), rule(2000.0, true, false));
    rules.insert("^.*\\.lproj/".to_string(), rule(1000.0, false, true));
    rules.insert("^.*\\.lproj/locversion.plist$".to_string(), rule(1100.0, true, false));
    rules.insert("^Base\\.lproj/".to_string(), rule(1010.0, false, false));
    rules.insert("^Info\\.plist$".to_string(), rule(20.0, true, false));
    rules.insert("^PkgInfo$".to_string(), rule(20.0, true, false));
    rules.insert("^embedded\\.provisionprofile$".to_string(), rule(20.0, false, false));
    rules.insert("^version\\.plist$".to_string(), rule(20.0, false, false));
    rules
}

/// Bundle-relative path with `/` separators.
fn relative_key(bundle: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bundle).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn is_optional(key: &str) -> bool {
    key.contains(".lproj/")
}

impl ResourceManifest {
    /// Hash every resource under `bundle`, skipping the seal directory and
    /// the main executable (which carries its own signature).
    ///
    /// Any entry that cannot be read fails the scan.
    pub fn scan(bundle: &Path, executable: &Path) -> Result<Self> {
        let excluded = relative_key(bundle, executable);

        let mut entries = Vec::new();
        for entry in WalkDir::new(bundle).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| bundle.to_path_buf());
                Error::signer(path, e.to_string())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(key) = relative_key(bundle, entry.path()) else {
                continue;
            };
            let sealed_dir = key == CODE_SIGNATURE_DIR
                || key.starts_with(&format!("{CODE_SIGNATURE_DIR}/"));
            if sealed_dir || excluded.as_deref() == Some(key.as_str()) {
                continue;
            }
            entries.push((key, entry.path().to_path_buf(), entry.path_is_symlink()));
        }

        let hashed = entries
            .into_par_iter()
            .map(|(key, path, symlink)| {
                let resource = if symlink {
                    Self::hash_symlink(&path)?
                } else {
                    Self::hash_file(&path)?
                };
                Ok((key, resource))
            })
            .collect::<Result<Vec<(String, Resource)>>>()?;

        debug!("hashed {} resources in {}", hashed.len(), bundle.display());

        Ok(Self {
            resources: hashed.into_iter().collect(),
        })
    }

    fn hash_file(path: &Path) -> Result<Resource> {
        let data = fs::read(path).map_err(|e| Error::signer(path, e.to_string()))?;
        Ok(Resource::File {
            sha1: Sha1::digest(&data).into(),
            sha256: Sha256::digest(&data).into(),
        })
    }

    fn hash_symlink(path: &Path) -> Result<Resource> {
        let target: PathBuf = fs::read_link(path).map_err(|e| Error::signer(path, e.to_string()))?;
        Ok(Resource::Symlink {
            target: target.to_string_lossy().into_owned(),
        })
    }

    /// Add a regular file with precomputed hashes.
    pub fn insert_file(&mut self, key: impl Into<String>, sha1: [u8; 20], sha256: [u8; 32]) {
        self.resources.insert(key.into(), Resource::File { sha1, sha256 });
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// The manifest as a property list with `files`, `files2`, `rules` and
    /// `rules2`.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut files = Dictionary::new();
        let mut files2 = Dictionary::new();

        for (key, resource) in &self.resources {
            let optional = is_optional(key);

            // symlinks only exist in the version 2 listing
            if let Resource::File { sha1, .. } = resource {
                let value = if optional {
                    let mut entry = Dictionary::new();
                    entry.insert("hash".to_string(), Value::Data(sha1.to_vec()));
                    entry.insert("optional".to_string(), Value::Boolean(true));
                    Value::Dictionary(entry)
                } else {
                    Value::Data(sha1.to_vec())
                };
                files.insert(key.clone(), value);
            }

            if FILES2_OMITTED.contains(&key.as_str()) || key.ends_with(".DS_Store") {
                continue;
            }

            let mut entry = Dictionary::new();
            match resource {
                Resource::File { sha1, sha256 } => {
                    entry.insert("hash".to_string(), Value::Data(sha1.to_vec()));
                    entry.insert("hash2".to_string(), Value::Data(sha256.to_vec()));
                }
                Resource::Symlink { target } => {
                    entry.insert("symlink".to_string(), Value::String(target.clone()));
                }
            }
            if optional {
                entry.insert("optional".to_string(), Value::Boolean(true));
            }
            files2.insert(key.clone(), Value::Dictionary(entry));
        }

        let mut root = Dictionary::new();
        root.insert("files".to_string(), Value::Dictionary(files));
        root.insert("files2".to_string(), Value::Dictionary(files2));
        root.insert("rules".to_string(), Value::Dictionary(legacy_rules()));
        root.insert("rules2".to_string(), Value::Dictionary(rules2()));
        root
    }
}
