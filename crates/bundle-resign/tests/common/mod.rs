//! Fixtures shared by the integration tests: bundle trees on disk, a test
//! identity, a trailer-based embedder and recording collaborators.

#![allow(dead_code)]

use bundle_resign::bundle::{CodeResourcesSealer, ResourceSealer, SealReference};
use bundle_resign::codesign::DigestType;
use bundle_resign::signer::{CodeRegion, SignatureEmbedder};
use bundle_resign::{
    plist_codec, Error, ExecutableKind, ExecutableSigner, Result, SignerIdentity, SigningRequest,
};
use plist::{Dictionary, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const TEAM_ID: &str = "ABCDE12345";

/// Identity whose "CMS" is the SHA-256 of the code directory.
pub struct TestIdentity {
    pub team_id: String,
}

impl Default for TestIdentity {
    fn default() -> Self {
        Self {
            team_id: TEAM_ID.to_string(),
        }
    }
}

impl SignerIdentity for TestIdentity {
    fn team_id(&self) -> &str {
        &self.team_id
    }

    fn common_name(&self) -> Option<&str> {
        Some("iPhone Distribution: Example Corp (ABCDE12345)")
    }

    fn sign(&self, code_directory: &[u8]) -> Result<Vec<u8>> {
        Ok(DigestType::Sha256.digest(code_directory))
    }
}

const TRAILER_MAGIC: &[u8; 4] = b"TSIG";

/// Stores signatures at the end of the file: `code | signature | len | TSIG`.
///
/// Re-embedding replaces the previous trailer, so the code region is stable
/// across runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrailerEmbedder;

impl TrailerEmbedder {
    /// Split a file into its code and its trailer signature, if any.
    pub fn split(data: &[u8]) -> (&[u8], Option<&[u8]>) {
        let Some(body) = data.strip_suffix(TRAILER_MAGIC) else {
            return (data, None);
        };
        if body.len() < 4 {
            return (data, None);
        }
        let (rest, len) = body.split_at(body.len() - 4);
        let len = u32::from_be_bytes(len.try_into().unwrap()) as usize;
        if len > rest.len() {
            return (data, None);
        }
        let (code, signature) = rest.split_at(rest.len() - len);
        (code, Some(signature))
    }

    pub fn read_signature(path: &Path) -> Vec<u8> {
        let data = fs::read(path).unwrap();
        let (_, signature) = Self::split(&data);
        signature
            .unwrap_or_else(|| panic!("{} is not signed", path.display()))
            .to_vec()
    }
}

impl SignatureEmbedder for TrailerEmbedder {
    fn code_region(&self, executable: &Path) -> Result<CodeRegion> {
        let data = fs::read(executable)?;
        let (code, _) = Self::split(&data);
        Ok(CodeRegion {
            exec_seg_limit: code.len() as u64,
            code: code.to_vec(),
        })
    }

    fn embed(&self, executable: &Path, signature: &[u8]) -> Result<()> {
        let data = fs::read(executable)?;
        let (code, _) = Self::split(&data);

        let mut out = code.to_vec();
        out.extend_from_slice(signature);
        out.extend_from_slice(&(signature.len() as u32).to_be_bytes());
        out.extend_from_slice(TRAILER_MAGIC);
        fs::write(executable, out)?;
        Ok(())
    }
}

/// What the recording collaborators saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Seal(PathBuf),
    Sign {
        kind: ExecutableKind,
        executable: PathBuf,
        sealed: bool,
    },
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Records every seal, then writes the real manifest.
pub struct RecordingSealer {
    pub log: EventLog,
}

impl ResourceSealer for RecordingSealer {
    fn make_seal(&self, executable: &Path, bundle: &Path) -> Result<SealReference> {
        self.log.lock().unwrap().push(Event::Seal(bundle.to_path_buf()));
        CodeResourcesSealer.make_seal(executable, bundle)
    }
}

/// Records every signing request; optionally fails on one executable.
pub struct RecordingSigner {
    pub log: EventLog,
    pub fail_on: Option<PathBuf>,
}

impl ExecutableSigner for RecordingSigner {
    fn sign(&self, request: &SigningRequest<'_>) -> Result<()> {
        if self.fail_on.as_deref() == Some(request.executable) {
            return Err(Error::signer(request.executable, "backend refused"));
        }
        self.log.lock().unwrap().push(Event::Sign {
            kind: request.kind,
            executable: request.executable.to_path_buf(),
            sealed: request.seal.is_some(),
        });
        Ok(())
    }
}

pub fn write_info(
    dir: &Path,
    executable: Option<&str>,
    identifier: Option<&str>,
    platforms: &[&str],
) {
    let mut info = Dictionary::new();
    info.insert(
        "CFBundleSupportedPlatforms".into(),
        Value::Array(platforms.iter().map(|p| Value::String(p.to_string())).collect()),
    );
    if let Some(name) = executable {
        info.insert("CFBundleExecutable".into(), Value::String(name.into()));
    }
    if let Some(id) = identifier {
        info.insert("CFBundleIdentifier".into(), Value::String(id.into()));
    }
    fs::create_dir_all(dir).unwrap();
    plist_codec::write(&Value::Dictionary(info), dir.join("Info.plist"), true).unwrap();
}

/// Deterministic fake executable contents.
pub fn fake_executable(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 251) as u8)).collect()
}

/// A native bundle at `dir` whose executable is named `executable`.
pub fn make_bundle(dir: &Path, executable: &str, identifier: &str) {
    write_info(dir, Some(executable), Some(identifier), &["iPhoneOS"]);
    fs::write(dir.join(executable), fake_executable(executable.len() as u8, 9000)).unwrap();
}

/// `Demo.app` with one framework, one dylib and a couple of resources.
pub struct SampleApp {
    pub app: PathBuf,
    pub app_executable: PathBuf,
    pub framework: PathBuf,
    pub framework_executable: PathBuf,
    pub dylib: PathBuf,
}

impl SampleApp {
    pub fn create(root: &Path) -> Self {
        let app = root.join("Demo.app");
        make_bundle(&app, "Demo", "com.example.demo");
        fs::create_dir_all(app.join("en.lproj")).unwrap();
        fs::write(app.join("en.lproj/Main.strings"), b"\"hello\" = \"hello\";").unwrap();
        fs::write(app.join("icon.png"), b"png").unwrap();

        let framework = app.join("Frameworks/Lib.framework");
        make_bundle(&framework, "Lib", "com.example.lib");

        let dylib = app.join("Frameworks/libswiftCore.dylib");
        fs::write(&dylib, fake_executable(7, 5000)).unwrap();

        Self {
            app_executable: app.join("Demo"),
            framework_executable: framework.join("Lib"),
            framework,
            dylib,
            app,
        }
    }
}

/// A provisioning profile stand-in.
pub fn write_profile(root: &Path, contents: &[u8]) -> PathBuf {
    let path = root.join("Test.mobileprovision");
    fs::write(&path, contents).unwrap();
    path
}
