//! Default executable signer: builds an embedded signature SuperBlob.

use super::embed::{CodeRegion, SignatureEmbedder};
use super::{ExecutableKind, ExecutableSigner, SigningRequest};
use crate::bundle::{entitlements, BundleKind};
use crate::codesign::constants::*;
use crate::codesign::der::entitlements_to_der;
use crate::codesign::superblob::{
    build_der_entitlements_blob, build_entitlements_blob, build_signature_blob,
};
use crate::codesign::{CodeDirectoryBuilder, DesignatedRequirement, DigestType, SuperBlobBuilder};
use crate::{plist_codec, Error, Result};
use log::debug;
use plist::Value;
use std::fs;
use std::path::Path;

/// Entitlements blobs bound by an app executable.
struct EntitlementBlobs {
    xml: Vec<u8>,
    der: Vec<u8>,
    allow_debugging: bool,
}

/// Signs executables with a SHA-1 and a SHA-256 code directory, a
/// designated requirement and, for apps, the owner's entitlements.
///
/// The container format is handled by `E`.
#[derive(Debug, Clone, Default)]
pub struct CodeSignatureSigner<E> {
    embedder: E,
}

impl<E: SignatureEmbedder> CodeSignatureSigner<E> {
    pub fn new(embedder: E) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Build the SuperBlob for `request` over `region`, without embedding it.
    pub fn build_signature(
        &self,
        request: &SigningRequest<'_>,
        region: &CodeRegion,
    ) -> Result<Vec<u8>> {
        let identifier = signing_identifier(request);
        let mut requirement = DesignatedRequirement::new(&identifier);
        if let Some(cn) = request.identity.common_name() {
            requirement = requirement.leaf_common_name(cn);
        }
        let requirements = requirement.to_requirements_blob();

        let info_path = request.owner.info_plist_path();
        let info = fs::read(&info_path).map_err(|e| Error::signer(&info_path, e.to_string()))?;

        let mut builder = CodeDirectoryBuilder::new(identifier, &region.code)
            .exec_seg_limit(region.exec_seg_limit)
            .special_slot(CSSLOT_SPECIAL_INFOSLOT, info)
            .special_slot(CSSLOT_SPECIAL_REQUIREMENTS, requirements.clone());

        let team_id = request.identity.team_id();
        if !team_id.is_empty() {
            builder = builder.team_id(team_id);
        }

        if let Some(seal) = request.seal {
            let manifest =
                fs::read(&seal.path).map_err(|e| Error::signer(&seal.path, e.to_string()))?;
            builder = builder.special_slot(CSSLOT_SPECIAL_RESOURCEDIR, manifest);
        }

        let entitlement_blobs = match request.kind {
            ExecutableKind::App => Some(app_entitlements(request)?),
            ExecutableKind::Generic | ExecutableKind::Framework => None,
        };
        if let Some(ref blobs) = entitlement_blobs {
            let mut exec_seg_flags = CS_EXECSEG_MAIN_BINARY;
            if blobs.allow_debugging {
                exec_seg_flags |= CS_EXECSEG_ALLOW_UNSIGNED;
            }
            builder = builder
                .exec_seg_flags(exec_seg_flags)
                .special_slot(CSSLOT_SPECIAL_ENTITLEMENTS, blobs.xml.clone())
                .special_slot(CSSLOT_SPECIAL_DER_ENTITLEMENTS, blobs.der.clone());
        }

        let cd_sha1 = builder.build(DigestType::Sha1);
        let cd_sha256 = builder.build(DigestType::Sha256);
        let cms = request.identity.sign(&cd_sha256)?;

        let mut superblob = SuperBlobBuilder::new()
            .code_directory_sha1(cd_sha1)
            .code_directory_sha256(cd_sha256)
            .requirements(requirements)
            .cms_signature(build_signature_blob(&cms));
        if let Some(blobs) = entitlement_blobs {
            superblob = superblob.entitlements(blobs.xml).der_entitlements(blobs.der);
        }

        Ok(superblob.build())
    }
}

impl<E: SignatureEmbedder> ExecutableSigner for CodeSignatureSigner<E> {
    fn sign(&self, request: &SigningRequest<'_>) -> Result<()> {
        let region = self.embedder.code_region(request.executable)?;
        let signature = self.build_signature(request, &region)?;

        debug!(
            "embedding {} byte signature into {} ({:?})",
            signature.len(),
            request.executable.display(),
            request.kind
        );
        self.embedder.embed(request.executable, &signature)
    }
}

/// The owner's identifier for its main executable, the file stem for
/// anything else it carries.
fn signing_identifier(request: &SigningRequest<'_>) -> String {
    match request.owner.executable_path() {
        Ok(main) if main == request.executable => request.owner.identifier(),
        _ => file_stem(request.executable),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn app_entitlements(request: &SigningRequest<'_>) -> Result<EntitlementBlobs> {
    let BundleKind::App(paths) = request.owner.kind() else {
        return Err(Error::signer(
            request.executable,
            "app executable is not owned by an app bundle",
        ));
    };

    let path = &paths.entitlements;
    let dict = plist_codec::read_dictionary(path).map_err(|e| Error::signer(path, e.to_string()))?;
    let allow_debugging = entitlements::allows_debugging(&dict);
    let value = Value::Dictionary(dict);

    let xml = plist_codec::to_xml_bytes(&value).map_err(|e| Error::signer(path, e.to_string()))?;
    let der = entitlements_to_der(&value).map_err(|message| Error::signer(path, message))?;

    Ok(EntitlementBlobs {
        xml: build_entitlements_blob(&xml),
        der: build_der_entitlements_blob(&der),
        allow_debugging,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{AppPaths, Bundle, SealReference};
    use crate::codesign::EmbeddedSignature;
    use crate::signer::SignerIdentity;
    use plist::Dictionary;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    struct TestIdentity;

    impl SignerIdentity for TestIdentity {
        fn team_id(&self) -> &str {
            "ABCDE12345"
        }

        fn common_name(&self) -> Option<&str> {
            Some("iPhone Developer: Test (ABCDE12345)")
        }

        fn sign(&self, code_directory: &[u8]) -> Result<Vec<u8>> {
            Ok(DigestType::Sha256.digest(code_directory))
        }
    }

    /// Hashes the whole file and keeps the signature in memory.
    #[derive(Default)]
    struct MemoryEmbedder {
        embedded: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    impl SignatureEmbedder for MemoryEmbedder {
        fn code_region(&self, executable: &Path) -> Result<CodeRegion> {
            let code = fs::read(executable)?;
            Ok(CodeRegion {
                exec_seg_limit: code.len() as u64,
                code,
            })
        }

        fn embed(&self, executable: &Path, signature: &[u8]) -> Result<()> {
            self.embedded
                .lock()
                .unwrap()
                .push((executable.to_path_buf(), signature.to_vec()));
            Ok(())
        }
    }

    fn make_bundle(kind_app: bool) -> (TempDir, Bundle) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Demo.app");
        fs::create_dir(&path).unwrap();

        let mut info = Dictionary::new();
        info.insert(
            "CFBundleSupportedPlatforms".into(),
            Value::Array(vec![Value::String("iPhoneOS".into())]),
        );
        info.insert("CFBundleIdentifier".into(), Value::String("com.example.demo".into()));
        plist_codec::write(&Value::Dictionary(info), path.join("Info.plist"), false).unwrap();
        fs::write(path.join("Demo"), vec![0x42; 9000]).unwrap();
        fs::write(path.join("libExtra.dylib"), vec![0x24; 100]).unwrap();

        let bundle = if kind_app {
            let entitlements_path = path.join("Entitlements.plist");
            entitlements::write_for_team("ABCDE12345", &entitlements_path).unwrap();
            Bundle::open(&path, BundleKind::App(AppPaths::within(&path))).unwrap()
        } else {
            Bundle::open(&path, BundleKind::Framework).unwrap()
        };
        (dir, bundle)
    }

    fn sign(
        bundle: &Bundle,
        kind: ExecutableKind,
        executable: &Path,
        seal: Option<&SealReference>,
    ) -> EmbeddedSignature {
        let signer = CodeSignatureSigner::new(MemoryEmbedder::default());
        signer
            .sign(&SigningRequest {
                kind,
                executable,
                owner: bundle,
                identity: &TestIdentity,
                seal,
            })
            .unwrap();

        let embedded = signer.embedder().embedded.lock().unwrap();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].0, executable);
        EmbeddedSignature::parse(&embedded[0].1).unwrap()
    }

    #[test]
    fn test_app_executable_binds_everything() {
        let (_dir, bundle) = make_bundle(true);
        let seal_path = bundle.path().join("CodeResources");
        fs::write(&seal_path, b"<plist/>").unwrap();
        let seal = SealReference {
            path: seal_path,
            file_count: 1,
        };

        let executable = bundle.executable_path().unwrap();
        let signature = sign(&bundle, ExecutableKind::App, &executable, Some(&seal));
        let cd = signature.primary();

        assert_eq!(cd.identifier, "com.example.demo");
        assert_eq!(cd.team_id.as_deref(), Some("ABCDE12345"));
        assert_eq!(cd.special_slot_count(), 7);
        for slot in [
            CSSLOT_SPECIAL_INFOSLOT,
            CSSLOT_SPECIAL_REQUIREMENTS,
            CSSLOT_SPECIAL_RESOURCEDIR,
            CSSLOT_SPECIAL_ENTITLEMENTS,
            CSSLOT_SPECIAL_DER_ENTITLEMENTS,
        ] {
            assert!(cd.has_special_slot(slot), "slot {slot} empty");
        }
        assert!(!cd.has_special_slot(CSSLOT_SPECIAL_APPLICATION));
        assert_eq!(cd.exec_seg_flags, CS_EXECSEG_MAIN_BINARY | CS_EXECSEG_ALLOW_UNSIGNED);
        assert_eq!(cd.code_slots().len(), 3);

        let entitlements = signature.entitlements().unwrap().unwrap();
        assert_eq!(
            entitlements.as_dictionary().unwrap(),
            &entitlements::for_team("ABCDE12345")
        );
        assert!(signature.der_entitlements().is_some());
        assert_eq!(
            signature.cms_signature(),
            Some(&DigestType::Sha256.digest(signature.primary().raw())[..])
        );
        assert_eq!(
            signature.designated_requirement().unwrap().leaf_common_name.as_deref(),
            Some("iPhone Developer: Test (ABCDE12345)")
        );
    }

    #[test]
    fn test_dylib_binds_info_and_requirements_only() {
        let (_dir, bundle) = make_bundle(true);
        let dylib = bundle.path().join("libExtra.dylib");

        let signature = sign(&bundle, ExecutableKind::Generic, &dylib, None);
        let cd = signature.primary();

        assert_eq!(cd.identifier, "libExtra");
        assert_eq!(cd.special_slot_count(), 2);
        assert!(cd.has_special_slot(CSSLOT_SPECIAL_INFOSLOT));
        assert!(cd.has_special_slot(CSSLOT_SPECIAL_REQUIREMENTS));
        assert!(!cd.has_special_slot(CSSLOT_SPECIAL_RESOURCEDIR));
        assert_eq!(cd.exec_seg_flags, 0);
        assert!(signature.entitlements().unwrap().is_none());
    }

    #[test]
    fn test_framework_executable_has_no_entitlements() {
        let (_dir, bundle) = make_bundle(false);
        let seal_path = bundle.path().join("CodeResources");
        fs::write(&seal_path, b"seal").unwrap();
        let seal = SealReference {
            path: seal_path,
            file_count: 0,
        };

        let executable = bundle.executable_path().unwrap();
        let signature = sign(&bundle, ExecutableKind::Framework, &executable, Some(&seal));
        let cd = signature.primary();

        assert_eq!(cd.special_slot_count(), 3);
        assert!(cd.has_special_slot(CSSLOT_SPECIAL_RESOURCEDIR));
        assert!(signature.entitlements().unwrap().is_none());
        assert!(signature.der_entitlements().is_none());
    }

    #[test]
    fn test_app_kind_requires_app_owner() {
        let (_dir, bundle) = make_bundle(false);
        let signer = CodeSignatureSigner::new(MemoryEmbedder::default());
        let executable = bundle.executable_path().unwrap();

        let result = signer.sign(&SigningRequest {
            kind: ExecutableKind::App,
            executable: &executable,
            owner: &bundle,
            identity: &TestIdentity,
            seal: None,
        });

        assert!(matches!(result, Err(Error::SignerBackend { .. })));
        assert!(signer.embedder().embedded.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_entitlements_is_signer_failure() {
        let (_dir, bundle) = make_bundle(true);
        let entitlements_path = bundle.path().join("Entitlements.plist");
        fs::write(&entitlements_path, b"not a plist").unwrap();
        let signer = CodeSignatureSigner::new(MemoryEmbedder::default());
        let executable = bundle.executable_path().unwrap();

        let result = signer.sign(&SigningRequest {
            kind: ExecutableKind::App,
            executable: &executable,
            owner: &bundle,
            identity: &TestIdentity,
            seal: None,
        });

        match result {
            Err(Error::SignerBackend { path, .. }) => assert_eq!(path, entitlements_path),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(signer.embedder().embedded.lock().unwrap().is_empty());
    }
}
