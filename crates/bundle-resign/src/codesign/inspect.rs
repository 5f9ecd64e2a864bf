//! Reading embedded signatures back.
//!
//! [`EmbeddedSignature::parse`] decodes a SuperBlob into its components and
//! [`EmbeddedSignature::display`] renders them in the line format external
//! verifiers print, which [`crate::report::parse`] understands.

use super::code_directory::{compute_cdhash, DigestType};
use super::constants::*;
use super::requirements::DesignatedRequirement;
use super::superblob::{INDEX_ENTRY_SIZE, SUPERBLOB_HEADER_SIZE};
use crate::{Error, Result};
use plist::{Dictionary, Value};
use std::fmt::Write;
use std::path::Path;

/// Alternate code directories occupy up to five consecutive slots.
const CSSLOT_ALTERNATE_CODEDIRECTORY_MAX: u32 = 5;

/// Verifiers print CDHashes truncated to this many bytes.
const CDHASH_DISPLAY_LEN: usize = 20;

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedSignature(message.into())
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {offset}")))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {offset}")))
}

fn read_cstr(data: &[u8], offset: usize) -> Result<String> {
    let tail = data
        .get(offset..)
        .ok_or_else(|| malformed(format!("string offset {offset} out of range")))?;
    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| malformed("unterminated string"))?;
    String::from_utf8(tail[..end].to_vec()).map_err(|e| malformed(e.to_string()))
}

/// Slice out the blob starting at `offset`, using its own length field.
fn blob_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    let length = read_u32(data, offset + 4)? as usize;
    if length < 8 {
        return Err(malformed(format!("blob at {offset} has length {length}")));
    }
    data.get(offset..offset + length)
        .ok_or_else(|| malformed(format!("blob at {offset} overruns the signature")))
}

/// A decoded CodeDirectory.
#[derive(Debug, Clone)]
pub struct CodeDirectory {
    pub version: u32,
    pub flags: u32,
    pub digest: DigestType,
    pub identifier: String,
    pub team_id: Option<String>,
    pub code_limit: u32,
    pub exec_seg_limit: u64,
    pub exec_seg_flags: u64,
    /// Hashes of slots `-1, -2, ...` in that order.
    special_slots: Vec<Vec<u8>>,
    code_slots: Vec<Vec<u8>>,
    raw: Vec<u8>,
}

impl CodeDirectory {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if read_u32(data, 0)? != CSMAGIC_CODEDIRECTORY {
            return Err(malformed("bad CodeDirectory magic"));
        }
        let length = read_u32(data, 4)? as usize;
        let data = data
            .get(..length)
            .ok_or_else(|| malformed("CodeDirectory shorter than its length field"))?;

        let version = read_u32(data, 8)?;
        let flags = read_u32(data, 12)?;
        let hash_offset = read_u32(data, 16)? as usize;
        let ident_offset = read_u32(data, 20)? as usize;
        let n_special = read_u32(data, 24)? as usize;
        let n_code = read_u32(data, 28)? as usize;
        let code_limit = read_u32(data, 32)?;
        let hash_size = *data.get(36).ok_or_else(|| malformed("truncated header"))? as usize;
        let hash_type = *data.get(37).ok_or_else(|| malformed("truncated header"))?;

        let digest = DigestType::from_hash_type(hash_type)
            .ok_or_else(|| malformed(format!("unknown hash type {hash_type}")))?;
        if digest.hash_len() != hash_size {
            return Err(malformed(format!(
                "hash size {hash_size} does not match {}",
                digest.name()
            )));
        }

        let team_offset = if version >= 0x20200 { read_u32(data, 48)? as usize } else { 0 };
        let team_id = match team_offset {
            0 => None,
            offset => Some(read_cstr(data, offset)?),
        };
        let (exec_seg_limit, exec_seg_flags) = if version >= 0x20400 {
            (read_u64(data, 72)?, read_u64(data, 80)?)
        } else {
            (0, 0)
        };

        let hash = |offset: usize| -> Result<Vec<u8>> {
            data.get(offset..offset + hash_size)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| malformed(format!("hash slot at {offset} out of range")))
        };

        let special_slots = (1..=n_special)
            .map(|i| {
                hash_offset
                    .checked_sub(i * hash_size)
                    .ok_or_else(|| malformed("special slots precede the header"))
                    .and_then(hash)
            })
            .collect::<Result<Vec<_>>>()?;
        let code_slots = (0..n_code)
            .map(|i| hash(hash_offset + i * hash_size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version,
            flags,
            digest,
            identifier: read_cstr(data, ident_offset)?,
            team_id,
            code_limit,
            exec_seg_limit,
            exec_seg_flags,
            special_slots,
            code_slots,
            raw: data.to_vec(),
        })
    }

    pub fn special_slot_count(&self) -> usize {
        self.special_slots.len()
    }

    /// Hash stored in special slot `slot` (negative), if within range.
    pub fn special_slot(&self, slot: i32) -> Option<&[u8]> {
        if slot >= 0 {
            return None;
        }
        self.special_slots
            .get(slot.unsigned_abs() as usize - 1)
            .map(Vec::as_slice)
    }

    /// Whether `slot` holds a real hash rather than zero fill.
    pub fn has_special_slot(&self, slot: i32) -> bool {
        self.special_slot(slot)
            .is_some_and(|hash| hash.iter().any(|b| *b != 0))
    }

    pub fn code_slots(&self) -> &[Vec<u8>] {
        &self.code_slots
    }

    pub fn cdhash(&self) -> Vec<u8> {
        compute_cdhash(&self.raw, self.digest)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Seal counts shown on the `Sealed Resources` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealSummary {
    pub rules: usize,
    pub files: usize,
}

impl SealSummary {
    /// Count the version 2 rules and files of a resource manifest.
    pub fn from_manifest(manifest: &Dictionary) -> Self {
        let count = |key: &str| {
            manifest
                .get(key)
                .and_then(Value::as_dictionary)
                .map_or(0, Dictionary::len)
        };
        Self {
            rules: count("rules2"),
            files: count("files2"),
        }
    }
}

/// A decoded embedded signature SuperBlob.
#[derive(Debug, Clone)]
pub struct EmbeddedSignature {
    /// Code directories in slot order; the primary one comes first.
    code_directories: Vec<CodeDirectory>,
    requirements: Option<Vec<u8>>,
    entitlements: Option<Vec<u8>>,
    der_entitlements: Option<Vec<u8>>,
    cms_signature: Option<Vec<u8>>,
}

impl EmbeddedSignature {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if read_u32(data, 0)? != CSMAGIC_EMBEDDED_SIGNATURE {
            return Err(malformed("bad SuperBlob magic"));
        }
        let count = read_u32(data, 8)? as usize;

        let mut signature = Self {
            code_directories: Vec::new(),
            requirements: None,
            entitlements: None,
            der_entitlements: None,
            cms_signature: None,
        };
        for index in 0..count {
            let entry = SUPERBLOB_HEADER_SIZE as usize + index * INDEX_ENTRY_SIZE as usize;
            let slot = read_u32(data, entry)?;
            let blob = blob_at(data, read_u32(data, entry + 4)? as usize)?;

            match slot {
                CSSLOT_CODEDIRECTORY => {
                    signature.code_directories.push(CodeDirectory::parse(blob)?)
                }
                s if (CSSLOT_ALTERNATE_CODEDIRECTORIES
                    ..CSSLOT_ALTERNATE_CODEDIRECTORIES + CSSLOT_ALTERNATE_CODEDIRECTORY_MAX)
                    .contains(&s) =>
                {
                    signature.code_directories.push(CodeDirectory::parse(blob)?)
                }
                CSSLOT_REQUIREMENTS => signature.requirements = Some(blob.to_vec()),
                CSSLOT_ENTITLEMENTS => signature.entitlements = Some(blob[8..].to_vec()),
                CSSLOT_DER_ENTITLEMENTS => signature.der_entitlements = Some(blob[8..].to_vec()),
                CSSLOT_SIGNATURESLOT => signature.cms_signature = Some(blob[8..].to_vec()),
                _ => {}
            }
        }

        if signature.code_directories.is_empty() {
            return Err(malformed("signature has no CodeDirectory"));
        }
        Ok(signature)
    }

    pub fn code_directories(&self) -> &[CodeDirectory] {
        &self.code_directories
    }

    pub fn code_directory(&self, digest: DigestType) -> Option<&CodeDirectory> {
        self.code_directories.iter().find(|cd| cd.digest == digest)
    }

    /// The directory verifiers report: SHA-256 when present.
    pub fn primary(&self) -> &CodeDirectory {
        self.code_directory(DigestType::Sha256)
            .unwrap_or(&self.code_directories[0])
    }

    /// The raw requirements blob, including its magic and length header.
    pub fn requirements_blob(&self) -> Option<&[u8]> {
        self.requirements.as_deref()
    }

    pub fn designated_requirement(&self) -> Option<DesignatedRequirement> {
        DesignatedRequirement::parse_requirements_blob(self.requirements.as_deref()?)
    }

    /// Entitlements embedded in XML form, if any.
    pub fn entitlements(&self) -> Result<Option<Value>> {
        self.entitlements
            .as_deref()
            .map(|xml| Value::from_reader_xml(xml).map_err(|e| malformed(e.to_string())))
            .transpose()
    }

    pub fn der_entitlements(&self) -> Option<&[u8]> {
        self.der_entitlements.as_deref()
    }

    pub fn cms_signature(&self) -> Option<&[u8]> {
        self.cms_signature.as_deref()
    }

    /// Render the signature the way `codesign -d -r- --verbose=20` does.
    pub fn display(
        &self,
        executable: &Path,
        info_entries: Option<usize>,
        seal: Option<SealSummary>,
    ) -> String {
        let cd = self.primary();
        let mut out = String::new();

        // fmt::Write into a String cannot fail
        let _ = writeln!(out, "Executable={}", executable.display());
        let _ = writeln!(out, "Identifier={}", cd.identifier);
        let _ = writeln!(
            out,
            "CodeDirectory v={:x} size={} flags={:#x}({}) hashes={}+{} location=embedded",
            cd.version,
            cd.raw.len(),
            cd.flags,
            if cd.flags & CS_ADHOC != 0 { "adhoc" } else { "none" },
            cd.code_slots.len(),
            cd.special_slots.len(),
        );
        let _ = writeln!(out, "Hash type={} size={}", cd.digest.name(), cd.digest.hash_len());
        for slot in (1..=cd.special_slots.len()).rev() {
            let hash = hex::encode(&cd.special_slots[slot - 1]);
            let _ = writeln!(out, " {:>6}={}", -(slot as i64), hash);
        }
        for (index, hash) in cd.code_slots.iter().enumerate() {
            let _ = writeln!(out, " {:>6}={}", index, hex::encode(hash));
        }

        for candidate in &self.code_directories {
            let _ = writeln!(
                out,
                "CandidateCDHash {}={}",
                candidate.digest.name(),
                hex::encode(candidate.cdhash())
            );
        }
        let cdhash = cd.cdhash();
        let _ = writeln!(
            out,
            "CDHash={}",
            hex::encode(&cdhash[..CDHASH_DISPLAY_LEN.min(cdhash.len())])
        );

        match self.cms_signature.as_deref() {
            Some(cms) if !cms.is_empty() => {
                let _ = writeln!(out, "Signature size={}", cms.len());
            }
            _ => {
                let _ = writeln!(out, "Signature=adhoc");
            }
        }
        if let Some(entries) = info_entries {
            let _ = writeln!(out, "Info.plist entries={entries}");
        }
        let _ = writeln!(
            out,
            "TeamIdentifier={}",
            cd.team_id.as_deref().unwrap_or("not set")
        );
        match seal {
            Some(seal) => {
                let _ = writeln!(
                    out,
                    "Sealed Resources version=2 rules={} files={}",
                    seal.rules, seal.files
                );
            }
            None => {
                let _ = writeln!(out, "Sealed Resources=none");
            }
        }
        if let Some(requirements) = self.requirements.as_deref() {
            let _ = writeln!(out, "Internal requirements count=1 size={}", requirements.len());
        }
        if let Some(requirement) = self.designated_requirement() {
            let _ = writeln!(out, "designated => {requirement}");
        }

        out
    }
}
