//! CodeDirectory blob builder.
//!
//! The CodeDirectory is the signed summary of an executable: one hash per
//! 4 KiB code page (the ordinary slots) and, at negative indices, hashes of
//! the non-code data the signature binds (Info.plist, requirements,
//! resource seal, entitlements).
//!
//! Special slots are written in reverse order, `-n` first and `-1` last,
//! immediately before the code slots. Absent slots inside that range are
//! zero-filled.

use super::constants::*;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::BTreeMap;

/// CodeDirectory header size for version 0x20400 (with exec segment fields)
const CODEDIRECTORY_HEADER_SIZE: u32 = 88;

/// Hash algorithm of a CodeDirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestType {
    Sha1,
    Sha256,
}

impl DigestType {
    /// The `hashType` byte stored in the CodeDirectory header.
    pub fn hash_type(self) -> u8 {
        match self {
            DigestType::Sha1 => CS_HASHTYPE_SHA1,
            DigestType::Sha256 => CS_HASHTYPE_SHA256,
        }
    }

    /// Digest length in bytes.
    pub fn hash_len(self) -> usize {
        match self {
            DigestType::Sha1 => CS_SHA1_LEN,
            DigestType::Sha256 => CS_SHA256_LEN,
        }
    }

    /// Name as printed by verifiers (`sha1`, `sha256`).
    pub fn name(self) -> &'static str {
        match self {
            DigestType::Sha1 => "sha1",
            DigestType::Sha256 => "sha256",
        }
    }

    pub fn from_hash_type(value: u8) -> Option<Self> {
        match value {
            CS_HASHTYPE_SHA1 => Some(DigestType::Sha1),
            CS_HASHTYPE_SHA256 => Some(DigestType::Sha256),
            _ => None,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestType::Sha1 => Sha1::digest(data).to_vec(),
            DigestType::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Builder for CodeDirectory blobs.
///
/// Special slot contents are supplied raw and hashed with the digest of the
/// directory being built, so the same builder produces both the SHA-1 and
/// the SHA-256 directory of a signature.
///
/// # Example
///
/// ```
/// use bundle_resign::codesign::code_directory::{CodeDirectoryBuilder, DigestType};
/// use bundle_resign::codesign::constants::*;
///
/// let code = vec![0u8; 8192];
/// let cd = CodeDirectoryBuilder::new("com.example.app", &code)
///     .team_id("TEAMID1234")
///     .special_slot(CSSLOT_SPECIAL_INFOSLOT, b"<plist/>".to_vec())
///     .exec_seg_flags(CS_EXECSEG_MAIN_BINARY)
///     .build(DigestType::Sha256);
/// assert_eq!(&cd[0..4], &CSMAGIC_CODEDIRECTORY.to_be_bytes());
/// ```
#[derive(Debug, Clone)]
pub struct CodeDirectoryBuilder<'a> {
    identifier: String,
    team_id: Option<String>,
    code: &'a [u8],
    /// Raw contents keyed by negative slot index.
    special: BTreeMap<i32, Vec<u8>>,
    exec_seg_limit: u64,
    exec_seg_flags: u64,
    flags: u32,
}

impl<'a> CodeDirectoryBuilder<'a> {
    /// Create a builder hashing `code` page by page.
    pub fn new(identifier: impl Into<String>, code: &'a [u8]) -> Self {
        Self {
            identifier: identifier.into(),
            team_id: None,
            code,
            special: BTreeMap::new(),
            exec_seg_limit: 0,
            exec_seg_flags: 0,
            flags: 0,
        }
    }

    /// Set the team identifier.
    pub fn team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Bind `content` to the special slot `slot` (a negative index such as
    /// [`CSSLOT_SPECIAL_INFOSLOT`]).
    pub fn special_slot(mut self, slot: i32, content: Vec<u8>) -> Self {
        debug_assert!(slot < 0, "special slots have negative indices");
        self.special.insert(slot, content);
        self
    }

    /// Set the executable segment limit (size of `__TEXT`).
    pub fn exec_seg_limit(mut self, limit: u64) -> Self {
        self.exec_seg_limit = limit;
        self
    }

    /// Set the raw executable segment flags.
    pub fn exec_seg_flags(mut self, flags: u64) -> Self {
        self.exec_seg_flags = flags;
        self
    }

    /// Set the code signature flags.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    fn is_main_executable(&self) -> bool {
        self.exec_seg_flags & CS_EXECSEG_MAIN_BINARY != 0
    }

    /// Special slots that end up in the directory. Slots -6 and -7 are only
    /// meaningful for main executables and are dropped otherwise.
    fn effective_special_slots(&self) -> impl Iterator<Item = (&i32, &Vec<u8>)> {
        let main = self.is_main_executable();
        self.special
            .iter()
            .filter(move |(slot, _)| main || **slot > CSSLOT_SPECIAL_REP_SPECIFIC)
    }

    /// Number of special slots: the magnitude of the lowest bound slot.
    fn count_special_slots(&self) -> usize {
        self.effective_special_slots()
            .map(|(slot, _)| slot.unsigned_abs() as usize)
            .max()
            .unwrap_or(0)
    }

    fn count_code_slots(&self) -> usize {
        self.code.len().div_ceil(PAGE_SIZE)
    }

    /// Serialize the CodeDirectory with the given digest.
    pub fn build(&self, digest: DigestType) -> Vec<u8> {
        let hash_size = digest.hash_len();
        let n_special_slots = self.count_special_slots();
        let n_code_slots = self.count_code_slots();
        let code_limit = self.code.len() as u32;

        let ident_offset = CODEDIRECTORY_HEADER_SIZE;
        let ident_len = self.identifier.len() as u32 + 1;

        let team_len = self
            .team_id
            .as_ref()
            .map(|t| t.len() as u32 + 1)
            .unwrap_or(0);
        let team_offset = if self.team_id.is_some() {
            ident_offset + ident_len
        } else {
            0
        };

        let hash_offset =
            ident_offset + ident_len + team_len + (n_special_slots * hash_size) as u32;
        let total_len = hash_offset + (n_code_slots * hash_size) as u32;

        let mut buf = Vec::with_capacity(total_len as usize);

        buf.extend(&CSMAGIC_CODEDIRECTORY.to_be_bytes());
        buf.extend(&total_len.to_be_bytes());
        buf.extend(&CODEDIRECTORY_VERSION.to_be_bytes());
        buf.extend(&self.flags.to_be_bytes());
        buf.extend(&hash_offset.to_be_bytes());
        buf.extend(&ident_offset.to_be_bytes());
        buf.extend(&(n_special_slots as u32).to_be_bytes());
        buf.extend(&(n_code_slots as u32).to_be_bytes());
        buf.extend(&code_limit.to_be_bytes());
        buf.push(hash_size as u8);
        buf.push(digest.hash_type());
        buf.push(0); // platform
        buf.push(PAGE_SIZE_LOG2);
        buf.extend(&0u32.to_be_bytes()); // spare2
        buf.extend(&0u32.to_be_bytes()); // scatterOffset
        buf.extend(&team_offset.to_be_bytes());
        buf.extend(&0u32.to_be_bytes()); // spare3
        buf.extend(&0u64.to_be_bytes()); // codeLimit64
        buf.extend(&0u64.to_be_bytes()); // execSegBase
        buf.extend(&self.exec_seg_limit.to_be_bytes());
        buf.extend(&self.exec_seg_flags.to_be_bytes());

        buf.extend(self.identifier.as_bytes());
        buf.push(0);

        if let Some(ref team) = self.team_id {
            buf.extend(team.as_bytes());
            buf.push(0);
        }

        buf.extend(self.special_slot_hashes(digest, n_special_slots));

        for page in self.code.chunks(PAGE_SIZE) {
            buf.extend(digest.digest(page));
        }

        buf
    }

    /// Hashes for slots `-n ..= -1`, zero-filled where nothing is bound.
    fn special_slot_hashes(&self, digest: DigestType, n_special_slots: usize) -> Vec<u8> {
        let bound: BTreeMap<i32, &Vec<u8>> = self
            .effective_special_slots()
            .map(|(slot, content)| (*slot, content))
            .collect();

        let mut out = Vec::with_capacity(n_special_slots * digest.hash_len());
        for slot in -(n_special_slots as i32)..0 {
            match bound.get(&slot) {
                Some(content) => out.extend(digest.digest(content)),
                None => out.extend(std::iter::repeat(0u8).take(digest.hash_len())),
            }
        }
        out
    }
}

/// Compute the CDHash (digest of a whole CodeDirectory blob).
pub fn compute_cdhash(code_directory: &[u8], digest: DigestType) -> Vec<u8> {
    digest.digest(code_directory)
}
