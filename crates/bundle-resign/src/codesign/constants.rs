//! Magic numbers, slot indices and flags of the embedded code signature
//! format. Values match `cs_blobs.h` / `codedirectory.h` from Apple's
//! open-source Security framework.

// Blob magics

/// Embedded signature SuperBlob.
pub const CSMAGIC_EMBEDDED_SIGNATURE: u32 = 0xfade0cc0;
/// CodeDirectory blob.
pub const CSMAGIC_CODEDIRECTORY: u32 = 0xfade0c02;
/// Requirement set (SuperBlob of requirements).
pub const CSMAGIC_REQUIREMENTS: u32 = 0xfade0c01;
/// Single requirement expression.
pub const CSMAGIC_REQUIREMENT: u32 = 0xfade0c00;
/// XML entitlements.
pub const CSMAGIC_EMBEDDED_ENTITLEMENTS: u32 = 0xfade7171;
/// DER entitlements.
pub const CSMAGIC_EMBEDDED_DER_ENTITLEMENTS: u32 = 0xfade7172;
/// Generic wrapper, used for the CMS signature.
pub const CSMAGIC_BLOBWRAPPER: u32 = 0xfade0b01;

// SuperBlob index slot types

pub const CSSLOT_CODEDIRECTORY: u32 = 0x0000;
pub const CSSLOT_REQUIREMENTS: u32 = 0x0002;
pub const CSSLOT_ENTITLEMENTS: u32 = 0x0005;
pub const CSSLOT_DER_ENTITLEMENTS: u32 = 0x0007;
pub const CSSLOT_ALTERNATE_CODEDIRECTORIES: u32 = 0x1000;
pub const CSSLOT_SIGNATURESLOT: u32 = 0x10000;

// Special (negative) hash slots inside a CodeDirectory

/// Info.plist.
pub const CSSLOT_SPECIAL_INFOSLOT: i32 = -1;
/// Requirements blob.
pub const CSSLOT_SPECIAL_REQUIREMENTS: i32 = -2;
/// Resource directory (`_CodeSignature/CodeResources`).
pub const CSSLOT_SPECIAL_RESOURCEDIR: i32 = -3;
/// Application specific, always empty.
pub const CSSLOT_SPECIAL_APPLICATION: i32 = -4;
/// XML entitlements blob.
pub const CSSLOT_SPECIAL_ENTITLEMENTS: i32 = -5;
/// Representation specific, always empty.
pub const CSSLOT_SPECIAL_REP_SPECIFIC: i32 = -6;
/// DER entitlements blob.
pub const CSSLOT_SPECIAL_DER_ENTITLEMENTS: i32 = -7;

// Hash types

pub const CS_HASHTYPE_SHA1: u8 = 1;
pub const CS_HASHTYPE_SHA256: u8 = 2;

pub const CS_SHA1_LEN: usize = 20;
pub const CS_SHA256_LEN: usize = 32;

// CodeDirectory flags

pub const CS_ADHOC: u32 = 0x0000_0002;

// Executable segment flags

/// Executable segment belongs to the main binary.
pub const CS_EXECSEG_MAIN_BINARY: u64 = 0x0001;
/// Allow unsigned pages (set together with `get-task-allow`).
pub const CS_EXECSEG_ALLOW_UNSIGNED: u64 = 0x0010;

/// CodeDirectory version with the exec segment fields.
pub const CODEDIRECTORY_VERSION: u32 = 0x20400;

/// Code page size hashed by each code slot.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SIZE_LOG2: u8 = 12;

// Requirement language opcodes

pub const OP_IDENT: u32 = 2;
pub const OP_AND: u32 = 6;
pub const OP_CERT_FIELD: u32 = 11;
pub const OP_APPLE_GENERIC_ANCHOR: u32 = 15;

/// Designated requirement type in a requirement set.
pub const CSREQ_DESIGNATED: u32 = 0x0003;

/// Requirement expression kind: plain expression.
pub const REQUIREMENT_KIND_EXPRESSION: u32 = 1;

/// Certificate index meaning "leaf certificate".
pub const CERT_INDEX_LEAF: i32 = 0;

pub const MATCH_EQUAL: u32 = 1;
