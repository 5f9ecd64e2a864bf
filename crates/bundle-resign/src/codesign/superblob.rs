//! SuperBlob assembly for embedded code signatures.
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ magic 0xfade0cc0 | length | count  │
//! ├────────────────────────────────────┤
//! │ index: (slot_type, offset) * count │
//! ├────────────────────────────────────┤
//! │ blob data, in index order          │
//! └────────────────────────────────────┘
//! ```

use super::constants::*;

/// Size of the SuperBlob header in bytes (magic + length + count)
pub(crate) const SUPERBLOB_HEADER_SIZE: u32 = 12;

/// Size of each index entry in bytes (slot_type + offset)
pub(crate) const INDEX_ENTRY_SIZE: u32 = 8;

/// One component of a SuperBlob, identified by its slot type.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub slot_type: u32,
    /// Raw blob data, including its own magic and length header.
    pub data: Vec<u8>,
}

impl BlobEntry {
    pub fn new(slot_type: u32, data: Vec<u8>) -> Self {
        Self { slot_type, data }
    }
}

/// Serialize a SuperBlob from entries, keeping their order.
pub fn build_superblob(entries: Vec<BlobEntry>) -> Vec<u8> {
    let count = entries.len() as u32;
    let header_size = SUPERBLOB_HEADER_SIZE + count * INDEX_ENTRY_SIZE;

    let mut offsets = Vec::with_capacity(entries.len());
    let mut current_offset = header_size;
    for entry in &entries {
        offsets.push(current_offset);
        current_offset += entry.data.len() as u32;
    }
    let total_length = current_offset;

    let mut buf = Vec::with_capacity(total_length as usize);
    buf.extend(&CSMAGIC_EMBEDDED_SIGNATURE.to_be_bytes());
    buf.extend(&total_length.to_be_bytes());
    buf.extend(&count.to_be_bytes());

    for (entry, offset) in entries.iter().zip(&offsets) {
        buf.extend(&entry.slot_type.to_be_bytes());
        buf.extend(&offset.to_be_bytes());
    }

    for entry in entries {
        buf.extend(entry.data);
    }

    buf
}

/// Wrap `payload` in a blob header with the given magic.
pub fn wrap_blob(magic: u32, payload: &[u8]) -> Vec<u8> {
    let total_len = 8 + payload.len() as u32;
    let mut buf = Vec::with_capacity(total_len as usize);
    buf.extend(&magic.to_be_bytes());
    buf.extend(&total_len.to_be_bytes());
    buf.extend(payload);
    buf
}

/// XML entitlements blob (slot 0x0005).
pub fn build_entitlements_blob(plist_xml: &[u8]) -> Vec<u8> {
    wrap_blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, plist_xml)
}

/// DER entitlements blob (slot 0x0007).
pub fn build_der_entitlements_blob(der: &[u8]) -> Vec<u8> {
    wrap_blob(CSMAGIC_EMBEDDED_DER_ENTITLEMENTS, der)
}

/// CMS signature wrapper blob (slot 0x10000).
pub fn build_signature_blob(cms: &[u8]) -> Vec<u8> {
    wrap_blob(CSMAGIC_BLOBWRAPPER, cms)
}

/// Builder placing each signature component in its standard slot.
///
/// Components are emitted in ascending slot order regardless of the order
/// the setters were called in, matching what Apple's `codesign` writes.
#[derive(Debug, Default)]
pub struct SuperBlobBuilder {
    code_directory_sha1: Option<Vec<u8>>,
    code_directory_sha256: Option<Vec<u8>>,
    requirements: Option<Vec<u8>>,
    entitlements: Option<Vec<u8>>,
    der_entitlements: Option<Vec<u8>>,
    cms_signature: Option<Vec<u8>>,
}

impl SuperBlobBuilder {
    /// Start with no components.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary CodeDirectory (slot 0x0000).
    pub fn code_directory_sha1(mut self, cd: Vec<u8>) -> Self {
        self.code_directory_sha1 = Some(cd);
        self
    }

    /// Alternate CodeDirectory (slot 0x1000).
    pub fn code_directory_sha256(mut self, cd: Vec<u8>) -> Self {
        self.code_directory_sha256 = Some(cd);
        self
    }

    /// Requirements blob (slot 0x0002).
    ///
    /// # Arguments
    ///
    /// * `req` - A complete requirements blob, magic and length included.
    pub fn requirements(mut self, req: Vec<u8>) -> Self {
        self.requirements = Some(req);
        self
    }

    /// XML entitlements blob (slot 0x0005), as built by
    /// [`build_entitlements_blob`].
    pub fn entitlements(mut self, ent: Vec<u8>) -> Self {
        self.entitlements = Some(ent);
        self
    }

    /// DER entitlements blob (slot 0x0007). Only app executables carry one.
    pub fn der_entitlements(mut self, der_ent: Vec<u8>) -> Self {
        self.der_entitlements = Some(der_ent);
        self
    }

    /// CMS signature wrapper (slot 0x10000), as built by
    /// [`build_signature_blob`].
    pub fn cms_signature(mut self, sig: Vec<u8>) -> Self {
        self.cms_signature = Some(sig);
        self
    }

    /// Serialize the components that were set.
    pub fn build(self) -> Vec<u8> {
        let slots = [
            (CSSLOT_CODEDIRECTORY, self.code_directory_sha1),
            (CSSLOT_REQUIREMENTS, self.requirements),
            (CSSLOT_ENTITLEMENTS, self.entitlements),
            (CSSLOT_DER_ENTITLEMENTS, self.der_entitlements),
            (CSSLOT_ALTERNATE_CODEDIRECTORIES, self.code_directory_sha256),
            (CSSLOT_SIGNATURESLOT, self.cms_signature),
        ];

        let entries = slots
            .into_iter()
            .filter_map(|(slot, data)| data.map(|data| BlobEntry::new(slot, data)))
            .collect();

        build_superblob(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be_u32(buf: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_superblob_structure() {
        let blob = build_superblob(vec![
            BlobEntry::new(CSSLOT_CODEDIRECTORY, vec![0xab; 100]),
            BlobEntry::new(CSSLOT_REQUIREMENTS, vec![0xcd; 12]),
        ]);

        assert_eq!(be_u32(&blob, 0), CSMAGIC_EMBEDDED_SIGNATURE);
        assert_eq!(be_u32(&blob, 8), 2);
        assert_eq!(be_u32(&blob, 4), 12 + 16 + 100 + 12);
        assert_eq!(blob.len(), 12 + 16 + 100 + 12);
    }

    #[test]
    fn test_superblob_offsets() {
        let blob = build_superblob(vec![
            BlobEntry::new(CSSLOT_CODEDIRECTORY, vec![0; 50]),
            BlobEntry::new(CSSLOT_REQUIREMENTS, vec![1; 30]),
            BlobEntry::new(CSSLOT_ENTITLEMENTS, vec![2; 20]),
        ]);

        assert_eq!(be_u32(&blob, 16), 36);
        assert_eq!(be_u32(&blob, 24), 86);
        assert_eq!(be_u32(&blob, 32), 116);
        assert_eq!(blob[116], 2);
    }

    #[test]
    fn test_entitlements_blob() {
        let plist = b"<?xml version=\"1.0\"?><plist><dict></dict></plist>";
        let blob = build_entitlements_blob(plist);

        assert_eq!(be_u32(&blob, 0), CSMAGIC_EMBEDDED_ENTITLEMENTS);
        assert_eq!(be_u32(&blob, 4) as usize, 8 + plist.len());
        assert_eq!(&blob[8..], plist);
    }

    #[test]
    fn test_signature_blob_wraps_cms() {
        let cms = [0x30, 0x82, 0x01, 0x00];
        let blob = build_signature_blob(&cms);

        assert_eq!(be_u32(&blob, 0), CSMAGIC_BLOBWRAPPER);
        assert_eq!(&blob[8..], &cms);
    }

    #[test]
    fn test_builder_slot_ordering() {
        let superblob = SuperBlobBuilder::new()
            .code_directory_sha256(vec![0x02; 10])
            .cms_signature(build_signature_blob(&[]))
            .code_directory_sha1(vec![0x01; 10])
            .der_entitlements(build_der_entitlements_blob(&[]))
            .entitlements(build_entitlements_blob(b""))
            .requirements(vec![0x03; 12])
            .build();

        assert_eq!(be_u32(&superblob, 8), 6);
        let slots: Vec<u32> = (0..6).map(|i| be_u32(&superblob, 12 + i * 8)).collect();
        assert_eq!(
            slots,
            vec![
                CSSLOT_CODEDIRECTORY,
                CSSLOT_REQUIREMENTS,
                CSSLOT_ENTITLEMENTS,
                CSSLOT_DER_ENTITLEMENTS,
                CSSLOT_ALTERNATE_CODEDIRECTORIES,
                CSSLOT_SIGNATURESLOT,
            ]
        );
    }

    #[test]
    fn test_builder_skips_absent_components() {
        let superblob = SuperBlobBuilder::new()
            .code_directory_sha256(vec![0xaa; 80])
            .build();

        assert_eq!(be_u32(&superblob, 8), 1);
        assert_eq!(be_u32(&superblob, 12), CSSLOT_ALTERNATE_CODEDIRECTORIES);
    }
}
