//! Property list reading and writing.
//!
//! Thin wrappers over the `plist` crate that attach the offending path to
//! every failure, so a re-signing error always names the file involved.

use crate::{Error, Result};
use plist::{Dictionary, Value};
use std::path::Path;

/// Read a binary or XML property list whose root is a dictionary.
///
/// A missing file, undecodable content, or a non-dictionary root all
/// yield [`Error::PlistRead`].
pub fn read_dictionary(path: impl AsRef<Path>) -> Result<Dictionary> {
    let path = path.as_ref();

    plist::from_file::<_, Dictionary>(path).map_err(|source| Error::PlistRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a property list, replacing any existing file.
///
/// `binary` selects the binary encoding; otherwise XML is written.
pub fn write(value: &Value, path: impl AsRef<Path>, binary: bool) -> Result<()> {
    let path = path.as_ref();

    let written = if binary {
        value.to_file_binary(path)
    } else {
        value.to_file_xml(path)
    };

    written.map_err(|source| Error::PlistWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode a property list as XML bytes.
pub fn to_xml_bytes(value: &Value) -> std::result::Result<Vec<u8>, plist::Error> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, value)?;
    Ok(buf)
}
