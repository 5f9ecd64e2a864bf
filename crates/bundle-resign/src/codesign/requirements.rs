//! Designated requirement encoding.
//!
//! A requirement set is a SuperBlob-like container (magic
//! `0xfade0c01`) whose index maps requirement types to requirement blobs.
//! Each requirement blob holds an expression in Apple's compiled
//! requirement language: big-endian opcodes, with strings stored as a
//! length followed by the bytes padded to a 4-byte boundary.
//!
//! Only the shapes a re-signed bundle needs are supported:
//!
//! ```text
//! identifier "<id>" and anchor apple generic
//! identifier "<id>" and anchor apple generic and certificate leaf[subject.CN] = "<cn>"
//! ```

use super::constants::*;

/// Certificate field matched by the leaf clause.
const SUBJECT_CN: &str = "subject.CN";

/// Expression of a designated requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignatedRequirement {
    pub identifier: String,
    pub leaf_common_name: Option<String>,
}

impl DesignatedRequirement {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            leaf_common_name: None,
        }
    }

    /// Also require the leaf certificate's subject CN.
    pub fn leaf_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.leaf_common_name = Some(common_name.into());
        self
    }

    /// Compile the expression into requirement-language opcodes.
    fn compile(&self) -> Vec<u8> {
        let mut expr = Vec::new();

        // `and` is binary and left-associative
        push_u32(&mut expr, OP_AND);
        if self.leaf_common_name.is_some() {
            push_u32(&mut expr, OP_AND);
        }

        push_u32(&mut expr, OP_IDENT);
        push_data(&mut expr, self.identifier.as_bytes());
        push_u32(&mut expr, OP_APPLE_GENERIC_ANCHOR);

        if let Some(ref cn) = self.leaf_common_name {
            push_u32(&mut expr, OP_CERT_FIELD);
            expr.extend(&CERT_INDEX_LEAF.to_be_bytes());
            push_data(&mut expr, SUBJECT_CN.as_bytes());
            push_u32(&mut expr, MATCH_EQUAL);
            push_data(&mut expr, cn.as_bytes());
        }

        expr
    }

    /// Single requirement blob (magic `0xfade0c00`).
    pub fn to_requirement_blob(&self) -> Vec<u8> {
        let expr = self.compile();
        let total_len = 12 + expr.len() as u32;

        let mut buf = Vec::with_capacity(total_len as usize);
        buf.extend(&CSMAGIC_REQUIREMENT.to_be_bytes());
        buf.extend(&total_len.to_be_bytes());
        buf.extend(&REQUIREMENT_KIND_EXPRESSION.to_be_bytes());
        buf.extend(expr);
        buf
    }

    /// Requirement set holding only this designated requirement, ready for
    /// slot 0x0002 of the signature.
    pub fn to_requirements_blob(&self) -> Vec<u8> {
        let requirement = self.to_requirement_blob();
        // header (12) + one index entry (8)
        let offset = 20u32;
        let total_len = offset + requirement.len() as u32;

        let mut buf = Vec::with_capacity(total_len as usize);
        buf.extend(&CSMAGIC_REQUIREMENTS.to_be_bytes());
        buf.extend(&total_len.to_be_bytes());
        buf.extend(&1u32.to_be_bytes());
        buf.extend(&CSREQ_DESIGNATED.to_be_bytes());
        buf.extend(&offset.to_be_bytes());
        buf.extend(requirement);
        buf
    }

    /// Decode a requirement set produced by [`Self::to_requirements_blob`].
    ///
    /// Returns `None` for any other shape.
    pub fn parse_requirements_blob(data: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(data);
        if reader.u32()? != CSMAGIC_REQUIREMENTS {
            return None;
        }
        let _length = reader.u32()?;
        let count = reader.u32()?;

        for index in 0..count as usize {
            let mut entry = Reader::at(data, 12 + index * 8)?;
            let kind = entry.u32()?;
            let offset = entry.u32()? as usize;
            if kind == CSREQ_DESIGNATED {
                return Self::parse_requirement_blob(data.get(offset..)?);
            }
        }

        None
    }

    fn parse_requirement_blob(data: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(data);
        if reader.u32()? != CSMAGIC_REQUIREMENT {
            return None;
        }
        let _length = reader.u32()?;
        if reader.u32()? != REQUIREMENT_KIND_EXPRESSION {
            return None;
        }

        let mut ands = 0;
        while reader.peek_u32()? == OP_AND {
            reader.u32()?;
            ands += 1;
        }

        if reader.u32()? != OP_IDENT {
            return None;
        }
        let identifier = String::from_utf8(reader.data()?).ok()?;
        if reader.u32()? != OP_APPLE_GENERIC_ANCHOR {
            return None;
        }

        let mut requirement = Self::new(identifier);
        if ands == 2 {
            if reader.u32()? != OP_CERT_FIELD {
                return None;
            }
            let _slot = reader.u32()?;
            let _field = reader.data()?;
            if reader.u32()? != MATCH_EQUAL {
                return None;
            }
            requirement.leaf_common_name = Some(String::from_utf8(reader.data()?).ok()?);
        }

        Some(requirement)
    }
}

impl std::fmt::Display for DesignatedRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "identifier \"{}\" and anchor apple generic", self.identifier)?;
        if let Some(ref cn) = self.leaf_common_name {
            write!(f, " and certificate leaf[{SUBJECT_CN}] = \"{cn}\"")?;
        }
        Ok(())
    }
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend(&value.to_be_bytes());
}

/// Length-prefixed data, padded with zeros to a 4-byte boundary.
fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    push_u32(buf, data.len() as u32);
    buf.extend(data);
    let padding = (4 - data.len() % 4) % 4;
    buf.extend(std::iter::repeat(0u8).take(padding));
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at(data: &'a [u8], pos: usize) -> Option<Self> {
        (pos <= data.len()).then_some(Self { data, pos })
    }

    fn peek_u32(&self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    }

    fn u32(&mut self) -> Option<u32> {
        let value = self.peek_u32()?;
        self.pos += 4;
        Some(value)
    }

    fn data(&mut self) -> Option<Vec<u8>> {
        let len = self.u32()? as usize;
        let bytes = self.data.get(self.pos..self.pos + len)?.to_vec();
        self.pos += len + (4 - len % 4) % 4;
        Some(bytes)
    }
}
