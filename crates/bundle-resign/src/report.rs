//! Decoder for the human readable signature report printed by
//! `codesign -d -r- --verbose=20`.
//!
//! The report is a shallow tree. Each line is one of:
//!
//! ```text
//! designated => identifier "com.example" and anchor apple generic   (text)
//! CodeDirectory v=20400 size=1234 flags=0x0(none) hashes=3+5        (properties)
//! Identifier=com.example                                            (scalar)
//!     -5=969d263f74a5755cd3b4bede3f9e90c9fb0b7bca                   (indexed)
//! ```
//!
//! Indexed lines belong to the closest preceding top-level key and are
//! collected under its reserved [`INDEXED_KEY`] sub-key, one level deep.
//! A key seen again turns into a [`ReportValue::Repeated`] list. Lines that
//! match nothing are kept in [`Report::errors`] rather than dropped, since
//! verifiers print their complaints inline.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Sub-key holding indexed (`-N=...`) entries of a properties value.
pub const INDEXED_KEY: &str = "_";

static TEXT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w[\w\s.]+) => (.*)$").expect("valid regex"));

static PROPS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w[\w\s.]+)\s+((?:\w+=\S+\s*)+)$").expect("valid regex"));

static PROP_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)=(\S+)").expect("valid regex"));

static SCALAR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w[\w\s.]+)=(.*)$").expect("valid regex"));

static INDEXED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+(-?\d+)=(.*)$").expect("valid regex"));

/// A decoded report value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportValue {
    Scalar(String),
    Properties(BTreeMap<String, ReportValue>),
    /// Values of a key that appeared more than once, in report order.
    Repeated(Vec<ReportValue>),
}

impl ReportValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ReportValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_properties(&self) -> Option<&BTreeMap<String, ReportValue>> {
        match self {
            ReportValue::Properties(props) => Some(props),
            _ => None,
        }
    }

    /// Look up a property, or the indexed sub-mapping via [`INDEXED_KEY`].
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.as_properties()?.get(key)
    }

    /// Indexed entries attached to this value, keyed by their index text.
    pub fn indexed(&self) -> Option<&BTreeMap<String, ReportValue>> {
        self.get(INDEXED_KEY)?.as_properties()
    }

    /// Every occurrence of this value; one element unless repeated.
    pub fn occurrences(&self) -> Vec<&ReportValue> {
        match self {
            ReportValue::Repeated(values) => values.iter().collect(),
            other => vec![other],
        }
    }
}

/// A decoded report: top-level keys in sorted order plus unparsed lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: BTreeMap<String, ReportValue>,
    errors: Vec<String>,
}

impl Report {
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Scalar value of `key`, if it is a scalar.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_scalar()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Lines that matched no known form.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Decoding state threaded through each line.
#[derive(Debug, Default)]
struct ParserState {
    report: Report,
    /// Top-level key most recently inserted, target of indexed lines.
    last_key: Option<String>,
}

impl ParserState {
    fn insert(&mut self, key: String, value: ReportValue) {
        use std::collections::btree_map::Entry;

        match self.report.entries.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                ReportValue::Repeated(values) => values.push(value),
                existing => {
                    let first = std::mem::replace(existing, ReportValue::Repeated(Vec::new()));
                    *existing = ReportValue::Repeated(vec![first, value]);
                }
            },
        }

        self.last_key = Some(key);
    }

    /// Attach an indexed entry to the last key; `false` if there is nothing
    /// that can carry it.
    fn attach_indexed(&mut self, index: String, value: String) -> bool {
        let target = self
            .last_key
            .as_ref()
            .and_then(|key| self.report.entries.get_mut(key))
            .and_then(|value| match value {
                ReportValue::Repeated(values) => values.last_mut(),
                other => Some(other),
            });

        match target {
            Some(ReportValue::Properties(props)) => {
                let indexed = props
                    .entry(INDEXED_KEY.to_string())
                    .or_insert_with(|| ReportValue::Properties(BTreeMap::new()));
                match indexed {
                    ReportValue::Properties(entries) => {
                        entries.insert(index, ReportValue::Scalar(value));
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn error(&mut self, line: &str) {
        self.report.errors.push(line.to_string());
    }

    fn feed(&mut self, line: &str) {
        if let Some(caps) = TEXT_LINE.captures(line) {
            self.insert(caps[1].to_string(), ReportValue::Scalar(caps[2].to_string()));
        } else if let Some(caps) = PROPS_LINE.captures(line) {
            let props = PROP_PAIR
                .captures_iter(&caps[2])
                .map(|pair| (pair[1].to_string(), ReportValue::Scalar(pair[2].to_string())))
                .collect();
            self.insert(caps[1].to_string(), ReportValue::Properties(props));
        } else if let Some(caps) = SCALAR_LINE.captures(line) {
            self.insert(caps[1].to_string(), ReportValue::Scalar(caps[2].to_string()));
        } else if let Some(caps) = INDEXED_LINE.captures(line) {
            if !self.attach_indexed(caps[1].to_string(), caps[2].to_string()) {
                self.error(line);
            }
        } else {
            self.error(line);
        }
    }
}

/// Decode a verifier report.
pub fn parse(text: &str) -> Report {
    let mut state = ParserState::default();
    for line in text.lines() {
        state.feed(line);
    }
    state.report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: &str) -> ReportValue {
        ReportValue::Scalar(s.to_string())
    }

    #[test]
    fn test_parse_code_directory_with_indexed_hash() {
        let report = parse(
            "Executable=/a/b\n\
             Identifier=com.x\n\
             CodeDirectory v=20200 size=100 flags=0x0\n    \
             -1=aabbcc\n",
        );

        assert_eq!(report.scalar("Executable"), Some("/a/b"));
        assert_eq!(report.scalar("Identifier"), Some("com.x"));

        let mut indexed = BTreeMap::new();
        indexed.insert("-1".to_string(), scalar("aabbcc"));
        let mut expected = BTreeMap::new();
        expected.insert("v".to_string(), scalar("20200"));
        expected.insert("size".to_string(), scalar("100"));
        expected.insert("flags".to_string(), scalar("0x0"));
        expected.insert(INDEXED_KEY.to_string(), ReportValue::Properties(indexed));

        assert_eq!(report.get("CodeDirectory"), Some(&ReportValue::Properties(expected)));
        assert!(report.errors().is_empty());
    }

    #[test]
    fn test_text_line_takes_priority() {
        let report = parse("designated => identifier \"com.x\" and anchor apple generic");
        assert_eq!(
            report.scalar("designated"),
            Some("identifier \"com.x\" and anchor apple generic")
        );
    }

    #[test]
    fn test_keys_may_contain_spaces_and_dots() {
        let report = parse(
            "Sealed Resources version=2 rules=13 files=4\n\
             Info.plist entries=21\n\
             Signed Time=May 14, 2015, 7:12:25 PM\n",
        );

        let sealed = report.get("Sealed Resources").unwrap();
        assert_eq!(sealed.get("files"), Some(&scalar("4")));
        assert_eq!(report.get("Info.plist").unwrap().get("entries"), Some(&scalar("21")));
        assert_eq!(report.scalar("Signed Time"), Some("May 14, 2015, 7:12:25 PM"));
    }

    #[test]
    fn test_repeated_keys_become_ordered_list() {
        let report = parse(
            "Authority=iPhone Distribution: Example\n\
             Authority=Apple Worldwide Developer Relations Certification Authority\n\
             Authority=Apple Root CA\n",
        );

        assert_eq!(
            report.get("Authority"),
            Some(&ReportValue::Repeated(vec![
                scalar("iPhone Distribution: Example"),
                scalar("Apple Worldwide Developer Relations Certification Authority"),
                scalar("Apple Root CA"),
            ]))
        );
    }

    #[test]
    fn test_indexed_lines_attach_to_latest_repeated_value() {
        let report = parse(
            "Hash type=sha1 size=20\n    \
             -1=aa\n\
             Hash type=sha256 size=32\n    \
             -1=bb\n     \
             0=cc\n",
        );

        let hashes = report.get("Hash").unwrap().occurrences();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0].indexed().unwrap().get("-1"), Some(&scalar("aa")));
        let second = hashes[1].indexed().unwrap();
        assert_eq!(second.get("-1"), Some(&scalar("bb")));
        assert_eq!(second.get("0"), Some(&scalar("cc")));
    }

    #[test]
    fn test_unparsed_lines_are_collected() {
        let report = parse("Identifier=com.x\n/tmp/x: code object is not signed at all\n");

        assert_eq!(report.scalar("Identifier"), Some("com.x"));
        assert_eq!(report.errors(), &["/tmp/x: code object is not signed at all".to_string()]);
    }

    #[test]
    fn test_indexed_line_without_properties_is_error() {
        let report = parse("    -1=aa\nIdentifier=com.x\n    -2=bb\n");

        assert_eq!(report.errors().len(), 2);
        assert_eq!(report.scalar("Identifier"), Some("com.x"));
    }
}
