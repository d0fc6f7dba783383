//! Annotation tags attached to schema nodes
//!
//! A tag attributes a schema node to a semantic slot (`class` / `property`) and
//! carries traversal flags. It is read from the `x-apiplan` extension of the
//! schema object when present, otherwise from a `<meqa ...>` marker embedded in
//! the human-readable `description`:
//!
//! ```text
//! <meqa Pet.name>          class "Pet", property "name"
//! <meqa Pet weak>          class "Pet", weak edge
//! <meqa Pet.owner,weak>    both
//! <meqa weak>              weak edge only
//! ```
//!
//! The first token is `Class` or `Class.property` unless it is a flag name.
//! Remaining tokens are flags separated by whitespace or commas. The
//! extension value may be written with or without the surrounding marker.

use serde_json::Value;

/// Schema extension carrying the tag, preferred over `description`.
pub const TAG_EXTENSION: &str = "x-apiplan";

const MARKER_OPEN: &str = "<meqa";
const MARKER_CLOSE: char = '>';
const WEAK_FLAG: &str = "weak";

/// Bit set of tag flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TagFlags(u32);

impl TagFlags {
    /// The edge into this node is skipped by default traversal.
    pub const WEAK: Self = Self(1);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Parsed annotation of a schema node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTag {
    pub class: String,
    pub property: String,
    pub flags: TagFlags,
}

impl SchemaTag {
    /// Read the tag of a raw schema object.
    ///
    /// The `x-apiplan` extension wins over `description`.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Option<Self> {
        if let Some(ext) = schema.get(TAG_EXTENSION).and_then(Value::as_str) {
            return if ext.contains(MARKER_OPEN) {
                Self::parse(ext)
            } else {
                parse_body(ext)
            };
        }
        schema
            .get("description")
            .and_then(Value::as_str)
            .and_then(Self::parse)
    }

    /// Find and parse the first `<meqa ...>` marker in `text`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut rest = text;
        while let Some(start) = rest.find(MARKER_OPEN) {
            let after = &rest[start + MARKER_OPEN.len()..];
            // `<meqafoo>` is not a marker
            match after.chars().next() {
                Some(c) if c.is_whitespace() || c == MARKER_CLOSE => {
                    let end = after.find(MARKER_CLOSE)?;
                    return parse_body(&after[..end]);
                }
                _ => rest = after,
            }
        }
        None
    }

    #[must_use]
    pub const fn is_weak(&self) -> bool {
        self.flags.contains(TagFlags::WEAK)
    }

    /// Key under which tagged scalar values are collected: `class.property`.
    #[must_use]
    pub fn slot(&self) -> Option<String> {
        if self.class.is_empty() || self.property.is_empty() {
            None
        } else {
            Some(format!("{}.{}", self.class, self.property))
        }
    }
}

fn parse_body(body: &str) -> Option<SchemaTag> {
    let mut tokens = body
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    let first = tokens.next()?;
    let mut tag = SchemaTag::default();
    if !apply_flag(&mut tag.flags, first) {
        match first.split_once('.') {
            Some((class, property)) => {
                tag.class = class.to_string();
                tag.property = property.to_string();
            }
            None => tag.class = first.to_string(),
        }
    }
    for token in tokens {
        if !apply_flag(&mut tag.flags, token) {
            log::debug!("ignoring unknown schema tag flag '{token}'");
        }
    }
    Some(tag)
}

fn apply_flag(flags: &mut TagFlags, token: &str) -> bool {
    if token.eq_ignore_ascii_case(WEAK_FLAG) {
        flags.insert(TagFlags::WEAK);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_class_and_property() {
        let tag = SchemaTag::parse("The pet's name <meqa Pet.name>").unwrap();
        assert_eq!(tag.class, "Pet");
        assert_eq!(tag.property, "name");
        assert!(!tag.is_weak());
        assert_eq!(tag.slot().as_deref(), Some("Pet.name"));
    }

    #[test]
    fn parses_weak_flag_after_class() {
        let tag = SchemaTag::parse("<meqa Pet.owner,weak>").unwrap();
        assert_eq!(tag.class, "Pet");
        assert_eq!(tag.property, "owner");
        assert!(tag.is_weak());
    }

    #[test]
    fn flag_only_marker() {
        let tag = SchemaTag::parse("back-reference <meqa weak>").unwrap();
        assert!(tag.class.is_empty());
        assert!(tag.is_weak());
        assert_eq!(tag.slot(), None);
    }

    #[test]
    fn class_without_property_has_no_slot() {
        let tag = SchemaTag::parse("<meqa User>").unwrap();
        assert_eq!(tag.class, "User");
        assert_eq!(tag.slot(), None);
    }

    #[test]
    fn no_marker_no_tag() {
        assert_eq!(SchemaTag::parse("just a description"), None);
        assert_eq!(SchemaTag::parse("<meqafoo Pet.name>"), None);
    }

    #[test]
    fn unterminated_marker_is_ignored() {
        assert_eq!(SchemaTag::parse("<meqa Pet.name"), None);
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let tag = SchemaTag::parse("<meqa Pet.id primary weak>").unwrap();
        assert!(tag.is_weak());
        assert_eq!(tag.property, "id");
    }

    #[test]
    fn extension_wins_over_description() {
        let schema = json!({
            "type": "string",
            "description": "<meqa Pet.name>",
            "x-apiplan": "Owner.name weak"
        });
        let tag = SchemaTag::from_schema(&schema).unwrap();
        assert_eq!(tag.class, "Owner");
        assert!(tag.is_weak());
    }

    #[test]
    fn description_fallback() {
        let schema = json!({"type": "string", "description": "id <meqa Pet.id>"});
        let tag = SchemaTag::from_schema(&schema).unwrap();
        assert_eq!(tag.slot().as_deref(), Some("Pet.id"));
    }

    #[test]
    fn flags_bits() {
        let mut flags = TagFlags::empty();
        assert_eq!(flags.bits(), 0);
        flags.insert(TagFlags::WEAK);
        assert!(flags.contains(TagFlags::WEAK));
        assert_eq!(flags.bits(), 1);
    }
}
