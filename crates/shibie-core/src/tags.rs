//! # IOB Tags for Named Entity Recognition
//!
//! Defines the closed tag set used for sequence labeling of Chinese text.
//! Uses the IOB (Inside-Outside-Begin) scheme over four entity kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Entity kinds recognised by the tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Location,
    Organization,
    Person,
    Time,
}

impl EntityKind {
    /// All entity kinds in tag-index order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Location,
        EntityKind::Organization,
        EntityKind::Person,
        EntityKind::Time,
    ];

    /// Canonical upper-case name, as used in tag strings.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Location => "LOCATION",
            EntityKind::Organization => "ORGANIZATION",
            EntityKind::Person => "PERSON",
            EntityKind::Time => "TIME",
        }
    }

    /// Parse a kind name, accepting the common short forms.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LOCATION" | "LOC" => Some(EntityKind::Location),
            "ORGANIZATION" | "ORG" => Some(EntityKind::Organization),
            "PERSON" | "PER" => Some(EntityKind::Person),
            "TIME" | "T" => Some(EntityKind::Time),
            _ => None,
        }
    }

    fn ordinal(&self) -> usize {
        match self {
            EntityKind::Location => 0,
            EntityKind::Organization => 1,
            EntityKind::Person => 2,
            EntityKind::Time => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single IOB tag.
///
/// Index layout: `O` is 0, then `B-`/`I-` pairs for each kind in
/// [`EntityKind::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Outside,
    Begin(EntityKind),
    Inside(EntityKind),
}

impl Tag {
    /// Total number of distinct tags.
    pub const NUM_TAGS: usize = 1 + 2 * EntityKind::ALL.len();

    /// Get all tags in index order.
    pub fn all() -> [Tag; Tag::NUM_TAGS] {
        let mut tags = [Tag::Outside; Tag::NUM_TAGS];
        for kind in EntityKind::ALL {
            tags[Tag::Begin(kind).index()] = Tag::Begin(kind);
            tags[Tag::Inside(kind).index()] = Tag::Inside(kind);
        }
        tags
    }

    /// Get the tag index for tensor operations.
    pub fn index(&self) -> usize {
        match self {
            Tag::Outside => 0,
            Tag::Begin(kind) => 1 + 2 * kind.ordinal(),
            Tag::Inside(kind) => 2 + 2 * kind.ordinal(),
        }
    }

    /// Get tag from index.
    pub fn from_index(idx: usize) -> Option<Self> {
        if idx == 0 {
            return Some(Tag::Outside);
        }
        let kind = *EntityKind::ALL.get((idx - 1) / 2)?;
        if idx % 2 == 1 {
            Some(Tag::Begin(kind))
        } else {
            Some(Tag::Inside(kind))
        }
    }

    /// Like [`Tag::from_index`], with unknown indices mapped to `O`.
    pub fn from_index_or_outside(idx: usize) -> Self {
        Self::from_index(idx).unwrap_or(Tag::Outside)
    }

    /// Check if this is a "Begin" tag.
    pub fn is_begin(&self) -> bool {
        matches!(self, Tag::Begin(_))
    }

    /// Check if this is an "Inside" tag.
    pub fn is_inside(&self) -> bool {
        matches!(self, Tag::Inside(_))
    }

    /// Get the entity kind for this tag.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Tag::Outside => None,
            Tag::Begin(kind) | Tag::Inside(kind) => Some(*kind),
        }
    }
}

impl FromStr for Tag {
    type Err = std::convert::Infallible;

    /// Unknown tag strings parse as `O`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let tag = match s.split_once('-') {
            Some(("B", kind)) => EntityKind::from_name(kind).map(Tag::Begin),
            Some(("I", kind)) => EntityKind::from_name(kind).map(Tag::Inside),
            _ => None,
        };
        Ok(tag.unwrap_or(Tag::Outside))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Outside => write!(f, "O"),
            Tag::Begin(kind) => write!(f, "B-{kind}"),
            Tag::Inside(kind) => write!(f, "I-{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_index_roundtrip() {
        for (i, tag) in Tag::all().iter().enumerate() {
            assert_eq!(tag.index(), i);
            assert_eq!(Tag::from_index(i), Some(*tag));
        }
        assert_eq!(Tag::from_index(Tag::NUM_TAGS), None);
    }

    #[test]
    fn test_index_layout() {
        assert_eq!(Tag::NUM_TAGS, 9);
        assert_eq!(Tag::Outside.index(), 0);
        assert_eq!(Tag::Begin(EntityKind::Location).index(), 1);
        assert_eq!(Tag::Inside(EntityKind::Location).index(), 2);
        assert_eq!(Tag::Begin(EntityKind::Time).index(), 7);
        assert_eq!(Tag::Inside(EntityKind::Time).index(), 8);
    }

    #[test]
    fn test_name_roundtrip() {
        for tag in Tag::all() {
            let parsed: Tag = tag.to_string().parse().unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn test_short_forms() {
        assert_eq!("B-PER".parse::<Tag>().unwrap(), Tag::Begin(EntityKind::Person));
        assert_eq!("I-LOC".parse::<Tag>().unwrap(), Tag::Inside(EntityKind::Location));
        assert_eq!("B-ORG".parse::<Tag>().unwrap(), Tag::Begin(EntityKind::Organization));
        assert_eq!("I-T".parse::<Tag>().unwrap(), Tag::Inside(EntityKind::Time));
    }

    #[test]
    fn test_unknown_defaults_to_outside() {
        assert_eq!("B-MISC".parse::<Tag>().unwrap(), Tag::Outside);
        assert_eq!("X".parse::<Tag>().unwrap(), Tag::Outside);
        assert_eq!("".parse::<Tag>().unwrap(), Tag::Outside);
        assert_eq!(Tag::from_index_or_outside(42), Tag::Outside);
    }

    #[test]
    fn test_kind() {
        assert_eq!(Tag::Begin(EntityKind::Person).kind(), Some(EntityKind::Person));
        assert_eq!(Tag::Outside.kind(), None);
        assert!(Tag::Begin(EntityKind::Time).is_begin());
        assert!(!Tag::Inside(EntityKind::Time).is_begin());
        assert!(Tag::Inside(EntityKind::Time).is_inside());
        assert!(!Tag::Outside.is_inside());
    }
}
