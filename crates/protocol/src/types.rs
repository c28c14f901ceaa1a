use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_NAMESPACE;

/// Error returned when parsing protocol values from strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid file id: {0}")]
    FileId(String),

    #[error("invalid attribute kind: {0}")]
    AttributeKind(String),
}

/// Opaque identifier assigned by the remote store to an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(FileId)
            .map_err(|_| ParseError::FileId(s.to_string()))
    }
}

impl From<u64> for FileId {
    fn from(v: u64) -> Self {
        FileId(v)
    }
}

/// Kind of a file attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Tag,
    Group,
}

impl AttributeKind {
    /// Returns the wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tag",
            AttributeKind::Group => "group",
        }
    }
}

impl FromStr for AttributeKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tag" | "tags" => Ok(AttributeKind::Tag),
            "group" | "groups" => Ok(AttributeKind::Group),
            other => Err(ParseError::AttributeKind(other.to_string())),
        }
    }
}

/// A tag or group attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Attribute {
    Tag(String),
    Group(String),
}

impl Attribute {
    /// Builds an attribute of the given kind.
    pub fn new(kind: AttributeKind, name: impl Into<String>) -> Self {
        match kind {
            AttributeKind::Tag => Attribute::Tag(name.into()),
            AttributeKind::Group => Attribute::Group(name.into()),
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Tag(_) => AttributeKind::Tag,
            Attribute::Group(_) => AttributeKind::Group,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Attribute::Tag(name) | Attribute::Group(name) => name,
        }
    }
}

/// Namespace plus tags and groups applied to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttributes {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            attributes: Vec::new(),
        }
    }
}

impl FileAttributes {
    /// Creates attributes in `namespace` with no tags or groups.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute, ignoring exact duplicates and empty names.
    pub fn add(&mut self, attribute: Attribute) {
        if attribute.name().trim().is_empty() || self.attributes.contains(&attribute) {
            return;
        }
        self.attributes.push(attribute);
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, attribute: Attribute) -> Self {
        self.add(attribute);
        self
    }

    /// Returns the names of all attributes of `kind`.
    pub fn names(&self, kind: AttributeKind) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.kind() == kind)
            .map(Attribute::name)
            .collect()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.names(AttributeKind::Tag)
    }

    pub fn groups(&self) -> Vec<&str> {
        self.names(AttributeKind::Group)
    }
}

/// Identifies a remote file to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileLocator {
    /// By remote identifier.
    Id(FileId),
    /// By name within a namespace.
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
    /// By public share name.
    PublicName(String),
}

impl fmt::Display for FileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileLocator::Id(id) => write!(f, "#{id}"),
            FileLocator::Name {
                name,
                namespace: Some(ns),
            } => write!(f, "{ns}/{name}"),
            FileLocator::Name {
                name,
                namespace: None,
            } => write!(f, "{name}"),
            FileLocator::PublicName(name) => write!(f, "public:{name}"),
        }
    }
}

impl FromStr for FileLocator {
    type Err = std::convert::Infallible;

    /// Numeric strings become [`FileLocator::Id`], everything else a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<FileId>() {
            return Ok(FileLocator::Id(id));
        }
        Ok(FileLocator::Name {
            name: s.to_string(),
            namespace: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_parse_and_display() {
        let id: FileId = " 42 ".parse().unwrap();
        assert_eq!(id, FileId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<FileId>().is_err());
    }

    #[test]
    fn attribute_kind_is_exhaustive() {
        let tag = Attribute::new(AttributeKind::Tag, "music");
        let group = Attribute::new(AttributeKind::Group, "family");
        assert_eq!(tag.kind(), AttributeKind::Tag);
        assert_eq!(group.kind(), AttributeKind::Group);
        assert_eq!(tag.name(), "music");
        assert_eq!("Groups".parse::<AttributeKind>().unwrap(), AttributeKind::Group);
        assert!("label".parse::<AttributeKind>().is_err());
    }

    #[test]
    fn attributes_skip_duplicates_and_empty() {
        let attrs = FileAttributes::default()
            .with(Attribute::Tag("a".into()))
            .with(Attribute::Tag("a".into()))
            .with(Attribute::Tag("  ".into()))
            .with(Attribute::Group("a".into()));
        assert_eq!(attrs.tags(), vec!["a"]);
        assert_eq!(attrs.groups(), vec!["a"]);
        assert_eq!(attrs.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn attribute_json_shape() {
        let json = serde_json::to_string(&Attribute::Group("ops".into())).unwrap();
        assert_eq!(json, r#"{"kind":"group","name":"ops"}"#);
    }

    #[test]
    fn locator_from_str() {
        assert_eq!(
            "17".parse::<FileLocator>().unwrap(),
            FileLocator::Id(FileId(17))
        );
        assert_eq!(
            "notes.txt".parse::<FileLocator>().unwrap(),
            FileLocator::Name {
                name: "notes.txt".into(),
                namespace: None
            }
        );
    }
}
