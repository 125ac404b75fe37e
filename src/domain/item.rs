use std::collections::BTreeMap;

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::ItemId;

/// A raw item record, as produced by an authoring front-end.
///
/// Records are unvalidated. They become [`Item`]s once accepted by an
/// [`ItemStore`](crate::ItemStore).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemRecord {
    /// The item ID. May be omitted when IDs are not required, in which case
    /// one is generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The item type's directive (e.g. `sys_req`).
    #[serde(alias = "type")]
    pub directive: String,
    /// Optional short title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Optional free-text body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Extra options, keyed by option name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Outgoing links, in authored order.
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// An outgoing link on a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The link type's option name (e.g. `satisfies`).
    pub option: String,
    /// The ID of the item the link points to.
    #[serde(alias = "target_id")]
    pub target: String,
}

impl ItemRecord {
    /// Creates a record with an explicit ID and no attributes or links.
    #[must_use]
    pub fn new(id: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            directive: directive.into(),
            ..Self::default()
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the body content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Adds (or replaces) an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Appends an outgoing link.
    #[must_use]
    pub fn with_link(mut self, option: impl Into<String>, target: impl Into<String>) -> Self {
        self.links.push(LinkRecord {
            option: option.into(),
            target: target.into(),
        });
        self
    }

    /// Hash-derived ID suffix of `len` uppercase hex characters.
    ///
    /// The hash covers the directive, title and content, so the same record
    /// always receives the same generated ID.
    ///
    /// # Panics
    ///
    /// Panics if borsh serialization fails (which should never happen for this
    /// data structure).
    #[must_use]
    pub fn id_hash(&self, len: usize) -> String {
        #[derive(BorshSerialize)]
        struct IdData<'a> {
            directive: &'a str,
            title: &'a str,
            content: &'a str,
        }

        let data = IdData {
            directive: &self.directive,
            title: &self.title,
            content: &self.content,
        };
        let encoded = borsh::to_vec(&data).expect("this should never fail");
        let hash = format!("{:X}", Sha256::digest(encoded));
        hash.chars().take(len).collect()
    }
}

/// A validated requirement or architecture item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) directive: String,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) links: Vec<Link>,
}

/// A typed outgoing link from one item to another.
///
/// Only outgoing links are stored; incoming links are derived from the
/// store or graph on demand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Link {
    /// The link type's option name.
    pub option: String,
    /// The target item's ID, exactly as authored. It is not guaranteed to
    /// resolve until links have been validated.
    pub target: String,
}

impl Item {
    /// The item's unique ID.
    #[must_use]
    pub const fn id(&self) -> &ItemId {
        &self.id
    }

    /// The directive of the item's type.
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// The item's title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The item's body content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The item's extra options.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Look up a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Outgoing links, in authored order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Returns a value generated by hashing the content of the item.
    ///
    /// The fingerprint covers the title, content and attributes (not the ID,
    /// type or links). Downstream consumers compare fingerprints across
    /// exports to detect items that changed.
    ///
    /// # Panics
    ///
    /// Panics if borsh serialization fails (which should never happen for this
    /// data structure).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(BorshSerialize)]
        struct FingerprintData<'a> {
            title: &'a str,
            content: &'a str,
            attributes: &'a BTreeMap<String, String>,
        }

        let data = FingerprintData {
            title: &self.title,
            content: &self.content,
            attributes: &self.attributes,
        };

        // encode using [borsh](https://borsh.io/)
        let encoded = borsh::to_vec(&data).expect("this should never fail");

        format!("{:x}", Sha256::digest(encoded))
    }
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            id: Some(item.id.to_string()),
            directive: item.directive.clone(),
            title: item.title.clone(),
            content: item.content.clone(),
            attributes: item.attributes.clone(),
            links: item
                .links
                .iter()
                .map(|link| LinkRecord {
                    option: link.option.clone(),
                    target: link.target.clone(),
                })
                .collect(),
        }
    }
}
