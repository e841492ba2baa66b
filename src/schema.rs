//! The decoded, typed view of a provider mapping payload: resource and
//! data-source tokens plus a per-field schema tree carrying the name
//! overrides, singleton flags, and asset markers that drive renaming.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderInfo {
    pub name: String,
    pub resources: BTreeMap<String, ResourceInfo>,
    pub data_sources: BTreeMap<String, ResourceInfo>,
    /// Provider configuration attributes, for `Pulumi.yaml` key renaming.
    pub config: BTreeMap<String, Schema>,
}

impl ProviderInfo {
    pub fn from_mapping(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A resource or data source: its PCL token and its field schemas.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceInfo {
    pub tok: String,
    pub fields: BTreeMap<String, Schema>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Unknown,
    String,
    Number,
    Int,
    Bool,
    List,
    Set,
    Map,
    Object,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Schema {
    /// Explicit name override for the field on the PCL side.
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: SchemaType,
    pub max_items_one: Option<bool>,
    pub max_items: Option<usize>,
    pub asset: Option<AssetTranslation>,
    /// Element schema for list/set/map types.
    pub elem: Option<Box<Elem>>,
}

impl Schema {
    /// A list- or set-typed field whose schema limits it to one element.
    pub fn single_element_collection(&self) -> bool {
        matches!(self.type_, SchemaType::List | SchemaType::Set) && self.max_items == Some(1)
    }
}

/// The element of a collection: either a plain schema or a nested object
/// described by its own field map. A map of `resource` elements is how the
/// source schema language spells a single nested object.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Elem {
    Schema(Box<Schema>),
    Resource(BTreeMap<String, Schema>),
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssetTranslation {
    File,
    Bytes,
    FileArchive,
    BytesArchive,
}

impl AssetTranslation {
    pub fn is_archive(&self) -> bool {
        matches!(self, AssetTranslation::FileArchive | AssetTranslation::BytesArchive)
    }
}
