//! Catalog data model
//!
//! The search API is loosely typed: some fields arrive as either a string
//! or a boolean, attributes as either a map or a list, and price tiers as
//! untyped arrays. Those fields are modelled as explicit variants here so
//! the rest of the crate never touches raw `serde_json::Value`s.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A leaf of the product taxonomy and the unit of crawl work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    #[serde(alias = "ID", default)]
    pub id: u64,

    #[serde(alias = "Name", default)]
    pub name: String,

    #[serde(alias = "URL", default)]
    pub url: String,

    /// Number of products the catalog claims for this subcategory
    #[serde(default)]
    pub product_num: u64,
}

/// A top-level category with its ordered subcategories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(flatten)]
    pub info: SubCategory,

    #[serde(alias = "Subs", default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<SubCategory>,
}

impl Category {
    /// Wraps a single subcategory id, as used when the tree fetch is skipped
    pub fn single(id: u64) -> Self {
        Self {
            info: SubCategory::default(),
            subs: vec![SubCategory {
                id,
                name: id.to_string(),
                ..SubCategory::default()
            }],
        }
    }

    /// Returns the units of work of this category in tree order
    ///
    /// A category without subcategories is itself a unit of work.
    pub fn units(&self) -> Vec<SubCategory> {
        if self.subs.is_empty() {
            vec![self.info.clone()]
        } else {
            self.subs.clone()
        }
    }
}

/// Flattens a category tree into subcategories in tree order
pub fn flatten(categories: &[Category]) -> Vec<SubCategory> {
    categories.iter().flat_map(Category::units).collect()
}

/// Descriptive part of a product record
///
/// The API sends `null` for absent values; those decode as defaults here
/// and in [`ProductRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
    /// Manufacturer part number
    #[serde(deserialize_with = "null_as_default")]
    pub number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub unit: String,
    /// Minimum order quantity
    #[serde(deserialize_with = "null_as_default")]
    pub min: i64,
    /// Maximum order quantity
    #[serde(deserialize_with = "null_as_default")]
    pub max: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub pre_unit: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub weight: f64,
    #[serde(rename = "packagemethod", deserialize_with = "null_as_default")]
    pub package_method: String,
    #[serde(deserialize_with = "null_as_default")]
    pub packaging: String,
    #[serde(deserialize_with = "null_as_default")]
    pub step: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
}

/// Manufacturer name and logo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manufacturer {
    #[serde(deserialize_with = "null_as_default")]
    pub en: String,
    #[serde(deserialize_with = "null_as_default")]
    pub logo: String,
}

/// The `auto_down` flag, sent either as a boolean or as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoDown {
    Flag(bool),
    Text(String),
}

/// Product attributes, sent either as a map or as a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attributes {
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
}

/// One row of the pricing table
///
/// The wire format is an untyped array whose first cell is the quantity
/// break and whose second cell is the unit price; either may be a number
/// or a numeric string. Parsed values are exposed as options and the raw
/// cells are kept so records serialize back to what the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<Value>")]
pub struct PriceTier {
    pub quantity: Option<u64>,
    pub unit_price: Option<f64>,
    cells: Vec<Value>,
}

impl PriceTier {
    /// The cells exactly as received
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

impl From<Vec<Value>> for PriceTier {
    fn from(cells: Vec<Value>) -> Self {
        let quantity = cells.first().and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let unit_price = cells.get(1).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
            _ => None,
        });
        Self {
            quantity,
            unit_price,
            cells,
        }
    }
}

impl From<PriceTier> for Vec<Value> {
    fn from(tier: PriceTier) -> Self {
        tier.cells
    }
}

/// A product as returned by the search API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    /// Catalog number
    #[serde(deserialize_with = "null_as_default")]
    pub number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub info: ProductInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub manufacturer: Manufacturer,
    #[serde(deserialize_with = "null_as_default")]
    pub stock: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<BTreeMap<String, String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub datasheet: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub package: String,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    pub auto_down: Option<AutoDown>,
    #[serde(deserialize_with = "null_as_default")]
    pub stock_sz: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub stock_js: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub stock_hk: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub hot_sort: i64,
    #[serde(alias = "Attributes")]
    pub attributes: Option<Attributes>,
    #[serde(deserialize_with = "null_as_default")]
    pub discount_type: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: Vec<PriceTier>,
}

impl ProductRecord {
    /// Every non-empty datasheet URL attached to this product
    pub fn datasheet_urls(&self) -> impl Iterator<Item = &str> {
        self.datasheet
            .values()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }
}

/// Raw body of a search API response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub code: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub result: SearchPayload,
}

/// The `result` object of a search response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub data: Vec<ProductRecord>,
    #[serde(deserialize_with = "number_or_string")]
    pub current_page: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub last_page: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub total_page: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
}

/// One fetched page of search results
#[derive(Debug, Clone)]
pub struct PageResult {
    pub success: bool,
    /// Server message; explains a refusal when `success` is false
    pub message: String,
    pub code: i64,
    pub items: Vec<ProductRecord>,
    pub current_page: u32,
    pub last_page: u32,
    pub total_pages: u32,
}

impl From<SearchResponse> for PageResult {
    fn from(response: SearchResponse) -> Self {
        Self {
            success: response.success,
            message: response.message,
            code: response.code,
            items: response.result.data,
            current_page: response.result.current_page,
            last_page: response.result.last_page,
            total_pages: response.result.total_page,
        }
    }
}

/// Treats an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a page number sent either as a JSON number or as a string
fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
        Null,
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Raw::Null => Ok(0),
    }
}
