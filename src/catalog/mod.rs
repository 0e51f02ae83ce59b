//! The product catalog: data model and the category tree fetch

mod fetcher;
mod types;

pub use fetcher::{parse_category_payload, CategoryFetcher};
pub use types::{
    flatten, Attributes, AutoDown, Category, Manufacturer, PageResult, PriceTier, ProductInfo,
    ProductRecord, SearchPayload, SearchResponse, SubCategory,
};
