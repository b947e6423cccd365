//! Default values for configuration

use std::path::PathBuf;

/// Default SQLite database file
pub fn default_db_path() -> PathBuf {
    PathBuf::from("foodome.db")
}

/// Default concurrent entity ingestions in flight
pub fn default_concurrency() -> usize {
    10
}

/// Default request timeout in seconds
pub fn default_timeout_secs() -> u64 {
    240
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("foodome/{} (Compound Catalog Crawler)", env!("CARGO_PKG_VERSION"))
}

/// FooDB compound catalog listing, quantified compounds only
pub fn default_foodb_catalog_url() -> String {
    "https://foodb.ca/compounds?filter=true&quantified=1&page=".to_string()
}

/// FooDB compound detail page prefix
pub fn default_foodb_detail_url() -> String {
    "https://foodb.ca/compounds/".to_string()
}

pub fn default_foodb_start_page() -> u32 {
    1
}

pub fn default_foodb_end_page() -> u32 {
    151
}

/// HMDB metabolite catalog listing, food-sourced quantified metabolites
pub fn default_hmdb_catalog_url() -> String {
    "https://hmdb.ca/metabolites?blood=1&c=hmdb_id&d=up&filter=true&food=1&quantified=1&page="
        .to_string()
}

/// HMDB metabolite detail page prefix (an ".xml" suffix is appended per id)
pub fn default_hmdb_detail_url() -> String {
    "https://hmdb.ca/metabolites/".to_string()
}

pub fn default_hmdb_start_page() -> u32 {
    1
}

pub fn default_hmdb_end_page() -> u32 {
    87
}

/// FooDB food catalog listing, grouped by food group
pub fn default_food_catalog_url() -> String {
    "https://foodb.ca/foods?button=&c=food_group&d=up&page=".to_string()
}

pub fn default_food_catalog_pages() -> u32 {
    32
}

/// Path of the JSON snapshot written during a food catalog import
pub fn default_food_map_snapshot() -> PathBuf {
    PathBuf::from("cache/food_map.json")
}
