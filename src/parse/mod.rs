//! Catalog page parsing
//!
//! Listing pages are HTML and yield entity ids; detail pages are XML and
//! yield structured records. Detail extraction never logs directly: each
//! parser returns its record together with the list of non-fatal anomalies
//! it tolerated, and the ingest boundary logs them aggregated per entity.

mod foodb;
mod hmdb;

pub use foodb::*;
pub use hmdb::*;

use crate::xml::Node;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A non-fatal extraction anomaly, reported instead of logged inline
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// An expected scalar field was absent or empty
    MissingField(&'static str),
    /// An expected section was absent entirely
    MissingSection(&'static str),
    /// A section was present but held no rows
    EmptySection(&'static str),
    /// A food row without a name was skipped
    FoodWithoutName,
    /// A food with none of average/max/min was not persisted
    NoQuantitativeData(String),
    /// A food whose max and min both parsed to zero was dropped
    ZeroedRange(String),
    /// A present value failed to parse as a number; the food was dropped
    UnparseableValue {
        food: String,
        field: &'static str,
        raw: String,
    },
    /// Non-value concentration fields that were nulled for being
    /// unspecified/unquantified (age and sex excepted)
    UnquantifiedFields(Vec<String>),
    /// A concentration field this schema does not carry was dropped
    UnknownField(String),
    /// A reference field this schema does not carry was dropped
    UnknownReferenceField(String),
}

/// Log an entity's anomalies, aggregated per kind
pub fn log_anomalies(source: &str, id: &str, anomalies: &[Anomaly]) {
    let mut no_data: Vec<&str> = Vec::new();
    let mut zeroed: Vec<&str> = Vec::new();
    let mut unknown: Vec<&str> = Vec::new();
    for anomaly in anomalies {
        match anomaly {
            Anomaly::MissingField(field) => warn!("{source} {id}: no {field}"),
            Anomaly::MissingSection(section) => warn!("{source} {id}: {section} missing"),
            Anomaly::EmptySection(section) => info!("{source} {id}: {section} empty"),
            Anomaly::FoodWithoutName => warn!("{source} {id}: food row without a name"),
            Anomaly::NoQuantitativeData(food) => no_data.push(food),
            Anomaly::ZeroedRange(food) => zeroed.push(food),
            Anomaly::UnparseableValue { food, field, raw } => {
                warn!("{source} {id}: {food}: {field} {raw:?} is not a number")
            }
            Anomaly::UnquantifiedFields(fields) => {
                warn!("{source} {id}: {} is not specified/quantified", fields.join(","))
            }
            Anomaly::UnknownField(field) | Anomaly::UnknownReferenceField(field) => {
                unknown.push(field)
            }
        }
    }
    if !no_data.is_empty() {
        info!("{source} {id}: foods with no data: {no_data:?}");
    }
    if !zeroed.is_empty() {
        info!("{source} {id}: foods with zeroed min/max: {zeroed:?}");
    }
    if !unknown.is_empty() {
        warn!("{source} {id}: dropped unknown fields: {unknown:?}");
    }
}

/// Trimmed, non-empty scalar content of a node
pub(crate) fn scalar(node: &Node) -> Option<String> {
    node.string_content()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract compound ids from a FooDB catalog listing page
pub fn extract_foodb_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut ids = Vec::new();
    if let Ok(selector) = Selector::parse("a.btn-show") {
        for link in document.select(&selector) {
            let id = link.text().collect::<String>().trim().to_string();
            if !id.is_empty() {
                ids.push(id);
            }
        }
    }
    ids
}

/// Extract metabolite ids from an HMDB catalog listing page
pub fn extract_hmdb_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut ids = Vec::new();
    if let Ok(selector) = Selector::parse("td.metabolite-link a") {
        for link in document.select(&selector) {
            let id = link.text().collect::<String>().trim().to_string();
            if !id.is_empty() {
                ids.push(id);
            }
        }
    }
    ids
}

/// Extract the category -> food names map from a FooDB food listing page.
///
/// Each food row carries a show link; the food name sits in the second cell
/// and the food group in the fifth.
pub fn extract_food_catalog(html: &str) -> BTreeMap<String, Vec<String>> {
    let document = Html::parse_document(html);
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let (Ok(row_selector), Ok(cell_selector), Ok(show_selector)) = (
        Selector::parse("tr"),
        Selector::parse("td"),
        Selector::parse("a.btn-show"),
    ) else {
        return map;
    };

    for row in document.select(&row_selector) {
        if row.select(&show_selector).next().is_none() {
            continue;
        }
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 5 {
            continue;
        }
        let name = cells[1].text().collect::<String>().trim().to_string();
        let category = cells[4].text().collect::<String>().trim().to_string();
        if name.is_empty() || category.is_empty() {
            continue;
        }
        map.entry(category).or_default().push(name);
    }
    map
}
