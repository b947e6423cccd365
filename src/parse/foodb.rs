//! FooDB compound detail parsing (source A)

use super::{scalar, Anomaly};
use crate::error::Result;
use crate::xml::{self, Node};
use std::collections::BTreeMap;

/// Observed concentration range of a compound in one food
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FoodValues {
    pub average: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

/// One parsed FooDB compound detail document
#[derive(Debug, Clone, Default)]
pub struct FoodbRecord {
    pub name: Option<String>,
    pub class: Option<String>,
    /// food name -> surviving quantitative values
    pub foods: BTreeMap<String, FoodValues>,
    pub anomalies: Vec<Anomaly>,
}

/// Parse a FooDB compound detail document
pub fn parse_foodb_document(text: &str) -> Result<FoodbRecord> {
    let root = xml::parse(text)?;
    let mut record = FoodbRecord::default();
    record.name = extract_name(&root, &mut record.anomalies);
    record.class = extract_class(&root, &mut record.anomalies);
    record.foods = extract_foods(&root, &mut record.anomalies);
    Ok(record)
}

/// Trimmed compound name; absent field is a soft failure
pub fn extract_name(root: &Node, anomalies: &mut Vec<Anomaly>) -> Option<String> {
    match root.find("name").and_then(scalar) {
        Some(name) => Some(name),
        None => {
            anomalies.push(Anomaly::MissingField("name"));
            None
        }
    }
}

/// Trimmed compound class label; same contract as the name
pub fn extract_class(root: &Node, anomalies: &mut Vec<Anomaly>) -> Option<String> {
    match root.find("class").and_then(scalar) {
        Some(class) => Some(class),
        None => {
            anomalies.push(Anomaly::MissingField("class"));
            None
        }
    }
}

/// Extract the food -> values map from the document's food table.
///
/// A missing table aborts food extraction for the entity. Per row: a row
/// without a name is skipped; a row with none of the three values is
/// recorded as "no quantitative data" and not persisted; any present value
/// that is not a number drops the row; a row whose max and min are both
/// exactly zero is vacuous and dropped.
pub fn extract_foods(root: &Node, anomalies: &mut Vec<Anomaly>) -> BTreeMap<String, FoodValues> {
    let mut foods = BTreeMap::new();
    let Some(table) = root.find("foods") else {
        anomalies.push(Anomaly::MissingSection("foods"));
        return foods;
    };

    'rows: for row in table.find_all("food") {
        let Some(name) = row.find("name").and_then(scalar) else {
            anomalies.push(Anomaly::FoodWithoutName);
            continue;
        };

        let raw_average = row.find("average_value").and_then(scalar);
        let raw_max = row.find("max_value").and_then(scalar);
        let raw_min = row.find("min_value").and_then(scalar);

        if raw_average.is_none() && raw_max.is_none() && raw_min.is_none() {
            anomalies.push(Anomaly::NoQuantitativeData(name));
            continue;
        }

        let mut values = FoodValues::default();
        for (field, raw, slot) in [
            ("average_value", raw_average, &mut values.average),
            ("max_value", raw_max, &mut values.max),
            ("min_value", raw_min, &mut values.min),
        ] {
            if let Some(raw) = raw {
                match raw.parse::<f64>() {
                    Ok(v) => *slot = Some(v),
                    Err(_) => {
                        anomalies.push(Anomaly::UnparseableValue {
                            food: name.clone(),
                            field,
                            raw,
                        });
                        continue 'rows;
                    }
                }
            }
        }

        if values.min == Some(0.0) && values.max == Some(0.0) {
            anomalies.push(Anomaly::ZeroedRange(name));
            continue;
        }

        foods.insert(name, values);
    }
    foods
}
