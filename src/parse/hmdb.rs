//! HMDB metabolite detail parsing (source B)

use super::{scalar, Anomaly};
use crate::error::Result;
use crate::xml::{self, Node};

/// Sentinel strings HMDB uses for absent values
const UNQUANTIFIED: [&str; 2] = ["Not Specified", "Not Quantified"];

/// A bibliographic reference attached to a concentration row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceRow {
    pub reference_text: Option<String>,
    pub pubmed_id: Option<String>,
}

/// One quantified concentration observation.
///
/// Fixed shape: heterogeneous source column names are normalized into this
/// attribute set at parse time and absent fields stay `None` all the way to
/// the store, which persists them as NULL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConcentrationRow {
    pub biospecimen: Option<String>,
    pub value: String,
    pub units: Option<String>,
    pub age: Option<String>,
    pub sex: Option<String>,
    pub condition: Option<String>,
    pub comment: Option<String>,
    pub references: Vec<ReferenceRow>,
}

/// One parsed HMDB metabolite detail document
#[derive(Debug, Clone, Default)]
pub struct HmdbRecord {
    pub name: Option<String>,
    /// Embedded FooDB cross-reference, when the page carries one
    pub foodb_id: Option<String>,
    pub biospecimens: Vec<String>,
    pub normal: Vec<ConcentrationRow>,
    pub abnormal: Vec<ConcentrationRow>,
    pub anomalies: Vec<Anomaly>,
}

/// Parse an HMDB metabolite detail document
pub fn parse_hmdb_document(text: &str) -> Result<HmdbRecord> {
    let root = xml::parse(text)?;
    let mut record = HmdbRecord::default();
    record.name = extract_name(&root, &mut record.anomalies);
    record.foodb_id = root.find("foodb_id").and_then(scalar);
    record.biospecimens = extract_biospecimens(&root, &mut record.anomalies);
    record.normal = extract_concentrations(&root, true, &mut record.anomalies);
    record.abnormal = extract_concentrations(&root, false, &mut record.anomalies);
    Ok(record)
}

/// Trimmed metabolite name; absent field is a soft failure
pub fn extract_name(root: &Node, anomalies: &mut Vec<Anomaly>) -> Option<String> {
    match root.find("name").and_then(scalar) {
        Some(name) => Some(name),
        None => {
            anomalies.push(Anomaly::MissingField("name"));
            None
        }
    }
}

/// Biospecimen location names; an absent section yields nothing
pub fn extract_biospecimens(root: &Node, anomalies: &mut Vec<Anomaly>) -> Vec<String> {
    let Some(section) = root.find("biospecimen_locations") else {
        anomalies.push(Anomaly::MissingSection("biospecimen_locations"));
        return Vec::new();
    };
    section
        .find_all("biospecimen")
        .iter()
        .map(|n| n.text().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Map heterogeneous source column names onto the fixed attribute set
fn normalize_column(name: &str) -> &str {
    match name {
        "subject_age" | "patient_age" => "age",
        "subject_sex" | "patient_sex" => "sex",
        "subject_condition" | "patient_information" => "condition",
        "concentration_value" => "value",
        "concentration_units" => "units",
        other => other,
    }
}

/// Extract the normal or abnormal concentration table.
///
/// Only immediate `concentration` children of the section are rows, and
/// only a row's immediate element children are fields; the nested
/// `references` list is handled separately and never read as a scalar.
/// A row whose value field is absent or a sentinel is discarded whole.
pub fn extract_concentrations(
    root: &Node,
    normal: bool,
    anomalies: &mut Vec<Anomaly>,
) -> Vec<ConcentrationRow> {
    let section_name = if normal {
        "normal_concentrations"
    } else {
        "abnormal_concentrations"
    };
    let Some(section) = root.find(section_name) else {
        anomalies.push(Anomaly::MissingSection(section_name));
        return Vec::new();
    };

    let rows: Vec<&Node> = section.children_named("concentration").collect();
    if rows.is_empty() {
        anomalies.push(Anomaly::EmptySection(section_name));
        return Vec::new();
    }

    let mut out = Vec::new();
    for row in rows {
        let mut conc = ConcentrationRow::default();
        let mut value: Option<String> = None;
        let mut quantified = true;
        let mut nulled: Vec<String> = Vec::new();

        for field in row.child_elements() {
            if field.name == "references" {
                for reference in field.children_named("reference") {
                    conc.references.push(extract_reference(reference, anomalies));
                }
                continue;
            }

            let column = normalize_column(&field.name);
            let content = scalar(field);
            let unquantified = match content.as_deref() {
                None => true,
                Some(text) => UNQUANTIFIED.contains(&text),
            };

            if unquantified {
                if column == "value" {
                    quantified = false;
                    break;
                }
                if column != "age" && column != "sex" {
                    nulled.push(column.to_string());
                }
                continue;
            }

            let text = content.unwrap_or_default();
            match column {
                "biospecimen" => conc.biospecimen = Some(text),
                "value" => value = Some(text),
                "units" => conc.units = Some(text),
                "age" => conc.age = Some(text),
                "sex" => conc.sex = Some(text),
                "condition" => conc.condition = Some(text),
                "comment" => conc.comment = Some(text),
                other => anomalies.push(Anomaly::UnknownField(other.to_string())),
            }
        }

        // A row that never carried a value field at all is just as
        // unquantified as a sentinel one.
        let Some(value) = value else {
            continue;
        };
        if quantified {
            if !nulled.is_empty() {
                anomalies.push(Anomaly::UnquantifiedFields(nulled));
            }
            conc.value = value;
            out.push(conc);
        }
    }
    out
}

fn extract_reference(node: &Node, anomalies: &mut Vec<Anomaly>) -> ReferenceRow {
    let mut row = ReferenceRow::default();
    for field in node.child_elements() {
        match field.name.as_str() {
            "reference_text" => {
                let text = field.text().trim().to_string();
                if !text.is_empty() {
                    row.reference_text = Some(text);
                }
            }
            "pubmed_id" => row.pubmed_id = scalar(field),
            other => anomalies.push(Anomaly::UnknownReferenceField(other.to_string())),
        }
    }
    row
}
