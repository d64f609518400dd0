// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Flatten transformation (`spec.md` §4.8): walks one `<iati-activities>`
//! document and produces one JSON record per `<iati-activity>`, the shape
//! the Solrize stage later posts to the search index.

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::services::FlattenService;
use iati_pipeline_domain::value_objects::{normalize_identifier, FlattenedField, FlattenedRecord};

/// Canonical names reparsed and reformatted to `YYYY-MM-DDTHH:MM:SS.mmmZ`;
/// matched by substring per `spec.md` §4.8.
const DATE_NAME_MARKERS: &[&str] = &["date", "datetime", "_dt"];

const CURRENCY_VALUE_FIELDS: &[&str] = &["budget_value", "transaction_value", "planned_disbursement_value"];

/// `quick-xml` based [`FlattenService`] implementation (`spec.md` §4.8).
pub struct QuickXmlFlattenService {
    explode_elements: HashSet<String>,
}

impl QuickXmlFlattenService {
    pub fn new(explode_elements: Vec<String>) -> Self {
        Self { explode_elements: explode_elements.into_iter().collect() }
    }

    fn flatten_activity(&self, root: &XmlNode, namespaces: &HashMap<String, String>) -> PipelineResult<Map<String, Value>> {
        let mut record = Map::new();
        let default_currency = root.attributes.get("default-currency").or_else(|| root.attributes.get("default_currency")).cloned();

        walk(root, "", namespaces, &mut record, &self.explode_elements, default_currency.as_deref());

        if let Some(Value::String(id)) = record.get_mut("iati_identifier") {
            *id = normalize_identifier(id);
        }
        Ok(record)
    }
}

impl FlattenService for QuickXmlFlattenService {
    /// Parses `xml` and returns one flattened record per `<iati-activity>`.
    /// Fails with [`PipelineError::SourceCorrupt`] when the root element is
    /// not `iati-activities`, per `spec.md` §4.8.
    fn flatten(&self, xml: &[u8]) -> PipelineResult<Vec<FlattenedRecord>> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut dataset_attrs: Map<String, Value> = Map::new();
        let mut activities: Vec<Map<String, Value>> = Vec::new();
        let mut namespaces: HashMap<String, String> = HashMap::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
            match event {
                Event::Eof => break,
                Event::Start(start) if local_name(&start) == "iati-activities" => {
                    collect_namespaces(&start, &mut namespaces);
                    for attr in start.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).replace(['-', ':'], "_");
                        let value = attr.unescape_value().unwrap_or_default().to_string();
                        match key.as_str() {
                            "version" => {
                                dataset_attrs.insert("dataset_version".into(), Value::String(value));
                            }
                            "generated_datetime" => {
                                dataset_attrs.insert("dataset_generated_datetime".into(), Value::String(reformat_date(&value).unwrap_or(value)));
                            }
                            "linked_data_default" => {
                                dataset_attrs.insert("dataset_linked_data_default".into(), Value::String(value));
                            }
                            _ => {}
                        }
                    }
                }
                Event::Start(start) if local_name(&start) == "iati-activity" => {
                    let mut owned_buf = Vec::new();
                    let subtree = capture_subtree(&mut reader, start.to_owned(), &mut owned_buf)?;
                    let mut record = self.flatten_activity(&subtree, &namespaces)?;
                    for (key, value) in &dataset_attrs {
                        record.insert(key.clone(), value.clone());
                    }
                    activities.push(record);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if activities.is_empty() && dataset_attrs.is_empty() {
            return Err(PipelineError::SourceCorrupt("root element is not iati-activities".into()));
        }
        Ok(activities.into_iter().map(into_flattened_record).collect())
    }
}

/// Converts the `serde_json::Value`-based record [`walk`] builds into the
/// domain's typed [`FlattenedRecord`] shape: a second pass over an
/// otherwise-finished tree, not a change to the transformation logic above.
fn into_flattened_record(map: Map<String, Value>) -> FlattenedRecord {
    map.into_iter().map(|(key, value)| (key, into_flattened_field(value))).collect()
}

fn into_flattened_field(value: Value) -> FlattenedField {
    match value {
        Value::String(s) => FlattenedField::Scalar(s),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            FlattenedField::SubRecords(items.into_iter().filter_map(|item| item.as_object().cloned()).map(into_flattened_record).collect())
        }
        Value::Array(items) => FlattenedField::List(items.into_iter().filter_map(|item| item.as_str().map(str::to_string)).collect()),
        _ => FlattenedField::Scalar(String::new()),
    }
}

struct XmlNode {
    tag: String,
    attributes: HashMap<String, String>,
    text: String,
    children: Vec<XmlNode>,
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_string()
}

fn collect_namespaces(start: &BytesStart, namespaces: &mut HashMap<String, String>) {
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            let uri = attr.unescape_value().unwrap_or_default().to_string();
            if !uri.contains("iati.org") {
                namespaces.insert(prefix.to_string(), prefix.replace([':', '-'], "_"));
            }
        }
    }
}

/// Reads forward from just after `start`'s own tag until its matching
/// close tag, building an in-memory tree. Frees the event buffer between
/// siblings so the reader's internal buffer does not grow with the whole
/// document, per the Lakify memory-cap note this sibling shares.
fn capture_subtree<R: std::io::BufRead>(reader: &mut Reader<R>, start: BytesStart<'static>, buf: &mut Vec<u8>) -> PipelineResult<XmlNode> {
    let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
    let mut attributes = HashMap::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().unwrap_or_default().to_string();
        attributes.insert(key, value);
    }

    let mut node = XmlNode { tag, attributes, text: String::new(), children: Vec::new() };

    loop {
        buf.clear();
        let event = reader.read_event_into(buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
        match event {
            Event::Start(child_start) => {
                let mut child_buf = Vec::new();
                let child = capture_subtree(reader, child_start.to_owned(), &mut child_buf)?;
                node.children.push(child);
            }
            Event::Empty(child_start) => {
                let tag = String::from_utf8_lossy(child_start.local_name().as_ref()).to_string();
                let mut attributes = HashMap::new();
                for attr in child_start.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr.unescape_value().unwrap_or_default().to_string();
                    attributes.insert(key, value);
                }
                node.children.push(XmlNode { tag, attributes, text: String::new(), children: Vec::new() });
            }
            Event::Text(text) => {
                node.text.push_str(&text.unescape().unwrap_or_default());
            }
            Event::CData(cdata) => {
                node.text.push_str(&String::from_utf8_lossy(cdata.as_ref()));
            }
            Event::End(_) => break,
            Event::Eof => return Err(PipelineError::SourceCorrupt("unexpected eof inside activity".into())),
            _ => {}
        }
    }

    Ok(node)
}

/// Walks one activity subtree, accumulating canonical `<prefix>_<attr>`
/// and element-text fields into `record`. Repeated names promote a scalar
/// into a list on the second occurrence, matching `spec.md` §4.8.
fn walk(node: &XmlNode, prefix: &str, namespaces: &HashMap<String, String>, record: &mut Map<String, Value>, explode_elements: &HashSet<String>, default_currency: Option<&str>) {
    let tag = collapse_namespace(&node.tag, namespaces);
    let own_prefix = if prefix.is_empty() { tag.clone() } else { format!("{prefix}_{tag}") };

    for (attr_name, attr_value) in &node.attributes {
        if attr_name.starts_with("xmlns") {
            continue;
        }
        let attr_key = format!("{own_prefix}_{}", sanitize(attr_name));
        accumulate(record, &attr_key, Value::String(attr_value.clone()));
    }

    if !node.text.trim().is_empty() {
        accumulate(record, &own_prefix, Value::String(node.text.trim().to_string()));
    }

    if explode_elements.contains(&tag) {
        let mut sub_record = Map::new();
        for (attr_name, attr_value) in &node.attributes {
            sub_record.insert(sanitize(attr_name), Value::String(attr_value.clone()));
        }
        for child in &node.children {
            walk(child, "", namespaces, &mut sub_record, &HashSet::new(), default_currency);
        }
        if let Some(currency_field) = CURRENCY_VALUE_FIELDS.iter().find(|f| f.starts_with(&tag)) {
            apply_currency_default(&mut sub_record, currency_field, default_currency);
        }
        let key = format!("@{tag}");
        record.entry(key).or_insert_with(|| Value::Array(Vec::new()));
        if let Some(Value::Array(list)) = record.get_mut(&format!("@{tag}")) {
            list.push(Value::Object(sub_record));
        }
    }

    for child in &node.children {
        walk(child, &own_prefix, namespaces, record, explode_elements, default_currency);
    }

    if CURRENCY_VALUE_FIELDS.contains(&own_prefix.as_str()) {
        apply_currency_default(record, &own_prefix, default_currency);
    }

    if DATE_NAME_MARKERS.iter().any(|marker| own_prefix.contains(marker)) {
        if let Some(Value::String(raw)) = record.get(&own_prefix) {
            match reformat_date(raw) {
                Some(formatted) => {
                    record.insert(own_prefix.clone(), Value::String(formatted));
                }
                None => {
                    record.remove(&own_prefix);
                }
            }
        }
    }
}

fn accumulate(record: &mut Map<String, Value>, key: &str, value: Value) {
    match record.remove(key) {
        None => {
            record.insert(key.to_string(), value);
        }
        Some(Value::Array(mut list)) => {
            list.push(value);
            record.insert(key.to_string(), Value::Array(list));
        }
        Some(existing) => {
            record.insert(key.to_string(), Value::Array(vec![existing, value]));
        }
    }
}

fn apply_currency_default(record: &mut Map<String, Value>, field: &str, default_currency: Option<&str>) {
    let currency_key = format!("{field}_currency");
    if !record.contains_key(&currency_key) {
        if let Some(default) = default_currency {
            record.insert(currency_key, Value::String(default.to_string()));
        }
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['-', ':'], "_")
}

fn collapse_namespace(tag: &str, namespaces: &HashMap<String, String>) -> String {
    match tag.split_once(':') {
        Some((prefix, local)) => match namespaces.get(prefix) {
            Some(short) => format!("{short}_{}", sanitize(local)),
            None => format!("{}_{}", sanitize(prefix), sanitize(local)),
        },
        None => sanitize(tag),
    }
}

fn reformat_date(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_simple_activity_with_repeated_elements() {
        let xml = br#"<iati-activities version="2.03" generated-datetime="2024-01-01T00:00:00Z">
            <iati-activity default-currency="USD">
                <iati-identifier>  AA-1  </iati-identifier>
                <title><narrative>Example</narrative></title>
                <title><narrative>Second</narrative></title>
            </iati-activity>
        </iati-activities>"#;

        let service = QuickXmlFlattenService::new(vec!["transaction".to_string()]);
        let records = service.flatten(xml).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("iati_identifier"), Some(&FlattenedField::Scalar("AA-1".to_string())));
        assert_eq!(record.get("dataset_version"), Some(&FlattenedField::Scalar("2.03".to_string())));
        assert!(matches!(record.get("title_narrative"), Some(FlattenedField::List(_))));
    }

    #[test]
    fn rejects_non_activities_root() {
        let service = QuickXmlFlattenService::new(vec![]);
        let err = service.flatten(b"<not-iati-activities></not-iati-activities>").unwrap_err();
        assert!(matches!(err, PipelineError::SourceCorrupt(_)));
    }

    #[test]
    fn explode_element_produces_sub_list_and_currency_default() {
        let xml = br#"<iati-activities>
            <iati-activity default-currency="GBP">
                <iati-identifier>AA-2</iati-identifier>
                <transaction>
                    <value>1000</value>
                </transaction>
            </iati-activity>
        </iati-activities>"#;
        let service = QuickXmlFlattenService::new(vec!["transaction".to_string()]);
        let records = service.flatten(xml).unwrap();
        let sub = match records[0].get("@transaction") {
            Some(FlattenedField::SubRecords(sub)) => sub,
            other => panic!("expected sub-records, got {other:?}"),
        };
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].get("transaction_value_currency"), Some(&FlattenedField::Scalar("GBP".to_string())));
    }
}
