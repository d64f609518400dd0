// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Lakify transformation (`spec.md` §4.9): explodes one cleaned document
//! into a `(xml, json)` blob pair per `<iati-activity>`, keyed by the sha1
//! of its normalised `iati-identifier`.

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::services::{LakeActivity, LakifyService};
use iati_pipeline_domain::value_objects::normalize_identifier;

/// `quick-xml` based [`LakifyService`] implementation (`spec.md` §4.9).
#[derive(Default)]
pub struct QuickXmlLakifyService;

impl QuickXmlLakifyService {
    pub fn new() -> Self {
        Self
    }
}

impl LakifyService for QuickXmlLakifyService {
    /// Splits `source` (a whole `<iati-activities>` document) into one
    /// [`LakeActivity`] per `<iati-activity>` child, freeing each activity's
    /// parsed tree before moving to the next (`spec.md` §4.9's memory-cap
    /// note).
    fn explode(&self, source: &[u8]) -> PipelineResult<Vec<LakeActivity>> {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut activities = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
            match event {
                Event::Eof => break,
                Event::Start(start) if start.local_name().as_ref() == b"iati-activity" => {
                    let mut xml_writer = Writer::new(Vec::new());
                    xml_writer.write_event(Event::Start(start.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;

                    let mut json_buf = Vec::new();
                    let root_node = capture_and_echo(&mut reader, &mut xml_writer, &mut json_buf)?;

                    let xml_bytes = xml_writer.into_inner();
                    let identifier = find_identifier(&root_node).unwrap_or_default();
                    let id_hash = sha1_hex(&normalize_identifier(&identifier));
                    let json = recursive_json_nest(&root_node);

                    activities.push(LakeActivity { id_hash, xml: xml_bytes, json });
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(activities)
    }
}

pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

struct JsonNode {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<JsonNode>,
}

/// Reads the body of `<iati-activity>` (whose opening tag has already been
/// consumed by the caller), echoing every event into `xml_writer` verbatim
/// while also building the tree `recursive_json_nest` needs.
fn capture_and_echo<R: std::io::BufRead>(reader: &mut Reader<R>, xml_writer: &mut Writer<Vec<u8>>, buf: &mut Vec<u8>) -> PipelineResult<JsonNode> {
    let mut node = JsonNode { tag: "iati-activity".to_string(), attributes: Vec::new(), text: String::new(), children: Vec::new() };

    loop {
        buf.clear();
        let event = reader.read_event_into(buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
        match &event {
            Event::Start(start) => {
                xml_writer.write_event(Event::Start(start.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                let attributes = attrs_of(start);
                let mut child_buf = Vec::new();
                let mut child = JsonNode { tag, attributes, text: String::new(), children: Vec::new() };
                fill_children(reader, xml_writer, &mut child, &mut child_buf)?;
                node.children.push(child);
            }
            Event::Empty(start) => {
                xml_writer.write_event(Event::Empty(start.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                node.children.push(JsonNode { tag, attributes: attrs_of(start), text: String::new(), children: Vec::new() });
            }
            Event::Text(text) => {
                xml_writer.write_event(Event::Text(text.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.text.push_str(&text.unescape().unwrap_or_default());
            }
            Event::Comment(comment) => {
                xml_writer.write_event(Event::Comment(comment.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.children.push(JsonNode { tag: "comment()".to_string(), attributes: Vec::new(), text: String::from_utf8_lossy(comment.as_ref()).to_string(), children: Vec::new() });
            }
            Event::PI(pi) => {
                xml_writer.write_event(Event::PI(pi.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.children.push(JsonNode { tag: "PI()".to_string(), attributes: Vec::new(), text: String::from_utf8_lossy(pi.as_ref()).to_string(), children: Vec::new() });
            }
            Event::End(end) => {
                xml_writer.write_event(Event::End(end.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                return Ok(node);
            }
            Event::Eof => return Err(PipelineError::SourceCorrupt("unexpected eof inside iati-activity".into())),
            _ => {}
        }
    }
}

fn fill_children<R: std::io::BufRead>(reader: &mut Reader<R>, xml_writer: &mut Writer<Vec<u8>>, node: &mut JsonNode, buf: &mut Vec<u8>) -> PipelineResult<()> {
    loop {
        buf.clear();
        let event = reader.read_event_into(buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
        match &event {
            Event::Start(start) => {
                xml_writer.write_event(Event::Start(start.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                let mut child = JsonNode { tag, attributes: attrs_of(start), text: String::new(), children: Vec::new() };
                let mut child_buf = Vec::new();
                fill_children(reader, xml_writer, &mut child, &mut child_buf)?;
                node.children.push(child);
            }
            Event::Empty(start) => {
                xml_writer.write_event(Event::Empty(start.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                node.children.push(JsonNode { tag, attributes: attrs_of(start), text: String::new(), children: Vec::new() });
            }
            Event::Text(text) => {
                xml_writer.write_event(Event::Text(text.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.text.push_str(&text.unescape().unwrap_or_default());
            }
            Event::Comment(comment) => {
                xml_writer.write_event(Event::Comment(comment.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.children.push(JsonNode { tag: "comment()".to_string(), attributes: Vec::new(), text: String::from_utf8_lossy(comment.as_ref()).to_string(), children: Vec::new() });
            }
            Event::PI(pi) => {
                xml_writer.write_event(Event::PI(pi.clone())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                node.children.push(JsonNode { tag: "PI()".to_string(), attributes: Vec::new(), text: String::from_utf8_lossy(pi.as_ref()).to_string(), children: Vec::new() });
            }
            Event::End(end) => {
                xml_writer.write_event(Event::End(end.to_owned())).map_err(|e| PipelineError::InternalError(e.to_string()))?;
                return Ok(());
            }
            Event::Eof => return Err(PipelineError::SourceCorrupt("unexpected eof".into())),
            _ => {}
        }
    }
}

fn attrs_of(start: &quick_xml::events::BytesStart) -> Vec<(String, String)> {
    start
        .attributes()
        .flatten()
        .map(|a| (String::from_utf8_lossy(a.key.as_ref()).to_string(), a.unescape_value().unwrap_or_default().to_string()))
        .collect()
}

fn find_identifier(node: &JsonNode) -> Option<String> {
    node.children.iter().find(|c| c.tag == "iati-identifier").map(|c| c.text.clone())
}

/// `recursive_json_nest` (`spec.md` §4.9): every element becomes a key
/// mapping to a *list* of occurrence dicts; attributes get an `@` prefix;
/// text becomes `text()`, even when empty (e.g. an empty `<narrative>`).
fn recursive_json_nest(node: &JsonNode) -> Value {
    let mut obj = Map::new();
    obj.insert("text()".to_string(), Value::String(node.text.clone()));
    for (key, value) in &node.attributes {
        obj.insert(format!("@{key}"), Value::String(value.clone()));
    }

    let mut grouped: Map<String, Value> = Map::new();
    for child in &node.children {
        let child_value = recursive_json_nest(child);
        grouped.entry(child.tag.clone()).or_insert_with(|| Value::Array(Vec::new()));
        if let Some(Value::Array(list)) = grouped.get_mut(&child.tag) {
            list.push(child_value);
        }
    }
    for (key, value) in grouped {
        obj.insert(key, value);
    }

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_activities_and_hashes_identifiers() {
        let xml = br#"<iati-activities>
            <iati-activity><iati-identifier>AA-1</iati-identifier><narrative></narrative></iati-activity>
            <iati-activity><iati-identifier> AA-2 </iati-identifier></iati-activity>
        </iati-activities>"#;
        let service = QuickXmlLakifyService::new();
        let activities = service.explode(xml).unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].id_hash, sha1_hex("AA-1"));
        assert_eq!(activities[1].id_hash, sha1_hex("AA-2"));
        assert!(activities[0].xml.starts_with(b"<iati-activity>"));
    }

    #[test]
    fn recursive_json_nest_emits_empty_text_for_empty_narrative() {
        let xml = br#"<iati-activities><iati-activity><iati-identifier>X</iati-identifier><narrative></narrative></iati-activity></iati-activities>"#;
        let service = QuickXmlLakifyService::new();
        let activities = service.explode(xml).unwrap();
        let json = activities[0].json.as_object().unwrap();
        let narrative = json.get("narrative").unwrap().as_array().unwrap();
        assert_eq!(narrative[0].as_object().unwrap().get("text()").unwrap().as_str().unwrap(), "");
    }

    proptest::proptest! {
        /// The blob prefix Solrize looks Lakify's output up by
        /// (`spec.md` §4.10) is `sha1_hex(identifier)`; that lookup only
        /// works if the hash is a deterministic, fixed-width function of
        /// its input, for every identifier Bulk Data Service could report.
        #[test]
        fn sha1_hex_is_deterministic_and_fixed_width(input in ".*") {
            let first = sha1_hex(&input);
            let second = sha1_hex(&input);
            proptest::prop_assert_eq!(&first, &second);
            proptest::prop_assert_eq!(first.len(), 40);
            proptest::prop_assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
