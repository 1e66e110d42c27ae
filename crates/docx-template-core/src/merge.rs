//! Writing user values back into a template package.

use std::collections::BTreeSet;
use std::ops::Range;

use roxmltree::{Document, Node};
use tracing::{debug, instrument};

use crate::error::{Result, TemplateError};
use crate::model::FieldValues;
use crate::package::{TemplatePackage, CUSTOM_PROPERTIES_PART, DOCUMENT_PART};
use crate::scan::{property_nodes, value_element};
use crate::wml::{self, escape_xml_text};

/// A text edit against the source of one part.
struct Edit {
    range: Range<usize>,
    text: String,
}

fn apply_edits(xml: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&xml[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end;
    }
    out.push_str(&xml[cursor..]);
    out
}

/// Merge `values` into the package.
///
/// Every `{{name}}` with a supplied value is replaced in the document body,
/// headers and footers. Names listed in `custom_property_names` also rewrite
/// the matching property value; properties are never created. A name that is
/// both a placeholder and a custom property updates both. Parts whose text
/// does not change are left byte-identical.
#[instrument(skip_all, level = "debug", fields(values = values.len()))]
pub fn merge_fields(
    mut package: TemplatePackage,
    values: &FieldValues,
    custom_property_names: &BTreeSet<String>,
) -> Result<TemplatePackage> {
    if package.part(DOCUMENT_PART).is_none() {
        return Err(TemplateError::PartNotFound(DOCUMENT_PART.to_string()));
    }
    if values.is_empty() {
        return Ok(package);
    }

    let story_parts: Vec<String> = package.story_parts().into_iter().map(String::from).collect();
    for part in story_parts {
        let Some(xml) = package.xml_part(&part)? else {
            continue;
        };
        let (merged, replaced) = merge_placeholders(xml, values).map_err(|e| {
            TemplateError::MalformedXml {
                part: part.clone(),
                message: e.to_string(),
            }
        })?;
        if replaced > 0 {
            debug!("Replaced {} placeholders in {}", replaced, part);
            package.replace_part(&part, merged)?;
        }
    }

    if let Some(xml) = package.custom_properties_xml()? {
        let (merged, updated) = merge_custom_properties(xml, values, custom_property_names)
            .map_err(|e| TemplateError::MalformedXml {
                part: CUSTOM_PROPERTIES_PART.to_string(),
                message: e.to_string(),
            })?;
        if updated > 0 {
            debug!("Updated {} custom properties", updated);
            package.replace_part(CUSTOM_PROPERTIES_PART, merged)?;
        }
    }

    Ok(package)
}

/// Substitute placeholders in one story part.
///
/// Returns the new XML and the number of tokens replaced. When a token spans
/// several runs, the run holding its first character carries the value; runs
/// left with nothing but their properties are removed.
pub fn merge_placeholders(
    xml: &str,
    values: &FieldValues,
) -> std::result::Result<(String, usize), roxmltree::Error> {
    let doc = Document::parse(xml)?;
    let mut edits = Vec::new();
    let mut replaced = 0;

    for paragraph in wml::paragraphs(&doc) {
        let matches: Vec<(Range<usize>, &str)> = wml::placeholder_regex()
            .captures_iter(&paragraph.text)
            .filter_map(|caps| {
                let value = values.get(caps.get(1)?.as_str())?;
                Some((caps.get(0)?.range(), value.as_str()))
            })
            .collect();
        if matches.is_empty() {
            continue;
        }
        replaced += matches.len();

        let mut next_match = 0;
        for segment in &paragraph.segments {
            let mut output = String::with_capacity(segment.text.len());
            // true until the segment keeps or receives any text
            let mut consumed = true;

            for (offset, ch) in segment.text.char_indices() {
                let pos = segment.start + offset;
                while next_match < matches.len() && matches[next_match].0.end <= pos {
                    next_match += 1;
                }
                match matches.get(next_match) {
                    Some((range, value)) if range.start <= pos => {
                        if range.start == pos {
                            output.push_str(value);
                            if !value.is_empty() {
                                consumed = false;
                            }
                        }
                    }
                    _ => {
                        output.push(ch);
                        consumed = false;
                    }
                }
            }

            if output == segment.text {
                continue;
            }
            if consumed {
                if let Some(run) = removable_run(&segment.node) {
                    edits.push(Edit {
                        range: run.range(),
                        text: String::new(),
                    });
                    continue;
                }
            }
            if let Some(edit) = rewrite_text(xml, &segment.node, &output) {
                edits.push(edit);
            }
        }
    }

    if edits.is_empty() {
        return Ok((xml.to_string(), replaced));
    }
    Ok((apply_edits(xml, edits), replaced))
}

/// The `w:r` owning `t`, when `t` is its only content besides run properties.
fn removable_run<'a, 'input>(t: &Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let run = t.parent_element().filter(|p| wml::is_wml(p, "r"))?;
    let only_text = run
        .children()
        .filter(|c| c.is_element())
        .all(|c| c == *t || wml::is_wml(&c, "rPr"));
    only_text.then_some(run)
}

fn rewrite_text(xml: &str, t: &Node, text: &str) -> Option<Edit> {
    let (start_tag, end_tag) = wml::element_tags(xml, t)?;
    let needs_preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    let start_tag = if needs_preserve && !start_tag.contains("xml:space") {
        format!(
            r#"{} xml:space="preserve">"#,
            start_tag.trim_end_matches('>')
        )
    } else {
        start_tag.to_string()
    };
    Some(Edit {
        range: t.range(),
        text: format!("{}{}{}", start_tag, escape_xml_text(text), end_tag),
    })
}

/// Rewrite the values of existing custom properties.
///
/// Returns the new XML and the number of properties updated.
pub fn merge_custom_properties(
    xml: &str,
    values: &FieldValues,
    custom_property_names: &BTreeSet<String>,
) -> std::result::Result<(String, usize), roxmltree::Error> {
    let doc = Document::parse(xml)?;
    let mut edits = Vec::new();

    for property in property_nodes(&doc) {
        let Some(name) = property.attribute("name") else {
            continue;
        };
        if !custom_property_names.contains(name) {
            continue;
        }
        let (Some(value), Some(element)) = (values.get(name), value_element(&property)) else {
            continue;
        };
        if element.children().any(|c| c.is_element()) {
            continue;
        }

        let escaped = escape_xml_text(value);
        let text = match wml::element_tags(xml, &element) {
            Some((start_tag, end_tag)) => format!("{start_tag}{escaped}{end_tag}"),
            None => {
                let Some(qname) = wml::qualified_name(xml, &element) else {
                    continue;
                };
                let source = &xml[element.range()];
                let start_tag = source.trim_end_matches("/>").trim_end();
                format!("{start_tag}>{escaped}</{qname}>")
            }
        };
        edits.push(Edit {
            range: element.range(),
            text,
        });
    }

    let updated = edits.len();
    if updated == 0 {
        return Ok((xml.to_string(), 0));
    }
    Ok((apply_edits(xml, edits), updated))
}
