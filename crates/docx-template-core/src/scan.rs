//! Field discovery: `{{placeholder}}` tokens and custom document properties.

use std::collections::HashSet;

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use crate::error::{Result, TemplateError};
use crate::model::{CustomProperty, PlaceholderField};
use crate::package::TemplatePackage;
use crate::wml;

/// Extract the distinct placeholder names of one story part, in order of
/// first appearance.
///
/// Runs are flattened per paragraph before matching, so a token the editor
/// split across runs is still found. `{ name }`, `{{ name }}` and lone braces
/// are not placeholders.
pub fn scan_placeholders(document_xml: &str) -> Result<Vec<PlaceholderField>> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    scan_into(document_xml, &mut names, &mut seen)?;
    Ok(into_fields(names))
}

/// Scan every story part of a package (body, headers, footers) into one
/// ordered set.
pub fn scan_package_placeholders(package: &TemplatePackage) -> Result<Vec<PlaceholderField>> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for part in package.story_parts() {
        if let Some(xml) = package.xml_part(part)? {
            scan_into(xml, &mut names, &mut seen)?;
        }
    }
    debug!("Found {} placeholders", names.len());
    Ok(into_fields(names))
}

fn scan_into(xml: &str, names: &mut Vec<String>, seen: &mut HashSet<String>) -> Result<()> {
    let doc = Document::parse(xml)
        .map_err(|e| TemplateError::UnsupportedFormat(format!("story part is not valid XML: {e}")))?;

    for paragraph in wml::paragraphs(&doc) {
        for caps in wml::placeholder_regex().captures_iter(&paragraph.text) {
            let name = &caps[1];
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    Ok(())
}

fn into_fields(names: Vec<String>) -> Vec<PlaceholderField> {
    names
        .into_iter()
        .enumerate()
        .map(|(order, name)| PlaceholderField { name, order })
        .collect()
}

/// Extract custom properties with their current values as strings.
///
/// Entries without a name or a value element are skipped; a part that is not
/// XML at all yields no properties.
pub fn scan_custom_properties(props_xml: &str) -> Vec<CustomProperty> {
    let doc = match Document::parse(props_xml) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Ignoring unreadable custom properties part: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut properties = Vec::new();
    for node in property_nodes(&doc) {
        let Some(name) = node.attribute("name") else {
            continue;
        };
        let Some(value) = value_element(&node) else {
            debug!("Skipping custom property {} without a value", name);
            continue;
        };
        if value.children().any(|c| c.is_element()) {
            debug!("Skipping custom property {} with a compound value", name);
            continue;
        }
        if seen.insert(name.to_string()) {
            properties.push(CustomProperty {
                name: name.to_string(),
                value: value.text().unwrap_or_default().to_string(),
            });
        }
    }
    properties
}

/// Custom properties of a package; empty when the part is absent.
pub fn scan_package_custom_properties(package: &TemplatePackage) -> Result<Vec<CustomProperty>> {
    Ok(package
        .custom_properties_xml()?
        .map(scan_custom_properties)
        .unwrap_or_default())
}

pub(crate) fn property_nodes<'a, 'input>(
    doc: &'a Document<'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "property")
}

/// The typed value child of a `property` element (`vt:lpwstr`, `vt:i4`, ...).
pub(crate) fn value_element<'a, 'input>(property: &Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    property.children().find(|c| c.is_element())
}
