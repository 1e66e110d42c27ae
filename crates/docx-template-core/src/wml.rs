//! WordprocessingML helpers shared by the scanner and the merge engine.

use std::sync::OnceLock;

use regex::Regex;
use roxmltree::{Document, Node};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const W_NS_STRICT: &str = "http://purl.oclc.org/ooxml/wordprocessingml/main";

/// `{{name}}` with no braces or whitespace inside.
pub(crate) fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}\s]+)\}\}").expect("placeholder pattern is valid"))
}

pub(crate) fn is_wml(node: &Node, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && matches!(node.tag_name().namespace(), Some(W_NS) | Some(W_NS_STRICT))
}

/// Text of one `w:t` element and where it starts in the flattened paragraph.
pub(crate) struct TextSegment<'a, 'input> {
    pub node: Node<'a, 'input>,
    pub text: String,
    pub start: usize,
}

impl TextSegment<'_, '_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// A paragraph with the text of all its runs concatenated.
pub(crate) struct FlatParagraph<'a, 'input> {
    pub text: String,
    pub segments: Vec<TextSegment<'a, 'input>>,
}

/// Flatten every paragraph of a story part.
///
/// Text-box paragraphs nested inside a paragraph are returned on their own
/// and do not contribute to the outer paragraph's text.
pub(crate) fn paragraphs<'a, 'input>(doc: &'a Document<'input>) -> Vec<FlatParagraph<'a, 'input>> {
    doc.descendants()
        .filter(|n| is_wml(n, "p"))
        .map(|p| {
            let mut text = String::new();
            let mut segments = Vec::new();
            for t in p.descendants().filter(|n| is_wml(n, "t")) {
                let owner = t.ancestors().find(|a| is_wml(a, "p"));
                if owner != Some(p) || t.children().any(|c| c.is_element()) {
                    continue;
                }
                let value: String = t.children().filter_map(|c| c.text()).collect();
                if value.is_empty() {
                    continue;
                }
                let start = text.len();
                text.push_str(&value);
                segments.push(TextSegment {
                    node: t,
                    text: value,
                    start,
                });
            }
            FlatParagraph { text, segments }
        })
        .collect()
}

/// Source text of an element's start and end tags, `None` when the element is
/// self-closing.
pub(crate) fn element_tags<'x>(xml: &'x str, node: &Node) -> Option<(&'x str, &'x str)> {
    let source = xml.get(node.range())?;
    let start_end = source.find('>')? + 1;
    if source[..start_end].ends_with("/>") {
        return None;
    }
    let end_start = source.rfind("</")?;
    Some((&source[..start_end], &source[end_start..]))
}

/// Qualified name as written in the source, e.g. `vt:lpwstr`.
pub(crate) fn qualified_name<'x>(xml: &'x str, node: &Node) -> Option<&'x str> {
    let source = xml.get(node.range())?;
    let name = source.strip_prefix('<')?;
    let end = name.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    Some(&name[..end])
}

/// Escape text for use as element content.
pub fn escape_xml_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
