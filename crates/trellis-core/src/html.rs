//! Tolerant HTML fragment parser and serializer for template markup.
//!
//! Parsed nodes are created detached in a [`Document`]; nothing here
//! touches the mounted tree.

use crate::dom::{Document, NodeData, NodeId};

/// Elements that never have a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is kept verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parses `html` into detached top-level nodes.
///
/// Comments and doctypes are skipped, whitespace-only text is dropped and
/// stray closing tags are ignored.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Vec<NodeId> {
    let mut parser = Parser {
        src: html,
        pos: 0,
        open: Vec::new(),
    };
    let (nodes, _) = parser.children_until(doc, None);
    nodes
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Parses siblings until `</close>` (consumed) or end of input.
    fn children_until(&mut self, doc: &mut Document, close: Option<&str>) -> (Vec<NodeId>, bool) {
        let mut nodes = Vec::new();
        while !self.at_end() {
            let rest = self.rest();
            if rest.starts_with("</") {
                let (name, end) = match rest.find('>') {
                    Some(i) => (&rest[2..i], i + 1),
                    None => (&rest[2..], rest.len()),
                };
                let name = name.trim().to_ascii_lowercase();
                if close == Some(name.as_str()) {
                    self.pos += end;
                    return (nodes, true);
                }
                if self.open.contains(&name) {
                    // Closes an ancestor; the current element ends here.
                    return (nodes, false);
                }
                self.pos += end;
                continue;
            }
            if rest.starts_with("<!--") {
                self.pos += rest.find("-->").map_or(rest.len(), |i| i + 3);
                continue;
            }
            if rest.starts_with("<!") {
                self.pos += rest.find('>').map_or(rest.len(), |i| i + 1);
                continue;
            }
            if rest.starts_with('<') {
                if let Some(node) = self.element(doc) {
                    nodes.push(node);
                    continue;
                }
                // Not a tag after all; the '<' is literal text.
                let end = rest[1..].find('<').map_or(rest.len(), |i| i + 1);
                self.push_text(doc, &mut nodes, end);
                continue;
            }
            let end = rest.find('<').unwrap_or(rest.len());
            self.push_text(doc, &mut nodes, end);
        }
        (nodes, false)
    }

    fn push_text(&mut self, doc: &mut Document, nodes: &mut Vec<NodeId>, len: usize) {
        let text = &self.src[self.pos..self.pos + len];
        self.pos += len;
        if !text.trim().is_empty() {
            nodes.push(doc.create_text(decode_entities(text)));
        }
    }

    fn element(&mut self, doc: &mut Document) -> Option<NodeId> {
        let rest = self.rest();
        let end = find_tag_end(rest)?;
        let mut content = &rest[1..end];
        let self_closing = content.ends_with('/');
        if self_closing {
            content = &content[..content.len() - 1];
        }
        let name_end = content
            .find(|c: char| c.is_whitespace())
            .unwrap_or(content.len());
        let tag = content[..name_end].to_ascii_lowercase();
        if tag.is_empty() || !tag.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }

        let node = doc.create_element(tag.as_str());
        for (name, value) in parse_attributes(&content[name_end..]) {
            // Duplicate attributes keep the first occurrence.
            if doc.attribute(node, &name).is_none() {
                let _ = doc.set_attribute(node, &name, value);
            }
        }
        self.pos += end + 1;

        if self_closing || is_void(&tag) {
            return Some(node);
        }
        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            let close = format!("</{tag}");
            let rest = self.rest();
            let body_len = find_ascii_case_insensitive(rest, &close).unwrap_or(rest.len());
            let body = &rest[..body_len];
            if !body.trim().is_empty() {
                let text = doc.create_text(body);
                let _ = doc.append_child(node, text);
            }
            self.pos += body_len;
            let rest = self.rest();
            self.pos += rest.find('>').map_or(rest.len(), |i| i + 1);
            return Some(node);
        }

        self.open.push(tag.clone());
        let (children, _) = self.children_until(doc, Some(&tag));
        self.open.pop();
        for child in children {
            let _ = doc.append_child(node, child);
        }
        Some(node)
    }
}

/// Offset of the `>` closing the tag that starts `rest`, ignoring any `>`
/// inside quoted attribute values.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote = None;
    for (i, b) in rest.bytes().enumerate().skip(1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i),
            (None, b'<') => return None,
            _ => {}
        }
    }
    None
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Parses the attribute section of a start tag.
///
/// Handles `key="value"`, `key='value'`, unquoted values and boolean
/// attributes, including directive names like `@click` and `:title`.
pub fn parse_attributes(source: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let s = source.trim();
    let bytes = s.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        let name_start = pos;
        while pos < bytes.len() && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let name = s[name_start..pos].to_ascii_lowercase();
        if name.is_empty() {
            pos += 1;
            continue;
        }
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != b'=' {
            attrs.push((name, String::new()));
            continue;
        }
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let value = if pos < bytes.len() && (bytes[pos] == b'"' || bytes[pos] == b'\'') {
            let quote = bytes[pos];
            pos += 1;
            let start = pos;
            while pos < bytes.len() && bytes[pos] != quote {
                pos += 1;
            }
            let value = &s[start..pos];
            pos = (pos + 1).min(bytes.len());
            value
        } else {
            let start = pos;
            while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            &s[start..pos]
        };
        attrs.push((name, decode_entities(value)));
    }
    attrs
}

const ENTITIES: &[(&str, char)] = &[
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#39;", '\''),
    ("&apos;", '\''),
    ("&nbsp;", '\u{a0}'),
];

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        match ENTITIES.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, ch)) => {
                out.push(*ch);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Markup for `node` itself and its subtree.
pub fn serialize(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out, false);
    out
}

/// Markup for the children of `node`.
pub fn inner_html(doc: &Document, node: NodeId) -> String {
    let raw = doc
        .tag(node)
        .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
    let mut out = String::new();
    for &child in doc.children(node) {
        write_node(doc, child, &mut out, raw);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String, raw: bool) {
    match doc.data(node) {
        Ok(NodeData::Text(text)) if raw => out.push_str(text),
        Ok(NodeData::Text(text)) => out.push_str(&escape_text(text)),
        Ok(NodeData::Element { tag, attributes }) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_text(value));
                    out.push('"');
                }
            }
            out.push('>');
            if is_void(tag) {
                return;
            }
            out.push_str(&inner_html(doc, node));
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(html: &str) -> String {
        let mut doc = Document::new();
        parse_fragment(&mut doc, html)
            .into_iter()
            .map(|node| serialize(&doc, node))
            .collect()
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let mut doc = Document::new();
        let nodes = parse_fragment(
            &mut doc,
            r#"<div class="card" data-key=a><p>Hello <b>world</b></p><input disabled></div>"#,
        );
        assert_eq!(nodes.len(), 1);
        let div = nodes[0];
        assert_eq!(doc.attribute(div, "class"), Some("card"));
        assert_eq!(doc.attribute(div, "data-key"), Some("a"));
        let children = doc.children(div).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(doc.tag(children[1]), Some("input"));
        assert_eq!(doc.attribute(children[1], "disabled"), Some(""));
        assert_eq!(doc.text_content(div), "Hello world");
    }

    #[test]
    fn quoted_gt_does_not_end_the_tag() {
        let mut doc = Document::new();
        let nodes = parse_fragment(&mut doc, r#"<x-meter :value="count > 3 ? 1 : 0"></x-meter>"#);
        assert_eq!(doc.attribute(nodes[0], ":value"), Some("count > 3 ? 1 : 0"));
    }

    #[test]
    fn comments_and_whitespace_text_are_dropped() {
        assert_eq!(
            roundtrip("<ul>\n  <!-- items -->\n  <li>a</li>\n  <li>b</li>\n</ul>"),
            "<ul><li>a</li><li>b</li></ul>"
        );
    }

    #[test]
    fn entities_decode_and_reencode() {
        let mut doc = Document::new();
        let nodes = parse_fragment(&mut doc, "<p>a &lt; b &amp;&amp; c</p>");
        assert_eq!(doc.text_content(nodes[0]), "a < b && c");
        assert_eq!(serialize(&doc, nodes[0]), "<p>a &lt; b &amp;&amp; c</p>");
    }

    #[test]
    fn style_body_is_raw() {
        assert_eq!(
            roundtrip("<style>.a > .b { color: red }</style>"),
            "<style>.a > .b { color: red }</style>"
        );
    }

    #[test]
    fn unclosed_elements_close_at_end_of_input() {
        assert_eq!(roundtrip("<div><span>x"), "<div><span>x</span></div>");
        assert_eq!(
            roundtrip("<div><span>x</div><p>y</p>"),
            "<div><span>x</span></div><p>y</p>"
        );
        assert_eq!(roundtrip("a < b"), "a &lt; b");
        assert_eq!(roundtrip("<br/><hr>"), "<br><hr>");
    }

    #[test]
    fn unterminated_closing_tag_before_multibyte_text_is_skipped() {
        assert_eq!(roundtrip("<p>x</p></é"), "<p>x</p>");
        assert_eq!(roundtrip("<p>ü</ü"), "<p>ü</p>");
        assert_eq!(roundtrip("<b>日本</"), "<b>日本</b>");
    }
}
