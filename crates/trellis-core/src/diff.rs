//! Reconciles a freshly parsed, detached tree into the mounted tree.
//!
//! Matching rules, in priority order:
//!
//! 1. Both sides keyed with different keys: replace.
//! 2. Missing old: append new. Missing new: remove old.
//! 3. Element vs text, or different tags: replace.
//! 4. Two text nodes: update the old node's text in place.
//! 5. Same tag: reconcile children by key.
//!
//! Attributes of a matched element are left as they are; only children and
//! text are reconciled. Unkeyed children are matched by their position
//! among unkeyed siblings.

use indexmap::IndexMap;

use crate::dom::{Document, NodeData, NodeId};
use crate::error::NodeError;

/// Attribute declaring a node's identity among its siblings.
pub const KEY_ATTRIBUTE: &str = "data-key";

pub fn node_key(doc: &Document, node: NodeId) -> Option<&str> {
    doc.attribute(node, KEY_ATTRIBUTE)
}

/// Reconciles `old` (a child of `parent`, or `None`) against the detached
/// `new` node. Nodes from `new` that are not adopted are freed.
pub fn reconcile(
    doc: &mut Document,
    old: Option<NodeId>,
    new: Option<NodeId>,
    parent: NodeId,
    old_key: Option<&str>,
    new_key: Option<&str>,
) -> Result<(), NodeError> {
    patch(doc, old, new, parent, old_key, new_key).map(|_| ())
}

/// Makes `parent`'s children match `new_children`, reusing existing
/// children where their keys match.
pub fn reconcile_children(
    doc: &mut Document,
    parent: NodeId,
    new_children: &[NodeId],
) -> Result<(), NodeError> {
    let mut old_by_key: IndexMap<String, NodeId> = IndexMap::new();
    let mut duplicates = Vec::new();
    for (key, child) in sibling_keys(doc, doc.children(parent)) {
        if old_by_key.contains_key(&key) {
            duplicates.push(child);
        } else {
            old_by_key.insert(key, child);
        }
    }

    let mut survivors = Vec::with_capacity(new_children.len());
    for (key, new) in sibling_keys(doc, new_children) {
        let old = old_by_key.shift_remove(&key);
        let old_key = old.and_then(|old| node_key(doc, old)).map(str::to_owned);
        let new_key = node_key(doc, new).map(str::to_owned);
        if let Some(node) = patch(
            doc,
            old,
            Some(new),
            parent,
            old_key.as_deref(),
            new_key.as_deref(),
        )? {
            survivors.push(node);
        }
    }

    for stale in old_by_key.into_values().chain(duplicates) {
        if doc.contains(stale) {
            doc.remove(stale)?;
        }
    }

    if doc.children(parent) != survivors.as_slice() {
        doc.set_children(parent, &survivors)?;
    }
    Ok(())
}

/// Matching key per sibling: `key:<data-key>` when declared, otherwise
/// `pos:<n>` with `n` counting unkeyed siblings only.
fn sibling_keys(doc: &Document, nodes: &[NodeId]) -> Vec<(String, NodeId)> {
    let mut unkeyed = 0;
    nodes
        .iter()
        .map(|&node| {
            let key = match node_key(doc, node) {
                Some(key) => format!("key:{key}"),
                None => {
                    unkeyed += 1;
                    format!("pos:{}", unkeyed - 1)
                }
            };
            (key, node)
        })
        .collect()
}

/// Returns the node that represents `new` in the live tree afterwards.
fn patch(
    doc: &mut Document,
    old: Option<NodeId>,
    new: Option<NodeId>,
    parent: NodeId,
    old_key: Option<&str>,
    new_key: Option<&str>,
) -> Result<Option<NodeId>, NodeError> {
    let (old, new) = match (old, new) {
        (None, None) => return Ok(None),
        (None, Some(new)) => {
            doc.append_child(parent, new)?;
            return Ok(Some(new));
        }
        (Some(old), None) => {
            doc.remove(old)?;
            return Ok(None);
        }
        (Some(old), Some(new)) => (old, new),
    };

    if let (Some(old_key), Some(new_key)) = (old_key, new_key) {
        if old_key != new_key {
            return replace(doc, parent, old, new);
        }
    }

    match (doc.data(old)?, doc.data(new)?) {
        (NodeData::Text(old_text), NodeData::Text(new_text)) => {
            if old_text != new_text {
                let text = new_text.clone();
                doc.set_text(old, text)?;
            }
        }
        (NodeData::Element { tag: old_tag, .. }, NodeData::Element { tag: new_tag, .. })
            if old_tag == new_tag =>
        {
            // A mounted component owns the content of its host.
            if !doc.is_component_host(old) {
                let children = doc.children(new).to_vec();
                reconcile_children(doc, old, &children)?;
            }
        }
        _ => return replace(doc, parent, old, new),
    }
    doc.release_detached(new);
    Ok(Some(old))
}

fn replace(
    doc: &mut Document,
    parent: NodeId,
    old: NodeId,
    new: NodeId,
) -> Result<Option<NodeId>, NodeError> {
    doc.replace_child(parent, new, old)?;
    doc.release_detached(old);
    Ok(Some(new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{inner_html, parse_fragment};

    fn mount(doc: &mut Document, html: &str) -> NodeId {
        let host = doc.create_element("div");
        let body = doc.body();
        doc.append_child(body, host).unwrap();
        let nodes = parse_fragment(doc, html);
        reconcile_children(doc, host, &nodes).unwrap();
        host
    }

    fn rerender(doc: &mut Document, host: NodeId, html: &str) {
        let nodes = parse_fragment(doc, html);
        reconcile_children(doc, host, &nodes).unwrap();
    }

    const LIST: &str = r#"<ul><li data-key="a">A</li><li data-key="b">B</li><li data-key="c">C</li></ul><p>tail</p>"#;

    #[test]
    fn identical_render_causes_no_mutation() {
        let mut doc = Document::new();
        let host = mount(&mut doc, LIST);
        let nodes_before = doc.len();
        let before = doc.mutation_count();
        rerender(&mut doc, host, LIST);
        assert_eq!(doc.mutation_count(), before);
        assert_eq!(doc.len(), nodes_before, "parsed copy was released");
        assert_eq!(inner_html(&doc, host), LIST);
    }

    #[test]
    fn keyed_reorder_keeps_identity() {
        let mut doc = Document::new();
        let host = mount(&mut doc, LIST);
        let ul = doc.children(host)[0];
        let old: Vec<NodeId> = doc.children(ul).to_vec();

        rerender(
            &mut doc,
            host,
            r#"<ul><li data-key="c">C</li><li data-key="a">A!</li></ul><p>tail</p>"#,
        );
        assert_eq!(doc.children(ul), &[old[2], old[0]]);
        assert!(!doc.contains(old[1]));
        assert_eq!(doc.text_content(old[0]), "A!");
    }

    #[test]
    fn key_mismatch_replaces_even_when_identical() {
        let mut doc = Document::new();
        let parent = doc.body();
        let old = doc.create_element("li");
        doc.set_attribute(old, KEY_ATTRIBUTE, "1").unwrap();
        doc.set_attribute(old, "data-marker", "kept").unwrap();
        doc.append_child(parent, old).unwrap();

        let new = doc.create_element("li");
        doc.set_attribute(new, KEY_ATTRIBUTE, "2").unwrap();
        reconcile(&mut doc, Some(old), Some(new), parent, Some("1"), Some("2")).unwrap();
        assert_eq!(doc.children(parent).last(), Some(&new));
        assert!(!doc.contains(old));

        let same = doc.create_element("li");
        doc.set_attribute(same, KEY_ATTRIBUTE, "2").unwrap();
        reconcile(&mut doc, Some(new), Some(same), parent, Some("2"), Some("2")).unwrap();
        assert!(doc.contains(new), "same key patches in place");
    }

    #[test]
    fn text_is_updated_in_place() {
        let mut doc = Document::new();
        let host = mount(&mut doc, "<span>0</span>");
        let span = doc.children(host)[0];
        let text = doc.children(span)[0];
        rerender(&mut doc, host, "<span>1</span>");
        assert_eq!(doc.children(span), &[text]);
        assert_eq!(doc.text(text), Some("1"));
    }

    #[test]
    fn tag_change_replaces_wholesale() {
        let mut doc = Document::new();
        let host = mount(&mut doc, "<span>x</span>");
        let span = doc.children(host)[0];
        rerender(&mut doc, host, "<em>x</em>");
        assert!(!doc.contains(span));
        assert_eq!(inner_html(&doc, host), "<em>x</em>");
    }

    #[test]
    fn attributes_on_matched_elements_are_not_updated() {
        let mut doc = Document::new();
        let host = mount(&mut doc, r#"<a href="/one">go</a>"#);
        rerender(&mut doc, host, r#"<a href="/two">go</a>"#);
        let a = doc.children(host)[0];
        assert_eq!(doc.attribute(a, "href"), Some("/one"));
    }

    #[test]
    fn unkeyed_children_match_by_position() {
        let mut doc = Document::new();
        let host = mount(&mut doc, "<p>a</p><p>b</p>");
        let first = doc.children(host)[0];
        rerender(&mut doc, host, "<p>b</p>");
        assert_eq!(doc.children(host), &[first]);
        assert_eq!(doc.text_content(first), "b");
    }

    #[test]
    fn component_host_content_is_left_alone() {
        let mut doc = Document::new();
        let host = mount(&mut doc, "<x-child></x-child>");
        let child = doc.children(host)[0];
        doc.set_component_host(child, true);
        let inner = doc.create_text("owned by child");
        doc.append_child(child, inner).unwrap();

        rerender(&mut doc, host, "<x-child></x-child>");
        assert_eq!(doc.children(child), &[inner]);
    }
}
