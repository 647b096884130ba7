//! Markup sanitizing applied to every rendered template and slot.

use trellis_core::html::{inner_html, parse_fragment};
use trellis_core::Document;

pub trait Sanitizer {
    fn sanitize(&self, html: &str) -> String;
}

/// Drops `<script>` elements and inline `on*` handler attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSanitizer;

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, html: &str) -> String {
        if !html.contains('<') {
            return html.to_owned();
        }
        let mut doc = Document::new();
        let scratch = doc.create_element("div");
        for node in parse_fragment(&mut doc, html) {
            let _ = doc.append_child(scratch, node);
        }
        for node in doc.descendants(scratch) {
            if !doc.contains(node) {
                continue;
            }
            if doc.tag(node) == Some("script") {
                let _ = doc.remove(node);
                continue;
            }
            let handlers: Vec<String> = doc
                .attributes(node)
                .map(|attributes| {
                    attributes
                        .keys()
                        .filter(|name| name.starts_with("on"))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for name in handlers {
                let _ = doc.remove_attribute(node, &name);
            }
        }
        inner_html(&doc, scratch)
    }
}

/// Leaves markup untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, html: &str) -> String {
        html.to_owned()
    }
}
