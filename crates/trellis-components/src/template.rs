//! Turns a component's render source into sanitized markup.
//!
//! Rendering runs in this order: resolve the source, substitute `<slot>`
//! placeholders with the captured light-DOM content, interpolate
//! `{{ expr }}` placeholders, sanitize. Placeholders inside slotted
//! content are therefore evaluated against this component's scope.

use indexmap::IndexMap;
use trellis_core::html::{escape_text, parse_attributes, serialize};
use trellis_core::{evaluate, Document, NodeId, ReactiveState, Scope, Store, Value};

use crate::config::RenderSource;
use crate::controller::ComponentInstance;
use crate::error::ComponentError;
use crate::sanitize::Sanitizer;

/// Slot name for content without a name.
pub const DEFAULT_SLOT: &str = "";

/// What a render function sees.
pub struct RenderContext<'a> {
    pub state: &'a ReactiveState,
    pub props: &'a ReactiveState,
    pub store: Option<&'a Store>,
    pub(crate) instance: &'a ComponentInstance,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        instance: &'a ComponentInstance,
        state: &'a ReactiveState,
        props: &'a ReactiveState,
        store: Option<&'a Store>,
    ) -> Self {
        Self {
            state,
            props,
            store,
            instance,
        }
    }

    /// Computed accessor of the local store; re-evaluated on each call.
    pub fn computed(&self, name: &str) -> Value {
        self.store
            .and_then(|store| store.computed(name))
            .unwrap_or_default()
    }

    /// Nearest value provided under `key` by this component or an ancestor.
    pub fn inject(&self, key: &str) -> Value {
        self.instance.inject(key)
    }

    pub fn instance(&self) -> &ComponentInstance {
        self.instance
    }
}

pub struct TemplateInput<'a> {
    pub source: Option<&'a RenderSource>,
    /// Content fetched for [`RenderSource::File`].
    pub file_template: Option<&'a str>,
    pub context: &'a RenderContext<'a>,
    pub scope: &'a Scope,
    pub slots: &'a IndexMap<String, String>,
    pub sanitizer: &'a dyn Sanitizer,
}

pub fn render_template(input: &TemplateInput<'_>) -> Result<String, ComponentError> {
    let source = resolve_source(input)?;
    let slotted = substitute_slots(&source, input.slots);
    let interpolated = interpolate(&slotted, input.scope);
    Ok(input.sanitizer.sanitize(&interpolated))
}

fn resolve_source(input: &TemplateInput<'_>) -> Result<String, ComponentError> {
    match input.source {
        None => Ok(String::new()),
        Some(RenderSource::Template(template)) => Ok(template.clone()),
        Some(RenderSource::Function(render)) => render(input.context),
        Some(RenderSource::File(address)) => input
            .file_template
            .map(str::to_owned)
            .ok_or_else(|| ComponentError::Render(format!("template {address} is not loaded"))),
    }
}

/// Replaces every `{{ expr }}` with the escaped display form of its value.
///
/// A failing expression renders as an empty string; the evaluator logs it.
pub fn interpolate(template: &str, scope: &Scope) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let expr = rest[open + 2..open + 2 + close].trim();
        if !expr.is_empty() {
            out.push_str(&escape_text(&evaluate(expr, scope).to_display()));
        }
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    out
}

/// Replaces `<slot>` / `<slot name="x">` placeholders (with any fallback
/// body) by the captured content, or nothing.
pub fn substitute_slots(template: &str, slots: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = find_slot_tag(rest) {
        out.push_str(&rest[..start]);
        let tag = &rest[start..];
        let Some(gt) = tag.find('>') else {
            rest = "";
            break;
        };
        let mut attrs = &tag[5..gt];
        let self_closing = attrs.trim_end().ends_with('/');
        if self_closing {
            attrs = attrs.trim_end().trim_end_matches('/');
        }
        let name = parse_attributes(attrs)
            .into_iter()
            .find(|(key, _)| key == "name")
            .map(|(_, value)| value)
            .unwrap_or_default();
        out.push_str(slots.get(&name).map_or("", String::as_str));

        let after_open = &tag[gt + 1..];
        rest = if self_closing {
            after_open
        } else {
            match after_open.find("</slot>") {
                Some(end) => &after_open[end + "</slot>".len()..],
                None => after_open,
            }
        };
    }
    out.push_str(rest);
    out
}

fn find_slot_tag(source: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(i) = source[offset..].find("<slot") {
        let at = offset + i;
        match source.as_bytes().get(at + 5) {
            Some(b'>' | b'/') => return Some(at),
            Some(b) if b.is_ascii_whitespace() => return Some(at),
            _ => offset = at + 5,
        }
    }
    None
}

/// Captures the host's children that carry a `slot` attribute, serialized
/// and sanitized, grouped by slot name. An empty name is the default slot.
pub fn collect_slots(
    doc: &Document,
    host: NodeId,
    sanitizer: &dyn Sanitizer,
) -> IndexMap<String, String> {
    let mut slots: IndexMap<String, String> = IndexMap::new();
    for &child in doc.children(host) {
        let Some(name) = doc.attribute(child, "slot") else {
            continue;
        };
        slots
            .entry(name.to_owned())
            .or_default()
            .push_str(&sanitizer.sanitize(&serialize(doc, child)));
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::DefaultSanitizer;
    use trellis_core::html::parse_fragment;
    use trellis_core::value_map;

    fn slots(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn interpolation_escapes_and_degrades() {
        let state = value_map! { "name" => "<b>ada</b>", "count" => 2 };
        let scope = Scope::merged(&state, &value_map! {});
        assert_eq!(
            interpolate("<p>{{ name }} has {{count + 1}} {{ missing.deep }}!</p>", &scope),
            "<p>&lt;b&gt;ada&lt;/b&gt; has 3 !</p>"
        );
        assert_eq!(interpolate("open {{ never closed", &scope), "open {{ never closed");
    }

    #[test]
    fn slots_are_substituted_by_name() {
        let filled = substitute_slots(
            r#"<header><slot name="title">Untitled</slot></header><main><slot></slot></main><footer><slot name="foot"/></footer>"#,
            &slots(&[("title", "<h1>Hi</h1>"), ("", "<p>body</p>")]),
        );
        assert_eq!(
            filled,
            "<header><h1>Hi</h1></header><main><p>body</p></main><footer></footer>"
        );
    }

    #[test]
    fn slotted_children_are_captured_per_name() {
        let mut doc = Document::new();
        let host = doc.create_element("x-card");
        for node in parse_fragment(
            &mut doc,
            r#"<h1 slot="title">T</h1><p slot>a</p><p>ignored</p><p slot="">b</p>"#,
        ) {
            doc.append_child(host, node).unwrap();
        }
        let captured = collect_slots(&doc, host, &DefaultSanitizer);
        assert_eq!(captured.get("title").unwrap(), r#"<h1 slot="title">T</h1>"#);
        assert_eq!(captured.get(DEFAULT_SLOT).unwrap(), "<p slot>a</p><p slot>b</p>");
        assert_eq!(captured.len(), 2);
    }

    #[test]
    fn slot_lookalikes_are_left_alone() {
        assert_eq!(
            substitute_slots("<slots>x</slots>", &IndexMap::new()),
            "<slots>x</slots>"
        );
    }
}
