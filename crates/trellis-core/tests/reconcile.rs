use std::rc::Rc;

use trellis_core::html::{inner_html, parse_fragment};
use trellis_core::{
    reconcile, reconcile_children, Document, Event, EventKind, NodeId, KEY_ATTRIBUTE,
};

fn mounted(html: &str) -> (Document, NodeId) {
    let mut doc = Document::new();
    let host = doc.create_element("x-app");
    let body = doc.body();
    doc.append_child(body, host).unwrap();
    render(&mut doc, host, html);
    (doc, host)
}

fn render(doc: &mut Document, host: NodeId, html: &str) {
    let nodes = parse_fragment(doc, html);
    reconcile_children(doc, host, &nodes).unwrap();
}

const PAGE: &str = concat!(
    r#"<header><h1>Todos</h1><input type="text" @input="draft"></header>"#,
    r#"<ul class="items">"#,
    r#"<li data-key="1"><span>milk</span><button @click="remove">x</button></li>"#,
    r#"<li data-key="2"><span>eggs</span><button @click="remove">x</button></li>"#,
    r#"</ul>"#,
    r#"<footer>2 left</footer>"#,
);

#[test]
fn reconciling_against_an_identical_copy_is_silent() {
    let (mut doc, host) = mounted(PAGE);
    let before = doc.mutation_count();
    let nodes = doc.len();
    for _ in 0..3 {
        render(&mut doc, host, PAGE);
    }
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(doc.len(), nodes);
    assert_eq!(inner_html(&doc, host), PAGE);
}

#[test]
fn differently_keyed_twins_are_replaced_not_patched() {
    let (mut doc, host) = mounted(r#"<p data-key="a">same</p>"#);
    let old = doc.children(host)[0];
    doc.set_attribute(old, "data-marker", "survived").unwrap();

    let fresh = parse_fragment(&mut doc, r#"<p data-key="b">same</p>"#)[0];
    reconcile(&mut doc, Some(old), Some(fresh), host, Some("a"), Some("b")).unwrap();

    let now = doc.children(host)[0];
    assert_eq!(now, fresh);
    assert_eq!(doc.attribute(now, "data-marker"), None);
    assert_eq!(doc.attribute(now, KEY_ATTRIBUTE), Some("b"));
}

#[test]
fn keyed_rows_survive_insertion_at_the_front() {
    let (mut doc, host) = mounted(PAGE);
    let ul = doc.children(host)[1];
    let milk = doc.children(ul)[0];
    doc.set_attribute(milk, "data-marker", "kept").unwrap();

    render(
        &mut doc,
        host,
        &PAGE.replace(
            r#"<ul class="items">"#,
            r#"<ul class="items"><li data-key="0"><span>bread</span></li>"#,
        ),
    );
    assert_eq!(doc.children(ul).len(), 3);
    assert_eq!(doc.children(ul)[1], milk);
    assert_eq!(doc.attribute(milk, "data-marker"), Some("kept"));
}

#[test]
fn unkeyed_rows_are_matched_by_position_only() {
    let (mut doc, host) = mounted("<ol><li>b</li><li>c</li></ol>");
    let ol = doc.children(host)[0];
    let first = doc.children(ol)[0];
    doc.set_attribute(first, "data-marker", "was-b").unwrap();

    render(&mut doc, host, "<ol><li>a</li><li>b</li><li>c</li></ol>");
    // The node that held "b" now holds "a"; its identity follows the
    // position, not the content.
    assert_eq!(doc.children(ol)[0], first);
    assert_eq!(doc.text_content(first), "a");
    assert_eq!(doc.attribute(first, "data-marker"), Some("was-b"));
    assert_eq!(doc.text_content(ol), "abc");
}

#[test]
fn removed_subtrees_take_their_listeners_along() {
    let (mut doc, host) = mounted(PAGE);
    let ul = doc.children(host)[1];
    for &li in doc.children(ul).to_vec().iter() {
        let button = doc.children(li)[1];
        doc.add_event_listener(button, EventKind::Click, Rc::new(|_: &Event| {}))
            .unwrap();
    }
    assert_eq!(doc.listener_count(), 2);
    render(&mut doc, host, "<footer>0 left</footer>");
    assert_eq!(doc.listener_count(), 0);
    assert_eq!(inner_html(&doc, host), "<footer>0 left</footer>");
}
