use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_components::{
    ComponentConfig, ComponentError, ComponentInstance, ComponentRegistry, FrameworkConfig,
    MemoryRegistry, Phase,
};
use trellis_core::{value_map, Value};
use trellis_testing::{logs_at, Level, TestApp};

fn counter() -> ComponentConfig {
    ComponentConfig::new("x-counter")
        .state(value_map! { "count" => 0 })
        .template(r#"<button @click="inc">{{ count }}</button>"#)
        .method("inc", |instance, _event| {
            instance
                .state()
                .update("count", |count| Value::from(count.to_number() + 1.0));
            Ok(())
        })
}

#[test]
fn counter_renders_once_per_click() {
    let registry = MemoryRegistry::new();
    registry.define(counter());
    let app = TestApp::with_registry(&registry);
    let counter = app.load("<x-counter></x-counter>").remove(0);

    assert_eq!(counter.phase(), Phase::Mounted);
    assert_eq!(counter.render_count(), 1);
    let button = app.find("button").unwrap();
    assert_eq!(app.text(button), "0");

    assert_eq!(app.click(button), 1);
    assert_eq!(app.text(button), "1");
    assert_eq!(counter.render_count(), 2);

    app.click(button);
    app.click(button);
    assert_eq!(app.text(button), "3");
    assert_eq!(counter.render_count(), 4);
    // The button survived every render, so it kept its listener.
    assert_eq!(app.find("button"), Some(button));
    assert_eq!(app.listener_count(), 1);
}

#[test]
fn rerendering_recycles_document_nodes() {
    let registry = MemoryRegistry::new();
    registry.define(counter());
    let app = TestApp::with_registry(&registry);
    let counter = app.load("<x-counter></x-counter>").remove(0);
    let button = app.find("button").unwrap();
    app.click(button);
    let allocated = app.document().borrow().allocated();
    let live = app.document().borrow().len();

    for _ in 0..50 {
        app.click(button);
    }
    assert_eq!(app.text(button), "51");
    assert_eq!(counter.render_count(), 52);
    assert_eq!(app.document().borrow().allocated(), allocated);
    assert_eq!(app.document().borrow().len(), live);
}

#[test]
fn writes_within_one_handler_coalesce() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-burst")
            .state(value_map! { "n" => 0 })
            .template(r#"<button @click="burst">{{ n }}</button>"#)
            .method("burst", |instance, _event| {
                let state = instance.state();
                for i in 1..=5 {
                    state.set("n", i);
                }
                Ok(())
            }),
    );
    let app = TestApp::with_registry(&registry);
    let burst = app.load("<x-burst></x-burst>").remove(0);
    let button = app.find("button").unwrap();
    app.click(button);
    assert_eq!(app.text(button), "5");
    assert_eq!(burst.render_count(), 2);
}

#[test]
fn hooks_run_in_lifecycle_order() {
    let calls: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let record = |name: &'static str| {
        let calls = Rc::clone(&calls);
        move |_: &ComponentInstance| -> Result<(), ComponentError> {
            calls.borrow_mut().push(name);
            Ok(())
        }
    };
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-hooked")
            .template("<p>hi</p>")
            .before_load(record("before_load"))
            .after_load(record("after_load"))
            .before_render(record("before_render"))
            .after_render(record("after_render"))
            .on_mount(record("on_mount"))
            .on_destroy(record("on_destroy")),
    );
    let app = TestApp::with_registry(&registry);
    let hooked = app.load("<x-hooked></x-hooked>").remove(0);
    assert_eq!(
        *calls.borrow(),
        ["before_load", "after_load", "before_render", "after_render", "on_mount"]
    );

    calls.borrow_mut().clear();
    hooked.request_render();
    app.settle();
    assert_eq!(*calls.borrow(), ["before_render", "after_render"]);

    calls.borrow_mut().clear();
    assert!(app.framework().unmount(hooked.host()));
    assert_eq!(*calls.borrow(), ["on_destroy"]);
    assert_eq!(hooked.phase(), Phase::Destroyed);
}

#[test]
fn state_written_before_the_first_render_is_covered_by_it() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-early")
            .state(value_map! { "label" => "draft" })
            .template("<p>{{ label }}</p>")
            .before_load(|instance| {
                instance.state().set("label", "ready");
                Ok(())
            }),
    );
    let app = TestApp::with_registry(&registry);
    let early = app.load("<x-early></x-early>").remove(0);
    assert_eq!(app.text(early.host()), "ready");
    assert_eq!(early.render_count(), 1);
}

#[test]
fn failing_render_shows_the_default_error_box() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-broken")
            .render_fn(|_| Err(ComponentError::msg("broken-render-fault"))),
    );
    let app = TestApp::with_registry(&registry);
    let broken = app.load("<x-broken></x-broken>").remove(0);

    assert_eq!(broken.phase(), Phase::Errored);
    assert_eq!(broken.error().as_deref(), Some("broken-render-fault"));
    assert_eq!(
        app.inner_html(broken.host()),
        r#"<div class="trellis-error" role="alert">broken-render-fault</div>"#
    );
    assert!(!logs_at(Level::Error, "broken-render-fault").is_empty());
}

#[test]
fn error_boundary_replaces_the_default_box() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-guarded")
            .template("<p>never</p>")
            .before_render(|_| Err(ComponentError::msg("nope")))
            .error_boundary(|message| format!(r#"<p class="oops">{message}</p>"#)),
    );
    let app = TestApp::with_registry(&registry);
    let guarded = app.load("<x-guarded></x-guarded>").remove(0);
    assert_eq!(guarded.phase(), Phase::Errored);
    assert_eq!(
        app.inner_html(guarded.host()),
        r#"<p class="oops">before_render hook failed: nope</p>"#
    );
}

#[test]
fn one_failing_component_leaves_its_siblings_alone() {
    let registry = MemoryRegistry::new();
    registry.define(counter());
    registry.define(
        ComponentConfig::new("x-faulty").on_mount(|_| Err(ComponentError::msg("late"))),
    );
    let app = TestApp::with_registry(&registry);
    let mounted = app.load("<x-faulty></x-faulty><x-counter></x-counter>");
    assert_eq!(mounted[0].phase(), Phase::Errored);
    assert_eq!(mounted[1].phase(), Phase::Mounted);

    let button = app.find("button").unwrap();
    app.click(button);
    assert_eq!(app.text(button), "1");
}

#[test]
fn missing_configuration_is_reported_in_place() {
    let app = TestApp::with_registry(&MemoryRegistry::new());
    let ghost = app.load("<x-ghost></x-ghost>").remove(0);
    assert_eq!(ghost.phase(), Phase::Errored);
    assert!(app.text(ghost.host()).contains("x-ghost"));
}

#[test]
fn renders_are_ignored_after_an_error() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-stuck")
            .state(value_map! { "n" => 0 })
            .template("<p>{{ n }}</p>")
            .on_mount(|_| Err(ComponentError::msg("stuck"))),
    );
    let app = TestApp::with_registry(&registry);
    let stuck = app.load("<x-stuck></x-stuck>").remove(0);
    let shown = app.inner_html(stuck.host());

    stuck.state().set("n", 7);
    app.settle();
    assert_eq!(app.inner_html(stuck.host()), shown);
    assert_eq!(stuck.render_count(), 1);
}

#[test]
fn events_bubble_to_the_declaring_element() {
    let hits = Rc::new(Cell::new(0));
    let registry = MemoryRegistry::new();
    {
        let hits = Rc::clone(&hits);
        registry.define(
            ComponentConfig::new("x-panel")
                .template(r#"<div @click="hit"><span><b>deep</b></span></div>"#)
                .method("hit", move |_, _| {
                    hits.set(hits.get() + 1);
                    Ok(())
                }),
        );
    }
    let app = TestApp::with_registry(&registry);
    app.load("<x-panel></x-panel>");
    let deep = app.find("b").unwrap();
    assert_eq!(app.click(deep), 1);
    assert_eq!(hits.get(), 1);
}

#[test]
fn input_events_carry_their_value() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-echo")
            .state(value_map! { "draft" => "" })
            .template(r#"<input @input="typed"><p>{{ draft.toUpperCase() }}</p>"#)
            .method("typed", |instance, event| {
                instance
                    .state()
                    .set("draft", event.value.clone().unwrap_or_default());
                Ok(())
            }),
    );
    let app = TestApp::with_registry(&registry);
    app.load("<x-echo></x-echo>");
    let input = app.find("input").unwrap();
    app.input(input, "hello");
    assert_eq!(app.text(app.find("p").unwrap()), "HELLO");
    assert_eq!(app.find("input"), Some(input));
}

#[test]
fn unknown_methods_are_reported_once() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-typo")
            .state(value_map! { "n" => 0 })
            .template(r#"<button @click="incremnt-typo">{{ n }}</button>"#),
    );
    let app = TestApp::with_registry(&registry);
    let typo = app.load("<x-typo></x-typo>").remove(0);
    typo.state().set("n", 1);
    app.settle();

    assert_eq!(typo.phase(), Phase::Mounted);
    assert_eq!(app.listener_count(), 0);
    assert_eq!(logs_at(Level::Warn, "incremnt-typo").len(), 1);
}

#[test]
fn failing_methods_are_logged_without_erroring_the_component() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-grumpy")
            .template(r#"<button @click="complain">go</button>"#)
            .method("complain", |_, _| Err(ComponentError::msg("grumpy-method-fault"))),
    );
    let app = TestApp::with_registry(&registry);
    let grumpy = app.load("<x-grumpy></x-grumpy>").remove(0);
    app.click(app.find("button").unwrap());
    assert_eq!(grumpy.phase(), Phase::Mounted);
    assert_eq!(logs_at(Level::Error, "grumpy-method-fault").len(), 1);
}

#[test]
fn destroy_cascades_through_owned_children() {
    let destroyed = Rc::new(Cell::new(0));
    let registry = MemoryRegistry::new();
    {
        let destroyed = Rc::clone(&destroyed);
        registry.define(
            ComponentConfig::new("x-leaf")
                .template(r#"<button @click="noop">leaf</button>"#)
                .method("noop", |_, _| Ok(()))
                .on_destroy(move |_| {
                    destroyed.set(destroyed.get() + 1);
                    Ok(())
                }),
        );
    }
    registry.define(
        ComponentConfig::new("x-tree")
            .template(r#"<div @click="noop"><x-leaf></x-leaf><x-leaf></x-leaf></div>"#)
            .method("noop", |_, _| Ok(())),
    );
    let app = TestApp::with_registry(&registry);
    let tree = app.load("<x-tree></x-tree>").remove(0);

    assert_eq!(tree.children().len(), 2);
    assert!(tree.children().iter().all(|leaf| leaf.phase() == Phase::Mounted));
    assert!(tree.children().iter().all(|leaf| leaf.parent().is_some()));
    assert_eq!(app.framework().instance_count(), 3);
    assert_eq!(app.listener_count(), 3);

    let leaves = tree.children();
    assert!(app.framework().unmount(tree.host()));
    assert_eq!(destroyed.get(), 2);
    assert_eq!(app.listener_count(), 0);
    assert_eq!(app.framework().instance_count(), 0);
    assert!(leaves.iter().all(|leaf| leaf.phase() == Phase::Destroyed));
    assert!(app.framework().roots().is_empty());
}

#[test]
fn children_dropped_from_the_output_are_destroyed() {
    let registry = MemoryRegistry::new();
    registry.define(ComponentConfig::new("x-item").template("<i>item</i>"));
    registry.define(
        ComponentConfig::new("x-list")
            .state(value_map! { "show" => true })
            .render_fn(|ctx| {
                let extra = if ctx.state.get("show").is_truthy() {
                    r#"<x-item data-key="b"></x-item>"#
                } else {
                    ""
                };
                Ok(format!(r#"<x-item data-key="a"></x-item>{extra}"#))
            }),
    );
    let app = TestApp::with_registry(&registry);
    let list = app.load("<x-list></x-list>").remove(0);
    assert_eq!(list.children().len(), 2);
    let first = list.children()[0].clone();
    let second = list.children()[1].clone();

    list.state().set("show", false);
    app.settle();
    assert_eq!(list.children().len(), 1);
    assert_eq!(second.phase(), Phase::Destroyed);
    assert_eq!(first.phase(), Phase::Mounted);
    assert_eq!(first.render_count(), 1, "surviving child is left alone");
    assert_eq!(app.framework().instance_count(), 2);
}

#[test]
fn plugins_can_extend_the_working_configuration() {
    let mounted = Rc::new(Cell::new(false));
    let registry = MemoryRegistry::new();
    registry.define(ComponentConfig::new("x-plain").template("<p>{{ plugged }}</p>"));
    let config = {
        let mounted = Rc::clone(&mounted);
        FrameworkConfig::new(Rc::new(registry.clone())).plugin(move |_, config| {
            config
                .state
                .insert("plugged".to_owned(), Value::from("yes"));
            let mounted = Rc::clone(&mounted);
            config.hooks.on_mount = Some(Rc::new(
                move |_: &ComponentInstance| -> Result<(), ComponentError> {
                    mounted.set(true);
                    Ok(())
                },
            ));
            Ok(())
        })
    };
    let app = TestApp::new(config);
    let plain = app.load("<x-plain></x-plain>").remove(0);
    assert_eq!(app.text(plain.host()), "yes");
    assert!(mounted.get());
    let registered = registry.get("x-plain").unwrap();
    assert!(registered.state.is_empty());
    assert!(registered.hooks.on_mount.is_none());
}

#[test]
fn provided_values_reach_descendants() {
    let registry = MemoryRegistry::new();
    registry.define(
        ComponentConfig::new("x-theme")
            .provide("color", "teal")
            .template("<section><x-swatch></x-swatch></section>"),
    );
    registry.define(ComponentConfig::new("x-swatch").render_fn(|ctx| {
        Ok(format!(
            "<i>{}</i><b>{}</b>",
            ctx.inject("color").to_display(),
            ctx.inject("size").to_display()
        ))
    }));
    let app = TestApp::with_registry(&registry);
    let theme = app.load("<x-theme></x-theme>").remove(0);
    let swatch = theme.children().remove(0);
    assert_eq!(app.inner_html(swatch.host()), "<i>teal</i><b></b>");
    assert_eq!(swatch.inject("color"), Value::from("teal"));
    assert_eq!(theme.inject("missing"), Value::Undefined);
}
