//! Single-file components: one resource carrying a template, optional
//! configuration overrides and a scoped style.

use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use trellis_core::hash::scope_token;
use trellis_core::html::{inner_html, parse_fragment};
use trellis_core::Document;

use crate::config::{ComponentConfig, RenderSource};
use crate::error::ResourceError;
use crate::resources::{Fetcher, LinkKind};

#[derive(Debug, Clone, Default)]
pub struct SfcParts {
    pub template: Option<String>,
    pub config: Option<ComponentConfig>,
    pub style: Option<String>,
    pub scope_token: String,
}

pub trait SfcLoader {
    fn load(&self, address: &str) -> LocalBoxFuture<'static, Result<SfcParts, ResourceError>>;
}

/// Loads single-file components through a [`Fetcher`] and splits them
/// with [`split_sfc`]. Such files carry no configuration.
pub struct FetchSfcLoader {
    fetcher: Rc<dyn Fetcher>,
}

impl FetchSfcLoader {
    pub fn new(fetcher: Rc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl SfcLoader for FetchSfcLoader {
    fn load(&self, address: &str) -> LocalBoxFuture<'static, Result<SfcParts, ResourceError>> {
        let fetch = self.fetcher.fetch(LinkKind::Html, address);
        let address = address.to_owned();
        async move {
            let source = fetch.await?;
            Ok(split_sfc(&source, &address))
        }
        .boxed_local()
    }
}

/// Splits `<template>` and `<style>` blocks out of a file. `<script>`
/// blocks are dropped; configuration only arrives through a loader that
/// fills in [`SfcParts::config`].
///
/// Without a `<template>` block the whole file minus styles and scripts is
/// the template.
pub fn split_sfc(source: &str, address: &str) -> SfcParts {
    let mut doc = Document::new();
    let mut template = None;
    let mut styles = Vec::new();
    let mut rest = String::new();
    for node in parse_fragment(&mut doc, source) {
        match doc.tag(node) {
            Some("template") => template = Some(inner_html(&doc, node)),
            Some("style") => styles.push(doc.text_content(node)),
            Some("script") => log::debug!("{address}: script block ignored"),
            _ => rest.push_str(&trellis_core::html::serialize(&doc, node)),
        }
    }
    let template = template.or_else(|| (!rest.trim().is_empty()).then_some(rest));
    SfcParts {
        template,
        config: None,
        style: (!styles.is_empty()).then(|| styles.join("\n")),
        scope_token: scope_token(address),
    }
}

/// Folds `parts` into the working configuration. The template replaces
/// the render source; configuration fields set in the file fill in or
/// override the working ones.
pub fn merge(config: &mut ComponentConfig, parts: SfcParts) {
    if let Some(template) = parts.template {
        config.render = Some(RenderSource::Template(template));
    }
    if let Some(file) = parts.config {
        config.state.extend(file.state);
        config.methods.extend(file.methods);
        if file.render.is_some() {
            config.render = file.render;
        }
        if file.store.is_some() {
            config.store = file.store;
        }
        config.links.extend(file.links);
        if file.error_boundary.is_some() {
            config.error_boundary = file.error_boundary;
        }
        let hooks = file.hooks;
        macro_rules! take_hooks {
            ($($name:ident),*) => {$(
                if hooks.$name.is_some() {
                    config.hooks.$name = hooks.$name;
                }
            )*};
        }
        take_hooks!(
            before_load,
            after_load,
            on_mount,
            on_update,
            before_render,
            after_render,
            on_destroy
        );
        config.provide.extend(file.provide);
    }
    if let Some(style) = parts.style {
        config.style = Some(scope_css(&style, &parts.scope_token));
    }
}

/// Prefixes every selector of `css` with `.token` so the rules only apply
/// inside hosts carrying that class. At-rule blocks are scoped one level
/// deep.
pub fn scope_css(css: &str, token: &str) -> String {
    let mut out = String::with_capacity(css.len() + token.len() * 4);
    let mut rest = css;
    while let Some(open) = rest.find('{') {
        let selectors = rest[..open].trim();
        let body_start = open + 1;
        if selectors.starts_with('@') {
            // Find the matching close of the at-rule block.
            let mut depth = 1;
            let mut end = rest.len();
            for (i, ch) in rest[body_start..].char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = body_start + i;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            out.push_str(selectors);
            out.push_str(" { ");
            out.push_str(&scope_css(&rest[body_start..end], token));
            out.push_str(" }\n");
            rest = rest.get(end + 1..).unwrap_or("");
            continue;
        }
        let close = rest[body_start..]
            .find('}')
            .map_or(rest.len(), |i| body_start + i);
        let scoped: Vec<String> = selectors
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|selector| format!(".{token} {selector}"))
            .collect();
        out.push_str(&scoped.join(", "));
        out.push_str(" { ");
        out.push_str(rest[body_start..close].trim());
        out.push_str(" }\n");
        rest = rest.get(close + 1..).unwrap_or("");
    }
    out.trim_end().to_owned()
}
