//! Components for Trellis: configuration, templates, the lifecycle
//! controller and shared resource loading.

pub(crate) mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod registry;
pub mod resources;
pub mod sanitize;
pub mod sfc;
pub mod template;

pub use config::{
    is_component_tag, ComponentConfig, ErrorBoundary, Hook, LifecycleHooks, Method, Plugin,
    RenderFn, RenderSource, UpdateHook,
};
pub use controller::{ComponentInstance, Framework, FrameworkConfig, Phase, DEFAULT_ERROR_CLASS};
pub use error::{ComponentError, ResourceError};
pub use registry::{ComponentRegistry, MemoryRegistry};
pub use resources::{Fetcher, LinkKind, LinkSpec, OfflineFetcher, ResourceCache};
pub use sanitize::{DefaultSanitizer, PassthroughSanitizer, Sanitizer};
pub use sfc::{FetchSfcLoader, SfcLoader, SfcParts};
pub use template::{RenderContext, DEFAULT_SLOT};
