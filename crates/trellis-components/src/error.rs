use thiserror::Error;
use trellis_core::{NodeError, StoreError};

/// Resource load failures. `Clone` so one shared pending load can hand the
/// same failure to every component waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("failed to fetch {address}: {reason}")]
    Fetch { address: String, reason: String },
    #[error("no single-file component loader is configured for {0}")]
    NoSfcLoader(String),
    #[error("load of {0} was abandoned")]
    Abandoned(String),
}

impl ResourceError {
    pub fn fetch(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    #[error("no component is registered under '{0}'")]
    ConfigurationMissing(String),
    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: Box<ComponentError>,
    },
    #[error("render failed: {0}")]
    Render(String),
    #[error("method '{0}' is not defined")]
    UnknownMethod(String),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Message(String),
}

impl ComponentError {
    /// Free-form failure raised by user code.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn in_hook(hook: &'static str, source: ComponentError) -> Self {
        Self::Hook {
            hook,
            source: Box::new(source),
        }
    }
}
