//! Request handlers invoked by the routing module.

use std::fmt;
use std::sync::Arc;

use httpmate_core::{BoxError, MetaData};

/// Endpoint logic for a route.
///
/// Handlers read request keys and write response keys. A failing handler
/// sends the request to `EXCEPTION_OCCURRED` like any other processor.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, meta: &mut MetaData) -> Result<(), BoxError>;
}

impl<F> Handler for F
where
    F: Fn(&mut MetaData) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn handle(&self, meta: &mut MetaData) -> Result<(), BoxError> {
        self(meta)
    }
}

/// A shared handler, as stored under [`HANDLER`](crate::keys::HANDLER).
#[derive(Clone)]
pub struct HandlerRef(Arc<dyn Handler>);

impl HandlerRef {
    pub fn new(handler: impl Handler) -> Self {
        Self(Arc::new(handler))
    }

    pub fn handle(&self, meta: &mut MetaData) -> Result<(), BoxError> {
        self.0.handle(meta)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerRef").finish_non_exhaustive()
    }
}
