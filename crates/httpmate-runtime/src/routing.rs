//! Route resolution and handler invocation.

use std::fmt;
use std::sync::Arc;

use httpmate_core::{Action, ChainExtender, ChainModule, ChainResult, ModuleDescriptor, named};
use httpmate_path::{PathRouter, PathTemplateResult};
use tracing::trace;

use crate::chains::{DETERMINE_HANDLER, INVOKE_HANDLER, NOT_FOUND};
use crate::core_module::CoreModule;
use crate::handler::{Handler, HandlerRef};
use crate::keys::{HANDLER, METHOD, PATH, PATH_PARAMETERS};

#[derive(Clone)]
struct Route {
    /// `None` accepts every method.
    method: Option<String>,
    handler: HandlerRef,
}

impl Route {
    fn accepts(&self, method: Option<&str>) -> bool {
        match (&self.method, method) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }
}

/// Maps `(METHOD, PATH)` to a handler.
///
/// In `DETERMINE_HANDLER` the first route whose method and template match
/// stores its handler under [`HANDLER`] and its captures under
/// [`PATH_PARAMETERS`]; without a match the request jumps to `NOT_FOUND`.
/// In `INVOKE_HANDLER` the stored handler runs.
///
/// Other modules and configurators can add routes during `configure`
/// through [`add_route`](Self::add_route).
#[derive(Default, Clone)]
pub struct RoutingModule {
    router: PathRouter<Route>,
}

impl RoutingModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route for `method`.
    pub fn route(
        mut self,
        method: &str,
        template: &str,
        handler: impl Handler,
    ) -> PathTemplateResult<Self> {
        self.add_route(Some(method), template, HandlerRef::new(handler))?;
        Ok(self)
    }

    /// Adds a route accepting every method.
    pub fn any(mut self, template: &str, handler: impl Handler) -> PathTemplateResult<Self> {
        self.add_route(None, template, HandlerRef::new(handler))?;
        Ok(self)
    }

    /// Adds a route in place. Routes are tried in the order they were added.
    pub fn add_route(
        &mut self,
        method: Option<&str>,
        template: &str,
        handler: HandlerRef,
    ) -> PathTemplateResult<()> {
        self.router.route(
            template,
            Route {
                method: method.map(str::to_ascii_uppercase),
                handler,
            },
        )?;
        Ok(())
    }

    pub fn route_count(&self) -> usize {
        self.router.len()
    }
}

impl fmt::Debug for RoutingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: Vec<String> = self
            .router
            .iter()
            .map(|(template, route)| {
                format!("{} {template}", route.method.as_deref().unwrap_or("*"))
            })
            .collect();
        f.debug_struct("RoutingModule")
            .field("routes", &routes)
            .finish()
    }
}

impl ChainModule for RoutingModule {
    fn dependencies(&self) -> Vec<ModuleDescriptor> {
        vec![ModuleDescriptor::of::<CoreModule>()]
    }

    fn register(&mut self, extender: &mut ChainExtender<'_>) -> ChainResult<()> {
        let router = Arc::new(self.router.clone());

        extender.append_processor(
            &DETERMINE_HANDLER,
            named("determine-handler", move |meta| {
                let path = meta.get(&PATH)?;
                let method = meta.get_optional(&METHOD).map(String::as_str);
                let Some(found) = router.find_where(path, |route| route.accepts(method)) else {
                    trace!(path = %path, "No route matched");
                    return Ok(());
                };
                trace!(path = %path, template = %found.template, "Route matched");
                let handler = found.value.handler.clone();
                let parameters = found.parameters;
                meta.set(&HANDLER, handler);
                meta.set(&PATH_PARAMETERS, parameters);
                Ok(())
            }),
        )?;

        extender.route_if(
            &DETERMINE_HANDLER,
            |meta| !meta.contains(&HANDLER),
            Action::jump(&NOT_FOUND),
            "HANDLER is not set",
        )?;

        extender.append_processor(
            &INVOKE_HANDLER,
            named("invoke-handler", |meta| {
                let handler = meta.get(&HANDLER)?.clone();
                handler.handle(meta)
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{RESPONSE_STATUS, STRING_RESPONSE};
    use httpmate_core::{BoxError, ChainRegistry, ChainRegistryBuilder, MetaData};

    fn echo_id(meta: &mut MetaData) -> Result<(), BoxError> {
        let id = meta.get(&PATH_PARAMETERS)?.get("id").cloned().unwrap_or_default();
        meta.set(&STRING_RESPONSE, format!("user {id}"));
        Ok(())
    }

    fn registry(routing: RoutingModule) -> ChainRegistry {
        ChainRegistryBuilder::new()
            .with_module(routing)
            .build()
            .unwrap()
    }

    fn run(registry: &ChainRegistry, method: &str, path: &str) -> MetaData {
        let (tx, rx) = std::sync::mpsc::channel();
        let meta = MetaData::new()
            .with(&METHOD, method.to_string())
            .with(&PATH, path.to_string());
        registry
            .put_into_chain(&crate::chains::INIT, meta, move |meta| {
                let _ = tx.send(meta);
            })
            .unwrap();
        rx.recv().unwrap()
    }

    #[test]
    fn test_matched_route_invokes_handler() {
        let registry = registry(
            RoutingModule::new()
                .route("get", "/users/<id>", echo_id)
                .unwrap(),
        );
        let meta = run(&registry, "GET", "/users/7");
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "user 7");
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &200);
    }

    #[test]
    fn test_unmatched_path_is_not_found() {
        let registry = registry(
            RoutingModule::new()
                .route("GET", "/wild/<parameter>/card", echo_id)
                .unwrap(),
        );
        let meta = run(&registry, "GET", "/wild/card");
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &404);
        assert!(!meta.contains(&STRING_RESPONSE));
    }

    #[test]
    fn test_method_mismatch_is_not_found() {
        let registry = registry(
            RoutingModule::new()
                .route("POST", "/users/<id>", echo_id)
                .unwrap(),
        );
        assert_eq!(
            run(&registry, "GET", "/users/7").get(&RESPONSE_STATUS).unwrap(),
            &404
        );
    }

    #[test]
    fn test_any_route_accepts_every_method() {
        let asset = |meta: &mut MetaData| -> Result<(), BoxError> {
            meta.set(&STRING_RESPONSE, "asset".to_string());
            Ok(())
        };
        let registry = registry(RoutingModule::new().any("/static/*", asset).unwrap());
        for method in ["GET", "DELETE"] {
            let meta = run(&registry, method, "/static/css/site.css");
            assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "asset");
        }
    }

    #[test]
    fn test_failing_handler_yields_error_status() {
        let registry = registry(
            RoutingModule::new()
                .route("GET", "/boom", |_: &mut MetaData| -> Result<(), BoxError> {
                    Err("handler exploded".into())
                })
                .unwrap(),
        );
        let meta = run(&registry, "GET", "/boom");
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &500);
    }

    #[test]
    fn test_missing_path_is_a_processing_failure() {
        let registry = registry(RoutingModule::new());
        let (tx, rx) = std::sync::mpsc::channel();
        registry
            .put_into_chain(&crate::chains::INIT, MetaData::new(), move |meta| {
                let _ = tx.send(meta);
            })
            .unwrap();
        let meta = rx.recv().unwrap();
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &500);
        assert!(
            meta.get(&httpmate_core::EXCEPTION)
                .unwrap()
                .to_string()
                .contains("PATH")
        );
    }

    #[test]
    fn test_routes_added_by_configurator() {
        let registry = ChainRegistryBuilder::new()
            .with_configurator(
                |deps: &mut httpmate_core::DependencyRegistry<'_>| -> Result<(), BoxError> {
                    deps.get_dependency::<RoutingModule>()?.add_route(
                        Some("GET"),
                        "/users/<id>",
                        HandlerRef::new(echo_id),
                    )?;
                    Ok(())
                },
            )
            .with_module(RoutingModule::new())
            .build()
            .unwrap();
        let meta = run(&registry, "GET", "/users/9");
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "user 9");
    }
}
