//! The assembled request pipeline.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use httpmate_runtime::{HttpMate, Outcome, keys::STRING_RESPONSE};
//!
//! let httpmate = HttpMate::builder()
//!     .get("/hello/<name>", |meta: &mut MetaData| -> Result<(), BoxError> {
//!         let name = meta.get(&PATH_PARAMETERS)?["name"].clone();
//!         meta.set(&STRING_RESPONSE, format!("hello {name}"));
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let outcome = httpmate.handle(HttpMate::request("GET", "/hello/world"))?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;

use httpmate_core::{
    ChainError, ChainModule, ChainName, ChainRegistry, ChainRegistryBuilder, Configurator,
    MetaData, ModuleDescriptor, PipelineGraph,
};
use httpmate_path::PathTemplateError;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::{ConfigLoader, HttpMateConfig, validate_config};
use crate::core_module::CoreModule;
use crate::error::{RuntimeError, RuntimeResult};
use crate::handler::{Handler, HandlerRef};
use crate::keys::{HEADERS, METHOD, PATH, QUERY_PARAMETERS, StringMap, parse_query};
use crate::logging;
use crate::routing::RoutingModule;

/// How a request left the pipeline.
#[derive(Debug)]
pub enum Outcome {
    /// A chain consumed the request; the metadata carries the response keys.
    Consumed(MetaData),
    /// A chain dropped the request.
    Dropped,
}

impl Outcome {
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed(_))
    }

    /// Returns the final metadata of a consumed request.
    pub fn into_consumed(self) -> Option<MetaData> {
        match self {
            Self::Consumed(meta) => Some(meta),
            Self::Dropped => None,
        }
    }
}

/// A built chain registry together with the chain requests enter.
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone)]
pub struct HttpMate {
    registry: Arc<ChainRegistry>,
    start: ChainName,
    config: HttpMateConfig,
}

impl HttpMate {
    pub fn builder() -> HttpMateBuilder {
        HttpMateBuilder::new()
    }

    /// Creates request metadata from a method and a path with an optional
    /// query string.
    pub fn request(method: &str, path_and_query: &str) -> MetaData {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (path_and_query, StringMap::new()),
        };
        MetaData::new()
            .with(&METHOD, method.to_ascii_uppercase())
            .with(&PATH, path.to_string())
            .with(&QUERY_PARAMETERS, query)
            .with(&HEADERS, StringMap::new())
    }

    /// Runs `meta` through the pipeline on the calling thread.
    ///
    /// Blocks until the run completes; if a processor takes the run's
    /// [`Completion`](httpmate_core::Completion), that is whenever its new
    /// owner completes it.
    ///
    /// # Errors
    ///
    /// [`ChainError::NoChainForName`] if a jump targets an unknown chain.
    pub fn handle(&self, meta: MetaData) -> RuntimeResult<Outcome> {
        let (tx, rx) = mpsc::channel();
        self.registry.put_into_chain(&self.start, meta, move |meta| {
            let _ = tx.send(meta);
        })?;
        // The sender is dropped without sending when the run is dropped.
        Ok(rx.recv().map_or(Outcome::Dropped, Outcome::Consumed))
    }

    /// Like [`handle`](Self::handle), but awaits completion.
    pub async fn handle_async(&self, meta: MetaData) -> RuntimeResult<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.registry.put_into_chain(&self.start, meta, move |meta| {
            let _ = tx.send(meta);
        })?;
        Ok(rx.await.map_or(Outcome::Dropped, Outcome::Consumed))
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HttpMateConfig {
        &self.config
    }

    pub fn start_chain(&self) -> &ChainName {
        &self.start
    }

    pub fn topology(&self) -> PipelineGraph {
        self.registry.topology()
    }

    /// Runs the registered closing actions.
    pub fn close(&self) {
        self.registry.close();
    }
}

/// Builder for [`HttpMate`].
///
/// Without an explicit [`config`](Self::config), configuration is loaded
/// through [`ConfigLoader`] on [`build`](Self::build). [`CoreModule`] is
/// always part of the pipeline; routes added through the builder go into a
/// [`RoutingModule`].
pub struct HttpMateBuilder {
    config_loader: ConfigLoader,
    config: Option<HttpMateConfig>,
    chains: ChainRegistryBuilder,
    routing: Option<RoutingModule>,
    route_error: Option<PathTemplateError>,
    init_logging: bool,
}

impl HttpMateBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            chains: ChainRegistryBuilder::new(),
            routing: None,
            route_error: None,
            init_logging: true,
        }
    }

    /// Uses `config` instead of loading one.
    pub fn config(mut self, config: HttpMateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Leaves the global subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn with_module<M: ChainModule>(mut self, module: M) -> Self {
        self.chains.add_module(Box::new(module));
        self
    }

    pub fn with_descriptor(mut self, descriptor: ModuleDescriptor) -> Self {
        self.chains = self.chains.with_descriptor(descriptor);
        self
    }

    pub fn with_configurator(mut self, configurator: impl Configurator + 'static) -> Self {
        self.chains.add_configurator(Box::new(configurator));
        self
    }

    /// Replaces the builder's routing module.
    pub fn routing(mut self, routing: RoutingModule) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn get(self, template: &str, handler: impl Handler) -> Self {
        self.route(Some("GET"), template, handler)
    }

    pub fn post(self, template: &str, handler: impl Handler) -> Self {
        self.route(Some("POST"), template, handler)
    }

    pub fn put(self, template: &str, handler: impl Handler) -> Self {
        self.route(Some("PUT"), template, handler)
    }

    pub fn delete(self, template: &str, handler: impl Handler) -> Self {
        self.route(Some("DELETE"), template, handler)
    }

    /// Adds a route; `None` accepts every method. An invalid template is
    /// reported by [`build`](Self::build).
    pub fn route(mut self, method: Option<&str>, template: &str, handler: impl Handler) -> Self {
        let routing = self.routing.get_or_insert_with(RoutingModule::new);
        if let Err(e) = routing.add_route(method, template, HandlerRef::new(handler))
            && self.route_error.is_none()
        {
            self.route_error = Some(e);
        }
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if the configuration cannot be loaded or is
    ///   invalid.
    /// - [`RuntimeError::Route`] for the first invalid route template.
    /// - [`RuntimeError::Chain`] if the modules cannot be assembled or the
    ///   start chain does not exist.
    /// - [`RuntimeError::TopologyExport`] if the configured topology file
    ///   cannot be written.
    pub fn build(self) -> RuntimeResult<HttpMate> {
        let Self {
            config_loader,
            config,
            mut chains,
            routing,
            route_error,
            init_logging,
        } = self;

        let config = match config {
            Some(config) => config,
            None => config_loader.load()?,
        };
        validate_config(&config)?;
        if init_logging {
            logging::init_from_config(&config.logging);
        }
        if let Some(e) = route_error {
            return Err(e.into());
        }

        if let Some(routing) = routing {
            debug!(routes = routing.route_count(), "Adding builder routes");
            chains.add_module(Box::new(routing));
        }
        let registry = chains
            .with_descriptor(ModuleDescriptor::of::<CoreModule>())
            .build()?;

        let start = ChainName::new(config.engine.start_chain.clone())?;
        if !registry.contains_chain(&start) {
            return Err(ChainError::NoChainForName(start).into());
        }

        if config.engine.log_topology || config.engine.topology_file.is_some() {
            let dot = registry.topology().to_dot();
            if config.engine.log_topology {
                debug!(topology = %dot, "Chain topology");
            }
            if let Some(path) = &config.engine.topology_file {
                write_topology(path, &dot)?;
            }
        }

        info!(
            start = %start,
            chains = registry.chain_count(),
            "HttpMate ready"
        );

        Ok(HttpMate {
            registry: Arc::new(registry),
            start,
            config,
        })
    }
}

impl Default for HttpMateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_topology(path: &Path, dot: &str) -> RuntimeResult<()> {
    std::fs::write(path, dot).map_err(|source| RuntimeError::TopologyExport {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Chain topology written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::INIT;
    use crate::keys::{BODY_STRING, PATH_PARAMETERS, RESPONSE_STATUS, STRING_RESPONSE};
    use httpmate_core::{Action, BoxError, ChainExtender, ChainResult, Completion};

    fn hello(meta: &mut MetaData) -> Result<(), BoxError> {
        let name = meta.get(&PATH_PARAMETERS)?["name"].clone();
        let greeting = match meta.get(&QUERY_PARAMETERS)?.get("greeting") {
            Some(greeting) => greeting.clone(),
            None => "hello".to_string(),
        };
        meta.set(&STRING_RESPONSE, format!("{greeting} {name}"));
        Ok(())
    }

    fn echo(meta: &mut MetaData) -> Result<(), BoxError> {
        let body = meta.get(&BODY_STRING)?.clone();
        meta.set(&STRING_RESPONSE, body);
        Ok(())
    }

    /// Answers from a worker thread after the pipeline has returned.
    fn shout_later(meta: &mut MetaData) -> Result<(), BoxError> {
        let (mut meta, completion) = Completion::take(meta)?;
        std::thread::spawn(move || {
            let body = meta.get_optional(&BODY_STRING).cloned().unwrap_or_default();
            meta.set(&STRING_RESPONSE, body.to_uppercase());
            meta.set(&RESPONSE_STATUS, 202);
            completion.complete(meta);
        });
        Ok(())
    }

    #[derive(Default)]
    struct Firewall;

    impl ChainModule for Firewall {
        fn dependencies(&self) -> Vec<ModuleDescriptor> {
            vec![ModuleDescriptor::of::<CoreModule>()]
        }

        fn register(&mut self, extender: &mut ChainExtender<'_>) -> ChainResult<()> {
            extender.route_if(
                &INIT,
                |meta| meta.get_optional(&METHOD).is_some_and(|m| m == "TRACE"),
                Action::Drop,
                "METHOD is TRACE",
            )
        }
    }

    fn builder() -> HttpMateBuilder {
        HttpMate::builder()
            .config(HttpMateConfig::default())
            .without_logging()
    }

    #[test]
    fn test_request_splits_query() {
        let meta = HttpMate::request("get", "/search?q=rust&page=2");
        assert_eq!(meta.get(&METHOD).unwrap(), "GET");
        assert_eq!(meta.get(&PATH).unwrap(), "/search");
        assert_eq!(meta.get(&QUERY_PARAMETERS).unwrap()["page"], "2");
        assert!(meta.get(&HEADERS).unwrap().is_empty());
    }

    #[test]
    fn test_routed_request_is_consumed() {
        let httpmate = builder().get("/hello/<name>", hello).build().unwrap();
        let meta = httpmate
            .handle(HttpMate::request("GET", "/hello/world?greeting=hi"))
            .unwrap()
            .into_consumed()
            .unwrap();
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "hi world");
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &200);
    }

    #[test]
    fn test_unrouted_request_is_not_found() {
        let httpmate = builder().get("/hello/<name>", hello).build().unwrap();
        let meta = httpmate
            .handle(HttpMate::request("GET", "/goodbye"))
            .unwrap()
            .into_consumed()
            .unwrap();
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &404);
    }

    #[test]
    fn test_core_module_is_always_present() {
        let httpmate = builder().build().unwrap();
        assert!(httpmate.registry().contains_chain(&INIT));
        assert_eq!(httpmate.start_chain(), &INIT);
        assert!(httpmate.topology().node("ERROR").is_some());
    }

    #[test]
    fn test_dropped_request() {
        let httpmate = builder().with_module(Firewall).build().unwrap();
        let outcome = httpmate.handle(HttpMate::request("TRACE", "/")).unwrap();
        assert!(!outcome.is_consumed());
        assert!(outcome.into_consumed().is_none());
    }

    #[tokio::test]
    async fn test_handle_async() {
        let httpmate = builder()
            .with_module(Firewall)
            .get("/hello/<name>", hello)
            .build()
            .unwrap();

        let consumed = httpmate
            .handle_async(HttpMate::request("GET", "/hello/async"))
            .await
            .unwrap();
        let meta = consumed.into_consumed().unwrap();
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "hello async");

        let dropped = httpmate
            .handle_async(HttpMate::request("TRACE", "/hello/async"))
            .await
            .unwrap();
        assert!(matches!(dropped, Outcome::Dropped));
    }

    #[test]
    fn test_request_body_reaches_handler() {
        let httpmate = builder().post("/echo", echo).build().unwrap();
        let request = HttpMate::request("POST", "/echo").with(&BODY_STRING, "ping".to_string());
        let meta = httpmate.handle(request).unwrap().into_consumed().unwrap();
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "ping");

        let missing = httpmate
            .handle(HttpMate::request("POST", "/echo"))
            .unwrap()
            .into_consumed()
            .unwrap();
        assert_eq!(missing.get(&RESPONSE_STATUS).unwrap(), &500);
    }

    #[test]
    fn test_handler_completes_from_another_thread() {
        let httpmate = builder().post("/shout", shout_later).build().unwrap();
        let request = HttpMate::request("POST", "/shout").with(&BODY_STRING, "hey".to_string());
        let meta = httpmate.handle(request).unwrap().into_consumed().unwrap();
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "HEY");
        assert_eq!(meta.get(&RESPONSE_STATUS).unwrap(), &202);
    }

    #[tokio::test]
    async fn test_handle_async_resolves_from_another_thread() {
        let httpmate = builder().post("/shout", shout_later).build().unwrap();
        let request = HttpMate::request("POST", "/shout").with(&BODY_STRING, "async".to_string());
        let meta = httpmate
            .handle_async(request)
            .await
            .unwrap()
            .into_consumed()
            .unwrap();
        assert_eq!(meta.get(&STRING_RESPONSE).unwrap(), "ASYNC");
    }

    #[test]
    fn test_invalid_route_template() {
        let result = builder().get("/files/|[|", hello).build();
        assert!(matches!(
            result,
            Err(RuntimeError::Route(PathTemplateError::InvalidRegex { .. }))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = HttpMateConfig::default();
        config.engine.start_chain = String::new();
        let result = HttpMate::builder().config(config).without_logging().build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_unknown_start_chain() {
        let mut config = HttpMateConfig::default();
        config.engine.start_chain = "MISSING".to_string();
        let result = HttpMate::builder().config(config).without_logging().build();
        assert!(matches!(
            result,
            Err(RuntimeError::Chain(ChainError::NoChainForName(name))) if name.as_str() == "MISSING"
        ));
    }

    #[test]
    fn test_topology_file_is_written() {
        let path = std::env::temp_dir()
            .join(format!("httpmate-topology-{}.dot", std::process::id()));
        let mut config = HttpMateConfig::default();
        config.engine.topology_file = Some(path.clone());
        builder().config(config).build().unwrap();

        let dot = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("DETERMINE_HANDLER"));
    }
}
