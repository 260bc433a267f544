//! Assembling a [`ChainRegistry`] from modules.
//!
//! Building runs in two phases:
//!
//! 1. **Resolution.** The transitive dependency closure of the added modules
//!    and configurators is computed with a worklist until nothing new is
//!    discovered. Explicitly added modules take precedence over instances
//!    created from a [`ModuleDescriptor`]; later duplicates (by identifier)
//!    are ignored. The closure is then ordered with Kahn's algorithm so that
//!    every module comes after the modules it depends on.
//! 2. **Wiring.** Every module is configured, then every configurator runs,
//!    then every module registers its chains, always in resolution order.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::chain::ModuleIdentifier;
use crate::error::{BoxError, ChainError, ChainResult};
use crate::extender::ChainExtender;
use crate::metadata::{MetaData, MetaDataKey};
use crate::module::{ChainModule, Configurator, DependencyRegistry, ModuleDescriptor};
use crate::registry::ChainRegistry;

/// A module together with the identifiers of its declared dependencies.
struct Resolved {
    module: Box<dyn ChainModule>,
    dependencies: Vec<ModuleIdentifier>,
}

/// Collects modules and configurators and builds a [`ChainRegistry`].
///
/// ```rust,ignore
/// let registry = ChainRegistryBuilder::new()
///     .with_module(RoutingModule::new(routes))
///     .with_configurator(|deps: &mut DependencyRegistry<'_>| {
///         deps.get_dependency::<CoreModule>()?.set_error_status(500);
///         Ok(())
///     })
///     .build()?;
/// ```
#[derive(Default)]
pub struct ChainRegistryBuilder {
    modules: Vec<Box<dyn ChainModule>>,
    descriptors: Vec<ModuleDescriptor>,
    configurators: Vec<Box<dyn Configurator>>,
    side_channel: MetaData,
}

impl ChainRegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module instance.
    pub fn with_module<M: ChainModule>(mut self, module: M) -> Self {
        self.add_module(Box::new(module));
        self
    }

    /// Adds a boxed module instance.
    pub fn add_module(&mut self, module: Box<dyn ChainModule>) -> &mut Self {
        self.modules.push(module);
        self
    }

    /// Adds a module by descriptor; it is instantiated only if no module with
    /// the same identifier was added explicitly.
    pub fn with_descriptor(mut self, descriptor: ModuleDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds a configurator.
    pub fn with_configurator(mut self, configurator: impl Configurator + 'static) -> Self {
        self.add_configurator(Box::new(configurator));
        self
    }

    /// Adds a boxed configurator.
    pub fn add_configurator(&mut self, configurator: Box<dyn Configurator>) -> &mut Self {
        self.configurators.push(configurator);
        self
    }

    /// Seeds the registry's side channel before any module is configured.
    pub fn with_side_channel<T: Send + Sync + 'static>(
        mut self,
        key: &MetaDataKey<T>,
        value: T,
    ) -> Self {
        self.side_channel.set(key, value);
        self
    }

    /// Resolves, configures and registers every module.
    ///
    /// # Errors
    ///
    /// - [`ChainError::DependencyCycle`] if module dependencies form a cycle.
    /// - Any error raised by a module's `configure` or `register` hook or by a
    ///   configurator. Hook failures that already are a [`ChainError`] are
    ///   passed through; anything else is wrapped in [`ChainError::Module`].
    pub fn build(self) -> ChainResult<ChainRegistry> {
        let Self {
            modules,
            descriptors,
            mut configurators,
            side_channel,
        } = self;

        let requested: Vec<ModuleDescriptor> = descriptors
            .into_iter()
            .chain(configurators.iter().flat_map(|c| c.dependencies()))
            .collect();
        let resolved = resolve(modules, requested);
        let ordered = order(resolved)?;

        let mut registry = ChainRegistry::new();
        *registry.side_channel_mut() = side_channel;

        let mut slots: Vec<Option<Box<dyn ChainModule>>> = ordered.into_iter().map(Some).collect();

        for index in 0..slots.len() {
            let Some(mut module) = slots[index].take() else {
                continue;
            };
            let id = module.identifier();
            debug!(module = %id, "Configuring module");
            let result = {
                let mut dependencies =
                    DependencyRegistry::new(slots.as_mut_slice(), registry.side_channel_mut());
                module.configure(&mut dependencies)
            };
            slots[index] = Some(module);
            result.map_err(|e| hook_error(&id, e))?;
        }

        for configurator in &mut configurators {
            let mut dependencies =
                DependencyRegistry::new(slots.as_mut_slice(), registry.side_channel_mut());
            configurator
                .configure(&mut dependencies)
                .map_err(|e| hook_error(&ModuleIdentifier::from_static("configurator"), e))?;
        }

        for module in slots.iter_mut().flatten() {
            let id = module.identifier();
            debug!(module = %id, "Registering module");
            let mut extender = ChainExtender::new(&mut registry, id);
            module.register(&mut extender)?;
        }

        info!(
            modules = slots.len(),
            configurators = configurators.len(),
            chains = registry.chain_count(),
            "Chain registry built"
        );
        Ok(registry)
    }
}

/// Maps a hook failure onto a [`ChainError`], unwrapping one if present.
fn hook_error(module: &ModuleIdentifier, error: BoxError) -> ChainError {
    match error.downcast::<ChainError>() {
        Ok(chain_error) => *chain_error,
        Err(other) => ChainError::module(module.as_str(), other),
    }
}

/// Computes the dependency closure with a worklist.
///
/// Explicit modules are enqueued first, so they always win over
/// descriptor-created instances of the same identifier.
fn resolve(
    modules: Vec<Box<dyn ChainModule>>,
    requested: Vec<ModuleDescriptor>,
) -> Vec<Resolved> {
    let mut worklist: VecDeque<Box<dyn ChainModule>> = modules.into();
    let mut queued: HashSet<ModuleIdentifier> =
        worklist.iter().map(|m| m.identifier()).collect();

    for descriptor in requested {
        if queued.insert(descriptor.identifier().clone()) {
            worklist.push_back(descriptor.instantiate());
        }
    }

    let mut seen: HashSet<ModuleIdentifier> = HashSet::new();
    let mut resolved = Vec::new();

    while let Some(module) = worklist.pop_front() {
        let id = module.identifier();
        if !seen.insert(id.clone()) {
            warn!(module = %id, "Duplicate module ignored; first registration wins");
            continue;
        }

        let descriptors = module.dependencies();
        for descriptor in &descriptors {
            if queued.insert(descriptor.identifier().clone()) {
                debug!(module = %id, dependency = %descriptor.identifier(), "Pulling in dependency");
                worklist.push_back(descriptor.instantiate());
            }
        }

        resolved.push(Resolved {
            module,
            dependencies: descriptors.iter().map(|d| d.identifier().clone()).collect(),
        });
    }

    resolved
}

/// Orders resolved modules so dependencies precede dependents.
///
/// Kahn's algorithm, one frontier at a time; within a frontier the
/// resolution order is kept.
fn order(resolved: Vec<Resolved>) -> ChainResult<Vec<Box<dyn ChainModule>>> {
    let n = resolved.len();

    let index: HashMap<ModuleIdentifier, usize> = resolved
        .iter()
        .enumerate()
        .map(|(i, r)| (r.module.identifier(), i))
        .collect();

    let mut in_degree: Vec<usize> = vec![0; n];
    let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];

    for (i, entry) in resolved.iter().enumerate() {
        for dependency in &entry.dependencies {
            match index.get(dependency) {
                Some(&provider) if provider != i => {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
                Some(_) => {
                    warn!(module = %dependency, "Module depends on itself; ignored");
                }
                None => {
                    warn!(
                        module = %entry.module.identifier(),
                        dependency = %dependency,
                        "Dependency descriptor created a module with a different identifier"
                    );
                }
            }
        }
    }

    let mut sequence: Vec<usize> = Vec::with_capacity(n);
    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();

    while !current.is_empty() {
        sequence.extend_from_slice(&current);
        let mut next: Vec<usize> = Vec::new();
        for &i in &current {
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        current = next;
    }

    if sequence.len() < n {
        let cyclic = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| resolved[i].module.identifier().to_string())
            .collect();
        return Err(ChainError::DependencyCycle(cyclic));
    }

    let mut slots: Vec<Option<Box<dyn ChainModule>>> =
        resolved.into_iter().map(|r| Some(r.module)).collect();
    Ok(sequence
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}
