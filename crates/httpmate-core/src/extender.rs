//! Module-scoped facade over the registry.

use std::fmt;

use crate::chain::{Action, ChainName, ModuleIdentifier, Processor, Rule};
use crate::error::ChainResult;
use crate::metadata::{MetaData, MetaDataKey};
use crate::registry::ChainRegistry;

/// Handed to [`ChainModule::register`](crate::ChainModule::register).
///
/// Every chain and rule created through the extender is tagged with the
/// registering module's identifier. Processors and rules may be appended to
/// chains owned by *other* modules; that is how modules extend one another.
pub struct ChainExtender<'a> {
    registry: &'a mut ChainRegistry,
    module: ModuleIdentifier,
}

impl<'a> ChainExtender<'a> {
    /// Creates an extender acting on behalf of `module`.
    pub fn new(registry: &'a mut ChainRegistry, module: ModuleIdentifier) -> Self {
        Self { registry, module }
    }

    /// The module on whose behalf this extender acts.
    pub fn module(&self) -> &ModuleIdentifier {
        &self.module
    }

    /// Creates a chain owned by this module.
    pub fn create_chain(
        &mut self,
        name: ChainName,
        default_action: Action,
        exception_action: Action,
    ) -> ChainResult<()> {
        self.registry
            .create_chain(name, default_action, exception_action, self.module.clone())
    }

    /// Appends a processor to `chain`.
    pub fn append_processor(
        &mut self,
        chain: &ChainName,
        processor: impl Processor,
    ) -> ChainResult<()> {
        self.registry.append_processor(chain, processor)
    }

    /// Appends a prebuilt rule to `chain`.
    pub fn add_rule(&mut self, chain: &ChainName, rule: Rule) -> ChainResult<()> {
        self.registry.add_rule(chain, rule)
    }

    /// Routes to `action` whenever `predicate` holds.
    pub fn route_if<F>(
        &mut self,
        chain: &ChainName,
        predicate: F,
        action: Action,
        description: impl Into<String>,
    ) -> ChainResult<()>
    where
        F: Fn(&MetaData) -> bool + Send + Sync + 'static,
    {
        let rule = Rule::new(self.module.clone(), predicate, action, description);
        self.registry.add_rule(chain, rule)
    }

    /// Routes to `action` when `key` equals `value`.
    pub fn route_if_equals<T>(
        &mut self,
        chain: &ChainName,
        key: MetaDataKey<T>,
        value: T,
        action: Action,
    ) -> ChainResult<()>
    where
        T: PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let rule = Rule::if_equals(self.module.clone(), key, value, action);
        self.registry.add_rule(chain, rule)
    }

    /// Routes to `action` when the flag `key` is `true`.
    pub fn route_if_true(
        &mut self,
        chain: &ChainName,
        key: MetaDataKey<bool>,
        action: Action,
    ) -> ChainResult<()> {
        let rule = Rule::if_true(self.module.clone(), key, action);
        self.registry.add_rule(chain, rule)
    }

    /// Routes to `action` when `key` is present.
    pub fn route_if_set<T>(
        &mut self,
        chain: &ChainName,
        key: MetaDataKey<T>,
        action: Action,
    ) -> ChainResult<()>
    where
        T: Send + Sync + 'static,
    {
        let rule = Rule::if_set(self.module.clone(), key, action);
        self.registry.add_rule(chain, rule)
    }

    /// Registers a teardown hook.
    pub fn add_closing_action(&mut self, action: impl FnOnce() + Send + 'static) {
        self.registry.add_closing_action(action);
    }

    /// Returns `true` if `chain` already exists.
    pub fn contains_chain(&self, chain: &ChainName) -> bool {
        self.registry.contains_chain(chain)
    }

    /// Shared build-time state.
    pub fn side_channel(&self) -> &MetaData {
        self.registry.side_channel()
    }

    /// Mutable access to the shared build-time state.
    pub fn side_channel_mut(&mut self) -> &mut MetaData {
        self.registry.side_channel_mut()
    }
}
