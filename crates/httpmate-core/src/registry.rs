//! The chain registry and its execution loop.
//!
//! [`ChainRegistry`] owns every chain by name. It is mutated only while the
//! pipeline is being built (usually through a
//! [`ChainExtender`](crate::ChainExtender)); afterwards it is shared
//! read-only, typically behind an `Arc`, across all concurrent requests.
//!
//! # Execution
//!
//! [`put_into_chain`](ChainRegistry::put_into_chain) drives one request:
//!
//! ```text
//!            ┌────────── Jump(target) ──────────┐
//!            ▼                                  │
//! start ─▶ chain.accept(meta) ─▶ Action ────────┤
//!                                   ├─ Consume ─▶ on_complete(meta)
//!                                   └─ Drop ────▶ (silent)
//! ```
//!
//! A processor may instead take the run's [`Completion`] out of the metadata
//! and finish the request elsewhere; the loop then stops without completing.
//!
//! The loop runs on the calling thread and has no depth bound: a jump cycle
//! in the configuration loops forever.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{Level, debug, info, span, trace};
use uuid::Uuid;

use crate::chain::{
    Action, BoxedProcessor, Chain, ChainName, ModuleIdentifier, Processor, Rule,
};
use crate::completion::{COMPLETION, Completion, CompletionCallback};
use crate::error::{ChainError, ChainResult};
use crate::metadata::MetaData;

/// A teardown hook registered by a module.
pub type ClosingAction = Box<dyn FnOnce() + Send>;

// =============================================================================
// ProcessingContext
// =============================================================================

/// State of a single `put_into_chain` invocation.
///
/// The completion callback is kept in the metadata under [`COMPLETION`]
/// for as long as the run owns it.
pub struct ProcessingContext {
    run_id: Uuid,
    meta: MetaData,
}

impl ProcessingContext {
    /// Creates a context with a fresh run id.
    pub fn new(meta: MetaData, on_complete: CompletionCallback) -> Self {
        Self::resume(meta, Completion::new(Uuid::new_v4(), on_complete))
    }

    /// Creates a context continuing the run `completion` belongs to.
    pub fn resume(mut meta: MetaData, completion: Completion) -> Self {
        let run_id = completion.run_id();
        meta.set(&COMPLETION, completion);
        Self { run_id, meta }
    }

    /// Opaque correlation id of the run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The request's metadata.
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Returns `true` once a processor has taken the completion.
    pub fn is_handed_off(&self) -> bool {
        !self.meta.contains(&COMPLETION)
    }

    fn complete(mut self) {
        if let Some(completion) = self.meta.remove(&COMPLETION) {
            completion.complete(self.meta);
        }
    }
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("run_id", &self.run_id)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ChainRegistry
// =============================================================================

/// Owner of all chains of a pipeline.
#[derive(Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainName, Chain>,
    /// Creation order, for stable diagnostics.
    order: Vec<ChainName>,
    side_channel: MetaData,
    closing_actions: Mutex<Vec<ClosingAction>>,
}

impl ChainRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Build-time mutation ─────────────────────────────────────────────────

    /// Creates a new, empty chain.
    ///
    /// Fails with [`ChainError::DuplicateChain`] if the name is taken; chains
    /// are write-once per name so modules cannot silently replace each
    /// other's stages.
    pub fn create_chain(
        &mut self,
        name: ChainName,
        default_action: Action,
        exception_action: Action,
        module: ModuleIdentifier,
    ) -> ChainResult<()> {
        if self.chains.contains_key(&name) {
            return Err(ChainError::DuplicateChain(name));
        }
        debug!(
            chain = %name,
            module = %module,
            default_action = %default_action,
            exception_action = %exception_action,
            "Chain created"
        );
        let chain = Chain::new(name.clone(), default_action, exception_action, module);
        self.order.push(name.clone());
        self.chains.insert(name, chain);
        Ok(())
    }

    /// Appends a processor to an existing chain, regardless of its owner.
    pub fn append_processor(
        &mut self,
        chain: &ChainName,
        processor: impl Processor,
    ) -> ChainResult<()> {
        self.append_boxed_processor(chain, Arc::new(processor))
    }

    /// Appends an already shared processor to an existing chain.
    pub fn append_boxed_processor(
        &mut self,
        chain: &ChainName,
        processor: BoxedProcessor,
    ) -> ChainResult<()> {
        let target = self.chain_mut(chain)?;
        trace!(chain = %chain, processor = processor.name(), "Processor appended");
        target.append_processor(processor);
        Ok(())
    }

    /// Appends a rule to an existing chain, regardless of its owner.
    pub fn add_rule(&mut self, chain: &ChainName, rule: Rule) -> ChainResult<()> {
        let target = self.chain_mut(chain)?;
        trace!(
            chain = %chain,
            module = %rule.module(),
            rule = rule.description(),
            "Rule added"
        );
        target.add_rule(rule);
        Ok(())
    }

    /// Registers a teardown hook run by [`close`](Self::close).
    pub fn add_closing_action(&self, action: impl FnOnce() + Send + 'static) {
        self.closing_actions.lock().push(Box::new(action));
    }

    /// Shared build-time state modules stash during `configure`.
    pub fn side_channel(&self) -> &MetaData {
        &self.side_channel
    }

    /// Mutable access to the side channel.
    pub fn side_channel_mut(&mut self) -> &mut MetaData {
        &mut self.side_channel
    }

    fn chain_mut(&mut self, name: &ChainName) -> ChainResult<&mut Chain> {
        self.chains
            .get_mut(name)
            .ok_or_else(|| ChainError::NoChainForName(name.clone()))
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// Returns the chain registered under `name`.
    pub fn chain(&self, name: &ChainName) -> Option<&Chain> {
        self.chains.get(name)
    }

    /// Returns `true` if a chain is registered under `name`.
    pub fn contains_chain(&self, name: &ChainName) -> bool {
        self.chains.contains_key(name)
    }

    /// Iterates chain names in creation order.
    pub fn chain_names(&self) -> impl Iterator<Item = &ChainName> {
        self.order.iter()
    }

    /// Iterates chains in creation order.
    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.order.iter().filter_map(|name| self.chains.get(name))
    }

    /// Number of registered chains.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    // ─── Execution ───────────────────────────────────────────────────────────

    /// Drives `meta` through the chain graph starting at `start`.
    ///
    /// `on_complete` is invoked exactly once if the run ends in
    /// [`Action::Consume`], and never if it ends in [`Action::Drop`] or fails.
    /// If a processor takes the run's [`Completion`], the run stops there and
    /// calling `on_complete` becomes the new owner's job.
    ///
    /// # Errors
    ///
    /// [`ChainError::NoChainForName`] if `start` or any jump target is not
    /// registered.
    pub fn put_into_chain<F>(
        &self,
        start: &ChainName,
        meta: MetaData,
        on_complete: F,
    ) -> ChainResult<()>
    where
        F: FnOnce(MetaData) + Send + 'static,
    {
        self.drive(start, ProcessingContext::new(meta, Box::new(on_complete)))
    }

    /// Continues a handed-off run at `start` with its original completion.
    ///
    /// The run keeps its id, so its log lines stay correlated.
    pub fn resume(
        &self,
        start: &ChainName,
        meta: MetaData,
        completion: Completion,
    ) -> ChainResult<()> {
        self.drive(start, ProcessingContext::resume(meta, completion))
    }

    fn drive(&self, start: &ChainName, mut context: ProcessingContext) -> ChainResult<()> {
        let span = span!(Level::DEBUG, "run", run_id = %context.run_id, start = %start);
        let _enter = span.enter();

        let mut current = start.clone();
        loop {
            let chain = self
                .chains
                .get(&current)
                .ok_or_else(|| ChainError::NoChainForName(current.clone()))?;

            let action = chain.accept(&mut context.meta);
            if context.is_handed_off() {
                debug!(chain = %current, "Run handed off");
                return Ok(());
            }

            match action {
                Action::Jump(target) => {
                    trace!(from = %current, to = %target, "Jump");
                    current = target;
                }
                Action::Consume => {
                    debug!(chain = %current, "Run consumed");
                    context.complete();
                    return Ok(());
                }
                Action::Drop => {
                    debug!(chain = %current, "Run dropped");
                    return Ok(());
                }
            }
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Runs every closing action once, most recently registered first.
    ///
    /// Subsequent calls are no-ops until new actions are registered.
    pub fn close(&self) {
        let actions = std::mem::take(&mut *self.closing_actions.lock());
        if actions.is_empty() {
            return;
        }
        info!(count = actions.len(), "Running closing actions");
        for action in actions.into_iter().rev() {
            action();
        }
    }
}

impl fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.order)
            .field("side_channel", &self.side_channel)
            .field("closing_actions", &self.closing_actions.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::EXCEPTION;
    use crate::error::BoxError;
    use crate::metadata::MetaDataKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TRACE: MetaDataKey<Vec<&'static str>> = MetaDataKey::new("TRACE");
    const A: ChainName = ChainName::from_static("A");
    const B: ChainName = ChainName::from_static("B");
    const ERROR: ChainName = ChainName::from_static("ERROR");
    const MISSING: ChainName = ChainName::from_static("MISSING");
    const TEST: ModuleIdentifier = ModuleIdentifier::from_static("test");

    fn push(step: &'static str) -> impl Processor {
        move |meta: &mut MetaData| -> Result<(), BoxError> {
            meta.get_mut(&TRACE)?.push(step);
            Ok(())
        }
    }

    fn traced() -> MetaData {
        MetaData::new().with(&TRACE, Vec::new())
    }

    /// Captures the metadata handed to the completion callback.
    fn capture() -> (Arc<Mutex<Vec<MetaData>>>, impl FnOnce(MetaData) + Send + 'static) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&sink);
        (sink, move |meta: MetaData| writer.lock().push(meta))
    }

    #[test]
    fn test_jump_then_consume() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::jump(&B), Action::Drop, TEST)
            .unwrap();
        registry
            .create_chain(B, Action::Consume, Action::Drop, TEST)
            .unwrap();
        registry.append_processor(&A, push("a")).unwrap();
        registry.append_processor(&B, push("b")).unwrap();

        let (sink, on_complete) = capture();
        registry.put_into_chain(&A, traced(), on_complete).unwrap();

        let completed = sink.lock();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].get(&TRACE).unwrap(), &vec!["a", "b"]);
    }

    #[test]
    fn test_drop_never_completes() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::Drop, Action::Drop, TEST)
            .unwrap();

        let (sink, on_complete) = capture();
        registry.put_into_chain(&A, traced(), on_complete).unwrap();
        assert!(sink.lock().is_empty());
    }

    #[test]
    fn test_exception_action_leads_to_error_chain() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::jump(&B), Action::jump(&ERROR), TEST)
            .unwrap();
        registry
            .create_chain(B, Action::Consume, Action::Drop, TEST)
            .unwrap();
        registry
            .create_chain(ERROR, Action::Consume, Action::Drop, TEST)
            .unwrap();
        registry
            .append_processor(&A, |_: &mut MetaData| -> Result<(), BoxError> {
                Err("broken".into())
            })
            .unwrap();
        registry.append_processor(&B, push("b")).unwrap();
        registry.append_processor(&ERROR, push("error")).unwrap();

        let (sink, on_complete) = capture();
        registry.put_into_chain(&A, traced(), on_complete).unwrap();

        let completed = sink.lock();
        assert_eq!(completed[0].get(&TRACE).unwrap(), &vec!["error"]);
        assert_eq!(completed[0].get(&EXCEPTION).unwrap().chain(), &A);
    }

    #[test]
    fn test_duplicate_chain_fails() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::Consume, Action::Drop, TEST)
            .unwrap();
        let err = registry
            .create_chain(A, Action::Drop, Action::Drop, TEST)
            .unwrap_err();
        assert!(matches!(err, ChainError::DuplicateChain(name) if name == A));
        assert_eq!(registry.chain(&A).unwrap().default_action(), &Action::Consume);
    }

    #[test]
    fn test_unknown_start_chain_fails() {
        let registry = ChainRegistry::new();
        let err = registry
            .put_into_chain(&MISSING, MetaData::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, ChainError::NoChainForName(name) if name == MISSING));
    }

    #[test]
    fn test_unknown_jump_target_fails() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::jump(&MISSING), Action::Drop, TEST)
            .unwrap();
        let (sink, on_complete) = capture();
        let err = registry
            .put_into_chain(&A, MetaData::new(), on_complete)
            .unwrap_err();
        assert!(matches!(err, ChainError::NoChainForName(name) if name == MISSING));
        assert!(sink.lock().is_empty());
    }

    #[test]
    fn test_extending_unknown_chain_fails() {
        let mut registry = ChainRegistry::new();
        assert!(registry.append_processor(&A, push("a")).is_err());
        assert!(
            registry
                .add_rule(&A, Rule::new(TEST, |_| true, Action::Drop, "always"))
                .is_err()
        );
    }

    #[test]
    fn test_closing_actions_run_once_in_reverse() {
        let registry = ChainRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.add_closing_action(move || order.lock().push(i));
        }

        registry.close();
        registry.close();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::Consume, Action::Drop, TEST)
            .unwrap();
        let registry = Arc::new(registry);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    registry
                        .put_into_chain(&A, MetaData::new(), move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_chain_names_keep_creation_order() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(B, Action::Consume, Action::Drop, TEST)
            .unwrap();
        registry
            .create_chain(A, Action::Consume, Action::Drop, TEST)
            .unwrap();
        let names: Vec<&str> = registry.chain_names().map(ChainName::as_str).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_completion_fires_once_from_spawned_thread() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::Consume, Action::Drop, TEST)
            .unwrap();
        let workers = Arc::new(Mutex::new(Vec::new()));
        let spawned = Arc::clone(&workers);
        registry.append_processor(&A, push("a")).unwrap();
        registry
            .append_processor(&A, move |meta: &mut MetaData| -> Result<(), BoxError> {
                let (mut meta, completion) = Completion::take(meta)?;
                spawned.lock().push(std::thread::spawn(move || {
                    meta.get_mut(&TRACE).unwrap().push("async");
                    completion.complete(meta);
                }));
                Ok(())
            })
            .unwrap();
        registry.append_processor(&A, push("skipped")).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let (tx, rx) = std::sync::mpsc::channel();
        registry
            .put_into_chain(&A, traced(), move |meta| {
                counted.fetch_add(1, Ordering::SeqCst);
                tx.send((std::thread::current().id(), meta)).unwrap();
            })
            .unwrap();

        let (thread, meta) = rx.recv().unwrap();
        for worker in workers.lock().drain(..) {
            worker.join().unwrap();
        }
        assert_ne!(thread, std::thread::current().id());
        assert_eq!(meta.get(&TRACE).unwrap(), &vec!["a", "async"]);
        assert!(!meta.contains(&COMPLETION));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resume_continues_with_original_completion() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::jump(&B), Action::Drop, TEST)
            .unwrap();
        registry
            .create_chain(B, Action::Consume, Action::Drop, TEST)
            .unwrap();
        let (handoff, parked) = std::sync::mpsc::channel();
        registry
            .append_processor(&A, move |meta: &mut MetaData| -> Result<(), BoxError> {
                handoff
                    .send(Completion::take(meta)?)
                    .map_err(|_| "no one is waiting for the run")?;
                Ok(())
            })
            .unwrap();
        registry.append_processor(&B, push("b")).unwrap();

        let (sink, on_complete) = capture();
        registry.put_into_chain(&A, traced(), on_complete).unwrap();
        assert!(sink.lock().is_empty());

        let (meta, completion) = parked.recv().unwrap();
        registry.resume(&B, meta, completion).unwrap();
        let completed = sink.lock();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].get(&TRACE).unwrap(), &vec!["b"]);
    }

    #[test]
    fn test_completion_key_is_gone_before_callback() {
        let mut registry = ChainRegistry::new();
        registry
            .create_chain(A, Action::Consume, Action::Drop, TEST)
            .unwrap();
        registry
            .append_processor(&A, |meta: &mut MetaData| -> Result<(), BoxError> {
                assert!(meta.contains(&COMPLETION));
                Ok(())
            })
            .unwrap();

        let (sink, on_complete) = capture();
        registry.put_into_chain(&A, traced(), on_complete).unwrap();
        let completed = sink.lock();
        assert_eq!(completed.len(), 1);
        assert!(!completed[0].contains(&COMPLETION));
    }
}
