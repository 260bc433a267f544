//! Chains, rules and actions.
//!
//! A [`Chain`] is one named stage of the request pipeline. When a request
//! enters it, the chain:
//!
//! 1. runs its processors in registration order;
//! 2. on the first processor failure, records a [`ChainException`] under
//!    [`EXCEPTION`] and returns the chain's exception action;
//! 3. otherwise returns the action of the first [`Rule`] whose predicate
//!    holds, or the chain's default action.
//!
//! A processor that takes the run's [`Completion`](crate::Completion) ends the
//! chain early with [`Action::Drop`].
//!
//! Rule order is part of the observable contract: register more specific
//! rules before broader ones.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::completion::COMPLETION;
use crate::error::{BoxError, ChainError, ChainResult};
use crate::metadata::{MetaData, MetaDataKey};

/// Reserved key under which a chain stores the failure of one of its
/// processors before taking its exception action.
pub const EXCEPTION: MetaDataKey<ChainException> = MetaDataKey::new("EXCEPTION");

// =============================================================================
// ChainName / ModuleIdentifier
// =============================================================================

/// Identifier of a chain. Non-empty; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChainName(Cow<'static, str>);

impl ChainName {
    /// Creates a chain name from a static string. Usable in `const` items.
    ///
    /// An empty name fails const evaluation.
    pub const fn from_static(name: &'static str) -> Self {
        assert!(!name.is_empty(), "chain names must not be empty");
        Self(Cow::Borrowed(name))
    }

    /// Creates a chain name from a runtime string.
    pub fn new(name: impl Into<String>) -> ChainResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChainError::InvalidChainName);
        }
        Ok(Self(Cow::Owned(name)))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Owner tag of a chain or rule. Only used to colour diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleIdentifier(Cow<'static, str>);

impl ModuleIdentifier {
    /// Creates an identifier from a static string.
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Creates an identifier from a runtime string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Action
// =============================================================================

/// What happens once a chain has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Continue at another chain.
    Jump(ChainName),
    /// Terminate the run and hand the metadata to the completion callback.
    Consume,
    /// Terminate the run silently.
    Drop,
}

impl Action {
    /// Shorthand for `Action::Jump(target.clone())`.
    pub fn jump(target: &ChainName) -> Self {
        Self::Jump(target.clone())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jump(target) => write!(f, "jump({target})"),
            Self::Consume => f.write_str("consume"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

// =============================================================================
// Processor
// =============================================================================

/// A side-effecting pipeline step.
///
/// Any `Fn(&mut MetaData) -> Result<(), BoxError>` closure is a processor;
/// implement the trait by hand to give the step a readable name in logs and
/// topology exports.
pub trait Processor: Send + Sync + 'static {
    /// Runs the step against the request's metadata.
    fn apply(&self, meta: &mut MetaData) -> Result<(), BoxError>;

    /// Name used in logs and exception reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Processor for F
where
    F: Fn(&mut MetaData) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn apply(&self, meta: &mut MetaData) -> Result<(), BoxError> {
        self(meta)
    }

    fn name(&self) -> &str {
        "processor"
    }
}

/// A shared, type-erased processor.
pub type BoxedProcessor = Arc<dyn Processor>;

/// A named processor built from a closure.
///
/// ```rust,ignore
/// extender.append_processor(&PRE_PROCESS, named("parse-query", |meta| { ... }))?;
/// ```
pub struct NamedProcessor<F> {
    name: Cow<'static, str>,
    f: F,
}

/// Wraps `f` into a processor reporting `name`.
pub fn named<F>(name: impl Into<Cow<'static, str>>, f: F) -> NamedProcessor<F>
where
    F: Fn(&mut MetaData) -> Result<(), BoxError> + Send + Sync + 'static,
{
    NamedProcessor {
        name: name.into(),
        f,
    }
}

impl<F> Processor for NamedProcessor<F>
where
    F: Fn(&mut MetaData) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn apply(&self, meta: &mut MetaData) -> Result<(), BoxError> {
        (self.f)(meta)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A type-erased rule predicate.
pub type PredicateFn = Arc<dyn Fn(&MetaData) -> bool + Send + Sync>;

/// A guarded routing decision evaluated after a chain's processors.
#[derive(Clone)]
pub struct Rule {
    module: ModuleIdentifier,
    predicate: PredicateFn,
    action: Action,
    description: String,
}

impl Rule {
    /// Creates a rule taking `action` whenever `predicate` holds.
    pub fn new<F>(
        module: ModuleIdentifier,
        predicate: F,
        action: Action,
        description: impl Into<String>,
    ) -> Self
    where
        F: Fn(&MetaData) -> bool + Send + Sync + 'static,
    {
        Self {
            module,
            predicate: Arc::new(predicate),
            action,
            description: description.into(),
        }
    }

    /// Rule matching when `key` holds a value equal to `value`.
    pub fn if_equals<T>(
        module: ModuleIdentifier,
        key: MetaDataKey<T>,
        value: T,
        action: Action,
    ) -> Self
    where
        T: PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let description = format!("{key} == {value:?}");
        Self::new(
            module,
            move |meta| meta.get_optional(&key) == Some(&value),
            action,
            description,
        )
    }

    /// Rule matching when the boolean flag `key` is set and `true`.
    pub fn if_true(module: ModuleIdentifier, key: MetaDataKey<bool>, action: Action) -> Self {
        let description = format!("{key} is true");
        Self::new(
            module,
            move |meta| meta.get_optional(&key).copied().unwrap_or(false),
            action,
            description,
        )
    }

    /// Rule matching when `key` is present.
    pub fn if_set<T>(module: ModuleIdentifier, key: MetaDataKey<T>, action: Action) -> Self
    where
        T: Send + Sync + 'static,
    {
        let description = format!("{key} is set");
        Self::new(module, move |meta| meta.contains(&key), action, description)
    }

    /// Returns `true` if this rule's predicate holds on `meta`.
    pub fn matches(&self, meta: &MetaData) -> bool {
        (self.predicate)(meta)
    }

    /// The action taken when the rule matches.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The module that added this rule.
    pub fn module(&self) -> &ModuleIdentifier {
        &self.module
    }

    /// Human-readable description of the predicate.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("module", &self.module)
            .field("action", &self.action)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ChainException
// =============================================================================

/// A processor failure recorded under [`EXCEPTION`].
#[derive(Debug)]
pub struct ChainException {
    chain: ChainName,
    processor: String,
    error: BoxError,
}

impl ChainException {
    /// The chain whose processor failed.
    pub fn chain(&self) -> &ChainName {
        &self.chain
    }

    /// Name of the failing processor.
    pub fn processor(&self) -> &str {
        &self.processor
    }

    /// The error raised by the processor.
    pub fn error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Consumes the record and returns the raised error.
    pub fn into_error(self) -> BoxError {
        self.error
    }
}

impl fmt::Display for ChainException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processor '{}' in chain '{}' failed: {}",
            self.processor, self.chain, self.error
        )
    }
}

// =============================================================================
// Chain
// =============================================================================

/// One named pipeline stage.
pub struct Chain {
    name: ChainName,
    default_action: Action,
    exception_action: Action,
    processors: Vec<BoxedProcessor>,
    rules: Vec<Rule>,
    module: ModuleIdentifier,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new(
        name: ChainName,
        default_action: Action,
        exception_action: Action,
        module: ModuleIdentifier,
    ) -> Self {
        Self {
            name,
            default_action,
            exception_action,
            processors: Vec::new(),
            rules: Vec::new(),
            module,
        }
    }

    /// Appends a processor; it runs after every processor added before it.
    pub fn append_processor(&mut self, processor: BoxedProcessor) {
        self.processors.push(processor);
    }

    /// Appends a rule; it is evaluated after every rule added before it.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Runs the chain against `meta` and returns the outcome.
    pub fn accept(&self, meta: &mut MetaData) -> Action {
        let owns_completion = meta.contains(&COMPLETION);
        for processor in &self.processors {
            trace!(chain = %self.name, processor = processor.name(), "Running processor");
            if let Err(error) = processor.apply(meta) {
                debug!(
                    chain = %self.name,
                    processor = processor.name(),
                    error = %error,
                    action = %self.exception_action,
                    "Processor failed, taking exception action"
                );
                meta.set(
                    &EXCEPTION,
                    ChainException {
                        chain: self.name.clone(),
                        processor: processor.name().to_string(),
                        error,
                    },
                );
                return self.exception_action.clone();
            }
            if owns_completion && !meta.contains(&COMPLETION) {
                debug!(
                    chain = %self.name,
                    processor = processor.name(),
                    "Completion taken, skipping the rest of the chain"
                );
                return Action::Drop;
            }
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(meta))
            .map(|rule| {
                trace!(chain = %self.name, rule = rule.description(), "Rule matched");
                rule.action.clone()
            })
            .unwrap_or_else(|| self.default_action.clone())
    }

    /// The chain's name.
    pub fn name(&self) -> &ChainName {
        &self.name
    }

    /// Action taken when no rule matches.
    pub fn default_action(&self) -> &Action {
        &self.default_action
    }

    /// Action taken when a processor fails.
    pub fn exception_action(&self) -> &Action {
        &self.exception_action
    }

    /// Registered rules, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of registered processors.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Names of registered processors, in execution order.
    pub fn processor_names(&self) -> impl Iterator<Item = &str> {
        self.processors.iter().map(|p| p.name())
    }

    /// The module that created the chain.
    pub fn module(&self) -> &ModuleIdentifier {
        &self.module
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("default_action", &self.default_action)
            .field("exception_action", &self.exception_action)
            .field("processor_count", &self.processors.len())
            .field("rules", &self.rules)
            .field("module", &self.module)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TRACE: MetaDataKey<Vec<&'static str>> = MetaDataKey::new("TRACE");
    const FLAG: MetaDataKey<bool> = MetaDataKey::new("FLAG");
    const LEVEL: MetaDataKey<u8> = MetaDataKey::new("LEVEL");

    const A: ChainName = ChainName::from_static("A");
    const B: ChainName = ChainName::from_static("B");
    const C: ChainName = ChainName::from_static("C");
    const ERR: ChainName = ChainName::from_static("ERR");
    const TEST: ModuleIdentifier = ModuleIdentifier::from_static("test");

    fn push(step: &'static str) -> BoxedProcessor {
        Arc::new(move |meta: &mut MetaData| -> Result<(), BoxError> {
            meta.get_mut(&TRACE)?.push(step);
            Ok(())
        })
    }

    fn chain() -> Chain {
        Chain::new(A, Action::Consume, Action::jump(&ERR), TEST)
    }

    #[test]
    fn test_processors_run_in_order_then_default() {
        let mut c = chain();
        c.append_processor(push("one"));
        c.append_processor(push("two"));

        let mut meta = MetaData::new().with(&TRACE, Vec::new());
        assert_eq!(c.accept(&mut meta), Action::Consume);
        assert_eq!(meta.get(&TRACE).unwrap(), &vec!["one", "two"]);
    }

    #[test]
    fn test_failing_processor_stops_chain() {
        let mut c = chain();
        c.append_processor(push("one"));
        c.append_processor(Arc::new(|_: &mut MetaData| -> Result<(), BoxError> {
            Err("boom".into())
        }));
        c.append_processor(push("never"));
        c.add_rule(Rule::new(TEST, |_| true, Action::Drop, "always"));

        let mut meta = MetaData::new().with(&TRACE, Vec::new());
        assert_eq!(c.accept(&mut meta), Action::Jump(ERR));
        assert_eq!(meta.get(&TRACE).unwrap(), &vec!["one"]);

        let exception = meta.get(&EXCEPTION).unwrap();
        assert_eq!(exception.chain(), &A);
        assert_eq!(exception.error().to_string(), "boom");
    }

    #[test]
    fn test_missing_metadatum_is_a_processor_failure() {
        let mut c = chain();
        c.append_processor(push("one"));

        let mut meta = MetaData::new();
        assert_eq!(c.accept(&mut meta), Action::Jump(ERR));
        assert!(meta.get(&EXCEPTION).unwrap().to_string().contains("TRACE"));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let mut c = chain();
        c.add_rule(Rule::if_equals(TEST, LEVEL, 3, Action::jump(&B)));
        c.add_rule(Rule::if_set(TEST, LEVEL, Action::jump(&C)));

        let mut meta = MetaData::new().with(&LEVEL, 3);
        assert_eq!(c.accept(&mut meta), Action::Jump(B));

        let mut meta = MetaData::new().with(&LEVEL, 1);
        assert_eq!(c.accept(&mut meta), Action::Jump(C));

        let mut meta = MetaData::new();
        assert_eq!(c.accept(&mut meta), Action::Consume);
    }

    #[test]
    fn test_if_true_rule() {
        let mut c = chain();
        c.add_rule(Rule::if_true(TEST, FLAG, Action::Drop));

        assert_eq!(c.accept(&mut MetaData::new().with(&FLAG, true)), Action::Drop);
        assert_eq!(
            c.accept(&mut MetaData::new().with(&FLAG, false)),
            Action::Consume
        );
        assert_eq!(c.accept(&mut MetaData::new()), Action::Consume);
    }

    #[test]
    fn test_rules_not_evaluated_on_error_path() {
        let evaluated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evaluated);

        let mut c = chain();
        c.append_processor(Arc::new(|_: &mut MetaData| -> Result<(), BoxError> {
            Err("fail".into())
        }));
        c.add_rule(Rule::new(
            TEST,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
            Action::Drop,
            "counting",
        ));

        assert_eq!(c.accept(&mut MetaData::new()), Action::Jump(ERR));
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_taking_completion_ends_chain() {
        let parked = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&parked);

        let mut c = chain();
        c.append_processor(push("one"));
        c.append_processor(Arc::new(move |meta: &mut MetaData| -> Result<(), BoxError> {
            sink.lock().push(crate::Completion::take(meta)?);
            Ok(())
        }));
        c.append_processor(push("never"));
        c.add_rule(Rule::new(TEST, |_| true, Action::Consume, "always"));

        let completion =
            crate::Completion::new(uuid::Uuid::new_v4(), Box::new(|_: MetaData| {}));
        let mut meta = MetaData::new()
            .with(&TRACE, Vec::new())
            .with(&COMPLETION, completion);
        assert_eq!(c.accept(&mut meta), Action::Drop);
        assert!(meta.is_empty());

        let (taken, _) = parked.lock().pop().unwrap();
        assert_eq!(taken.get(&TRACE).unwrap(), &vec!["one"]);
    }

    #[test]
    fn test_named_processor_reports_name() {
        let mut c = chain();
        c.append_processor(Arc::new(named("exploding", |_| Err("nope".into()))));

        let mut meta = MetaData::new();
        c.accept(&mut meta);
        assert_eq!(meta.get(&EXCEPTION).unwrap().processor(), "exploding");
        assert_eq!(c.processor_names().collect::<Vec<_>>(), vec!["exploding"]);
    }

    #[test]
    fn test_chain_name_validation() {
        assert!(matches!(ChainName::new(""), Err(ChainError::InvalidChainName)));
        assert_eq!(ChainName::new("A").unwrap(), A);
    }
}
