//! Modules, configurators and the dependency registry.
//!
//! A [`ChainModule`] is an independently packaged unit that extends the chain
//! graph at build time. Modules never call each other at request time; they
//! communicate through [`MetaData`] only. At build time they may:
//!
//! - declare other modules they depend on ([`ChainModule::dependencies`]);
//!   missing dependencies are instantiated from their [`ModuleDescriptor`];
//! - reach into resolved dependencies during [`configure`](ChainModule::configure)
//!   through the [`DependencyRegistry`], e.g. to adjust another module's settings;
//! - create chains and append processors/rules during
//!   [`register`](ChainModule::register) through a
//!   [`ChainExtender`](crate::ChainExtender).
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct CorsModule { allowed: Vec<String> }
//!
//! impl ChainModule for CorsModule {
//!     fn dependencies(&self) -> Vec<ModuleDescriptor> {
//!         vec![ModuleDescriptor::of::<CoreModule>()]
//!     }
//!
//!     fn register(&mut self, extender: &mut ChainExtender<'_>) -> ChainResult<()> {
//!         extender.append_processor(&POST_PROCESS, cors_headers(self.allowed.clone()))
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::fmt;

use crate::chain::ModuleIdentifier;
use crate::error::{BoxError, ChainError, ChainResult};
use crate::extender::ChainExtender;
use crate::metadata::MetaData;

// =============================================================================
// ChainModule
// =============================================================================

/// Upcast helper implemented for every `'static` type.
#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A build-time extension of the chain graph.
pub trait ChainModule: AsAny + Send {
    /// Stable tag of the module.
    ///
    /// Defaults to the type name, which is also what
    /// [`ModuleDescriptor::of`] uses, so dependency resolution recognises a
    /// module whether it was added explicitly or pulled in as a dependency.
    fn identifier(&self) -> ModuleIdentifier {
        ModuleIdentifier::from_static(type_name::<Self>())
    }

    /// Modules that must be present (and registered) before this one.
    fn dependencies(&self) -> Vec<ModuleDescriptor> {
        Vec::new()
    }

    /// First build phase. Runs for every module before any module registers.
    fn configure(&mut self, _dependencies: &mut DependencyRegistry<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Second build phase: create and extend chains.
    fn register(&mut self, extender: &mut ChainExtender<'_>) -> ChainResult<()>;
}

// =============================================================================
// ModuleDescriptor
// =============================================================================

/// A tag plus factory identifying a module in dependency declarations.
#[derive(Clone)]
pub struct ModuleDescriptor {
    id: ModuleIdentifier,
    create: fn() -> Box<dyn ChainModule>,
}

fn create_default<M: ChainModule + Default>() -> Box<dyn ChainModule> {
    Box::new(M::default())
}

impl ModuleDescriptor {
    /// Creates a descriptor from an explicit identifier and factory.
    ///
    /// The factory's module must report the same identifier.
    pub fn new(id: ModuleIdentifier, create: fn() -> Box<dyn ChainModule>) -> Self {
        Self { id, create }
    }

    /// Descriptor of a default-constructible module, tagged by type name.
    pub fn of<M: ChainModule + Default>() -> Self {
        Self {
            id: ModuleIdentifier::from_static(type_name::<M>()),
            create: create_default::<M>,
        }
    }

    /// The module's identifier.
    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.id
    }

    /// Creates a fresh instance of the module.
    pub fn instantiate(&self) -> Box<dyn ChainModule> {
        (self.create)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Configurator
// =============================================================================

/// User-supplied configuration applied after every module's `configure`.
///
/// Any `FnMut(&mut DependencyRegistry) -> Result<(), BoxError>` closure is a
/// configurator without dependencies.
pub trait Configurator: Send {
    /// Modules the configurator needs; they are added to the build.
    fn dependencies(&self) -> Vec<ModuleDescriptor> {
        Vec::new()
    }

    /// Adjusts resolved modules or the side channel.
    fn configure(&mut self, dependencies: &mut DependencyRegistry<'_>) -> Result<(), BoxError>;
}

impl<F> Configurator for F
where
    F: FnMut(&mut DependencyRegistry<'_>) -> Result<(), BoxError> + Send,
{
    fn configure(&mut self, dependencies: &mut DependencyRegistry<'_>) -> Result<(), BoxError> {
        self(dependencies)
    }
}

// =============================================================================
// DependencyRegistry
// =============================================================================

/// Build-time view over the resolved modules and the side channel.
///
/// The module currently being configured is absent from the view.
pub struct DependencyRegistry<'a> {
    modules: &'a mut [Option<Box<dyn ChainModule>>],
    side_channel: &'a mut MetaData,
}

impl<'a> DependencyRegistry<'a> {
    pub(crate) fn new(
        modules: &'a mut [Option<Box<dyn ChainModule>>],
        side_channel: &'a mut MetaData,
    ) -> Self {
        Self {
            modules,
            side_channel,
        }
    }

    /// Returns the resolved module of type `M`.
    ///
    /// Fails with [`ChainError::MissingDependency`] if no module of that type
    /// takes part in the build.
    pub fn get_dependency<M: ChainModule>(&mut self) -> ChainResult<&mut M> {
        let missing = || ChainError::MissingDependency {
            requested: type_name::<M>(),
        };
        let index = self
            .modules
            .iter()
            .position(|slot| slot.as_deref().is_some_and(|m| m.as_any().is::<M>()))
            .ok_or_else(missing)?;
        self.modules[index]
            .as_deref_mut()
            .and_then(|m| m.as_any_mut().downcast_mut::<M>())
            .ok_or_else(missing)
    }

    /// Returns `true` if a module of type `M` takes part in the build.
    pub fn has_dependency<M: ChainModule>(&self) -> bool {
        self.modules
            .iter()
            .any(|slot| slot.as_deref().is_some_and(|m| m.as_any().is::<M>()))
    }

    /// Shared build-time state.
    pub fn side_channel(&self) -> &MetaData {
        &*self.side_channel
    }

    /// Mutable access to the shared build-time state.
    pub fn side_channel_mut(&mut self) -> &mut MetaData {
        &mut *self.side_channel
    }
}
