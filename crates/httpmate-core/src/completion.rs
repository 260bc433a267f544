//! Completing a run away from the thread that started it.
//!
//! While a run is in flight its completion callback travels in the metadata
//! under [`COMPLETION`]. A processor that continues the request on its own
//! (a message bus, a worker pool) calls [`Completion::take`] to receive the
//! metadata together with the callback. The run in progress stops right
//! after that processor and is treated as dropped; the new owner finishes
//! the request later with [`Completion::complete`], or re-enters the chain
//! graph with [`ChainRegistry::resume`](crate::ChainRegistry::resume).
//!
//! ```rust,ignore
//! extender.append_processor(&DISPATCH, named("bus", move |meta| {
//!     let (meta, completion) = Completion::take(meta)?;
//!     bus.publish(meta, move |reply| completion.complete(reply));
//!     Ok(())
//! }))?;
//! ```
//!
//! A taken completion that is dropped without being called leaves the
//! request unanswered, exactly like [`Action::Drop`](crate::Action::Drop).

use std::fmt;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::MetaDataResult;
use crate::metadata::{MetaData, MetaDataKey};

/// The completion callback of a run. Invoked at most once, on `Consume`.
pub type CompletionCallback = Box<dyn FnOnce(MetaData) + Send>;

/// Reserved key holding the [`Completion`] of the run in progress.
pub const COMPLETION: MetaDataKey<Completion> = MetaDataKey::new("COMPLETION");

/// The single-use right to finish a run.
pub struct Completion {
    run_id: Uuid,
    // Never locked; it only makes the callback `Sync` for storage in metadata.
    callback: Mutex<CompletionCallback>,
}

impl Completion {
    pub(crate) fn new(run_id: Uuid, callback: CompletionCallback) -> Self {
        Self {
            run_id,
            callback: Mutex::new(callback),
        }
    }

    /// Moves the metadata and the completion out of a running request.
    ///
    /// Leaves `meta` empty. Fails with
    /// [`MetaDataError::Missing`](crate::MetaDataError::Missing) outside a
    /// run or once another processor has taken the completion.
    pub fn take(meta: &mut MetaData) -> MetaDataResult<(MetaData, Completion)> {
        let completion = meta.take(&COMPLETION)?;
        Ok((std::mem::take(meta), completion))
    }

    /// Correlation id of the run this completion belongs to.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Hands `meta` to the run's callback.
    pub fn complete(self, meta: MetaData) {
        (self.callback.into_inner())(meta);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}
