//! The module that lays out the standard chains.

use httpmate_core::{Action, ChainExtender, ChainModule, ChainResult, EXCEPTION, named};
use tracing::{debug, warn};

use crate::chains::{
    DETERMINE_HANDLER, ERROR, EXCEPTION_OCCURRED, INIT, INVOKE_HANDLER, NOT_FOUND, POST_INVOKE,
    POST_PROCESS, PRE_PROCESS,
};
use crate::keys::{RESPONSE_HEADERS, RESPONSE_STATUS, StringMap};

/// Creates every chain in [`chains`](crate::chains) and the fallback
/// processors that set a status on the not-found and error paths.
///
/// Every other module depends on it. Its statuses can be adjusted by a
/// configurator:
///
/// ```rust,ignore
/// builder.with_configurator(|deps: &mut DependencyRegistry<'_>| {
///     deps.get_dependency::<CoreModule>()?.set_error_status(503);
///     Ok(())
/// })
/// ```
#[derive(Debug, Clone)]
pub struct CoreModule {
    ok_status: u16,
    not_found_status: u16,
    error_status: u16,
}

impl Default for CoreModule {
    fn default() -> Self {
        Self {
            ok_status: 200,
            not_found_status: 404,
            error_status: 500,
        }
    }
}

impl CoreModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status used when nothing else set one.
    pub fn set_ok_status(&mut self, status: u16) -> &mut Self {
        self.ok_status = status;
        self
    }

    pub fn set_not_found_status(&mut self, status: u16) -> &mut Self {
        self.not_found_status = status;
        self
    }

    pub fn set_error_status(&mut self, status: u16) -> &mut Self {
        self.error_status = status;
        self
    }

    pub fn ok_status(&self) -> u16 {
        self.ok_status
    }

    pub fn not_found_status(&self) -> u16 {
        self.not_found_status
    }

    pub fn error_status(&self) -> u16 {
        self.error_status
    }
}

impl ChainModule for CoreModule {
    fn register(&mut self, extender: &mut ChainExtender<'_>) -> ChainResult<()> {
        let on_exception = Action::jump(&EXCEPTION_OCCURRED);
        let on_late_exception = Action::jump(&ERROR);

        extender.create_chain(INIT, Action::jump(&PRE_PROCESS), on_exception.clone())?;
        extender.create_chain(
            PRE_PROCESS,
            Action::jump(&DETERMINE_HANDLER),
            on_exception.clone(),
        )?;
        extender.create_chain(
            DETERMINE_HANDLER,
            Action::jump(&INVOKE_HANDLER),
            on_exception.clone(),
        )?;
        extender.create_chain(
            INVOKE_HANDLER,
            Action::jump(&POST_INVOKE),
            on_exception.clone(),
        )?;
        extender.create_chain(POST_INVOKE, Action::jump(&POST_PROCESS), on_exception)?;
        extender.create_chain(POST_PROCESS, Action::Consume, on_late_exception.clone())?;
        extender.create_chain(
            NOT_FOUND,
            Action::jump(&POST_PROCESS),
            on_late_exception.clone(),
        )?;
        extender.create_chain(
            EXCEPTION_OCCURRED,
            Action::jump(&POST_PROCESS),
            on_late_exception,
        )?;
        extender.create_chain(ERROR, Action::Consume, Action::Drop)?;

        extender.append_processor(
            &INIT,
            named("init-response", |meta| {
                if !meta.contains(&RESPONSE_HEADERS) {
                    meta.set(&RESPONSE_HEADERS, StringMap::new());
                }
                Ok(())
            }),
        )?;

        let not_found_status = self.not_found_status;
        extender.append_processor(
            &NOT_FOUND,
            named("not-found-status", move |meta| {
                debug!(status = not_found_status, "No handler for request");
                meta.set(&RESPONSE_STATUS, not_found_status);
                Ok(())
            }),
        )?;

        let error_status = self.error_status;
        extender.append_processor(
            &EXCEPTION_OCCURRED,
            named("report-exception", move |meta| {
                if let Some(exception) = meta.get_optional(&EXCEPTION) {
                    warn!(
                        chain = %exception.chain(),
                        processor = exception.processor(),
                        error = %exception.error(),
                        "Request processing failed"
                    );
                }
                meta.set(&RESPONSE_STATUS, error_status);
                Ok(())
            }),
        )?;

        extender.append_processor(
            &ERROR,
            named("error-status", move |meta| {
                meta.set(&RESPONSE_STATUS, error_status);
                Ok(())
            }),
        )?;

        let ok_status = self.ok_status;
        extender.append_processor(
            &POST_PROCESS,
            named("default-status", move |meta| {
                if !meta.contains(&RESPONSE_STATUS) {
                    meta.set(&RESPONSE_STATUS, ok_status);
                }
                Ok(())
            }),
        )
    }
}
