//! Dispatch middleware
//!
//! Middleware wraps every dispatch of an adapter. The first installed
//! middleware runs outermost; the innermost step resolves the servant and
//! runs the operation. The chain is frozen by the first dispatch.

use crate::error::DispatchResult;
use crate::servant::Current;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A step wrapped around every dispatch
pub trait Middleware: Send + Sync {
    /// Handle the request, usually by calling `next.run`
    fn dispatch(&self, current: &Current, payload: &[u8], next: Next<'_>) -> DispatchResult;
}

/// Remainder of the chain after the current middleware
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Fn(&Current, &[u8]) -> DispatchResult,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain
    pub fn run(self, current: &Current, payload: &[u8]) -> DispatchResult {
        match self.chain.split_first() {
            Some((middleware, rest)) => middleware.dispatch(
                current,
                payload,
                Next {
                    chain: rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(current, payload),
        }
    }
}

#[derive(Default)]
struct Pending {
    middleware: Vec<Arc<dyn Middleware>>,
    sealed: bool,
}

/// Ordered middleware chain, sealed on first use
#[derive(Default)]
pub struct Pipeline {
    pending: Mutex<Pending>,
    chain: OnceCell<Vec<Arc<dyn Middleware>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; returns `false` once the chain is sealed
    pub fn install(&self, middleware: Arc<dyn Middleware>) -> bool {
        let mut pending = self.pending.lock();
        if pending.sealed {
            return false;
        }
        pending.middleware.push(middleware);
        true
    }

    pub fn is_sealed(&self) -> bool {
        self.chain.get().is_some()
    }

    /// Run `terminal` through the chain, sealing it first if needed
    pub fn run(
        &self,
        current: &Current,
        payload: &[u8],
        terminal: &dyn Fn(&Current, &[u8]) -> DispatchResult,
    ) -> DispatchResult {
        let chain = self.chain.get_or_init(|| {
            let mut pending = self.pending.lock();
            pending.sealed = true;
            std::mem::take(&mut pending.middleware)
        });

        Next { chain, terminal }.run(current, payload)
    }
}

/// Logs every dispatch outcome
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    warn_on_miss: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log `ObjectNotExist` / `FacetNotExist` failures at warn level
    pub fn warn_on_miss(mut self, enabled: bool) -> Self {
        self.warn_on_miss = enabled;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn dispatch(&self, current: &Current, payload: &[u8], next: Next<'_>) -> DispatchResult {
        let result = next.run(current, payload);
        match &result {
            Ok(reply) => debug!(
                adapter = %current.adapter,
                identity = %current.id,
                facet = %current.facet,
                operation = %current.operation,
                request_id = current.request_id,
                reply_len = reply.len(),
                "Dispatch succeeded"
            ),
            Err(err) if err.is_miss() && !self.warn_on_miss => debug!(
                adapter = %current.adapter,
                identity = %current.id,
                facet = %current.facet,
                operation = %current.operation,
                "Dispatch missed: {}",
                err
            ),
            Err(err) => warn!(
                adapter = %current.adapter,
                identity = %current.id,
                facet = %current.facet,
                operation = %current.operation,
                request_id = current.request_id,
                "Dispatch failed: {}",
                err
            ),
        }
        result
    }
}
