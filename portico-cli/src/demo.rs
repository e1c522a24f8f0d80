//! Demo servants used by the CLI commands.

use portico_core::{
    Cookie, Current, DispatchError, Located, OperationTable, ServantLocator, ServantRef,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Servant answering `echo`, `reverse`, `describe` and `fail`
pub fn echo_servant() -> ServantRef {
    OperationTable::new("Echo")
        .operation("echo", |_, payload| Ok(payload.to_vec()))
        .operation("reverse", |_, payload| {
            let mut reply = payload.to_vec();
            reply.reverse();
            Ok(reply)
        })
        .operation("describe", |current, _| Ok(describe(current).into_bytes()))
        .operation("fail", |_, payload| {
            Err(DispatchError::user(format!(
                "requested failure: {}",
                String::from_utf8_lossy(payload)
            )))
        })
        .into_ref()
}

fn describe(current: &Current) -> String {
    let facet = if current.facet.is_empty() {
        "<default>"
    } else {
        current.facet.as_str()
    };
    format!(
        "adapter={} identity={} facet={} operation={}",
        current.adapter, current.id, facet, current.operation
    )
}

/// Locates an echo servant for every identity except those named `missing`
pub struct EchoLocator {
    servant: ServantRef,
    located: AtomicU64,
}

impl EchoLocator {
    pub fn new() -> Self {
        Self {
            servant: echo_servant(),
            located: AtomicU64::new(0),
        }
    }
}

impl Default for EchoLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServantLocator for EchoLocator {
    fn locate(&self, current: &Current) -> Result<Option<Located>, DispatchError> {
        if current.id.name() == "missing" {
            return Ok(None);
        }
        let serial = self.located.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Located::with_cookie(self.servant.clone(), serial)))
    }

    fn finished(
        &self,
        current: &Current,
        _servant: &ServantRef,
        cookie: Option<Cookie>,
    ) -> Result<(), DispatchError> {
        let serial = cookie.and_then(|c| c.downcast::<u64>().ok()).map(|c| *c);
        debug!(identity = %current.id, serial = ?serial, "Echo locator finished");
        Ok(())
    }

    fn deactivate(&self, category: &str) {
        debug!(
            category,
            located = self.located.load(Ordering::Relaxed),
            "Echo locator deactivated"
        );
    }
}
