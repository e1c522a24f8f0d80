//! Integration tests for request dispatch through an object adapter

use parking_lot::Mutex;
use portico_core::{
    AdapterError, Communicator, Cookie, Current, DispatchError, DispatchResult, FnServant,
    Located, LoggingMiddleware, Middleware, Next, ObjectAdapter, OperationTable, PorticoConfig,
    Request, ServantLocator, ServantRef,
};
use portico_types::Identity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct AppError(String);

type Events = Arc<Mutex<Vec<String>>>;

fn active_adapter() -> Arc<ObjectAdapter> {
    let communicator = Communicator::new(PorticoConfig::default());
    let adapter = communicator.create_object_adapter("Test").unwrap();
    adapter.activate().unwrap();
    adapter
}

fn tagged(tag: &'static str, events: Events) -> ServantRef {
    FnServant::shared(move |current, _| {
        events.lock().push(format!("{} {}", tag, current.operation));
        Ok(tag.as_bytes().to_vec())
    })
}

fn dispatch(adapter: &ObjectAdapter, identity: Identity, operation: &str) -> DispatchResult {
    adapter.dispatch(Request::new(identity, operation))
}

/// Records every locator callback and hands out a cookie per request
struct RecordingLocator {
    servant: ServantRef,
    events: Events,
    fail_locate: bool,
    fail_finished: bool,
}

impl RecordingLocator {
    fn new(servant: ServantRef, events: Events) -> Self {
        Self {
            servant,
            events,
            fail_locate: false,
            fail_finished: false,
        }
    }
}

impl ServantLocator for RecordingLocator {
    fn locate(&self, current: &Current) -> Result<Option<Located>, DispatchError> {
        self.events.lock().push(format!("locate {}", current.id));
        if self.fail_locate {
            return Err(DispatchError::user(AppError("locate failed".into())));
        }
        if current.id.name() == "unknown" {
            return Ok(None);
        }
        Ok(Some(Located::with_cookie(
            self.servant.clone(),
            format!("cookie-{}", current.id.name()),
        )))
    }

    fn finished(
        &self,
        _current: &Current,
        _servant: &ServantRef,
        cookie: Option<Cookie>,
    ) -> Result<(), DispatchError> {
        let cookie = cookie
            .and_then(|c| c.downcast::<String>().ok())
            .map(|c| *c)
            .unwrap_or_default();
        self.events.lock().push(format!("finished {}", cookie));
        if self.fail_finished {
            return Err(DispatchError::user(AppError("finished failed".into())));
        }
        Ok(())
    }

    fn deactivate(&self, category: &str) {
        self.events.lock().push(format!("deactivate {}", category));
    }
}

#[test]
fn test_exact_registration_wins() {
    let adapter = active_adapter();
    let events = Events::default();
    let id = Identity::new("x").with_category("c");
    adapter.add(tagged("exact", events.clone()), &id).unwrap();
    adapter
        .add_default_servant(tagged("default", events.clone()), "c")
        .unwrap();

    assert_eq!(dispatch(&adapter, id, "op").unwrap(), b"exact");
}

#[test]
fn test_category_default_before_catch_all() {
    let adapter = active_adapter();
    let events = Events::default();
    adapter
        .add_default_servant(tagged("category", events.clone()), "c")
        .unwrap();
    adapter
        .add_default_servant(tagged("any", events.clone()), "")
        .unwrap();

    let reply = dispatch(&adapter, Identity::new("x").with_category("c"), "op").unwrap();
    assert_eq!(reply, b"category");

    let reply = dispatch(&adapter, Identity::new("x").with_category("d"), "op").unwrap();
    assert_eq!(reply, b"any");
}

#[test]
fn test_default_servants_before_locators() {
    let adapter = active_adapter();
    let events = Events::default();
    adapter
        .add_default_servant(tagged("any", events.clone()), "")
        .unwrap();
    adapter
        .add_servant_locator(
            Arc::new(RecordingLocator::new(
                tagged("located", events.clone()),
                events.clone(),
            )),
            "c",
        )
        .unwrap();

    let reply = dispatch(&adapter, Identity::new("x").with_category("c"), "op").unwrap();
    assert_eq!(reply, b"any");
    assert_eq!(*events.lock(), vec!["any op"]);
}

#[test]
fn test_locator_call_order() {
    let adapter = active_adapter();
    let events = Events::default();
    let locator = Arc::new(RecordingLocator::new(
        tagged("servant", events.clone()),
        events.clone(),
    ));
    adapter.add_servant_locator(locator, "cat").unwrap();

    let reply = dispatch(&adapter, Identity::new("n").with_category("cat"), "op").unwrap();
    assert_eq!(reply, b"servant");
    assert_eq!(
        *events.lock(),
        vec!["locate cat/n", "servant op", "finished cookie-n"]
    );
}

#[test]
fn test_finished_runs_when_operation_fails() {
    let adapter = active_adapter();
    let events = Events::default();
    let failing = FnServant::shared(|_, _| Err(DispatchError::user(AppError("boom".into()))));
    adapter
        .add_servant_locator(Arc::new(RecordingLocator::new(failing, events.clone())), "")
        .unwrap();

    let err = dispatch(&adapter, Identity::new("n"), "op").unwrap_err();
    assert_eq!(err.user_error::<AppError>().map(|e| e.0.as_str()), Some("boom"));
    assert_eq!(*events.lock(), vec!["locate n", "finished cookie-n"]);
}

#[test]
fn test_finished_failure_replaces_result() {
    let adapter = active_adapter();
    let events = Events::default();
    let mut locator = RecordingLocator::new(tagged("servant", events.clone()), events.clone());
    locator.fail_finished = true;
    adapter.add_servant_locator(Arc::new(locator), "").unwrap();

    let err = dispatch(&adapter, Identity::new("n"), "op").unwrap_err();
    assert_eq!(
        err.user_error::<AppError>().map(|e| e.0.as_str()),
        Some("finished failed")
    );
}

/// Hands out its servant but panics once the operation finished
struct PanickingFinish(ServantRef);

impl ServantLocator for PanickingFinish {
    fn locate(&self, _current: &Current) -> Result<Option<Located>, DispatchError> {
        Ok(Some(Located::new(self.0.clone())))
    }

    fn finished(
        &self,
        _current: &Current,
        _servant: &ServantRef,
        _cookie: Option<Cookie>,
    ) -> Result<(), DispatchError> {
        panic!("finished exploded");
    }
}

#[test]
fn test_finished_panic_becomes_unknown() {
    let adapter = active_adapter();
    let events = Events::default();
    adapter
        .add_servant_locator(
            Arc::new(PanickingFinish(tagged("servant", events.clone()))),
            "",
        )
        .unwrap();

    let worker = {
        let adapter = adapter.clone();
        thread::spawn(move || dispatch(&adapter, Identity::new("x"), "op"))
    };
    let err = worker.join().expect("panic escaped dispatch").unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Unknown { ref message, .. } if message == "servant locator panicked in finished"
    ));
    assert_eq!(*events.lock(), vec!["servant op"]);

    // The adapter keeps serving after the panic
    adapter.add(tagged("exact", events.clone()), &Identity::new("y")).unwrap();
    assert_eq!(dispatch(&adapter, Identity::new("y"), "op").unwrap(), b"exact");
}

#[test]
fn test_locate_failure_propagates_without_finished() {
    let adapter = active_adapter();
    let events = Events::default();
    let mut locator = RecordingLocator::new(tagged("servant", events.clone()), events.clone());
    locator.fail_locate = true;
    adapter.add_servant_locator(Arc::new(locator), "").unwrap();

    let err = dispatch(&adapter, Identity::new("n"), "op").unwrap_err();
    assert_eq!(err.to_string(), "locate failed");
    assert_eq!(*events.lock(), vec!["locate n"]);
}

#[test]
fn test_only_one_locator_consulted() {
    let adapter = active_adapter();
    let category_events = Events::default();
    let any_events = Events::default();
    adapter
        .add_servant_locator(
            Arc::new(RecordingLocator::new(
                tagged("category", category_events.clone()),
                category_events.clone(),
            )),
            "c",
        )
        .unwrap();
    adapter
        .add_servant_locator(
            Arc::new(RecordingLocator::new(
                tagged("any", any_events.clone()),
                any_events.clone(),
            )),
            "",
        )
        .unwrap();

    let err = dispatch(&adapter, Identity::new("unknown").with_category("c"), "op").unwrap_err();
    assert!(matches!(err, DispatchError::ObjectNotExist { .. }));
    assert_eq!(*category_events.lock(), vec!["locate c/unknown"]);
    assert!(any_events.lock().is_empty());
}

#[test]
fn test_object_and_facet_not_exist() {
    let adapter = active_adapter();
    let events = Events::default();
    let id = Identity::new("x");
    adapter
        .add_facet(tagged("admin", events.clone()), &id, "admin")
        .unwrap();

    let err = dispatch(&adapter, Identity::new("y"), "op").unwrap_err();
    assert!(matches!(err, DispatchError::ObjectNotExist { .. }));

    let err = dispatch(&adapter, id.clone(), "op").unwrap_err();
    assert!(matches!(err, DispatchError::FacetNotExist { ref facet, .. } if facet.is_empty()));

    let reply = adapter
        .dispatch(Request::new(id, "op").with_facet("admin"))
        .unwrap();
    assert_eq!(reply, b"admin");
}

#[test]
fn test_operation_not_exist() {
    let adapter = active_adapter();
    let greeter = OperationTable::new("Greeter")
        .operation("greet", |current, payload| {
            let who = current.context.get("lang").map(String::as_str).unwrap_or("en");
            Ok(format!("{}:{}", who, String::from_utf8_lossy(payload)).into_bytes())
        })
        .into_ref();
    adapter.add(greeter, &Identity::new("greeter")).unwrap();

    let reply = adapter
        .dispatch(
            Request::new(Identity::new("greeter"), "greet")
                .with_payload("bob")
                .with_context("lang", "fr"),
        )
        .unwrap();
    assert_eq!(reply, b"fr:bob");

    let err = dispatch(&adapter, Identity::new("greeter"), "shout").unwrap_err();
    assert!(matches!(err, DispatchError::OperationNotExist { .. }));
}

#[test]
fn test_destroy_deactivates_locators() {
    let communicator = Communicator::new(PorticoConfig::default());
    let adapter = communicator.create_object_adapter("Test").unwrap();
    let events = Events::default();
    for category in ["b", "a"] {
        adapter
            .add_servant_locator(
                Arc::new(RecordingLocator::new(
                    tagged("servant", events.clone()),
                    events.clone(),
                )),
                category,
            )
            .unwrap();
    }

    adapter.destroy();
    assert_eq!(*events.lock(), vec!["deactivate a", "deactivate b"]);
    assert!(adapter.find_servant_locator("a").is_none());
}

struct Tag(&'static str, Events);

impl Middleware for Tag {
    fn dispatch(&self, current: &Current, payload: &[u8], next: Next<'_>) -> DispatchResult {
        self.1.lock().push(format!("before {}", self.0));
        let result = next.run(current, payload);
        self.1.lock().push(format!("after {}", self.0));
        result
    }
}

#[test]
fn test_middleware_wraps_dispatch() {
    let communicator = Communicator::new(PorticoConfig::default());
    let adapter = communicator.create_object_adapter("Test").unwrap();
    let events = Events::default();

    adapter
        .use_middleware(Arc::new(Tag("outer", events.clone())))
        .unwrap();
    adapter
        .use_middleware(Arc::new(Tag("inner", events.clone())))
        .unwrap();
    adapter
        .use_middleware(Arc::new(LoggingMiddleware::new()))
        .unwrap();
    adapter
        .add(tagged("servant", events.clone()), &Identity::new("x"))
        .unwrap();
    adapter.activate().unwrap();

    dispatch(&adapter, Identity::new("x"), "op").unwrap();
    assert_eq!(
        *events.lock(),
        vec![
            "before outer",
            "before inner",
            "servant op",
            "after inner",
            "after outer"
        ]
    );

    assert!(matches!(
        adapter.use_middleware(Arc::new(LoggingMiddleware::new())),
        Err(AdapterError::PipelineSealed(_))
    ));
}

#[test]
fn test_concurrent_dispatch() {
    let adapter = active_adapter();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = {
        let calls = calls.clone();
        FnServant::shared(move |current, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(current.request_id.to_le_bytes().to_vec())
        })
    };
    adapter.add_default_servant(counter, "").unwrap();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let adapter = adapter.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|j| {
                        let id = Identity::new(format!("obj-{}-{}", i, j));
                        dispatch(&adapter, id, "op").unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut replies = Vec::new();
    for worker in workers {
        replies.extend(worker.join().unwrap());
    }
    replies.sort();
    replies.dedup();

    assert_eq!(calls.load(Ordering::SeqCst), 200);
    assert_eq!(replies.len(), 200);

    adapter.deactivate();
    adapter.wait_for_deactivate();
}
