//! Dispatch command implementation
use crate::demo::{self, EchoLocator};
use anyhow::{bail, Context, Result};
use portico_core::{Communicator, DispatchResult, LoggingMiddleware, PorticoConfig, Request};
use portico_types::Identity;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub adapter: String,
    pub identity: String,
    pub facet: String,
    pub operation: String,
    pub payload: String,
    pub locator: Option<String>,
    pub repeat: usize,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Outcome {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl From<DispatchResult> for Outcome {
    fn from(result: DispatchResult) -> Self {
        match result {
            Ok(reply) => Self {
                ok: true,
                reply: Some(String::from_utf8_lossy(&reply).into_owned()),
                error: None,
                kind: None,
            },
            Err(err) => Self {
                ok: false,
                reply: None,
                error: Some(err.to_string()),
                kind: Some(err.kind()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct DispatchReport {
    adapter: String,
    identity: String,
    facet: String,
    operation: String,
    outcomes: Vec<Outcome>,
}

/// Dispatch requests to the demo servants through a freshly activated adapter
///
/// The adapter serves an echo servant as `hello`, an echo default servant for
/// the `default` category and, with `--locator`, an echo servant locator.
pub async fn run_dispatch(config_path: &Path, opts: DispatchOptions) -> Result<()> {
    let config = PorticoConfig::from_file(config_path).context("Failed to load configuration")?;
    let identity = Identity::parse(&opts.identity)
        .with_context(|| format!("Invalid identity `{}`", opts.identity))?;

    let communicator = Communicator::new(config);
    let adapter = communicator
        .create_object_adapter(&opts.adapter)
        .with_context(|| format!("Failed to create adapter `{}`", opts.adapter))?;

    adapter.use_middleware(Arc::new(LoggingMiddleware::new()))?;
    adapter.add(demo::echo_servant(), &Identity::new("hello"))?;
    adapter.add_default_servant(demo::echo_servant(), "default")?;
    if let Some(category) = &opts.locator {
        adapter.add_servant_locator(Arc::new(EchoLocator::new()), category)?;
    }
    adapter.activate()?;
    info!(adapter = %adapter.name(), requests = opts.repeat, "Dispatching");

    let mut handles = Vec::with_capacity(opts.repeat);
    for _ in 0..opts.repeat {
        let adapter = adapter.clone();
        let request = Request::new(identity.clone(), opts.operation.clone())
            .with_facet(opts.facet.clone())
            .with_payload(opts.payload.clone());
        handles.push(tokio::task::spawn_blocking(move || adapter.dispatch(request)));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.await.context("Dispatch task panicked")?;
        outcomes.push(Outcome::from(result));
    }

    let name = adapter.name().to_string();
    tokio::task::spawn_blocking(move || {
        adapter.destroy();
        communicator.destroy();
    })
    .await
    .context("Adapter shutdown panicked")?;

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    let report = DispatchReport {
        adapter: name,
        identity: identity.to_string(),
        facet: opts.facet,
        operation: opts.operation,
        outcomes,
    };

    if opts.json {
        let json = serde_json::to_string_pretty(&report)?;
        println!("{json}");
    } else {
        for outcome in &report.outcomes {
            match (&outcome.reply, &outcome.error) {
                (Some(reply), _) => println!("ok: {}", reply),
                (_, Some(error)) => {
                    println!("error [{}]: {}", outcome.kind.unwrap_or("unknown"), error)
                }
                _ => {}
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} dispatches failed", failed, report.outcomes.len());
    }

    Ok(())
}
