//! Proxies command implementation
use crate::demo;
use anyhow::{Context, Result};
use portico_core::{Communicator, ObjectAdapter, PorticoConfig};
use portico_types::{format_endpoint_list, Identity};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct AdapterReport {
    name: String,
    adapter_id: Option<String>,
    replica_group_id: Option<String>,
    endpoints: String,
    published_endpoints: String,
    proxy: String,
    direct_proxy: String,
    indirect_proxy: Option<String>,
}

/// Create every configured adapter and report the proxies it hands out
pub fn show_proxies(config_path: &Path, json: bool) -> Result<()> {
    let config = PorticoConfig::from_file(config_path).context("Failed to load configuration")?;
    let names: Vec<String> = config.adapters.keys().cloned().collect();
    let communicator = Communicator::new(config);

    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        let adapter = communicator
            .create_object_adapter(name)
            .with_context(|| format!("Failed to create adapter `{}`", name))?;
        let report = report(&adapter);
        adapter.destroy();
        reports.push(report?);
    }
    communicator.destroy();

    if json {
        let json = serde_json::to_string_pretty(&reports)?;
        println!("{json}");
        return Ok(());
    }

    if reports.is_empty() {
        println!("No adapters configured in {}", config_path.display());
        return Ok(());
    }

    for report in &reports {
        println!("[{}]", report.name);
        if let Some(id) = &report.adapter_id {
            println!("  adapter id:  {}", id);
        }
        if let Some(group) = &report.replica_group_id {
            println!("  replica group: {}", group);
        }
        println!("  endpoints:   {}", report.endpoints);
        println!("  published:   {}", report.published_endpoints);
        println!("  proxy:       {}", report.proxy);
        println!("  direct:      {}", report.direct_proxy);
        if let Some(indirect) = &report.indirect_proxy {
            println!("  indirect:    {}", indirect);
        }
        println!();
    }

    Ok(())
}

fn report(adapter: &ObjectAdapter) -> Result<AdapterReport> {
    let identity = Identity::new("hello");
    adapter.add(demo::echo_servant(), &identity)?;

    let indirect_proxy = if adapter.adapter_id().is_some() {
        Some(adapter.create_indirect_proxy(&identity)?.to_string())
    } else {
        None
    };

    Ok(AdapterReport {
        name: adapter.name().to_string(),
        adapter_id: adapter.adapter_id().map(str::to_string),
        replica_group_id: adapter.replica_group_id().map(str::to_string),
        endpoints: format_endpoint_list(&adapter.endpoints()),
        published_endpoints: format_endpoint_list(&adapter.published_endpoints()),
        proxy: adapter.create_proxy(&identity)?.to_string(),
        direct_proxy: adapter.create_direct_proxy(&identity)?.to_string(),
        indirect_proxy,
    })
}
