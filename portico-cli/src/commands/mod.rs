//! CLI command implementations.

pub mod dispatch;
pub mod proxies;

pub use dispatch::{run_dispatch, DispatchOptions};
pub use proxies::show_proxies;
