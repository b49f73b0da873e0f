//! Command implementations.

pub mod agent;
pub mod directory;
pub mod route;

use crate::ui;
use cape_kernel::config::load_config;
use cape_kernel::{CapeNode, KernelError};
use cape_types::config::CapeConfig;
use std::path::PathBuf;

/// Runtime for one command.
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        ui::error(&format!("Failed to start async runtime: {e}"));
        std::process::exit(1);
    })
}

/// Load the configuration, letting `adjust` tweak it before boot.
pub(crate) fn load(config: Option<PathBuf>, adjust: impl FnOnce(&mut CapeConfig)) -> CapeConfig {
    let mut cfg = load_config(config.as_deref());
    adjust(&mut cfg);
    cfg
}

pub(crate) async fn boot_node(config: CapeConfig) -> CapeNode {
    match CapeNode::boot(config).await {
        Ok(node) => node,
        Err(e) => {
            boot_error(&e);
            std::process::exit(1);
        }
    }
}

fn boot_error(e: &KernelError) {
    let msg = e.to_string();
    if msg.contains("listen") {
        ui::error_with_fix(
            &msg,
            "Check listen_addr in ~/.cape/config.toml, or stop the process holding the port",
        );
    } else if msg.contains("Memory") {
        ui::error_with_fix(
            &format!("State store error: {msg}"),
            "Check memory.sqlite_path, or switch memory.backend to \"memory\"",
        );
    } else {
        ui::error_with_fix(
            &format!("Failed to boot node: {msg}"),
            "Run with RUST_LOG=debug for details",
        );
    }
}

/// Report a failed operation and exit non-zero.
pub(crate) fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    ui::error(&format!("{context}: {e}"));
    std::process::exit(1);
}

/// Block until Ctrl+C.
pub(crate) async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        fail("Cannot listen for Ctrl+C", e);
    }
}
