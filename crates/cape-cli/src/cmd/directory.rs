//! `cape directory`: serve the reference directory.

use super::{boot_node, fail, load, runtime, wait_for_interrupt};
use crate::ui;
use std::path::PathBuf;

pub fn cmd_directory(config: Option<PathBuf>) {
    let config = load(config, |_| {});
    runtime().block_on(async {
        let node = boot_node(config).await;
        let (registry, address) = node
            .serve_directory()
            .unwrap_or_else(|e| fail("Cannot serve directory", e));

        ui::section("CAPE directory");
        ui::kv("Address", &address);
        ui::hint("Press Ctrl+C to stop");
        if address != node.config().directory_url {
            ui::hint(&format!(
                "agents must set directory_url = \"{address}\" to reach this directory"
            ));
        }

        wait_for_interrupt().await;
        ui::success(&format!(
            "Stopped with {} registration(s)",
            registry.len()
        ));
        node.shutdown();
    });
}
