//! One-shot routing commands: notify, find, contacts.
//!
//! These run an ephemeral node on a free local port so they can share a host
//! with a long-running agent or directory.

use super::{boot_node, fail, load, runtime};
use crate::cli::LoginArgs;
use crate::ui;
use cape_types::datasource::ContactFilter;
use std::path::PathBuf;

const EPHEMERAL_ADDR: &str = "127.0.0.1:0";

fn ephemeral(config: Option<PathBuf>) -> cape_types::config::CapeConfig {
    load(config, |cfg| cfg.listen_addr = EPHEMERAL_ADDR.to_string())
}

pub fn cmd_notify(config: Option<PathBuf>, login: LoginArgs, to: Option<&str>, message: &str) {
    let config = ephemeral(config);
    runtime().block_on(async {
        let node = boot_node(config).await;
        let client = node.client();
        client
            .login(&login.username, &login.password)
            .await
            .unwrap_or_else(|e| fail("Login failed", e));

        match client.send_notification(to, message).await {
            Ok(()) => ui::success(&format!(
                "Notification delivered to {}",
                to.unwrap_or(&login.username)
            )),
            Err(e) => fail("Notification failed", e),
        }
        client.logout().await;
        node.shutdown();
    });
}

pub fn cmd_find(config: Option<PathBuf>, user: &str, data_type: &str) {
    let config = ephemeral(config);
    runtime().block_on(async {
        let node = boot_node(config).await;
        let agent = node.spawn_agent("cape-cli");
        let found = agent
            .find(user, data_type)
            .await
            .unwrap_or_else(|e| fail("Directory lookup failed", e));
        agent.destroy();

        if found.is_empty() {
            ui::hint(&format!("No agent serves '{data_type}' for {user}"));
        } else {
            ui::section(&format!("'{data_type}' providers for {user}"));
            for (i, address) in found.iter().enumerate() {
                ui::kv(&format!("#{}", i + 1), address);
            }
        }
        node.shutdown();
    });
}

pub fn cmd_contacts(config: Option<PathBuf>, login: LoginArgs, filter: Option<&str>) {
    let filter: Option<ContactFilter> = filter.map(|text| {
        serde_json::from_str(text).unwrap_or_else(|e| fail("Filter is not a JSON object", e))
    });
    let config = ephemeral(config);
    runtime().block_on(async {
        let node = boot_node(config).await;
        let client = node.client();
        client
            .login(&login.username, &login.password)
            .await
            .unwrap_or_else(|e| fail("Login failed", e));

        let contacts = client
            .get_contacts(filter.as_ref())
            .await
            .unwrap_or_else(|e| fail("Contact lookup failed", e));
        ui::section(&format!("{} contact(s)", contacts.len()));
        for contact in &contacts {
            println!("  {contact}");
        }
        client.logout().await;
        node.shutdown();
    });
}
