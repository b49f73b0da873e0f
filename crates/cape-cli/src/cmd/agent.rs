//! `cape agent`: log a user in, offer capabilities, serve until interrupted.

use super::{boot_node, fail, load, runtime, wait_for_interrupt};
use crate::cli::LoginArgs;
use crate::ui;
use async_trait::async_trait;
use cape_kernel::{NotificationHandler, StaticContacts};
use cape_types::datasource::{Contact, CONTACTS};
use cape_types::error::CapeResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Prints incoming notifications to the terminal.
struct PrintNotifications;

#[async_trait]
impl NotificationHandler for PrintNotifications {
    async fn notify(&self, sender: Option<&str>, message: &str) -> CapeResult<()> {
        ui::notification(sender, message);
        Ok(())
    }
}

fn read_contacts(path: &Path) -> Vec<Contact> {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        fail(&format!("Cannot read {}", path.display()), e);
    });
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        fail(
            &format!("{} is not a JSON array of contacts", path.display()),
            e,
        );
    })
}

pub fn cmd_agent(
    config: Option<PathBuf>,
    login: LoginArgs,
    mut offers: Vec<String>,
    contacts_file: Option<PathBuf>,
) {
    let config = load(config, |_| {});
    let contacts = contacts_file.as_deref().map(read_contacts);
    if contacts.is_some() && !offers.iter().any(|o| o == CONTACTS) {
        offers.push(CONTACTS.to_string());
    }

    runtime().block_on(async {
        let node = boot_node(config).await;
        let client = node.client();
        client.on_notification(Arc::new(PrintNotifications));
        if let Some(contacts) = contacts {
            client.serve_contacts(Arc::new(StaticContacts::new(contacts)));
        }

        let agent = client
            .login(&login.username, &login.password)
            .await
            .unwrap_or_else(|e| fail("Login failed", e));

        ui::section(&format!("CAPE agent {}", agent.id()));
        ui::kv("Address", &agent.address().unwrap_or_default());
        ui::kv("Directory", &node.config().directory_url);

        for data_type in &offers {
            match agent.offer(data_type).await {
                Ok(()) => ui::success(&format!("Offering '{data_type}'")),
                Err(e) => fail(&format!("Cannot offer '{data_type}'"), e),
            }
        }
        ui::hint("Press Ctrl+C to stop");

        wait_for_interrupt().await;

        for data_type in &offers {
            if let Err(e) = agent.withdraw(data_type).await {
                warn!(data_type = %data_type, error = %e, "Withdraw failed");
            }
        }
        client.logout().await;
        node.shutdown();
    });
}
