// === Interactive Setup ===

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, Select};

use super::{AadUpdate, Configuration};

/// Check if interactive setup is needed (neither auth flow is fully configured)
pub fn needs_interactive_setup(config: &Configuration) -> bool {
    config.auth_settings(false).is_err() && config.auth_settings(true).is_err()
}

/// Prompt for the service endpoint and authentication details, then save them
pub fn run_interactive_setup(config: &mut Configuration) -> Result<()> {
    println!();
    println!("Batch Apps - Authentication Setup");
    println!();
    println!("Enter the details of your Batch Apps service. Leave a value empty");
    println!("to keep the current setting.");
    println!();

    let current = config.endpoint().unwrap_or_default();
    let endpoint: String = Input::new()
        .with_prompt("Service endpoint (e.g. myservice.batchapps.core.windows.net)")
        .default(current)
        .allow_empty(true)
        .interact_text()
        .context("Failed to read endpoint")?;

    let modes = ["Interactive (user login)", "Unattended (client credentials)"];
    let mode = Select::new()
        .with_prompt("Authentication mode")
        .items(&modes)
        .default(0)
        .interact()
        .context("Failed to read authentication mode")?;
    let unattended = mode == 1;

    let mut update = AadUpdate {
        endpoint: Some(endpoint),
        ..Default::default()
    };

    if unattended {
        let account: String = Input::new()
            .with_prompt("Unattended account (ClientID=abc;TenantID=xyz)")
            .interact_text()
            .context("Failed to read unattended account")?;
        let key = Password::new()
            .with_prompt("Unattended key")
            .interact()
            .context("Failed to read unattended key")?;
        update.account = Some(account);
        update.key = Some(key);
    } else {
        let client_id: String = Input::new()
            .with_prompt("Client ID")
            .interact_text()
            .context("Failed to read client id")?;
        let tenant: String = Input::new()
            .with_prompt("Tenant")
            .default("common".to_string())
            .interact_text()
            .context("Failed to read tenant")?;
        let redirect: String = Input::new()
            .with_prompt("Redirect URI (without scheme)")
            .interact_text()
            .context("Failed to read redirect uri")?;
        update.client_id = Some(client_id);
        update.tenant = Some(tenant);
        update.redirect = Some(redirect);
    }

    config
        .aad_config(update, unattended, true)
        .context("Authentication settings are incomplete")?;

    let save = Confirm::new()
        .with_prompt(format!(
            "Save configuration to {}?",
            config.config_file().display()
        ))
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save && config.save_config() {
        println!();
        println!("Configuration saved");
    }

    println!();
    Ok(())
}
