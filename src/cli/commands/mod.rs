use anyhow::Result;
use std::io::Write;

use crate::config::{config, ClonerConfig, ConfigSettingsProvider, PlatformSettings, SettingsProvider};
use crate::devops::DevOpsClient;

pub mod clone;
pub mod templates;
pub mod validate;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Loaded configuration and the connection settings derived from it.
pub fn load_settings() -> Result<(&'static ClonerConfig, PlatformSettings)> {
    let config = config()?;
    let settings = ConfigSettingsProvider::new(config.clone()).settings()?;
    Ok((config, settings))
}

pub async fn with_platform<F, Fut, R>(f: F) -> Result<R>
where
    F: FnOnce(DevOpsClient, &'static ClonerConfig, PlatformSettings) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    let (config, settings) = match load_settings() {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("❌ {e}");
            return Err(e);
        }
    };

    print!("🔄 Connecting to {}... ", settings.endpoint);
    let _ = std::io::stdout().flush();

    match DevOpsClient::new(&settings.endpoint, &settings.credential, config) {
        Ok(client) => {
            println!("✅");
            f(client, config, settings).await
        }
        Err(e) => {
            println!("❌ {e}");
            print_guidance(&e);
            Err(e.into())
        }
    }
}

pub fn print_guidance(error: &crate::devops::DevOpsError) {
    for hint in error.guidance() {
        println!("   → {hint}");
    }
}

pub async fn show_usage() -> Result<()> {
    println!("🧬 Project Cloner - replicate a project into a new sibling project");
    println!();
    println!("To get started:");
    println!("  🔌 project-cloner validate                    # Check organization and token");
    println!("  📋 project-cloner templates                   # List process templates");
    println!("  🧬 project-cloner clone <SOURCE> <TARGET> --all  # Copy everything");
    println!();
    println!("Settings are read from project-cloner.toml and PROJECT_CLONER_* variables.");
    println!("The token can also come from AZURE_DEVOPS_EXT_PAT.");
    println!();
    println!("💡 Pick parts to copy with --settings, --work-items, --wiki and friends.");
    Ok(())
}
