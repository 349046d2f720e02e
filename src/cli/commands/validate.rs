use anyhow::{bail, Result};
use std::io::Write;

use super::{load_settings, Command};
use crate::clone::validate_target_reachable;

pub struct ValidateCommand;

impl ValidateCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidateCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for ValidateCommand {
    async fn execute(&self) -> Result<()> {
        println!("🔌 Validating platform connection");
        println!();

        let (_, settings) = match load_settings() {
            Ok(loaded) => loaded,
            Err(e) => {
                println!("❌ {e}");
                return Err(e);
            }
        };
        println!("  🌐 Organization: {}", settings.endpoint);
        println!("  📁 Run reports: {}", settings.default_local_path.display());
        println!();

        print!("🔄 Listing projects... ");
        let _ = std::io::stdout().flush();
        if validate_target_reachable(&settings.endpoint, &settings.credential).await {
            println!("✅");
            println!();
            println!("✅ Ready to clone. Try: project-cloner clone <SOURCE> <TARGET> --all");
            Ok(())
        } else {
            println!("❌");
            println!();
            println!("   → Check the organization URL");
            println!("   → Check that the personal access token is valid and not expired");
            println!("   → Run with RUST_LOG=debug for the platform response");
            bail!("Organization {} is not reachable", settings.endpoint)
        }
    }
}
