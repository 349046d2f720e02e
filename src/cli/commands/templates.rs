use anyhow::Result;
use std::io::Write;

use super::{load_settings, Command};
use crate::clone::list_available_process_templates;

pub struct TemplatesCommand;

impl TemplatesCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TemplatesCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for TemplatesCommand {
    async fn execute(&self) -> Result<()> {
        let (_, settings) = match load_settings() {
            Ok(loaded) => loaded,
            Err(e) => {
                println!("❌ {e}");
                return Err(e);
            }
        };

        print!("🔄 Fetching process templates from {}... ", settings.endpoint);
        let _ = std::io::stdout().flush();
        let templates = list_available_process_templates(&settings.endpoint, &settings.credential).await;
        println!("✅");
        println!();

        if templates.is_empty() {
            println!("📋 No process templates available");
            println!("   → Run 'project-cloner validate' to check the connection");
        } else {
            println!("📋 Process templates ({}):", templates.len());
            for name in &templates {
                println!("  • {name}");
            }
        }
        Ok(())
    }
}
