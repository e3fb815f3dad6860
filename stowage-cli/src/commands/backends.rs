//! Backends Command
//!
//! Lists backend implementations and configured backends.

use super::AppContext;
use anyhow::Result;
use console::style;
use stowage_storage::BackendRegistry;

/// Run backends command
pub fn run(ctx: &AppContext) -> Result<()> {
    let registry = BackendRegistry::new(&ctx.config.storage)?;

    println!("{}", style("Backend implementations").bold().underlined());
    println!();
    for kind in registry.kinds() {
        let mode = if kind.simple_data { "path" } else { "key=value" };
        println!("  {:<16} {}", style(kind.name).cyan(), style(mode).dim());
    }

    println!();
    println!("{}", style("Configured backends").bold().underlined());
    println!();
    for (name, definition) in registry.definitions() {
        let marker = if name == registry.default_backend() {
            style("(default)").green().to_string()
        } else {
            String::new()
        };
        println!("  {:<16} {} {}", style(name).cyan(), definition, marker);
    }
    println!();

    match registry.validate() {
        Ok(()) => println!("{} Configuration is valid", style(crate::output::CHECK).green()),
        Err(e) => println!("{} {}", style(crate::output::CROSS).red(), e),
    }
    Ok(())
}
