//! Engines command implementation

use colored::Colorize;

use crate::context::Context;
use crate::error::Result;

/// List installed engines and the sites each one serves.
pub fn run_engines(context: &Context) -> Result<()> {
    println!("{}", "Engines".bold());
    for id in context.registry.list() {
        println!(
            "  {} {} ({})",
            "+".green(),
            id.cyan(),
            context.registry.sites(id).join(", ")
        );
    }
    Ok(())
}
