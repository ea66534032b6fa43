//! routes command - Display the compiled routes

use super::Options;
use console::style;

pub fn run(options: &Options) -> anyhow::Result<()> {
    let artifacts = options.load_artifacts()?;
    let routes = artifacts.router.routes();
    if routes.is_empty() {
        println!("{}", style("No routes compiled").dim());
        return Ok(());
    }

    let width = routes.iter().map(|(_, call)| call.path.len()).max().unwrap_or(0);
    for (method, call) in routes {
        let name = call
            .name
            .as_deref()
            .map(|name| format!(" ({})", name))
            .unwrap_or_default();
        println!(
            "{:<7} {:<width$}  {}{}",
            style(method).cyan(),
            call.path,
            call.target(),
            style(name).dim(),
            width = width
        );
    }
    Ok(())
}
