//! match command - Resolve a method and path against the compiled router

use super::Options;
use anyhow::{anyhow, Context};
use console::style;
use prewire::metadata::HttpMethod;
use prewire::routing::RouteMatcher;

/// Returns `false` when no route matches
pub fn run(options: &Options, method: &str, path: &str) -> anyhow::Result<bool> {
    let method =
        HttpMethod::parse(method).ok_or_else(|| anyhow!("Unknown HTTP method '{}'", method))?;
    let artifacts = options.load_artifacts()?;
    let matcher = RouteMatcher::new(artifacts.router).context("Invalid route requirement")?;

    let Some(found) = matcher.find(method, path) else {
        println!("{} No route matches {} {}", style("✗").red(), method, path);
        return Ok(false);
    };

    println!(
        "{} {} {} -> {}",
        style("✓").green(),
        method,
        path,
        style(found.call.target()).bold()
    );
    println!("  template: {}", found.call.path);
    if let Some(name) = &found.call.name {
        println!("  name:     {}", name);
    }
    for (name, value) in &found.params {
        println!("  {} = {}", style(name).cyan(), value);
    }
    Ok(true)
}
