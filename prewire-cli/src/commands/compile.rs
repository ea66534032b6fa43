//! compile command - Analyse the project and write the artifacts

use super::Options;
use anyhow::Context;
use console::style;
use prewire::emit::{self, Emitter, JsonEmitter};
use prewire::error::Severity;
use prewire::metadata::SourceAnalyzer;
use prewire::Compiler;
use std::path::PathBuf;

/// Returns `false` when the diagnostics should fail the run
pub fn run(
    options: &Options,
    out: Option<PathBuf>,
    sources: Vec<PathBuf>,
    deny_warnings: bool,
) -> anyhow::Result<bool> {
    let mut config = options.load_config()?;
    if let Some(out) = out {
        config.output.dir = out;
    }

    let analyzer = if sources.is_empty() {
        SourceAnalyzer::new()
    } else {
        SourceAnalyzer::with_source_dirs(sources)
    };

    println!("{} Compiling {}", style("→").cyan(), config.project_root.display());
    let compilation = match Compiler::new(config.clone()).compile(analyzer) {
        Ok(compilation) => compilation,
        Err(err) => {
            emit::invalidate(&config).context("Failed to remove stale manifest")?;
            return Err(anyhow::Error::new(err).context("Compilation failed"));
        }
    };

    for diagnostic in &compilation.diagnostics {
        match diagnostic.severity {
            Severity::Error => eprintln!("{} {}", style("error:").red().bold(), diagnostic),
            Severity::Warning => eprintln!("{} {}", style("warning:").yellow().bold(), diagnostic),
        }
    }

    if deny_warnings && !compilation.diagnostics.is_empty() {
        eprintln!();
        eprintln!(
            "{} {} diagnostic(s) with --deny-warnings, nothing written",
            style("Error:").red().bold(),
            compilation.diagnostics.len()
        );
        emit::invalidate(&config).context("Failed to remove stale manifest")?;
        return Ok(false);
    }

    let manifest = JsonEmitter::default()
        .emit(&compilation.plans, &config)
        .context("Failed to write artifacts")?;

    let plans = &compilation.plans;
    println!(
        "{} {} services, {} routes, {} middleware, {} events",
        style("✓").green(),
        plans.container.services.len(),
        plans.router.len(),
        plans.middleware.entries.len(),
        plans.listeners.groups.len()
    );
    for entry in &manifest.artifacts {
        println!(
            "  {} {}",
            style(entry.kind).dim(),
            config.output_dir().join(&entry.file).display()
        );
    }
    Ok(true)
}
