//! services command - Display the compiled container

use super::Options;
use console::style;
use prewire::container::{Builtin, Origin};

fn origin(origin: Origin) -> &'static str {
    match origin {
        Origin::Discovered => "discovered",
        Origin::Manual => "manual",
        Origin::Builtin(Builtin::Container) => "builtin container",
        Origin::Builtin(Builtin::Config) => "builtin config",
    }
}

pub fn run(options: &Options) -> anyhow::Result<()> {
    let artifacts = options.load_artifacts()?;
    let plan = &artifacts.container.plan;

    for service in &plan.services {
        let lifetime = if service.singleton { "singleton" } else { "transient" };
        let via = match &service.factory {
            Some(factory) => format!("{}::{}", factory.class, factory.method),
            None => service.class.clone(),
        };
        println!(
            "{} {} {}",
            style(&service.id).green(),
            via,
            style(format!("[{}, {}]", lifetime, origin(service.origin))).dim()
        );
        for arg in &service.args {
            println!("    {} = {:?}", arg.name, arg.value);
        }
    }

    if !plan.aliases.is_empty() {
        println!();
        for (alias, target) in &plan.aliases {
            println!("{} -> {}", style(alias).yellow(), target);
        }
    }
    Ok(())
}
