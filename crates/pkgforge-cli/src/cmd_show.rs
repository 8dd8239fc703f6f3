// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pkgforge show` command.

use clap::Args;
use colored::Colorize;
use miette::Result;
use pkgforge::{config, filter, PackageInstance, Selector};
use serde_yaml::Value;

use crate::{ConfigFlags, ManagerFlags};

/// Display the resolved package instances
#[derive(Debug, Args)]
pub struct CmdShow {
    #[clap(flatten)]
    config: ConfigFlags,

    #[clap(flatten)]
    manager: ManagerFlags,

    /// Only show these packages: 'all' or a comma separated list of names
    #[clap(short, long)]
    packages: Option<String>,

    /// Show the injected settings of each instance
    #[clap(long)]
    settings: bool,

    /// Output format: table, yaml
    #[clap(long, default_value = "table")]
    format: String,
}

impl CmdShow {
    pub async fn run(&mut self) -> Result<i32> {
        let Some(collection) = self.config.load()? else {
            return Ok(0);
        };

        let selector = match self.packages.as_deref() {
            Some(text) => text.parse::<Selector>()?,
            None => Selector::All,
        };
        let manager = self.manager.conan();
        let instances = filter(&selector, collection.instances(), &manager);

        if self.format == "yaml" {
            self.show_yaml(&instances)?;
        } else {
            self.show_table(&instances)?;
        }
        Ok(0)
    }

    fn show_table(&self, instances: &[&PackageInstance]) -> Result<()> {
        println!("{}", "Package Instances:".bold());
        println!();

        if instances.is_empty() {
            println!("  {}", "(no instances)".dimmed());
        }

        for (i, instance) in instances.iter().enumerate() {
            match instance.reference() {
                Ok(reference) => println!("  {}. {}", i + 1, reference.to_string().green()),
                Err(err) => println!(
                    "  {}. {} {}",
                    i + 1,
                    instance.name().yellow(),
                    format!("({err})").red()
                ),
            }

            match instance.template_path() {
                Ok(path) => println!("     recipe:   {}", path.display().to_string().cyan()),
                Err(_) => println!("     recipe:   {}", "(none)".dimmed()),
            }
            let identity = instance.identity();
            println!("     identity: {}", &identity[..identity.len().min(12)]);

            let settings = instance.settings();
            if let Some(checkout) = &settings.checkout {
                println!("     checkout: {checkout}");
            }
            for rule in instance.dependency_rules() {
                println!(
                    "     override: {} {} {}",
                    rule.pattern.cyan(),
                    "->".dimmed(),
                    rule.replacement
                );
            }

            if self.settings {
                for (key, value) in settings.injected_settings() {
                    let text = match value {
                        Value::String(s) => s,
                        other => config::to_yaml(&other)?.trim_end().to_string(),
                    };
                    println!("     {} = {}", key.blue(), text);
                }
            }
        }

        println!();
        println!("Total: {} instance(s)", instances.len());
        Ok(())
    }

    fn show_yaml(&self, instances: &[&PackageInstance]) -> Result<()> {
        let entries = instances
            .iter()
            .map(|instance| instance.raw_config().clone())
            .collect::<Vec<_>>();
        print!("{}", config::to_yaml(&Value::Sequence(entries))?);
        Ok(())
    }
}
