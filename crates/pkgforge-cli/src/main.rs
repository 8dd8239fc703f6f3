// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! pkgforge - Recipe Instance Configuration Engine CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use pkgforge::collection::{run_pipeline, BatchOptions, BatchReport, PackageCollection, Step};
use pkgforge::config::{self, ToolSettings};
use pkgforge::manager::{ConanCli, PackageManager, DEFAULT_BUILD_POLICY, DEFAULT_PROGRAM};
use pkgforge::{Selector, WorkingDirectory};
use tokio::sync::Semaphore;

mod cmd_export;
mod cmd_show;

#[cfg(test)]
#[path = "./main_test.rs"]
mod main_test;

use cmd_export::CmdExport;
use cmd_show::CmdShow;
use cmd_test::CmdTest;

/// Selector value that also disables recipe discovery.
const INSTANCES_ONLY: &str = "instances-only";

#[derive(Parser)]
#[clap(
    name = "pkgforge",
    about = "Recipe Instance Configuration Engine",
    version,
    long_about = "Generate recipe instances from template recipes, then export, build and test them"
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    /// Run as if started in DIR
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
struct Logging {
    /// Increase verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[clap(long, global = true, env = "PKGFORGE_NO_COLOR")]
    no_color: bool,
}

/// Where the configuration comes from.
#[derive(Parser, Clone, Debug, Default)]
pub struct ConfigFlags {
    /// Configuration files, merged in order on top of the defaults
    #[clap(value_name = "CONFIG_FILE")]
    pub config_files: Vec<PathBuf>,

    /// Print the default configuration and exit
    #[clap(long)]
    pub print_default_configuration: bool,

    /// Print the complete configuration that would be used and exit
    #[clap(long)]
    pub print_configuration: bool,

    /// Owner used for every package unless configured otherwise
    #[clap(short, long)]
    pub owner: Option<String>,

    /// Channel used for every package unless configured otherwise
    #[clap(short, long)]
    pub channel: Option<String>,

    /// Directory with one subdirectory per template recipe
    #[clap(long, default_value = "recipes", env = "PKGFORGE_RECIPES")]
    pub recipes: PathBuf,

    /// Only process explicitly configured instances, skip recipe discovery
    #[clap(long)]
    pub instances_only: bool,
}

impl ConfigFlags {
    /// Assemble the configuration and build the collection.
    ///
    /// Returns `None` when a configuration was printed instead.
    pub fn load(&self) -> Result<Option<PackageCollection>> {
        let mut config = config::default_configuration()?;
        if self.print_default_configuration {
            println!("# Default Configuration");
            print!("{}", config::to_yaml(&config)?);
            return Ok(None);
        }

        for file in &self.config_files {
            tracing::debug!("loading configuration {:?}", file);
            config::merge_document(&mut config, &config::load_config_file(file)?)?;
        }
        if let Some(owner) = &self.owner {
            config::set_package_default(&mut config, "owner", owner.as_str().into());
        }
        if let Some(channel) = &self.channel {
            config::set_package_default(&mut config, "channel", channel.as_str().into());
        }

        let mut collection = PackageCollection::from_config(&config)?;
        if !self.instances_only {
            if self.recipes.is_dir() {
                collection.add_from_recipe_collection(&self.recipes)?;
            } else {
                tracing::warn!(
                    "Recipe directory {:?} not found, using configured instances only",
                    self.recipes
                );
            }
        }

        if self.print_configuration {
            println!("# Complete Configuration");
            print!("{}", config::to_yaml(collection.config())?);
            return Ok(None);
        }
        Ok(Some(collection))
    }
}

/// How the package manager is invoked.
#[derive(Parser, Clone, Debug)]
pub struct ManagerFlags {
    /// Package manager executable
    #[clap(long, default_value = DEFAULT_PROGRAM, env = "PKGFORGE_CONAN")]
    pub program: PathBuf,

    /// Profile used to install and test packages (repeatable)
    #[clap(long = "profile", value_name = "NAME")]
    pub profiles: Vec<String>,

    /// Value passed to --build when installing packages
    #[clap(long, default_value = DEFAULT_BUILD_POLICY)]
    pub build_policy: String,
}

impl ManagerFlags {
    pub fn manager(&self) -> Arc<dyn PackageManager> {
        Arc::new(self.conan())
    }

    pub fn conan(&self) -> ConanCli {
        ConanCli::new(&self.program)
            .with_profiles(self.profiles.clone())
            .with_build_policy(Some(self.build_policy.clone()))
    }
}

/// Which packages to process and how.
#[derive(Parser, Clone, Debug, Default)]
pub struct RunFlags {
    /// Packages to process: 'all', 'instances-only' or a comma separated
    /// list of names
    #[clap(short, long)]
    pub packages: Option<String>,

    /// Do not remove packages from the local cache before exporting them
    #[clap(long)]
    pub no_clear_cache: bool,

    /// Process packages concurrently
    #[clap(long)]
    pub parallel: bool,

    /// Maximum number of packages processed at once with --parallel
    #[clap(short, long, default_value_t = 4)]
    pub jobs: usize,
}

impl RunFlags {
    /// Whether `--packages instances-only` was given.
    pub fn instances_only(&self) -> bool {
        self.packages.as_deref() == Some(INSTANCES_ONLY)
    }

    /// The selector given on the command line, or `configured`.
    pub fn selector(&self, configured: Selector) -> Result<Selector> {
        match self.packages.as_deref() {
            None => Ok(configured),
            Some(INSTANCES_ONLY) => Ok(Selector::All),
            Some(text) => Ok(text.parse::<Selector>()?),
        }
    }
}

/// Clear the scratch folder of this run and return it.
pub fn prepare_scratch_folder(tool: &ToolSettings) -> Result<PathBuf> {
    pkgforge::workdir::reset_dir(&tool.scratch_folder)?;
    Ok(tool.scratch_folder.clone())
}

/// Run `steps` for the instances selected by `selector`.
///
/// With `--parallel` each instance's pipeline runs on the blocking pool,
/// at most `--jobs` at a time. Results are always in collection order.
pub async fn run_batch(
    collection: &mut PackageCollection,
    selector: &Selector,
    steps: &[Step],
    manager: Arc<dyn PackageManager>,
    options: &BatchOptions,
    flags: &RunFlags,
) -> Result<BatchReport> {
    if !flags.parallel {
        return Ok(collection.run(selector, steps, manager.as_ref(), options)?);
    }

    let plan = collection.plan(selector, options, manager.as_ref());
    let permits = Arc::new(Semaphore::new(flags.jobs.max(1)));
    let mut handles = Vec::with_capacity(plan.len());
    for planned in plan {
        let mut instance = collection.instances()[planned.index].clone();
        let manager = Arc::clone(&manager);
        let permits = Arc::clone(&permits);
        let steps = steps.to_vec();
        let log_dir = options.log_dir.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.into_diagnostic()?;
            let result = tokio::task::spawn_blocking(move || {
                run_pipeline(
                    &mut instance,
                    &steps,
                    manager.as_ref(),
                    &log_dir,
                    planned.clear_cache,
                )
            })
            .await
            .into_diagnostic()??;
            Ok::<_, miette::Report>(result)
        }));
    }

    let mut report = BatchReport::default();
    for handle in handles {
        report.results.push(handle.await.into_diagnostic()??);
    }
    Ok(report)
}

/// Print the failures and totals of a batch.
pub fn print_summary(report: &BatchReport, verb: &str) {
    for failure in report.failures() {
        println!(
            "{} {} (see {})",
            "FAILED".red().bold(),
            failure.name,
            failure.log.display()
        );
    }
    println!("{}", format!("{verb} {} Packages", report.processed()).bold());
    if report.skipped() > 0 {
        println!("{}", format!("{} Skipped", report.skipped()).yellow());
    }
    if report.failed() > 0 {
        println!("{}", format!("{} Failed", report.failed()).red().bold());
    } else {
        println!("{}", "All Good!".green().bold());
    }
}

#[derive(Subcommand)]
enum Command {
    /// Export recipe instances to the local cache
    Export(CmdExport),

    /// Export, build and test recipe instances
    Test(CmdTest),

    /// Display the resolved package instances
    Show(CmdShow),
}

impl Opt {
    async fn run(self) -> Result<i32> {
        // Setup logging
        let log_level = match (self.logging.quiet, self.logging.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_ansi(!self.logging.no_color)
            .init();

        if self.logging.no_color {
            colored::control::set_override(false);
        }

        let _cwd = self
            .directory
            .as_ref()
            .map(WorkingDirectory::enter)
            .transpose()?;

        // Dispatch to command
        match self.cmd {
            Command::Export(mut cmd) => cmd.run().await,
            Command::Test(mut cmd) => cmd.run().await,
            Command::Show(mut cmd) => cmd.run().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run().await?;
    std::process::exit(code);
}
