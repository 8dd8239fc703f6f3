// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pkgforge export` command.

use clap::Args;
use colored::Colorize;
use miette::Result;
use pkgforge::collection::{BatchOptions, Step};
use pkgforge::config::{ToolSettings, TOOL_NAMESPACE};

use crate::{prepare_scratch_folder, print_summary, run_batch, ConfigFlags, ManagerFlags, RunFlags};

/// Export recipe instances to the local cache
///
/// Consumers of exported packages must install them with `--build missing`
/// the first time, unless `--create` is given.
#[derive(Debug, Args)]
pub struct CmdExport {
    #[clap(flatten)]
    config: ConfigFlags,

    #[clap(flatten)]
    manager: ManagerFlags,

    #[clap(flatten)]
    run: RunFlags,

    /// Build the packages after exporting them
    #[clap(long)]
    create: bool,
}

impl CmdExport {
    pub async fn run(&mut self) -> Result<i32> {
        self.config.instances_only |= self.run.instances_only();
        let Some(mut collection) = self.config.load()? else {
            return Ok(0);
        };

        let tool = ToolSettings::from_config(collection.config(), TOOL_NAMESPACE)?;
        let selector = self.run.selector(tool.export_selector()?)?;
        let options = BatchOptions {
            log_dir: prepare_scratch_folder(&tool)?,
            clear_cache: !self.run.no_clear_cache,
            use_cache: tool.use_cache_selector()?,
        };

        let (steps, verb): (&[Step], _) = if self.create {
            println!("{}", "Creating packages".bold());
            (&[Step::Export, Step::Build], "Created")
        } else {
            println!("{}", "Exporting packages".bold());
            (&[Step::Export], "Exported")
        };

        let report = run_batch(
            &mut collection,
            &selector,
            steps,
            self.manager.manager(),
            &options,
            &self.run,
        )
        .await?;

        print_summary(&report, verb);
        Ok(report.exit_code())
    }
}
