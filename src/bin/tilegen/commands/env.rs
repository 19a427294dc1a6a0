//! `tilegen env` command

use anyhow::Result;

use crate::cli::TargetArgs;
use tilegen::ops::describe_envs;

pub fn execute(args: TargetArgs, verbose: bool) -> Result<()> {
    let json = describe_envs(&args.project_dir, &args.settings(verbose))?;
    println!("{}", json);
    Ok(())
}
