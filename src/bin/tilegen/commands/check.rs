//! `tilegen check` command

use anyhow::Result;

use crate::cli::CheckArgs;
use tilegen::ops::{check, GenerateOptions, ScriptRegistry};

pub fn execute(args: CheckArgs, verbose: bool) -> Result<()> {
    let settings = args.target.settings(verbose);
    let mut opts = GenerateOptions::new(&args.target.project_dir, settings);
    opts.skip_toolchain_check = args.skip_toolchain_check;

    let result = check(&opts, &ScriptRegistry::new())?;
    eprintln!(
        "{:>12} {} rules, {} edges ({})",
        "Checked",
        result.rules,
        result.edges,
        result.targets.join(", ")
    );
    Ok(())
}
