//! `tilegen generate` command

use anyhow::Result;

use crate::cli::GenerateArgs;
use tilegen::ops::{generate, GenerateOptions, ScriptRegistry};

pub fn execute(args: GenerateArgs, verbose: bool) -> Result<()> {
    let settings = args.target.settings(verbose);
    let mut opts = GenerateOptions::new(&args.target.project_dir, settings);
    opts.format = args.format;
    opts.output = args.output;
    opts.skip_toolchain_check = args.skip_toolchain_check;

    let result = generate(&opts, &ScriptRegistry::new())?;
    let status = if result.written { "Generated" } else { "Fresh" };
    eprintln!(
        "{:>12} {} ({} edges, {})",
        status,
        result.path.display(),
        result.edges,
        result.targets.join(", ")
    );
    Ok(())
}
