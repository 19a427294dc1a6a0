//! Implementation of `tilegen generate`, `tilegen check` and `tilegen env`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::coordinator::Coordinator;
use crate::builder::ldscript::LdScript;
use crate::builder::rust;
use crate::builder::session::{Session, SessionState};
use crate::core::env::Env;
use crate::core::graph::Generator;
use crate::core::ninja;
use crate::core::path::SourcePath;
use crate::ops::traverse::{BuildCx, ScriptRegistry};
use crate::util::config::{BuildSettings, ProjectConfig};
use crate::util::fs::write_if_changed;

/// Format of the written build description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Ninja,
    /// The logical graph as JSON.
    Json,
}

impl OutputFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Ninja => "build.ninja",
            OutputFormat::Json => "build.json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ninja" => Ok(OutputFormat::Ninja),
            "json" => Ok(OutputFormat::Json),
            other => bail!("unknown output format `{}` (expected ninja or json)", other),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Ninja => "ninja",
            OutputFormat::Json => "json",
        })
    }
}

/// Options for a generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Project root.
    pub root: PathBuf,
    pub settings: BuildSettings,
    pub format: OutputFormat,
    /// Skip the cross compiler version check.
    pub skip_toolchain_check: bool,
    /// Write here instead of the default location.
    pub output: Option<PathBuf>,
}

impl GenerateOptions {
    pub fn new(root: impl Into<PathBuf>, settings: BuildSettings) -> Self {
        GenerateOptions {
            root: root.into(),
            settings,
            format: OutputFormat::default(),
            skip_toolchain_check: false,
            output: None,
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    pub path: PathBuf,
    /// False if the file already had the same contents, or for `check`.
    pub written: bool,
    pub targets: Vec<String>,
    pub rules: usize,
    pub edges: usize,
}

/// A validated graph and the settings it was built for.
#[derive(Debug)]
pub struct Generation {
    pub session: Session,
    pub settings: BuildSettings,
}

/// Build and validate the complete graph without writing anything.
pub fn construct(opts: &GenerateOptions, scripts: &ScriptRegistry) -> Result<Generation> {
    let root = opts.root.as_path();
    let mut settings = opts.settings.clone();
    settings.validate()?;

    let config = ProjectConfig::load(root)?;
    let coordinator = Coordinator::new(root, &settings, &config)?;
    if config.cross.check && !opts.skip_toolchain_check {
        for toolchain in coordinator.toolchains() {
            toolchain.verify(root)?;
        }
    }

    let ldscript = SourcePath::new(&config.layout.ldscript)
        .with_context(|| format!("invalid linker script path `{}`", config.layout.ldscript))?;
    let mut session = Session::new(SessionState::new(config.link.clone(), ldscript))?;
    session
        .graph
        .add_var("builddir", default_builddir(&settings));

    {
        let mut cx = BuildCx::new(&mut session, scripts);
        for target in coordinator.targets() {
            visit_target(&mut cx, &config, target)?;
        }
    }

    session.graph.validate(root)?;
    info!(
        "{} rules, {} edges for {}",
        session.graph.rules().len(),
        session.graph.edges().len(),
        target_names(&settings).join(", ")
    );
    Ok(Generation { session, settings })
}

fn visit_target(cx: &mut BuildCx<'_>, config: &ProjectConfig, target: &Env) -> Result<()> {
    debug!("generating {} in {}", target.triple, target.dirs.builddir);
    for variant in LdScript::ALL {
        let frag = cx.target(target.isa).ldscripts.request(target, variant);
        cx.merge(frag)?;
    }

    for dir in &config.layout.roots {
        let env = if dir.host {
            target.host().unwrap_or(target)
        } else {
            target
        };
        cx.sub_build(env, &dir.path)?;
    }

    // All crates are known now.
    if let Some(frag) = rust::cargo_ws(target, cx.target(target.isa))? {
        cx.merge(frag)?;
    }
    Ok(())
}

/// Where the executor keeps its own state.
fn default_builddir(settings: &BuildSettings) -> String {
    match settings.isas.as_slice() {
        [isa] => settings.builddir(*isa),
        _ => "build".to_string(),
    }
}

fn target_names(settings: &BuildSettings) -> Vec<String> {
    settings
        .isas
        .iter()
        .map(|isa| format!("{}-{}-{}", settings.platform, isa, settings.mode))
        .collect()
}

/// Serialize a validated graph.
pub fn render(graph: &Generator, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Ninja => Ok(ninja::to_ninja(graph)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(graph)?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Location of the build description for validated `settings`.
pub fn output_path(opts: &GenerateOptions, settings: &BuildSettings) -> PathBuf {
    if let Some(path) = &opts.output {
        return path.clone();
    }
    opts.root
        .join(default_builddir(settings))
        .join(opts.format.file_name())
}

/// Build the graph and write it.
pub fn generate(opts: &GenerateOptions, scripts: &ScriptRegistry) -> Result<GenerateResult> {
    let generation = construct(opts, scripts)?;
    let contents = render(&generation.session.graph, opts.format)?;
    let path = output_path(opts, &generation.settings);
    let written = write_if_changed(&path, &contents)?;
    if written {
        info!("wrote {}", path.display());
    }
    Ok(summary(&generation, path, written))
}

/// Build and validate the graph; write nothing.
pub fn check(opts: &GenerateOptions, scripts: &ScriptRegistry) -> Result<GenerateResult> {
    let generation = construct(opts, scripts)?;
    let path = output_path(opts, &generation.settings);
    Ok(summary(&generation, path, false))
}

fn summary(generation: &Generation, path: PathBuf, written: bool) -> GenerateResult {
    GenerateResult {
        path,
        written,
        targets: target_names(&generation.settings),
        rules: generation.session.graph.rules().len(),
        edges: generation.session.graph.edges().len(),
    }
}

/// One target and its host environment, as printed by `tilegen env`.
#[derive(Debug, Serialize)]
pub struct EnvDump<'a> {
    pub target: &'a Env,
    pub host: Option<&'a Env>,
}

/// The constructed environments as pretty JSON.
pub fn describe_envs(root: &Path, settings: &BuildSettings) -> Result<String> {
    let mut settings = settings.clone();
    settings.validate()?;
    let config = ProjectConfig::load(root)?;
    let coordinator = Coordinator::new(root, &settings, &config)?;

    let dumps: Vec<EnvDump<'_>> = coordinator
        .targets()
        .iter()
        .map(|target| EnvDump {
            target,
            host: target.host(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&dumps)?)
}
