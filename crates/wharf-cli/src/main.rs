use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use wharf::config::SiteConfig;
use wharf::editlink::ForgesConfig;
use wharf::orchestrator::Generator;
use wharf::types::{BuildOptions, FetchStrategy, RenderMode, Repository};

mod progress;

use progress::ProgressReporter;

#[derive(Parser, Debug)]
#[command(name = "wharf", version)]
#[command(about = "Build orchestration core for multi-repository documentation sites")]
struct Cli {
    /// Path to the repository manifest (TOML, `[[repositories]]` array).
    #[arg(long, default_value = "wharf.toml")]
    repos: PathBuf,

    /// Path to the site configuration TOML.
    #[arg(long, default_value = "site.toml")]
    config: PathBuf,

    /// Directory the build is promoted into.
    #[arg(long, default_value = "public-site")]
    output: PathBuf,

    /// Scratch directory repositories are cloned into.
    #[arg(long, default_value = ".wharf-workspace")]
    workspace: PathBuf,

    /// Number of repositories to fetch concurrently.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// How the terminal `run_hugo` stage invokes the renderer.
    #[arg(long, value_enum, default_value = "always")]
    render_mode: RenderModeArg,

    /// Strategy for resolving clone-vs-update per repository.
    #[arg(long, value_enum, default_value = "auto")]
    fetch_strategy: FetchStrategyArg,

    /// Renderer binary to shell out to in `run_hugo` (omit to skip rendering).
    #[arg(long)]
    renderer: Option<String>,

    /// Timeout for the renderer invocation (e.g. 5m, 30s).
    #[arg(long, default_value = "5m")]
    renderer_timeout: String,

    /// Disable TTY progress output even when stdout is a terminal.
    #[arg(long)]
    no_progress: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RenderModeArg {
    Never,
    Always,
    Preview,
}

impl From<RenderModeArg> for RenderMode {
    fn from(value: RenderModeArg) -> Self {
        match value {
            RenderModeArg::Never => RenderMode::Never,
            RenderModeArg::Always => RenderMode::Always,
            RenderModeArg::Preview => RenderMode::Preview,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FetchStrategyArg {
    Fresh,
    Update,
    Auto,
}

impl From<FetchStrategyArg> for FetchStrategy {
    fn from(value: FetchStrategyArg) -> Self {
        match value {
            FetchStrategyArg::Fresh => FetchStrategy::Fresh,
            FetchStrategyArg::Update => FetchStrategy::Update,
            FetchStrategyArg::Auto => FetchStrategy::Auto,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full clone-discover-transform-render pipeline.
    Build,
    /// Parse the repository manifest and site config without building.
    Validate,
    /// Print the summary line from the last `build-report.json` in `--output`.
    Report,
}

#[derive(Debug, Deserialize)]
struct ReposManifest {
    #[serde(default)]
    repositories: Vec<Repository>,
    #[serde(default)]
    forges: ForgesConfig,
}

impl ReposManifest {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read repository manifest at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse repository manifest at {}", path.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Build => run_build(&cli),
        Commands::Validate => run_validate(&cli),
        Commands::Report => run_report(&cli),
    }
}

fn run_build(cli: &Cli) -> Result<()> {
    let manifest = ReposManifest::load(&cli.repos)?;
    let site = SiteConfig::load(&cli.config)?;

    let options = BuildOptions {
        concurrency: cli.concurrency,
        render_mode: if cli.renderer.is_none() { RenderMode::Never } else { cli.render_mode.into() },
        ..BuildOptions::default()
    };

    let mut generator = Generator::new(cli.output.clone(), cli.workspace.clone(), site)
        .with_forges(manifest.forges)
        .with_fetch_strategy(cli.fetch_strategy.into())
        .with_options(options);

    if let Some(binary) = &cli.renderer {
        let timeout = parse_duration(&cli.renderer_timeout)?;
        let renderer = wharf::renderer::CommandRenderer { binary: binary.clone(), args: Vec::new(), timeout };
        generator = generator.with_renderer(Box::new(renderer));
    }

    let progress: Box<dyn wharf::observer::Observer> =
        if cli.no_progress { Box::new(ProgressReporter::silent()) } else { Box::new(ProgressReporter::new()) };
    generator = generator.with_observer(progress);

    let report = generator.generate_full_site(manifest.repositories)?;
    print_report(&report);

    if matches!(report.outcome, wharf::report::Outcome::Failed | wharf::report::Outcome::Canceled) {
        std::process::exit(1);
    }
    Ok(())
}

fn run_validate(cli: &Cli) -> Result<()> {
    let manifest = ReposManifest::load(&cli.repos)?;
    let site = SiteConfig::load(&cli.config)?;

    println!("repositories: {}", manifest.repositories.len());
    for repo in &manifest.repositories {
        println!("  {} -> {} @ {}", repo.name, repo.clone_url, repo.branch());
    }
    println!("forges: {}", manifest.forges.len());
    println!("site theme: {}", site.theme);
    println!("config_hash: {}", site.compute_config_hash());
    Ok(())
}

fn run_report(cli: &Cli) -> Result<()> {
    let path = cli.output.join("build-report.json");
    let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let report: wharf::report::BuildReport =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &wharf::report::BuildReport) {
    println!("{}", report.summary_line());
    for issue in &report.issues {
        println!("  [{:?}] {} ({}): {}", issue.severity, issue.code, issue.stage, issue.message);
    }
}

fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}
