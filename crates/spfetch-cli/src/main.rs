//! CLI interface for spfetch - pull a year's spreadsheets from SharePoint.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::fmt::WriteStyle;
use log::{LevelFilter, debug};
use spfetch_core::paths::{expand_str_path, write_default_config};
use spfetch_core::{
    AppConfig, AppPaths, Fetcher, LogLevel, RemoteEntry, RunReport, Secret, Year,
    drop_data_folder, generate_schema, write_generated_files,
};

const APP_NAME: &str = "spfetch";
const REPO_URL: &str = "https://github.com/UrbanJakubDev/spfetch";

fn main() -> anyhow::Result<()> {
    try_main()
}

fn try_main() -> Result<()> {
    // .env must be loaded before parsing so clap's env fallbacks can see it
    let dotenv_path = dotenv::dotenv().ok();
    let cli = Cli::parse();

    // init writes the default config itself
    let create_config = !matches!(cli.command, Command::Init(_));
    let ctx = RuntimeContext::new(cli.common.clone(), &cli.graph, create_config)?;
    ctx.init_logging()?;
    if let Some(path) = dotenv_path {
        debug!("loaded environment from {}", path.display());
    }
    debug!("resolved paths: {:#?}", ctx.paths);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Command::Run(cmd) => rt.block_on(handle_run(&ctx, cmd)),
        Command::List(cmd) => rt.block_on(handle_list(&ctx, cmd)),
        Command::Auth { subcommand } => rt.block_on(handle_auth(&ctx, subcommand)),
        Command::Clean => rt.block_on(handle_clean(&ctx)),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "spfetch",
    author,
    version,
    about = "Download a year's spreadsheets from a SharePoint document library",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(flatten)]
    graph: GraphOpts,
    #[command(subcommand)]
    command: Command,
}

/// Common CLI options shared across all subcommands.
#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Override the config file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Reduce output to only errors.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable trace logging.
    #[arg(long, global = true)]
    pub trace: bool,
    /// Output machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Disable ANSI colors in output.
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    pub no_color: bool,
    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    pub color: ColorOption,
    /// Do not change anything on disk or remotely.
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,
    /// Assume "yes" for interactive prompts.
    #[arg(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,
}

/// Credentials and drive overrides. Each falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct GraphOpts {
    /// Directory (tenant) ID.
    #[arg(long, env = "TENANT_ID", global = true)]
    pub tenant_id: Option<String>,
    /// Application (client) ID.
    #[arg(long, env = "CLIENT_ID", global = true)]
    pub client_id: Option<String>,
    /// Client secret.
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,
    /// Local download directory.
    #[arg(long, env = "DOWNLOAD_PATH", value_name = "DIR", global = true)]
    pub download_path: Option<String>,
    /// SharePoint site ID.
    #[arg(long, env = "SITE_ID", global = true)]
    pub site_id: Option<String>,
    /// Document library drive ID.
    #[arg(long, env = "DRIVE_ID", global = true)]
    pub drive_id: Option<String>,
}

impl GraphOpts {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(ref v) = self.tenant_id {
            config.graph.tenant_id = Some(v.clone());
        }
        if let Some(ref v) = self.client_id {
            config.graph.client_id = Some(v.clone());
        }
        if let Some(ref v) = self.client_secret {
            config.graph.client_secret = Some(Secret::new(v.clone()));
        }
        if let Some(ref v) = self.download_path {
            config.library.download_path.clone_from(v);
        }
        if let Some(ref v) = self.site_id {
            config.graph.site_id.clone_from(v);
        }
        if let Some(ref v) = self.drive_id {
            config.graph.drive_id.clone_from(v);
        }
    }
}

/// Color output mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorOption {
    /// Detect terminal capabilities automatically.
    Auto,
    /// Always emit ANSI color codes.
    Always,
    /// Never emit ANSI color codes.
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the spreadsheets for a year.
    Run(RunCommand),
    /// List a drive folder (the root when no folder ID is given).
    List(ListCommand),
    /// Authentication checks.
    Auth {
        #[command(subcommand)]
        subcommand: AuthSubcommand,
    },
    /// Remove the download directory.
    Clean,
    /// Create config directories and default files.
    Init(InitCommand),
    /// Inspect and manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct RunCommand {
    /// Year whose folder to fetch (e.g. 2024).
    #[arg(short = 'Y', long)]
    year: String,
    /// Remove the download directory after the run.
    #[arg(long)]
    purge: bool,
    /// Exit with an error if the subfolder is missing or any download failed.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Args)]
struct ListCommand {
    /// Drive item ID of the folder to list.
    #[arg(long, value_name = "ID")]
    folder_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum AuthSubcommand {
    /// Acquire an app token to verify the client credentials.
    Check,
}

#[derive(Debug, Clone, Copy, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists.
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration.
    Show,
    /// Print the resolved config file path.
    Path,
    /// Print all resolved paths.
    Paths,
    /// Print the JSON schema, or write schema and example config to a directory.
    Schema {
        /// Directory to write `config.schema.json` and `config.toml` into.
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Regenerate the default configuration file.
    Reset,
}

// ─── Runtime ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts, graph: &GraphOpts, create_config: bool) -> Result<Self> {
        let paths = AppPaths::discover(common.config.as_deref())?;
        let mut config = AppConfig::load(&paths, common.dry_run || !create_config)?;
        graph.apply(&mut config);
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());

        if let Some(ref file) = self.config.logging.file {
            let file = expand_str_path(file)?;
            let target = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file)
                .with_context(|| format!("opening log file {}", file.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(target)));
            builder.write_style(WriteStyle::Never);
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            if disable_color {
                builder.write_style(WriteStyle::Never);
            } else if force_color {
                builder.write_style(WriteStyle::Always);
            } else {
                builder.write_style(WriteStyle::Auto);
            }
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    const fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => match self.config.logging.level {
                    LogLevel::Error => LevelFilter::Error,
                    LogLevel::Warn => LevelFilter::Warn,
                    LogLevel::Info => LevelFilter::Info,
                    LogLevel::Debug => LevelFilter::Debug,
                    LogLevel::Trace => LevelFilter::Trace,
                },
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn fetcher(&self) -> Result<Fetcher> {
        let run_config = self
            .config
            .run_config()
            .context("incomplete configuration (set TENANT_ID, CLIENT_ID and CLIENT_SECRET)")?;
        Ok(Fetcher::new(run_config))
    }
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn handle_run(ctx: &RuntimeContext, cmd: RunCommand) -> Result<()> {
    let year: Year = cmd.year.parse()?;
    let fetcher = ctx.fetcher()?;

    if ctx.common.dry_run {
        let cfg = fetcher.config();
        println!(
            "dry-run: would download '{}{year}/{}' into {}",
            cfg.folder_prefix(),
            cfg.subfolder_name(),
            cfg.download_path().display()
        );
        return Ok(());
    }

    let report = fetcher.run_for(year).await?;
    print_report(ctx, &report)?;

    if cmd.purge {
        fetcher.drop_data_folder().await?;
        eprintln!("Removed {}", report.download_dir.display());
    }

    if cmd.strict && !report.is_complete() {
        bail!(
            "run incomplete: subfolder found = {}, failed downloads = {}",
            report.subfolder_found,
            report.failures().count()
        );
    }
    Ok(())
}

async fn handle_list(ctx: &RuntimeContext, cmd: ListCommand) -> Result<()> {
    let fetcher = ctx.fetcher()?;
    let cfg = fetcher.config();
    let walker = fetcher.connect().await?;
    let entries = walker
        .list_children(cfg.site_id(), cfg.drive_id(), cmd.folder_id.as_deref())
        .await?;

    if ctx.common.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_entries(&entries);
    }
    Ok(())
}

async fn handle_auth(ctx: &RuntimeContext, cmd: AuthSubcommand) -> Result<()> {
    match cmd {
        AuthSubcommand::Check => {
            let fetcher = ctx.fetcher()?;
            fetcher.connect().await?;
            println!("Authenticated.");
            println!("Tenant ID: {}", fetcher.config().tenant_id());
            println!("Client ID: {}", fetcher.config().client_id());
            Ok(())
        }
    }
}

async fn handle_clean(ctx: &RuntimeContext) -> Result<()> {
    if ctx.common.dry_run {
        log::info!("dry-run: would remove {}", ctx.paths.download_dir.display());
        return Ok(());
    }
    drop_data_folder(&ctx.paths.download_dir).await?;
    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }
    if ctx.common.dry_run {
        log::info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }
    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut shown = ctx.config.clone();
            if shown.graph.client_secret.is_some() {
                shown.graph.client_secret = Some(Secret::new("***"));
            }
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&shown).context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&shown).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Paths => {
            if ctx.common.json {
                let paths = serde_json::json!({
                    "config": ctx.paths.config_file,
                    "downloads": ctx.paths.download_dir,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&paths).context("serializing paths to JSON")?
                );
            } else {
                println!("config:    {}", ctx.paths.config_file.display());
                println!("downloads: {}", ctx.paths.download_dir.display());
            }
            Ok(())
        }
        ConfigCommand::Schema { output } => {
            if let Some(dir) = output {
                if ctx.common.dry_run {
                    log::info!("dry-run: would write schema files to {}", dir.display());
                    return Ok(());
                }
                write_generated_files(&dir, APP_NAME, REPO_URL)?;
                eprintln!("Wrote config.schema.json and config.toml to {}", dir.display());
            } else {
                println!("{}", generate_schema(APP_NAME, REPO_URL)?);
            }
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                log::info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}

// ─── Formatting helpers ──────────────────────────────────────────────

fn print_report(ctx: &RuntimeContext, report: &RunReport) -> Result<()> {
    if ctx.common.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Folder: {}/{}", report.folder_name, report.subfolder_name);
    if !report.subfolder_found {
        eprintln!(
            "warning: subfolder '{}' not found in '{}'",
            report.subfolder_name, report.folder_name
        );
    }

    println!(
        "Downloaded {} file(s), {} bytes, into {}",
        report.downloaded.len(),
        report.total_bytes(),
        report.download_dir.display()
    );
    for file in &report.downloaded {
        println!("  {:<40} {:>10}", file.name, file.bytes);
    }

    if !report.skipped.is_empty() {
        println!("Skipped {}:", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {:<40} {}", skipped.name, skipped.reason);
        }
    }
    Ok(())
}

fn print_entries(entries: &[RemoteEntry]) {
    if entries.is_empty() {
        println!("(empty)");
        return;
    }
    for entry in entries {
        let kind = if entry.is_folder { "dir " } else { "file" };
        println!("{kind}  {:<40}  {}", entry.name, entry.id);
    }
}
