//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use coenroll_core::{
    EnrollSummary, Enroller, OutputSink, ProgressReporter, RowOutcome, enroll_file, enroll_single,
    run_validation,
};
use coenroll_registry::RegistryClient;
use coenroll_shared::{
    AppConfig, FailurePolicy, RegistryOverrides, RegistrySettings, UserRecord, init_config,
    load_config, load_config_from,
};
use coenroll_validator::{DnsMxResolver, load_organizations};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Crates whose log output the verbosity flag controls.
const LOG_TARGETS: &[&str] = &[
    "coenroll",
    "coenroll_shared",
    "coenroll_validator",
    "coenroll_registry",
    "coenroll_core",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// coenroll: validate and enroll users into a registry in bulk.
#[derive(Parser)]
#[command(
    name = "coenroll",
    version,
    about = "Validate enrollment CSV files and enroll their users into a registry.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.coenroll/coenroll.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check a CSV file and report every problem found.
    Validate {
        /// CSV file: firstname,middlename,lastname,organization,emailaddress.
        #[arg(short, long)]
        input: PathBuf,

        /// Write diagnostics here instead of standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Organization list (defaults to [organizations] path).
        #[arg(long)]
        orgs: Option<PathBuf>,
    },

    /// Enroll users from a CSV file, or a single user given by flags.
    Enroll {
        /// CSV file to enroll. Omit to enroll the single user given by the
        /// --first/--last/--org/--email flags.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write result rows here instead of standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// What a failed row does: abort (default) or skip.
        #[arg(long)]
        on_failure: Option<FailurePolicy>,

        #[command(flatten)]
        registry: RegistryArgs,

        #[command(flatten)]
        user: SingleUserArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Registry connection flags.
#[derive(clap::Args)]
pub(crate) struct RegistryArgs {
    /// Registry hostname or base URL.
    #[arg(long, env = "COENROLL_SERVER")]
    pub server: Option<String>,

    /// API user name.
    #[arg(long, env = "COENROLL_USER")]
    pub user: Option<String>,

    /// API password.
    #[arg(long, env = "COENROLL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl From<RegistryArgs> for RegistryOverrides {
    fn from(args: RegistryArgs) -> Self {
        Self {
            server: args.server,
            username: args.user,
            password: args.password,
        }
    }
}

/// Single-user enrollment flags.
#[derive(clap::Args)]
pub(crate) struct SingleUserArgs {
    #[arg(long, conflicts_with = "input")]
    pub first: Option<String>,

    #[arg(long, conflicts_with = "input")]
    pub middle: Option<String>,

    #[arg(long, conflicts_with = "input")]
    pub last: Option<String>,

    #[arg(long, conflicts_with = "input")]
    pub org: Option<String>,

    #[arg(long, conflicts_with = "input")]
    pub email: Option<String>,
}

impl SingleUserArgs {
    fn into_record(self) -> Result<UserRecord> {
        let required = |value: Option<String>, flag: &str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| eyre!("single-user enrollment needs --{flag} (or use --input)"))
        };

        Ok(UserRecord {
            first_name: required(self.first, "first")?,
            middle_name: self.middle.unwrap_or_default(),
            last_name: required(self.last, "last")?,
            organization: required(self.org, "org")?,
            email: required(self.email, "email")?,
        })
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show the config file and the resolved registry connection.
    Show {
        #[command(flatten)]
        registry: RegistryArgs,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so standard
/// output carries only result rows and diagnostics.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Validate {
            input,
            output,
            orgs,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_validate(&config, &input, output.as_deref(), orgs.as_deref()).await
        }
        Command::Enroll {
            input,
            output,
            on_failure,
            registry,
            user,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_enroll(
                &config,
                input.as_deref(),
                output.as_deref(),
                on_failure,
                registry,
                user,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show { registry } => cmd_config_show(config_path.as_deref(), registry),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_validate(
    config: &AppConfig,
    input: &Path,
    output: Option<&Path>,
    orgs: Option<&Path>,
) -> Result<()> {
    if !input.is_file() {
        return Err(eyre!("input file '{}' not found", input.display()));
    }

    let orgs_path = orgs.unwrap_or(&config.organizations.path);
    let organizations =
        load_organizations(orgs_path, config.organizations.source_url.as_deref()).await?;

    info!(input = %input.display(), organizations = organizations.len(), "validating");

    let resolver = DnsMxResolver::from_system();
    let mut sink = OutputSink::from_option(output);
    let report = run_validation(input, &organizations, &resolver, &mut sink).await?;

    info!(
        rows = report.rows_checked,
        problems = report.diagnostics.len(),
        "validation finished"
    );
    Ok(())
}

/// Where `enroll` takes its rows from.
enum RowSource<'a> {
    File(&'a Path),
    Single(UserRecord),
}

async fn cmd_enroll(
    config: &AppConfig,
    input: Option<&Path>,
    output: Option<&Path>,
    on_failure: Option<FailurePolicy>,
    registry: RegistryArgs,
    user: SingleUserArgs,
) -> Result<()> {
    let policy = on_failure.unwrap_or(config.enroll.on_failure);

    // Check the row source before touching the registry
    let source = match input {
        Some(path) if !path.is_file() => {
            return Err(eyre!("input file '{}' not found", path.display()));
        }
        Some(path) => RowSource::File(path),
        None => RowSource::Single(user.into_record()?),
    };

    let settings = RegistrySettings::resolve(config, registry.into())?;

    info!(
        server = %settings.base_url,
        co_id = settings.co_id,
        %policy,
        "connecting to registry"
    );

    let client = RegistryClient::new(settings)?;
    let enroller = Enroller::prepare(&client).await?;
    let mut sink = OutputSink::from_option(output);

    match source {
        RowSource::Single(record) => {
            let result = enroll_single(&enroller, &record, &mut sink).await?;
            info!(email = %result.record.email, access_id = %result.access_id, "done");
        }
        RowSource::File(path) => {
            let reporter = CliProgress::new();
            let summary = enroll_file(&enroller, path, &mut sink, policy, &reporter).await;
            reporter.finish();
            print_summary(&summary?, &sink);
        }
    }

    Ok(())
}

fn print_summary(summary: &EnrollSummary, sink: &OutputSink) {
    eprintln!();
    eprintln!("  Enrollment finished");
    eprintln!("  Enrolled: {}", summary.enrolled);
    eprintln!("  Existing: {}", summary.existing);
    eprintln!("  Invalid:  {}", summary.invalid);
    eprintln!("  Failed:   {}", summary.failed);
    if let Some(path) = sink.path() {
        eprintln!("  Output:   {}", path.display());
    }
    eprintln!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    eprintln!();
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>, registry: RegistryArgs) -> Result<()> {
    let config = resolve_config(path)?;
    println!("{}", render_config(&config, registry.into())?);
    Ok(())
}

/// The config file contents followed by the registry settings they resolve
/// to once flags and env vars are applied. The password is always redacted.
fn render_config(config: &AppConfig, overrides: RegistryOverrides) -> Result<String> {
    let mut rendered = toml::to_string_pretty(config)?;
    match RegistrySettings::resolve(config, overrides) {
        Ok(settings) => {
            rendered.push_str(&format!("\n# resolved registry connection\n{settings:#?}\n"));
        }
        Err(e) => {
            rendered.push_str(&format!("\n# registry connection not resolved: {e}\n"));
        }
    }
    Ok(rendered)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn row_done(&self, line: usize, outcome: &RowOutcome) {
        let status = match outcome {
            RowOutcome::Enrolled(result) => format!("enrolled {}", result.record.email),
            RowOutcome::Existing(result) => format!("existing {}", result.record.email),
            RowOutcome::Invalid { .. } => "invalid row".to_string(),
            RowOutcome::Failed { .. } => "failed".to_string(),
        };
        self.spinner.set_message(format!("Line {line}: {status}"));
    }

    fn done(&self, _summary: &EnrollSummary) {
        self.spinner.finish_and_clear();
    }
}
