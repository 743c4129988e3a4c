#![forbid(unsafe_code)]

//! `town-identity`: agent identity and session coordination CLI.
//!
//! Run by every agent at startup (`prime`) and by operators inspecting roles,
//! identity locks, and session records.

use std::env;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use town_identity::events::JsonlEventLog;
use town_identity::lock::{
    clean_stale_locks, detect_collisions, find_all_locks, IdentityLock, LockCollision,
    SessionProbe, TmuxSessions,
};
use town_identity::mode::{OutputFormat, RunFlags};
use town_identity::models::{LockRecord, Role, RoleInfo};
use town_identity::prime::{run_prime, PrimeReport, PrimeRequest};
use town_identity::role::{agent_env, parse_declared_role, resolve_role, role_home, RoleOverride};
use town_identity::session::{
    read_session, read_stdin_hook_input, resolve_session_id, SessionSources,
};
use town_identity::workspace::{self, TownLocation};
use town_identity::{AppError, IdentityConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "town-identity",
    about = "Agent role detection, identity locks, and session discovery",
    version,
    long_about = None
)]
struct Cli {
    /// Log output format (text or json). Logs go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Town root; discovered from the working directory when omitted.
    #[arg(long, global = true)]
    town_root: Option<PathBuf>,

    /// Configuration file; defaults to `<town_root>/mayor/identity.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent startup sequence.
    Prime(PrimeArgs),

    /// Inspect role detection.
    #[command(subcommand)]
    Role(RoleCommand),

    /// Inspect and manage identity locks.
    #[command(subcommand)]
    Lock(LockCommand),

    /// Inspect session tokens.
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Print a JSON document instead of text.
    #[arg(long)]
    json: bool,
}

impl OutputArgs {
    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Debug, Args)]
struct PrimeArgs {
    /// Invoked as the session-start hook: read the handshake from stdin and
    /// persist the session token.
    #[arg(long)]
    hook: bool,

    /// Resolve and report without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Explain each step.
    #[arg(long)]
    explain: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Subcommand)]
enum RoleCommand {
    /// Show the resolved role, honoring the declared role.
    Show(OutputArgs),

    /// Classify a directory from its location alone.
    Detect {
        /// Directory to classify; defaults to the working directory.
        #[arg(long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the home directory of a role.
    Home {
        /// Role to look up (`mayor`, `<rig>/witness`, ...); defaults to the
        /// current role.
        role: Option<String>,

        /// Rig override.
        #[arg(long)]
        rig: Option<String>,

        /// Worker name override; requires `--rig`.
        #[arg(long, requires = "rig")]
        worker: Option<String>,
    },

    /// List known roles.
    List,

    /// Print shell exports declaring the current role.
    Env,
}

#[derive(Debug, Subcommand)]
enum LockCommand {
    /// Show the lock state of a worker identity.
    Status {
        /// Identity directory; defaults to the current worker identity.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Release a worker identity lock.
    Release {
        /// Identity directory; defaults to the current worker identity.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Remove the lock even if another live process holds it.
        #[arg(long)]
        force: bool,
    },

    /// Fail if another live process holds the identity.
    Check {
        /// Identity directory; defaults to the current worker identity.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List every lock in the town and report stale or orphaned ones.
    Scan(OutputArgs),

    /// Remove locks whose process and session are both gone.
    Clean,
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// Print the session token this agent resolves to.
    Id(OutputArgs),

    /// Print the persisted session record of a directory.
    Show {
        /// Directory; defaults to the working directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ScanEntry<'a> {
    identity_dir: &'a Path,
    #[serde(flatten)]
    record: &'a LockRecord,
    stale: bool,
}

#[derive(Serialize)]
struct ScanReport<'a> {
    locks: Vec<ScanEntry<'a>>,
    findings: Vec<String>,
}

/// Located town plus its configuration.
struct Context {
    location: TownLocation,
    config: IdentityConfig,
}

impl Context {
    fn role(&self) -> RoleInfo {
        resolve_role(
            &self.location.root,
            &self.location.work_dir,
            RoleOverride::from_env(&self.config).as_ref(),
        )
    }

    /// Explicit directory, else the current worker identity, else the
    /// working directory.
    fn lock_dir(&self, dir: Option<&Path>) -> PathBuf {
        dir.map(Path::to_path_buf)
            .or_else(|| self.role().identity_dir())
            .unwrap_or_else(|| self.location.work_dir.clone())
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.log_format) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(&cli) {
        report_error(&err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = load_context(cli)?;
    debug!(root = %ctx.location.root.display(), work_dir = %ctx.location.work_dir.display(), "town located");

    match &cli.command {
        Command::Prime(args) => prime(&ctx, args),
        Command::Role(cmd) => role(&ctx, cmd),
        Command::Lock(cmd) => lock(&ctx, cmd),
        Command::Session(cmd) => session(&ctx, cmd),
    }
}

fn load_context(cli: &Cli) -> Result<Context> {
    let explicit = cli
        .config
        .as_deref()
        .map(IdentityConfig::load_from_path)
        .transpose()?;
    let locate_with = explicit.clone().unwrap_or_default();

    let location = match &cli.town_root {
        Some(root) => {
            let root = root.canonicalize().map_err(|err| {
                AppError::Workspace(format!("invalid town root {}: {err}", root.display()))
            })?;
            let work_dir = env::current_dir()
                .ok()
                .and_then(|dir| dir.canonicalize().ok())
                .unwrap_or_else(|| root.clone());
            TownLocation { root, work_dir }
        }
        None => workspace::find_from_cwd(&locate_with)?,
    };

    let config = match explicit {
        Some(config) => config,
        None => IdentityConfig::load_for_town(&location.root)?,
    };
    Ok(Context { location, config })
}

fn prime(ctx: &Context, args: &PrimeArgs) -> Result<()> {
    let flags = RunFlags {
        dry_run: args.dry_run,
        format: args.output.format(),
        explain: args.explain,
    };
    let request = PrimeRequest {
        town_root: ctx.location.root.clone(),
        work_dir: ctx.location.work_dir.clone(),
        declared: RoleOverride::from_env(&ctx.config),
        sources: SessionSources::from_env(&ctx.config),
        hook_mode: args.hook,
        hook_input: if args.hook {
            read_stdin_hook_input()
        } else {
            None
        },
    };
    let events = JsonlEventLog::new(ctx.config.events_path(&ctx.location.root));

    let report = run_prime(&request, &ctx.config, flags, &events)?;
    if flags.is_json() {
        return print_json(&report);
    }
    print_prime_report(&report, args.hook);
    Ok(())
}

fn print_prime_report(report: &PrimeReport, hook: bool) {
    for line in &report.explanations {
        eprintln!("[explain] {line}");
    }

    if hook {
        println!("[session:{}]", report.session.token);
        if let Some(source) = report.hook_source {
            println!("[source:{}]", source.as_str());
        }
    }

    let info = &report.role;
    if info.mismatch {
        println!();
        println!("ROLE/LOCATION MISMATCH");
        println!(
            "You are {} (declared) but your directory suggests {}.",
            info.role, info.cwd_role
        );
        if let Some(home) = &info.home {
            println!("Expected home: {}", home.display());
        }
        println!("Actual cwd:    {}", info.work_dir.display());
        println!();
        println!("This can cause commands to misbehave. Either:");
        println!("  1. cd to your home directory, OR");
        println!("  2. use absolute paths for town commands");
        println!();
    }
    if info.env_incomplete {
        eprintln!("Warning: declared role incomplete, rig or worker filled from directory");
    }

    if let Some(beacon) = &report.beacon {
        println!("{beacon}");
    }
}

fn role(ctx: &Context, cmd: &RoleCommand) -> Result<()> {
    match cmd {
        RoleCommand::Show(output) => {
            let info = ctx.role();
            if output.format() == OutputFormat::Json {
                return print_json(&info);
            }
            print_role_info(&info);
        }
        RoleCommand::Detect { dir, output } => {
            let dir = match dir {
                Some(dir) => dir.canonicalize().map_err(|err| {
                    AppError::Workspace(format!("invalid directory {}: {err}", dir.display()))
                })?,
                None => ctx.location.work_dir.clone(),
            };
            let info = resolve_role(&ctx.location.root, &dir, None);
            if output.format() == OutputFormat::Json {
                return print_json(&info);
            }
            print_role_info(&info);
        }
        RoleCommand::Home { role, rig, worker } => {
            let (role, mut home_rig, mut home_worker) = match role {
                Some(declared) => {
                    let parsed = parse_declared_role(declared);
                    (parsed.role, parsed.rig, parsed.worker)
                }
                None => {
                    let current = ctx.role();
                    (current.role, current.rig, current.worker_name)
                }
            };
            if rig.is_some() {
                home_rig.clone_from(rig);
            }
            if worker.is_some() {
                home_worker.clone_from(worker);
            }
            let home = role_home(
                &ctx.location.root,
                role,
                home_rig.as_deref(),
                home_worker.as_deref(),
            )
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "cannot determine home for role {role} (rig={home_rig:?}, worker={home_worker:?})"
                ))
            })?;
            println!("{}", home.display());
        }
        RoleCommand::List => {
            for role in Role::KNOWN {
                println!("{:<10} {}", role.as_str(), role.description());
            }
        }
        RoleCommand::Env => {
            let info = ctx.role();
            if info.home.is_none() {
                return Err(AppError::NotFound(format!(
                    "cannot determine home for role {} (rig={:?}, worker={:?})",
                    info.role, info.rig, info.worker_name
                )));
            }
            if info.env_incomplete {
                eprintln!("Warning: declared role incomplete, rig or worker filled from directory");
            }
            for (key, value) in agent_env(&info, &ctx.config) {
                println!("export {key}={value}");
            }
        }
    }
    Ok(())
}

fn print_role_info(info: &RoleInfo) {
    println!("role:   {}", info.role);
    println!("source: {}", info.source);
    if let Some(actor) = info.actor() {
        println!("actor:  {actor}");
    }
    if let Some(rig) = &info.rig {
        println!("rig:    {rig}");
    }
    if let Some(worker) = &info.worker_name {
        println!("worker: {worker}");
    }
    if let Some(home) = &info.home {
        println!("home:   {}", home.display());
    }
    if info.mismatch {
        println!(
            "MISMATCH: declared {} but directory suggests {}",
            info.role, info.cwd_role
        );
    }
}

fn lock(ctx: &Context, cmd: &LockCommand) -> Result<()> {
    match cmd {
        LockCommand::Status { dir } => {
            let lock = IdentityLock::new(ctx.lock_dir(dir.as_deref()), &ctx.config);
            println!("{}: {}", lock.identity_dir().display(), lock.status());
        }
        LockCommand::Release { dir, force } => {
            let lock = IdentityLock::new(ctx.lock_dir(dir.as_deref()), &ctx.config);
            if *force {
                lock.force_release()?;
            } else {
                lock.release()?;
            }
            println!("released {}", lock.lock_path().display());
        }
        LockCommand::Check { dir } => {
            let lock = IdentityLock::new(ctx.lock_dir(dir.as_deref()), &ctx.config);
            lock.check()?;
            println!("{}: no conflicting holder", lock.identity_dir().display());
        }
        LockCommand::Scan(output) => {
            let locks = find_all_locks(&ctx.location.root, &ctx.config)?;
            let live = TmuxSessions.live_sessions();
            let findings = detect_collisions(&ctx.location.root, &ctx.config, &live)?;

            if output.format() == OutputFormat::Json {
                let report = ScanReport {
                    locks: locks
                        .iter()
                        .map(|(dir, record)| ScanEntry {
                            identity_dir: dir,
                            record,
                            stale: record.is_stale(),
                        })
                        .collect(),
                    findings: findings.iter().map(ToString::to_string).collect(),
                };
                return print_json(&report);
            }

            if locks.is_empty() {
                println!("no identity locks found");
            }
            for (dir, record) in &locks {
                let state = if record.is_stale() { "stale" } else { "live" };
                println!(
                    "{} pid={} session={} acquired={} ({state})",
                    dir.display(),
                    record.pid,
                    record.session_id,
                    record.acquired_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
            for finding in &findings {
                println!("warning: {finding}");
            }
        }
        LockCommand::Clean => {
            let cleaned = clean_stale_locks(&ctx.location.root, &ctx.config, &TmuxSessions)?;
            println!("removed {cleaned} stale lock(s)");
        }
    }
    Ok(())
}

fn session(ctx: &Context, cmd: &SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Id(output) => {
            let info = ctx.role();
            let actor = info.actor().unwrap_or_else(|| info.role.to_string());
            let resolved = resolve_session_id(
                &actor,
                &SessionSources::from_env(&ctx.config),
                &ctx.location.work_dir,
                &ctx.location.root,
                &ctx.config,
            );
            if output.format() == OutputFormat::Json {
                return print_json(&resolved);
            }
            println!("{}", resolved.token);
        }
        SessionCommand::Show { dir } => {
            let dir = dir.clone().unwrap_or_else(|| ctx.location.work_dir.clone());
            let record = read_session(&dir, &ctx.config)?;
            println!("{}", record.token);
            if let Some(at) = record.resolved_at {
                println!("{}", at.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to render JSON: {err}")))?;
    println!("{body}");
    Ok(())
}

fn report_error(err: &AppError) {
    if let AppError::Locked(collision) = err {
        print_collision(collision);
    }
    eprintln!("Error: {err}");
}

fn print_collision(collision: &LockCollision) {
    eprintln!();
    eprintln!("IDENTITY COLLISION DETECTED");
    eprintln!("Another agent already claims this worker identity.");
    eprintln!();
    if let Some(holder) = &collision.holder {
        eprintln!("Lock holder:");
        eprintln!("  PID:      {}", holder.pid);
        eprintln!("  Session:  {}", holder.session_id);
        eprintln!(
            "  Acquired: {}",
            holder.acquired_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(host) = &holder.hostname {
            eprintln!("  Host:     {host}");
        }
        eprintln!();
    }
    eprintln!("To resolve:");
    for (step, line) in collision.remediation().iter().enumerate() {
        eprintln!("  {}. {line}", step + 1);
    }
    eprintln!();
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
