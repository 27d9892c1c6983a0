#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use crate::app::{self, Session};
use crate::config;
use crate::error::TaskflowError;
use crate::notify::{Notification, Permission};
use crate::output::table::Table;
use crate::reminder::{TickReport, TickStatus};
use crate::task::model::{format_timestamp, parse_due_date};
use crate::task::{NewTask, Priority, Task, TaskFilter, TaskRepository};

#[derive(Debug, Parser)]
#[command(
    name = "taskflow",
    version,
    about = "Task list with due-date reminders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Add(AddArgs),
    List(ListArgs),
    Toggle(IdArgs),
    #[command(alias = "rm")]
    Remove(IdArgs),
    Reschedule(RescheduleArgs),
    Stats(StatsArgs),
    /// Print this installation's device id
    Whoami,
    /// Run one reminder pass and print what it did
    Tick,
    /// Run the reminder scheduler until Ctrl-C
    Watch(WatchArgs),
    Notify(NotifyArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Task title
    #[arg(required = true)]
    pub title: Vec<String>,
    #[arg(short = 'd', long = "description")]
    pub description: Option<String>,
    #[arg(short = 'p', long = "priority", default_value = "medium")]
    pub priority: Priority,
    /// Due date (RFC 3339)
    #[arg(long = "due", conflicts_with = "within")]
    pub due: Option<String>,
    /// Due after a duration from now (e.g. 45m, 2h, 1d)
    #[arg(long = "in")]
    pub within: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    #[arg(short = 'f', long = "filter", default_value = "all")]
    pub filter: TaskFilter,
    /// Output in JSON format
    #[arg(long = "json", conflicts_with = "csv")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct IdArgs {
    /// Task id
    pub id: String,
}

#[derive(Debug, Parser)]
pub struct RescheduleArgs {
    /// Task id
    pub id: String,
    /// New due date (RFC 3339)
    #[arg(long = "due", conflicts_with_all = ["within", "clear"])]
    pub due: Option<String>,
    #[arg(long = "in", conflicts_with = "clear")]
    pub within: Option<String>,
    /// Remove the due date
    #[arg(long = "clear")]
    pub clear: bool,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct WatchArgs {
    /// Tick period (defaults to scheduler.tick_interval_secs)
    #[arg(long = "interval")]
    pub interval: Option<String>,
}

#[derive(Debug, Parser)]
pub struct NotifyArgs {
    #[command(subcommand)]
    pub cmd: NotifyCmd,
}

#[derive(Debug, Subcommand)]
pub enum NotifyCmd {
    Status,
    Enable,
    Disable,
    /// Minutes before the due date at which to remind
    Lead(LeadArgs),
    /// Send a sample notification
    Test,
}

#[derive(Debug, Parser)]
pub struct LeadArgs {
    pub minutes: u32,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Get(ConfigGetArgs),
    Set(ConfigSetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

pub async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli).await;
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    // stdout carries --json/--csv output, so logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskflow=info")),
        )
        .try_init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        None => {
            cmd_list(ListArgs {
                filter: TaskFilter::All,
                json: false,
                csv: false,
            })
            .await
        }
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "taskflow", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config(args)) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Set(set) => {
                config::set_value_string(&set.key, &set.value)?;
                println!("Set {} = {}", set.key, set.value);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => {
                let val = config::get_value_string(&get.key)?;
                match val {
                    Some(v) => {
                        println!("{v}");
                        Ok(ExitCode::SUCCESS)
                    }
                    None => anyhow::bail!(
                        "configuration key '{}' not found - use 'taskflow config list' to see available keys",
                        get.key
                    ),
                }
            }
        },
        Some(Commands::Add(args)) => cmd_add(args).await,
        Some(Commands::List(args)) => cmd_list(args).await,
        Some(Commands::Toggle(args)) => cmd_toggle(args).await,
        Some(Commands::Remove(args)) => cmd_remove(args).await,
        Some(Commands::Reschedule(args)) => cmd_reschedule(args).await,
        Some(Commands::Stats(args)) => cmd_stats(args).await,
        Some(Commands::Whoami) => cmd_whoami().await,
        Some(Commands::Tick) => cmd_tick().await,
        Some(Commands::Watch(args)) => cmd_watch(args).await,
        Some(Commands::Notify(args)) => cmd_notify(args).await,
        Some(Commands::Version) => Ok(cmd_version()),
    }
}

async fn load_cfg() -> anyhow::Result<crate::config::Config> {
    let cfg = tokio::task::spawn_blocking(config::load).await??;
    Ok(cfg)
}

async fn open_session(cfg: &crate::config::Config) -> anyhow::Result<Session> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || Session::from_config(&cfg)).await?
}

fn with_repo<T>(session: &Session, f: impl FnOnce(&mut TaskRepository) -> T) -> T {
    let mut repo = session
        .repo()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    f(&mut repo)
}

async fn cmd_add(args: AddArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let now = session.clock().now();

    let input = NewTask {
        title: args.title.join(" "),
        description: args.description,
        priority: args.priority,
        due_date: resolve_due(args.due.as_deref(), args.within.as_deref(), now)?,
    };
    let task = with_repo(&session, |repo| repo.create(input))?;
    println!("Added {} {}", task.id, task.title);
    if let Some(due) = task.due_date {
        println!("  due: {}", format_timestamp(due));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list(args: ListArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let now = session.clock().now();
    let tasks: Vec<Task> = with_repo(&session, |repo| repo.filtered(args.filter).cloned().collect());

    if args.json {
        let mut out = serde_json::to_string_pretty(&tasks)?;
        out.push('\n');
        print!("{out}");
        return Ok(ExitCode::SUCCESS);
    }

    if args.csv {
        let mut t = Table::new([
            "id",
            "title",
            "priority",
            "status",
            "due_date",
            "reminder_sent",
        ]);
        for task in &tasks {
            t.row([
                task.id.clone(),
                task.title.clone(),
                task.priority.as_str().to_owned(),
                task_status_str(task, now).to_owned(),
                task.due_date.map(format_timestamp).unwrap_or_default(),
                task.reminder_sent.to_string(),
            ]);
        }
        t.write_csv()?;
        return Ok(ExitCode::SUCCESS);
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut t = Table::new(["ID", "TITLE", "PRIORITY", "STATUS", "DUE"]);
    for task in &tasks {
        let mut id = task.id.clone();
        if cfg.ui.icons {
            id = format!("{} {}", task_status_icon(task, now), task.id);
        }
        t.row([
            id,
            truncate(&task.title, 50),
            task.priority.label().to_owned(),
            task_status_str(task, now).to_owned(),
            task.due_date
                .map_or_else(|| "-".to_owned(), |due| format_due(due, now)),
        ]);
    }
    t.print()?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_toggle(args: IdArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let task = with_repo(&session, |repo| repo.toggle_completed(&args.id))?;
    let state = if task.completed { "completed" } else { "pending" };
    println!("{} is now {state}", task.id);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_remove(args: IdArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let task = with_repo(&session, |repo| repo.delete(&args.id))?;
    println!("Removed {} {}", task.id, task.title);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_reschedule(args: RescheduleArgs) -> anyhow::Result<ExitCode> {
    if !args.clear && args.due.is_none() && args.within.is_none() {
        anyhow::bail!("pass --due, --in or --clear");
    }
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let now = session.clock().now();
    let due = resolve_due(args.due.as_deref(), args.within.as_deref(), now)?;

    let task = with_repo(&session, |repo| repo.reschedule(&args.id, due))?;
    match task.due_date {
        Some(due) => println!("{} is due {}", task.id, format_timestamp(due)),
        None => println!("{} has no due date", task.id),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_stats(args: StatsArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let stats = with_repo(&session, |repo| repo.stats());

    if args.json {
        let mut out = serde_json::to_string_pretty(&stats)?;
        out.push('\n');
        print!("{out}");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Total:     {}", stats.total);
    println!("Completed: {}", stats.completed);
    println!("Pending:   {}", stats.pending);
    println!("Progress:  {}%", stats.progress_percent);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_whoami() -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let key = with_repo(&session, |repo| repo.key().to_owned());
    let data_dir = config::expand_path(&cfg.storage.data_dir)?;
    println!("{}", session.device());
    println!(
        "  data dir: {}",
        config::tilde_path(&data_dir.to_string_lossy())
    );
    println!("  tasks key: {key}");
    println!("  settings key: {}", session.settings_store().key());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_tick() -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let scheduler = session.scheduler_from_config(&cfg);
    let report = tokio::task::spawn_blocking(move || scheduler.tick()).await?;

    print_report(&report);
    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn print_report(report: &TickReport) {
    let status = match report.status {
        TickStatus::Ran => "ran",
        TickStatus::Disabled => "disabled (enable with 'taskflow notify enable')",
        TickStatus::Skipped => "skipped",
    };
    println!("tick: {status}");
    if report.status != TickStatus::Ran {
        return;
    }
    println!("  reminded: {}", report.reminded.len());
    for id in &report.reminded {
        println!("    {id}");
    }
    println!(
        "  overdue: {}{}",
        report.overdue,
        if report.overdue_notified { " (notified)" } else { "" }
    );
    for n in &report.suppressed {
        println!("  suppressed: {} - {}", n.title, n.body);
    }
    for f in &report.failures {
        let who = f.task_id.as_deref().unwrap_or("overdue batch");
        eprintln!("  failed ({who}): {}", f.error);
    }
}

async fn cmd_watch(args: WatchArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let period = match args.interval.as_deref() {
        Some(s) => parse_duration(s)?,
        None => cfg.tick_interval(),
    };
    let session = open_session(&cfg).await?;
    let scheduler = Arc::new(session.scheduler_from_config(&cfg));
    let handle = scheduler.spawn(period);

    println!(
        "Watching reminders for {} every {}s (Ctrl-C to stop)",
        session.device(),
        period.as_secs().max(1)
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_notify(args: NotifyArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let session = open_session(&cfg).await?;
    let settings = session.settings_store();

    match args.cmd {
        NotifyCmd::Status => {
            let current = settings.load();
            let permission = request_permission(&cfg).await?;
            println!("enabled: {}", current.enabled);
            println!("reminder_minutes: {}", current.reminder_minutes);
            println!("permission: {permission}");
            println!("key: {}", settings.key());
        }
        NotifyCmd::Enable => {
            settings.update(|s| s.enabled = true)?;
            println!("Notifications enabled");
            let permission = request_permission(&cfg).await?;
            if !permission.is_granted() {
                eprintln!(
                    "warning: notification permission is {permission}; reminders will be logged but not shown"
                );
            }
        }
        NotifyCmd::Disable => {
            settings.update(|s| s.enabled = false)?;
            println!("Notifications disabled");
        }
        NotifyCmd::Lead(lead) => {
            let updated = settings.update(|s| s.reminder_minutes = lead.minutes)?;
            println!(
                "Reminders fire {} minutes before the due date",
                updated.reminder_minutes
            );
        }
        NotifyCmd::Test => {
            let gateway = app::gateway_from_config(&cfg);
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let permission = gateway.request_permission();
                if !permission.is_granted() {
                    anyhow::bail!("notification permission is {permission}");
                }
                gateway.deliver(&test_notification())?;
                Ok(())
            })
            .await??;
            println!("Test notification sent");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn request_permission(cfg: &crate::config::Config) -> anyhow::Result<Permission> {
    let gateway = app::gateway_from_config(cfg);
    Ok(tokio::task::spawn_blocking(move || gateway.request_permission()).await?)
}

fn test_notification() -> Notification {
    Notification {
        title: "TaskFlow".to_owned(),
        body: "Notificações ativadas!".to_owned(),
        tag: "test".to_owned(),
    }
}

fn cmd_version() -> ExitCode {
    println!("taskflow version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

fn resolve_due(
    due: Option<&str>,
    within: Option<&str>,
    now: OffsetDateTime,
) -> anyhow::Result<Option<OffsetDateTime>> {
    if let Some(due) = due {
        return Ok(Some(parse_due_date(due)?));
    }
    let Some(within) = within else {
        return Ok(None);
    };
    let due = time::Duration::try_from(parse_duration(within)?)
        .ok()
        .and_then(|offset| now.checked_add(offset))
        .ok_or_else(|| TaskflowError::Validation(format!("due date out of range: {within}")))?;
    Ok(Some(due))
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }

    let (num, unit) = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .map_or((s, ""), |i| s.split_at(i));
    let n: u64 = num
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;

    let per_unit: u64 = match unit {
        "s" | "" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => anyhow::bail!("unsupported duration unit in '{s}' (use s|m|h|d|w)"),
    };
    let secs = n
        .checked_mul(per_unit)
        .ok_or_else(|| TaskflowError::Validation(format!("duration too large: {s}")))?;
    Ok(Duration::from_secs(secs))
}

fn is_overdue(task: &Task, now: OffsetDateTime) -> bool {
    !task.completed && task.due_date.is_some_and(|due| due < now)
}

fn task_status_icon(task: &Task, now: OffsetDateTime) -> &'static str {
    if task.completed {
        "✓"
    } else if is_overdue(task, now) {
        "!"
    } else {
        "○"
    }
}

fn task_status_str(task: &Task, now: OffsetDateTime) -> &'static str {
    if task.completed {
        "completed"
    } else if is_overdue(task, now) {
        "overdue"
    } else {
        "pending"
    }
}

fn format_due(due: OffsetDateTime, now: OffsetDateTime) -> String {
    let delta = due - now;
    let (mag, suffix) = if delta.is_negative() {
        (-delta, "ago")
    } else {
        (delta, "left")
    };
    let rel = if mag.whole_days() > 0 {
        format!("{}d", mag.whole_days())
    } else if mag.whole_hours() > 0 {
        format!("{}h", mag.whole_hours())
    } else {
        format!("{}m", mag.whole_minutes())
    };
    format!("{} ({rel} {suffix})", format_timestamp(due))
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use time::Duration as TimeDuration;

    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn task(completed: bool, due: Option<OffsetDateTime>) -> Task {
        Task {
            id: "1".to_owned(),
            title: "Estudar Rust".to_owned(),
            description: None,
            priority: Priority::Medium,
            completed,
            created_at: now(),
            due_date: due,
            reminder_sent: false,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5y").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("99999999999999999w").is_err());
        assert!(parse_duration("99999999999999999999").is_err());
    }

    #[test]
    fn resolve_due_prefers_explicit_date() {
        let at = resolve_due(Some("2030-01-02T03:04:05Z"), None, now())
            .unwrap()
            .unwrap();
        assert_eq!(format_timestamp(at), "2030-01-02T03:04:05Z");

        let later = resolve_due(None, Some("45m"), now()).unwrap().unwrap();
        assert_eq!(later - now(), TimeDuration::minutes(45));

        assert!(resolve_due(None, None, now()).unwrap().is_none());
        assert!(resolve_due(Some("tomorrow"), None, now()).is_err());
    }

    #[test]
    fn resolve_due_rejects_offsets_past_the_calendar() {
        let err = resolve_due(None, Some("99999999999w"), now()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskflowError>(),
            Some(TaskflowError::Validation(_))
        ));
        assert!(resolve_due(None, Some("520000w"), now()).is_err());
        assert!(resolve_due(None, Some("99999999999999999w"), now()).is_err());
    }

    #[test]
    fn status_reflects_completion_and_due_date() {
        let past = Some(now() - TimeDuration::minutes(5));
        assert_eq!(task_status_str(&task(false, past), now()), "overdue");
        assert_eq!(task_status_str(&task(true, past), now()), "completed");
        assert_eq!(task_status_str(&task(false, None), now()), "pending");
        assert_eq!(task_status_icon(&task(false, past), now()), "!");
    }

    #[test]
    fn format_due_is_relative() {
        let s = format_due(now() + TimeDuration::hours(3), now());
        assert!(s.ends_with("(3h left)"), "{s}");
        let s = format_due(now() - TimeDuration::days(2), now());
        assert!(s.ends_with("(2d ago)"), "{s}");
    }

    #[test]
    fn cli_parses_add_with_relative_due() {
        let cli = Cli::try_parse_from([
            "taskflow", "add", "Pagar", "conta", "-p", "high", "--in", "2h",
        ])
        .unwrap();
        let Some(Commands::Add(args)) = cli.cmd else {
            panic!("expected add");
        };
        assert_eq!(args.title.join(" "), "Pagar conta");
        assert_eq!(args.priority, Priority::High);
        assert_eq!(args.within.as_deref(), Some("2h"));
    }

    #[test]
    fn cli_rejects_due_and_in_together() {
        let args = [
            "taskflow",
            "add",
            "x",
            "--due",
            "2030-01-01T00:00:00Z",
            "--in",
            "1h",
        ];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
