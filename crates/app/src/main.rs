mod player;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use lamp_show_core::{
    Actuator, AppConfig, ClockSource, Dispatcher, DryRunActuator, ModbusActuator, PatternLibrary,
    RunReport, Schedule, SerialConnector, WallClock,
};
use tracing_subscriber::EnvFilter;

use crate::player::PlayerClock;

/// Extra time the wall clock keeps running after the last event.
const TAIL_MS: u64 = 1_000;

fn main() -> lamp_show_core::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Run(args) => run_show(config, args),
        Commands::Check { schedule } => run_check(&config, schedule.as_ref()),
        Commands::Patterns => run_patterns(&config),
    }
}

fn run_show(mut config: AppConfig, args: RunArgs) -> lamp_show_core::Result<()> {
    args.apply(&mut config);

    let schedule = load_schedule(args.schedule.as_ref())?;
    let timeline = schedule.timeline();
    let patterns = PatternLibrary::with_overrides(&config.patterns);
    patterns.check(&timeline)?;

    tracing::info!(
        schedule = %schedule.name,
        events = timeline.len(),
        dry_run = args.dry_run,
        "preparing show"
    );

    let mut clock: Box<dyn ClockSource> = match args.player.as_deref() {
        Some(command) if !command.is_empty() => {
            let clock = PlayerClock::new(command, args.latency_ms).ok_or("empty player command")?;
            Box::new(clock)
        }
        _ => {
            let length = args
                .length_ms
                .or(schedule.length_ms)
                .or_else(|| timeline.last_deadline_ms().map(|last| last + TAIL_MS))
                .unwrap_or(0);
            Box::new(WallClock::with_length(Duration::from_millis(length)).on_first_poll())
        }
    };

    let mut actuator: Box<dyn Actuator> = if args.dry_run {
        Box::new(DryRunActuator::new())
    } else {
        Box::new(ModbusActuator::new(
            SerialConnector::new(config.bus.clone()),
            config.bus.unit_id,
            config.bus.conventions.clone(),
        ))
    };

    let mut dispatcher = Dispatcher::new(timeline, patterns, config.run);
    let report = dispatcher.run(&mut clock, &mut actuator)?;
    print_report(&report);
    Ok(())
}

fn run_check(config: &AppConfig, schedule: Option<&PathBuf>) -> lamp_show_core::Result<()> {
    let schedule = load_schedule(schedule)?;
    let timeline = schedule.timeline();
    PatternLibrary::with_overrides(&config.patterns).check(&timeline)?;

    println!(
        "{}: {} events, last at {} ms",
        schedule.name,
        timeline.len(),
        timeline.last_deadline_ms().unwrap_or(0)
    );
    Ok(())
}

fn run_patterns(config: &AppConfig) -> lamp_show_core::Result<()> {
    let library = PatternLibrary::with_overrides(&config.patterns);
    for (action, commands) in library.entries() {
        let shapes: Vec<String> = commands
            .iter()
            .map(|command| {
                let bits: String = command
                    .bit_pattern
                    .iter()
                    .map(|on| if *on { '1' } else { '0' })
                    .collect();
                format!("@{:#06x} {bits} {}ms", command.base_address, command.hold_ms)
            })
            .collect();
        println!("{action:<10} {}", shapes.join(", "));
    }
    Ok(())
}

fn load_schedule(path: Option<&PathBuf>) -> lamp_show_core::Result<Schedule> {
    match path {
        Some(path) => Schedule::load(path),
        None => Schedule::builtin(),
    }
}

fn print_report(report: &RunReport) {
    println!(
        "{:?}: {} fired, {} failed, {} late, {} duplicate, {} not reached",
        report.termination,
        report.fired,
        report.failed,
        report.late,
        report.duplicates,
        report.unfired
    );
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fires lamp pulses in time with a music track", long_about = None)]
struct Cli {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a schedule against the lamp bank.
    Run(RunArgs),
    /// Validate a schedule against the known patterns without touching hardware.
    Check {
        /// Schedule file; the built-in show when omitted.
        #[arg(short, long)]
        schedule: Option<PathBuf>,
    },
    /// List the known actions and the coil writes they perform.
    Patterns,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Schedule file; the built-in show when omitted.
    #[arg(short, long)]
    schedule: Option<PathBuf>,
    /// Log writes instead of opening the serial port.
    #[arg(long)]
    dry_run: bool,
    /// Serial port of the RS-485 adapter.
    #[arg(long)]
    port: Option<String>,
    /// Modbus unit id of the output controller.
    #[arg(long)]
    unit_id: Option<u8>,
    #[arg(long)]
    tolerance_ms: Option<u64>,
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Track length for the built-in wall clock.
    #[arg(long)]
    length_ms: Option<u64>,
    /// Audio output latency subtracted from the player position.
    #[arg(long, default_value_t = 0)]
    latency_ms: i64,
    /// Player command to follow, e.g. `--player mpv song.mp3`.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    player: Option<Vec<String>>,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.bus.port = port.clone();
        }
        if let Some(unit_id) = self.unit_id {
            config.bus.unit_id = unit_id;
        }
        if let Some(tolerance_ms) = self.tolerance_ms {
            config.run.tolerance_ms = tolerance_ms;
        }
        if let Some(poll_ms) = self.poll_ms {
            config.run.poll_interval_ms = poll_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "lamp-show",
            "run",
            "--dry-run",
            "--port",
            "COM5",
            "--tolerance-ms",
            "20",
            "--player",
            "mpv",
            "song.mp3",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert!(args.dry_run);
        assert_eq!(config.bus.port, "COM5");
        assert_eq!(config.run.tolerance_ms, 20);
        assert_eq!(config.run.poll_interval_ms, 3);
        assert_eq!(args.player, Some(vec!["mpv".to_string(), "song.mp3".to_string()]));
    }

    #[test]
    fn dry_run_plays_a_short_schedule() {
        let dir = std::env::temp_dir().join(format!("lamp-show-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("short.json");
        std::fs::write(
            &path,
            r#"{ "name": "short", "events": [ { "at_ms": 0, "action": "lamp-1" }, { "at_ms": 20, "action": "all-3" } ] }"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "lamp-show",
            "run",
            "--dry-run",
            "--schedule",
            path.to_str().unwrap(),
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        assert!(run_show(AppConfig::default(), args).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn check_rejects_unknown_actions() {
        let dir = std::env::temp_dir().join(format!("lamp-show-check-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(
            &path,
            r#"{ "name": "bad", "events": [ { "at_ms": 0, "action": "lamp-7" } ] }"#,
        )
        .unwrap();

        assert!(run_check(&AppConfig::default(), Some(&path)).is_err());
        assert!(run_check(&AppConfig::default(), None).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
