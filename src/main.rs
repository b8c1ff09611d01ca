use anyhow::{anyhow, Context, Result};
use clap::Parser;
use reckon_config::{AppConfig, LockedAxis, SourceKind};
use reckon_imu::{FixedRateClock, ImuClient, LogSink, MonotonicClock, Session, Sinks};
use reckon_record::CsvRecorder;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Reference-relative orientation and dead-reckoned position from an IMU line feed.
#[derive(Debug, Parser)]
#[command(name = "imu-reckon", version)]
struct Args {
    /// Config file to use instead of the per-user default.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read the feed from a TCP endpoint (host:port).
    #[arg(long, conflicts_with_all = ["file", "stdin"])]
    tcp: Option<String>,
    /// Replay a captured line log.
    #[arg(long, conflicts_with = "stdin")]
    file: Option<PathBuf>,
    /// Read the feed from standard input.
    #[arg(long)]
    stdin: bool,
    /// Sample period assumed when replaying a file.
    #[arg(long)]
    period_ms: Option<u64>,
    /// Keep a single rotational axis: none, roll, pitch or yaw.
    #[arg(long)]
    lock_axis: Option<LockedAxis>,
    /// Only process the newest complete line of each read.
    #[arg(long)]
    latest_only: bool,
    /// Do not write a CSV recording.
    #[arg(long)]
    no_record: bool,
    /// Save the effective configuration to the per-user config file.
    #[arg(long)]
    write_config: bool,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(addr) = &self.tcp {
            config.source.kind = SourceKind::Tcp;
            config.source.addr = addr.clone();
        }
        if let Some(path) = &self.file {
            config.source.kind = SourceKind::File;
            config.source.path = Some(path.clone());
        }
        if self.stdin {
            config.source.kind = SourceKind::Stdin;
        }
        if let Some(period_ms) = self.period_ms {
            config.source.period_ms = period_ms;
        }
        if let Some(axis) = self.lock_axis {
            config.estimator.locked_axis = axis;
        }
        if self.latest_only {
            config.source.drain_to_latest = true;
        }
        if self.no_record {
            config.record.enabled = false;
        }
    }
}

/// Save to the file the config came from, or the per-user default.
fn write_config(args: &Args, config: &AppConfig) -> Result<PathBuf> {
    match &args.config {
        Some(path) => {
            reckon_config::save_config_to(config, path)?;
            Ok(path.clone())
        }
        None => reckon_config::save_config(config),
    }
}

async fn start_client(config: &AppConfig, sinks: Sinks) -> Result<ImuClient> {
    let estimator = config.estimator.clone();
    let source = &config.source;

    match source.kind {
        SourceKind::Tcp => {
            let session = Session::new(estimator, Box::new(MonotonicClock));
            ImuClient::connect_tcp(&source.addr, session, sinks, source.drain_to_latest).await
        }
        SourceKind::File => {
            let path = source
                .path
                .as_ref()
                .ok_or_else(|| anyhow!("source.kind = \"file\" requires source.path"))?;
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let period = Duration::from_millis(source.period_ms);
            info!(path = %path.display(), period_ms = source.period_ms, "Replaying capture");

            // Every line of a replay matters; draining would skip most of the file.
            let session = Session::new(estimator, Box::new(FixedRateClock::new(period)));
            Ok(ImuClient::spawn(file, session, sinks, false))
        }
        SourceKind::Stdin => {
            info!("Reading IMU feed from stdin");
            let session = Session::new(estimator, Box::new(MonotonicClock));
            Ok(ImuClient::spawn(
                tokio::io::stdin(),
                session,
                sinks,
                source.drain_to_latest,
            ))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reckon_app=info,reckon_imu=info,reckon_record=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("IMU dead-reckoning estimator starting");

    // Load config. An explicit --config must exist and parse; the default may fall back.
    let mut config = match &args.config {
        Some(path) => reckon_config::load_config_from(path)?,
        None => reckon_config::load_config().unwrap_or_else(|e| {
            warn!(?e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    args.apply(&mut config);
    config.estimator.validate()?;

    if args.write_config {
        let path = write_config(&args, &config)?;
        info!(?path, "Config written");
    }

    info!(
        source = ?config.source.kind,
        locked_axis = ?config.estimator.locked_axis,
        accel_unit = ?config.estimator.accel_unit,
        "Config loaded"
    );

    let mut sinks: Sinks = Vec::new();
    if config.record.echo {
        sinks.push(Box::new(LogSink));
    }
    let mut recording = None;
    if config.record.enabled {
        match CsvRecorder::create(&config.record.directory, &config.record.file_prefix) {
            Ok(recorder) => {
                recording = recorder.path().map(|p| p.to_path_buf());
                sinks.push(Box::new(recorder));
            }
            Err(e) => warn!(?e, "Recording unavailable, continuing without CSV output"),
        }
    }

    let mut client = start_client(&config, sinks).await?;
    info!("Press Ctrl-C to stop");

    let stats = tokio::select! {
        result = client.join() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing session");
            client.shutdown();
            client.join().await?
        }
    };

    stats.log_summary();
    if let Some(path) = recording {
        info!(path = %path.display(), "Data saved");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "imu-reckon",
            "--file",
            "bicep_test.txt",
            "--period-ms",
            "10",
            "--lock-axis",
            "yaw",
            "--no-record",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.path, Some(PathBuf::from("bicep_test.txt")));
        assert_eq!(config.source.period_ms, 10);
        assert_eq!(config.estimator.locked_axis, LockedAxis::Yaw);
        assert!(!config.record.enabled);
    }

    #[test]
    fn conflicting_sources_are_refused() {
        assert!(Args::try_parse_from(["imu-reckon", "--tcp", "127.0.0.1:5760", "--stdin"]).is_err());
    }

    #[test]
    fn unknown_axis_is_refused() {
        assert!(Args::try_parse_from(["imu-reckon", "--lock-axis", "heave"]).is_err());
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let args = Args::try_parse_from(["imu-reckon"]).unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.source.kind, SourceKind::Tcp);
        assert!(config.record.enabled);
    }

    #[test]
    fn write_config_targets_explicit_config_file() {
        let path = std::env::temp_dir().join(format!("imu-reckon-{}.toml", std::process::id()));
        let path_arg = path.to_string_lossy().into_owned();
        let args = Args::try_parse_from([
            "imu-reckon",
            "--config",
            path_arg.as_str(),
            "--lock-axis",
            "pitch",
            "--write-config",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply(&mut config);
        let written = write_config(&args, &config).unwrap();
        assert_eq!(written, path);

        let reloaded = reckon_config::load_config_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(reloaded.estimator.locked_axis, LockedAxis::Pitch);
    }
}
