use anyhow::Context;
use chrono::Utc;
use clap::{Arg, ArgAction, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use portscope::output::{format_traffic, OutputConfig, OutputFormat, OutputManager};
use portscope::scanner::parse_range_fields;
use portscope::{
    PortRange, RangeScanner, ScanConfig, ScanError, ScanReport, ScanSummary, SystemCounters,
    TcpConnectProbe, TrafficCounters, TrafficMonitor,
};
use std::time::{Duration, Instant};

/// File descriptors kept back for stdio, the resolver and the log sink
const FD_RESERVE: u64 = 64;

/// Exit status for rejected port input
const EXIT_INVALID_INPUT: i32 = 2;

fn build_cli() -> Command {
    Command::new("portscope")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Probe a range of TCP ports on one host and report which accept connections")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Host to scan (IP address or hostname)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("start")
                .short('s')
                .long("start")
                .value_name("START")
                .help("First port of the range [default: 1]")
                .allow_hyphen_values(true)
                .conflicts_with("ports"),
        )
        .arg(
            Arg::new("end")
                .short('e')
                .long("end")
                .value_name("END")
                .help("Last port of the range, inclusive [default: 1024]")
                .allow_hyphen_values(true)
                .conflicts_with("ports"),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("RANGE")
                .help("Port range as START-END, or a single port")
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Per-port connect timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .value_name("N")
                .help("Maximum number of probes in flight")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("deadline")
                .long("deadline")
                .value_name("MS")
                .help("Stop the whole scan after this many milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Read settings from this TOML file instead of ~/.portscope.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format: text or json")
                .default_value("text"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Write the report to FILE instead of stdout"),
        )
        .arg(
            Arg::new("show-closed")
                .long("show-closed")
                .help("List closed ports instead of only counting them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stream")
                .long("stream")
                .help("Print each port as soon as its probe finishes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("traffic")
                .long("traffic")
                .value_name("SECONDS")
                .help("Show host network traffic, and keep refreshing it for SECONDS after the scan")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Automatically increase ulimit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count),
        )
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(ulimit: Option<u64>) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            println!(
                "{} {}",
                "[~] Automatically increasing ulimit value to".bright_blue(),
                limit.to_string().bright_cyan().bold()
            );
        } else {
            eprintln!("{}", "[!] ERROR: Failed to set ulimit value.".bright_red());
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            log::warn!("Could not get file descriptor limit: {}", e);
            65535
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_ulimit: Option<u64>) -> u64 {
    65535
}

/// Lower the fan-out so every in-flight probe can hold a socket
fn cap_concurrency(concurrency: usize, fd_limit: u64) -> usize {
    let usable = fd_limit.saturating_sub(FD_RESERVE).max(1);
    let capped = usize::try_from(usable).unwrap_or(usize::MAX).min(concurrency);
    if capped < concurrency {
        eprintln!(
            "{} {} {}",
            "[!] File limit is too low for".bright_yellow(),
            concurrency.to_string().bright_cyan(),
            format!("concurrent probes; using {} (raise it with --ulimit)", capped).bright_yellow()
        );
    }
    capped
}

fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config file {}", path))?,
        None => ScanConfig::load_default_config().context("Failed to load default config")?,
    };

    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config = config.with_timeout(timeout);
    }
    if let Some(&concurrency) = matches.get_one::<usize>("concurrency") {
        config = config.with_concurrency(concurrency);
    }
    if let Some(&deadline) = matches.get_one::<u64>("deadline") {
        config = config.with_deadline(Some(deadline));
    }

    Ok(config)
}

fn resolve_range(matches: &clap::ArgMatches) -> portscope::Result<PortRange> {
    if let Some(ports) = matches.get_one::<String>("ports") {
        return ports.parse();
    }

    let start = matches.get_one::<String>("start").map_or("1", String::as_str);
    let end = matches.get_one::<String>("end").map_or("1024", String::as_str);
    parse_range_fields(start, end)
}

fn report_input_error(error: &ScanError) {
    let title = match error {
        ScanError::Parse(_) => "Invalid Input",
        _ => "Invalid Port Range",
    };
    eprintln!("{} {}", format!("[!] {}:", title).bright_red().bold(), error);
}

/// Scan while printing results as they arrive
async fn stream_scan(
    scanner: &RangeScanner<TcpConnectProbe>,
    target: &str,
    range: PortRange,
    output: &OutputManager,
    show_progress: bool,
) -> ScanSummary {
    let pb = if show_progress {
        let pb = ProgressBar::new(range.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut summary = ScanSummary::default();
    let mut rx = scanner.scan_streaming(target, range);
    while let Some(result) = rx.recv().await {
        if result.reachable {
            summary.open_ports.push(result.port);
            pb.println(output.format_probe_result(&result));
        } else {
            summary.closed_ports.push(result.port);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    summary.open_ports.sort_unstable();
    summary.closed_ports.sort_unstable();
    summary
}

/// Keep printing traffic samples until `linger` has passed
async fn watch_traffic(monitor: &TrafficMonitor, linger: Duration) {
    let mut samples = monitor.subscribe();
    let stop = tokio::time::sleep(linger);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = samples.changed() => {
                if changed.is_err() {
                    break;
                }
                let sample = *samples.borrow_and_update();
                if let Some(sample) = sample {
                    println!(
                        "[{}]\n{}",
                        sample.taken_at.format("%H:%M:%S"),
                        format_traffic(&sample.counters)
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let colored_output = !matches.get_flag("no-color");
    if !colored_output {
        colored::control::set_override(false);
    }

    let format: OutputFormat = matches
        .get_one::<String>("output")
        .map_or(Ok(OutputFormat::Text), |s| s.parse())
        .map_err(anyhow::Error::msg)?;
    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output-file").cloned(),
        colored: colored_output,
        show_closed: matches.get_flag("show-closed"),
    });

    let target = matches
        .get_one::<String>("target")
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let range = match resolve_range(&matches) {
        Ok(range) => range,
        Err(e) => {
            report_input_error(&e);
            std::process::exit(EXIT_INVALID_INPUT);
        }
    };

    let mut config = load_config(&matches)?;
    let fd_limit = adjust_ulimit_size(matches.get_one::<u64>("ulimit").copied());
    config.concurrency = cap_concurrency(config.concurrency, fd_limit);
    let deadline = config.deadline_duration();
    let traffic_interval = config.traffic_interval_duration();

    let scanner = RangeScanner::new(TcpConnectProbe::new(), config)
        .context("Invalid scan configuration")?;
    log::info!("Scanning {} ports {}", target, range);

    let traffic_linger = matches.get_one::<u64>("traffic").copied();
    let monitor = traffic_linger.map(|_| TrafficMonitor::spawn(SystemCounters::new(), traffic_interval));

    let started_at = Utc::now();
    let clock = Instant::now();
    let report = if let Some(deadline) = deadline {
        let scan = scanner.scan_with_deadline(&target, range, deadline).await;
        ScanReport::from_partial(target.clone(), range, started_at, clock.elapsed(), scan)
    } else if matches.get_flag("stream") {
        let show_progress = format == OutputFormat::Text;
        let summary = stream_scan(&scanner, &target, range, &output, show_progress).await;
        ScanReport::new(target.clone(), range, started_at, clock.elapsed(), summary)
    } else {
        let summary = scanner.scan_range(&target, range).await;
        ScanReport::new(target.clone(), range, started_at, clock.elapsed(), summary)
    };

    let traffic: Option<TrafficCounters> = monitor
        .as_ref()
        .and_then(|m| m.latest())
        .map(|sample| sample.counters);
    output
        .write_report(&report.with_traffic(traffic))
        .context("Failed to write scan report")?;

    if let Some(monitor) = monitor {
        if let Some(seconds) = traffic_linger.filter(|s| *s > 0) {
            if format == OutputFormat::Text {
                watch_traffic(&monitor, Duration::from_secs(seconds)).await;
            }
        }
        monitor.stop().await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portscope::RangeValidationError;

    #[test]
    fn test_default_range_is_first_1024() {
        let matches = build_cli().get_matches_from(["portscope", "localhost"]);
        assert_eq!(resolve_range(&matches).unwrap(), PortRange::new(1, 1024).unwrap());
    }

    #[test]
    fn test_range_flags() {
        let matches = build_cli().get_matches_from(["portscope", "host", "-p", "20-25"]);
        assert_eq!(resolve_range(&matches).unwrap(), PortRange::new(20, 25).unwrap());

        let matches = build_cli().get_matches_from(["portscope", "host", "-s", "-1", "-e", "80"]);
        assert!(matches!(
            resolve_range(&matches),
            Err(ScanError::RangeValidation(_))
        ));

        let matches = build_cli().get_matches_from(["portscope", "host", "-p", "-1-100"]);
        assert!(matches!(
            resolve_range(&matches),
            Err(ScanError::RangeValidation(RangeValidationError::StartBelowZero(-1)))
        ));

        let matches = build_cli().get_matches_from(["portscope", "host", "-s", "x"]);
        assert!(matches!(resolve_range(&matches), Err(ScanError::Parse(_))));
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let matches = build_cli().get_matches_from([
            "portscope",
            "host",
            "--config",
            "/nonexistent/portscope.toml",
        ]);
        assert!(load_config(&matches).is_err());
    }

    #[test]
    fn test_cap_concurrency() {
        assert_eq!(cap_concurrency(500, 1024), 500);
        assert_eq!(cap_concurrency(500, 256), 192);
        assert_eq!(cap_concurrency(500, 10), 1);
    }
}
