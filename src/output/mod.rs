//! Output formatting and management

use crate::network::TrafficCounters;
use crate::scanner::{PartialScan, PortRange, ProbeResult, ScanSummary};
use chrono::{DateTime, Utc};
use colored::{Color, Colorize};
use serde::{Deserialize, Serialize, Serializer};
use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub colored: bool,
    /// List closed ports one by one instead of only counting them
    pub show_closed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
            show_closed: false,
        }
    }
}

/// Everything worth reporting about one finished scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub target: String,
    pub range: PortRange,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_seconds", serialize_with = "as_seconds")]
    pub duration: Duration,
    pub summary: ScanSummary,
    /// Ports left unprobed when a deadline cut the scan short
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unprobed: Vec<u16>,
    /// Host counters read when the scan finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficCounters>,
}

impl ScanReport {
    pub fn new(
        target: impl Into<String>,
        range: PortRange,
        started_at: DateTime<Utc>,
        duration: Duration,
        summary: ScanSummary,
    ) -> Self {
        Self {
            target: target.into(),
            range,
            started_at,
            duration,
            summary,
            unprobed: Vec::new(),
            traffic: None,
        }
    }

    /// Report for a deadline-bounded scan
    pub fn from_partial(
        target: impl Into<String>,
        range: PortRange,
        started_at: DateTime<Utc>,
        duration: Duration,
        scan: PartialScan,
    ) -> Self {
        let mut report = Self::new(target, range, started_at, duration, scan.summary);
        report.unprobed = scan.unprobed;
        report
    }

    pub fn with_traffic(mut self, traffic: Option<TrafficCounters>) -> Self {
        self.traffic = traffic;
        self
    }
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write a scan report to the configured file, or stdout
    pub fn write_report(&self, report: &ScanReport) -> io::Result<()> {
        let output = self.render(report)?;

        match &self.config.file {
            Some(filename) => {
                let mut file = File::create(filename)?;
                file.write_all(output.as_bytes())?;
            }
            None => {
                print!("{}", output);
            }
        }

        Ok(())
    }

    /// Render a report in the configured format
    pub fn render(&self, report: &ScanReport) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(report)),
            OutputFormat::Json => self.format_json(report),
        }
    }

    /// Format results as text
    fn format_text(&self, report: &ScanReport) -> String {
        let summary = &report.summary;
        let mut output = String::new();

        output.push_str(&self.paint(
            &format!("Scan report for {} (ports {})\n", report.target, report.range),
            Color::Cyan,
        ));
        output.push_str(&format!(
            "Started {}, took {:.2}s\n\n",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            report.duration.as_secs_f64()
        ));

        output.push_str(&self.paint(&format!("Open Ports: {}\n", summary.open_count()), Color::Green));
        for port in &summary.open_ports {
            output.push_str(&self.paint(&format!("  {}/tcp open\n", port), Color::Green));
        }

        if self.config.show_closed {
            output.push_str(&format!("Closed Ports: {}\n", join_ports(&summary.closed_ports)));
        } else {
            output.push_str(&format!("Closed Ports: {}\n", summary.closed_count()));
        }

        let (open, closed) = summary.proportions();
        output.push_str(&format!("Open: {:.2}%  Closed: {:.2}%\n", open, closed));

        if !report.unprobed.is_empty() {
            output.push_str(&self.paint(
                &format!(
                    "Deadline reached, {} ports not probed: {}\n",
                    report.unprobed.len(),
                    join_ports(&report.unprobed)
                ),
                Color::Yellow,
            ));
        }

        if let Some(traffic) = &report.traffic {
            output.push('\n');
            output.push_str(&format_traffic(traffic));
            output.push('\n');
        }

        output
    }

    /// Format results as JSON
    fn format_json(&self, report: &ScanReport) -> io::Result<String> {
        serde_json::to_string_pretty(report).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// One line per streamed probe result
    pub fn format_probe_result(&self, result: &ProbeResult) -> String {
        match self.config.format {
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::Text if result.reachable => {
                self.paint(&format!("{}/tcp open", result.port), Color::Green)
            }
            OutputFormat::Text => format!("{}/tcp closed", result.port),
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.config.colored {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Host traffic in megabytes with two decimals
pub fn format_traffic(counters: &TrafficCounters) -> String {
    format!(
        "Bytes Sent: {:.2} MB\nBytes Received: {:.2} MB",
        counters.sent_megabytes(),
        counters.received_megabytes()
    )
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
