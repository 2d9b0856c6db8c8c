// SPDX-License-Identifier: MPL-2.0

//! Camera diagnostics report
//!
//! Walks through the checks needed to get a DSLR working with the box:
//! - Camera-control tool installed
//! - Camera detected on USB
//! - Camera summary (model, serial, firmware, battery)
//! - Live view preview
//! - Available configuration
//! - Capture mode (manual vs PC-remote)
//!
//! A missing tool or camera ends the report early. No photo is taken.

use crate::backends::camera::dslr::{commands, config_output};
use crate::backends::camera::process::CommandRunner;
use crate::constants::{self, gphoto};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Preview test gets more headroom than a live view cycle
const PREVIEW_TEST_TIMEOUT: Duration = Duration::from_secs(8);

const SUMMARY_KEYWORDS: &[&str] = &["model", "serial", "firmware", "battery"];
const IMPORTANT_CONFIG_KEYS: &[&str] = &["iso", "aperture", "shutterspeed", "capture"];

/// One diagnostic step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: Vec<String>,
}

/// Ordered result of a diagnostics run
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub version: String,
    pub generated: String,
    pub checks: Vec<Check>,
    /// False when a blocking check stopped the run
    pub completed: bool,
}

impl DiagnosticReport {
    pub fn passed(&self) -> bool {
        self.completed && self.checks.iter().all(|c| c.passed)
    }

    /// Human readable rendering
    pub fn to_markdown(&self) -> String {
        let mut report = String::new();
        report.push_str("# Photo Box Camera Diagnostics\n\n");
        report.push_str(&format!("Generated: {}\n", self.generated));
        report.push_str(&format!("**Version:** {}\n\n", self.version));

        for check in &self.checks {
            let mark = if check.passed { "OK" } else { "FAILED" };
            report.push_str(&format!("## {} [{}]\n\n", check.name, mark));
            for line in &check.detail {
                report.push_str(&format!("- {}\n", line));
            }
            report.push('\n');
        }

        if !self.completed {
            report.push_str("Diagnostics stopped early.\n");
        }
        report
    }
}

/// Run the full diagnostics against `tool`
pub fn run(runner: &dyn CommandRunner, tool: &str) -> DiagnosticReport {
    info!(tool, "Running camera diagnostics");
    let mut report = DiagnosticReport {
        version: constants::app_version().to_string(),
        generated: chrono::Local::now().to_rfc3339(),
        checks: Vec::new(),
        completed: false,
    };

    let installed = check_tool(runner, tool);
    let stop = !installed.passed;
    report.checks.push(installed);
    if stop {
        return report;
    }

    let detected = check_detection(runner, tool);
    let stop = !detected.passed;
    report.checks.push(detected);
    if stop {
        return report;
    }

    report.checks.push(check_summary(runner, tool));
    report.checks.push(check_preview(runner, tool));
    report.checks.push(check_config(runner, tool));
    report.checks.push(check_capture_mode(runner, tool));
    report.completed = true;

    info!(passed = report.passed(), "Diagnostics finished");
    report
}

fn invoke(
    runner: &dyn CommandRunner,
    tool: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, String> {
    match runner.run(tool, &commands::as_refs(args), timeout) {
        Ok(out) if out.success() => Ok(out.stdout),
        Ok(out) => Err(out.failure_summary()),
        Err(e) => Err(e.to_string()),
    }
}

fn check_tool(runner: &dyn CommandRunner, tool: &str) -> Check {
    match invoke(runner, tool, &commands::version(), gphoto::VERSION_TIMEOUT) {
        Ok(out) => Check {
            name: "Tool installation".into(),
            passed: true,
            detail: vec![out.lines().next().unwrap_or("unknown version").trim().to_string()],
        },
        Err(e) => Check {
            name: "Tool installation".into(),
            passed: false,
            detail: vec![
                format!("{} not found: {}", tool, e),
                format!("Install it with your package manager (e.g. apt-get install {})", tool),
            ],
        },
    }
}

fn check_detection(runner: &dyn CommandRunner, tool: &str) -> Check {
    let output = invoke(runner, tool, &commands::auto_detect(), gphoto::DETECT_TIMEOUT);
    let cameras: Vec<String> = output
        .as_deref()
        .map(|out| commands::usb_lines(out).map(|l| l.trim().to_string()).collect())
        .unwrap_or_default();

    if cameras.is_empty() {
        Check {
            name: "Camera detection".into(),
            passed: false,
            detail: vec![
                "No camera detected".into(),
                "Check the USB cable and that the camera is switched on".into(),
            ],
        }
    } else {
        Check {
            name: "Camera detection".into(),
            passed: true,
            detail: cameras,
        }
    }
}

fn check_summary(runner: &dyn CommandRunner, tool: &str) -> Check {
    match invoke(runner, tool, &commands::summary(), gphoto::SUMMARY_TIMEOUT) {
        Ok(out) => Check {
            name: "Camera summary".into(),
            passed: true,
            detail: out
                .lines()
                .take(10)
                .filter(|line| {
                    let lower = line.to_lowercase();
                    SUMMARY_KEYWORDS.iter().any(|k| lower.contains(k))
                })
                .map(|line| line.trim().to_string())
                .collect(),
        },
        Err(e) => Check {
            name: "Camera summary".into(),
            passed: false,
            detail: vec![e],
        },
    }
}

fn check_preview(runner: &dyn CommandRunner, tool: &str) -> Check {
    let dir = std::env::temp_dir().join(format!(
        "{}-diagnose-{}",
        constants::APP_NAME,
        uuid::Uuid::new_v4()
    ));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return Check {
            name: "Live view preview".into(),
            passed: false,
            detail: vec![format!("cannot create temp dir: {}", e)],
        };
    }

    let file = dir.join("test_preview.jpg");
    let args = commands::preview_variants(&file)[0].clone();
    let result = invoke(runner, tool, &args, PREVIEW_TEST_TIMEOUT);
    let size = file_size(&file);

    if let Err(e) = std::fs::remove_dir_all(&dir) {
        debug!(error = %e, "Failed to remove diagnostics temp dir");
    }

    match result {
        Ok(_) => Check {
            name: "Live view preview".into(),
            passed: true,
            detail: size
                .map(|bytes| vec![format!("Preview file: {} bytes", bytes)])
                .unwrap_or_default(),
        },
        Err(e) => Check {
            name: "Live view preview".into(),
            passed: false,
            detail: vec![
                e,
                "Set the mode dial to M/Av/Tv rather than Auto or a scene mode".into(),
                "Enable live view on the camera".into(),
                "Remove the lens cap".into(),
            ],
        },
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

fn check_config(runner: &dyn CommandRunner, tool: &str) -> Check {
    match invoke(runner, tool, &commands::list_config(), gphoto::CONFIG_TIMEOUT) {
        Ok(out) => {
            let keys = config_output::parse_config_list(&out, usize::MAX);
            let mut detail = vec![format!("{} settings available", keys.len())];
            detail.extend(
                keys.iter()
                    .filter(|k| IMPORTANT_CONFIG_KEYS.iter().any(|i| k.contains(i)))
                    .take(5)
                    .cloned(),
            );
            Check {
                name: "Configuration".into(),
                passed: true,
                detail,
            }
        }
        Err(e) => Check {
            name: "Configuration".into(),
            passed: false,
            detail: vec![e],
        },
    }
}

fn check_capture_mode(runner: &dyn CommandRunner, tool: &str) -> Check {
    let args = commands::get_config(gphoto::CAPTURE_MODE_KEY);
    match invoke(runner, tool, &args, gphoto::CONFIG_TIMEOUT) {
        Ok(out) => {
            let descriptor = config_output::parse_get_config(gphoto::CAPTURE_MODE_KEY, &out);
            let manual = config_output::is_manual_capture_mode(&descriptor);
            let detail = match (manual, descriptor.current.as_deref()) {
                (true, _) => vec!["PTP mode, camera controls usable".to_string()],
                (false, Some(_)) => vec![
                    "PC-remote mode, camera controls locked".to_string(),
                    "Run `photobox manual` to switch back".to_string(),
                ],
                (false, None) => vec!["Capture mode unknown".to_string()],
            };
            Check {
                name: "Manual control".into(),
                passed: manual,
                detail,
            }
        }
        Err(e) => Check {
            name: "Manual control".into(),
            passed: false,
            detail: vec![e],
        },
    }
}
