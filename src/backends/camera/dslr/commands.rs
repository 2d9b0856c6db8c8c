// SPDX-License-Identifier: GPL-3.0-only

//! Argument lists for the camera-control tool and the two probes built on them

use crate::backends::camera::process::CommandRunner;
use crate::constants::gphoto::{DETECT_TIMEOUT, USB_MARKER, VERSION_TIMEOUT};
use std::path::Path;
use tracing::{debug, info};

pub fn version() -> Vec<String> {
    args(&["--version"])
}

pub fn auto_detect() -> Vec<String> {
    args(&["--auto-detect"])
}

pub fn summary() -> Vec<String> {
    args(&["--summary"])
}

pub fn list_config() -> Vec<String> {
    args(&["--list-config"])
}

pub fn get_config(key: &str) -> Vec<String> {
    args(&["--get-config", key])
}

pub fn set_config(key: &str, value: &str) -> Vec<String> {
    vec!["--set-config".to_string(), format!("{}={}", key, value)]
}

/// Release the device held by the tool
pub fn exit() -> Vec<String> {
    args(&["--exit"])
}

pub fn capture_and_download(path: &Path) -> Vec<String> {
    let mut list = args(&["--capture-image-and-download", "--filename"]);
    list.push(path.to_string_lossy().into_owned());
    list.push("--force-overwrite".to_string());
    list
}

/// Alternative preview commands, tried in order until one succeeds
///
/// Plain preview works on most bodies; some need the viewfinder raised
/// first, Canon EOS bodies use their own viewfinder key.
pub fn preview_variants(path: &Path) -> [Vec<String>; 3] {
    let file = path.to_string_lossy().into_owned();
    let preview = |prefix: &[&str]| {
        let mut list = args(prefix);
        list.extend(args(&["--capture-preview", "--filename"]));
        list.push(file.clone());
        list.push("--force-overwrite".to_string());
        list
    };
    [
        preview(&[]),
        preview(&["--set-config", "viewfinder=1"]),
        preview(&["--set-config", "eosviewfinder=1"]),
    ]
}

/// Borrow an owned argument list for [`CommandRunner::run`]
pub fn as_refs(list: &[String]) -> Vec<&str> {
    list.iter().map(String::as_str).collect()
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Whether the tool is installed and answers its version probe
pub fn tool_available(runner: &dyn CommandRunner, tool: &str) -> bool {
    match runner.run(tool, &as_refs(&version()), VERSION_TIMEOUT) {
        Ok(out) if out.success() => {
            let first_line = out.stdout.lines().next().unwrap_or_default();
            debug!(tool, version = %first_line.trim(), "Camera-control tool available");
            true
        }
        Ok(out) => {
            debug!(tool, error = %out.failure_summary(), "Version probe failed");
            false
        }
        Err(e) => {
            debug!(tool, error = %e, "Camera-control tool not usable");
            false
        }
    }
}

/// Whether auto-detect reports a USB-attached camera
pub fn detect_device(runner: &dyn CommandRunner, tool: &str) -> bool {
    match runner.run(tool, &as_refs(&auto_detect()), DETECT_TIMEOUT) {
        Ok(out) if out.success() => {
            let found = usb_lines(&out.stdout).next().is_some();
            if found {
                for line in usb_lines(&out.stdout) {
                    info!(device = %line.trim(), "Camera detected");
                }
            } else {
                info!("No camera detected");
            }
            found
        }
        Ok(out) => {
            info!(error = %out.failure_summary(), "Camera detection failed");
            false
        }
        Err(e) => {
            info!(error = %e, "Camera detection failed");
            false
        }
    }
}

/// Lines of auto-detect output naming a USB port
pub fn usb_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .filter(|line| line.to_lowercase().contains(USB_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::process::CommandOutput;
    use crate::backends::camera::process::testing::ScriptedRunner;

    const DETECT_OUTPUT: &str = "Model                          Port\n\
        ----------------------------------------------------------\n\
        Canon EOS 600D                 usb:001,004\n";

    #[test]
    fn test_preview_variants_share_filename() {
        let path = Path::new("/tmp/preview_1.jpg");
        let variants = preview_variants(path);
        assert_eq!(variants.len(), 3);
        for variant in &variants {
            assert!(variant.iter().any(|a| a == "--capture-preview"));
            assert!(variant.iter().any(|a| a == "/tmp/preview_1.jpg"));
        }
        assert_eq!(variants[1][1], "viewfinder=1");
    }

    #[test]
    fn test_set_config_joins_key_and_value() {
        assert_eq!(set_config("iso", "400"), vec!["--set-config", "iso=400"]);
    }

    #[test]
    fn test_detect_device_requires_usb_marker() {
        let runner = ScriptedRunner::new(|_, _| Ok(CommandOutput::ok(DETECT_OUTPUT)));
        assert!(detect_device(runner.as_ref(), "gphoto2"));

        let empty = ScriptedRunner::new(|_, _| {
            Ok(CommandOutput::ok("Model    Port\n-------------\n"))
        });
        assert!(!detect_device(empty.as_ref(), "gphoto2"));
    }

    #[test]
    fn test_tool_available_swallows_errors() {
        let missing = ScriptedRunner::new(|program, _| {
            Err(crate::backends::camera::process::ProcessError::NotFound(
                program.to_string(),
            ))
        });
        assert!(!tool_available(missing.as_ref(), "gphoto2"));

        let present = ScriptedRunner::new(|_, _| Ok(CommandOutput::ok("gphoto2 2.5.28\n")));
        assert!(tool_available(present.as_ref(), "gphoto2"));
    }
}
