// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Status and configuration output
//! - Taking photos
//! - Reading and changing DSLR settings
//! - USB remediation, connection reset and diagnostics

use photobox::backends::camera::dslr::usb::{self, SetupStep, UsbConflictResolver};
use photobox::backends::camera::process::SystemCommandRunner;
use photobox::backends::camera::webcam::SystemFrameSourceOpener;
use photobox::backends::camera::{BackendKind, CameraBackendManager, SettingKey};
use photobox::config::Config;
use photobox::constants::dslr::CONFIG_LIST_LIMIT;
use photobox::constants::usb::{REAUTHORIZE_DELAY, SYSFS_USB_DEVICES};
use std::path::Path;
use photobox::diagnostics;
use std::path::PathBuf;
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// How long `photo` waits for the synthetic camera's first frame
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

fn open_camera(config: &Config) -> Result<CameraBackendManager, Box<dyn std::error::Error>> {
    Ok(CameraBackendManager::initialize(config.backend, config)?)
}

/// Print the status record as JSON
pub fn show_status(config: &Config) -> CliResult {
    let camera = open_camera(config)?;
    println!("{}", serde_json::to_string_pretty(&camera.status())?);
    camera.shutdown();
    Ok(())
}

/// Take a single photo
pub fn take_photo(config: &Config, output: Option<PathBuf>) -> CliResult {
    let camera = open_camera(config)?;
    println!("Using camera: {}", camera.kind().display_name());

    // The synthetic camera saves its latest rendered frame, so it needs one
    if camera.kind() == BackendKind::Synthetic {
        camera.start_live_view()?;
        let start = Instant::now();
        while camera.latest_frame().is_none() {
            if start.elapsed() > FIRST_FRAME_TIMEOUT {
                camera.shutdown();
                return Err("No frame produced by the synthetic camera".into());
            }
            std::thread::sleep(Duration::from_millis(16));
        }
    }

    println!("Capturing...");
    let result = camera.capture(output.as_deref());
    camera.shutdown();
    let photo = result?;

    println!("Photo saved: {}", photo.path.display());
    if let Some(copy) = photo.forwarded_to {
        println!("Forwarded to: {}", copy.display());
    }
    Ok(())
}

/// List, describe or change camera settings
pub fn settings(config: &Config, name: Option<String>, value: Option<String>) -> CliResult {
    let camera = open_camera(config)?;

    let result = match (name, value) {
        (Some(name), Some(value)) => camera.set_setting(&name, &value).map(|()| {
            println!("{} set to {}", name, value);
        }),
        (Some(name), None) => camera.describe_setting(&name).map(|descriptor| {
            println!(
                "{}: {}",
                descriptor.label.as_deref().unwrap_or(&descriptor.name),
                descriptor.current.as_deref().unwrap_or("unknown")
            );
            for choice in &descriptor.choices {
                let marker = if Some(choice) == descriptor.current.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!("  {} {}", marker, choice);
            }
        }),
        (None, _) => {
            let cached = camera.settings();
            if cached.is_empty() {
                println!("No settings available on the {}", camera.kind().display_name());
            }
            for key in SettingKey::ALL {
                if let Some(value) = cached.get(key.as_str()) {
                    println!("{:<14} {}", key.as_str(), value);
                }
            }
            match camera.list_config_keys(CONFIG_LIST_LIMIT) {
                Ok(keys) if !keys.is_empty() => {
                    println!();
                    println!("Configuration keys (first {}):", CONFIG_LIST_LIMIT);
                    for key in keys {
                        println!("  {}", key);
                    }
                }
                _ => {}
            }
            Ok(())
        }
    };

    camera.shutdown();
    Ok(result?)
}

/// Optional host-level steps for `fix-usb`
#[derive(Debug, Default)]
pub struct UsbFixOptions {
    pub disable_automount: bool,
    /// Directory receiving the generated udev rules
    pub udev_rules: Option<PathBuf>,
    pub reset_usb: bool,
}

fn print_steps(title: &str, steps: &[SetupStep]) {
    println!("{}:", title);
    if steps.is_empty() {
        println!("  nothing to do");
    }
    for step in steps {
        let marker = if step.succeeded { "ok" } else { "FAILED" };
        println!("  [{}] {}", marker, step.description);
    }
}

/// Terminate services holding the camera and re-detect it
///
/// The optional steps run first, so a reset device is not grabbed again by
/// a service that is only stopped afterwards.
pub fn fix_usb(config: &Config, options: UsbFixOptions) -> CliResult {
    let runner = SystemCommandRunner::shared()?;
    let resolver =
        UsbConflictResolver::new(runner.clone(), &config.dslr.tool, config.dslr.usb_settle);

    if options.disable_automount {
        print_steps("Desktop automount", &resolver.disable_automount());
    }
    if let Some(dir) = &options.udev_rules {
        let path = usb::write_udev_rules(dir)?;
        println!("udev rules written to {}. To install:", path.display());
        println!("  sudo cp {} /etc/udev/rules.d/", path.display());
        println!("  sudo udevadm control --reload-rules");
        println!("  sudo udevadm trigger");
    }
    if options.reset_usb {
        let steps =
            resolver.reset_camera_devices(Path::new(SYSFS_USB_DEVICES), REAUTHORIZE_DELAY);
        print_steps("USB reset", &steps);
    }

    let camera = CameraBackendManager::initialize_with(
        config.backend,
        config,
        runner,
        &SystemFrameSourceOpener,
    )?;
    let result = camera.resolve_usb_conflict();
    camera.shutdown();
    let resolution = result?;

    for service in &resolution.terminated {
        println!("Stopped {}", service);
    }
    for service in &resolution.still_running {
        println!("Still running: {}", service);
    }
    if resolution.resolved() {
        println!("Camera detected.");
        Ok(())
    } else {
        Err("Camera still not detected; try reconnecting the USB cable".into())
    }
}

/// Release and re-detect the camera
pub fn reset(config: &Config) -> CliResult {
    let camera = open_camera(config)?;
    let result = camera.reset_connection();
    camera.shutdown();
    result?;
    println!("Camera connection reset.");
    Ok(())
}

/// Switch the DSLR back to manual (PTP) control
pub fn manual(config: &Config) -> CliResult {
    let camera = open_camera(config)?;
    let result = camera.enable_manual_control();
    camera.shutdown();
    result?;
    println!("Camera switched to manual control.");
    Ok(())
}

/// Run the diagnostics report against the DSLR tool
pub fn diagnose(config: &Config) -> CliResult {
    let runner = SystemCommandRunner::new()?;
    let report = diagnostics::run(&runner, &config.dslr.tool);
    print!("{}", report.to_markdown());

    if report.passed() {
        Ok(())
    } else {
        Err("Diagnostics found problems".into())
    }
}

/// Print the effective configuration, optionally persisting it
pub fn show_config(config: &Config, save: bool) -> CliResult {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        let path = config.save()?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
