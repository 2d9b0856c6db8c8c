// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application name used for config and output directories
pub const APP_NAME: &str = "photobox";

/// Crate version with git suffix, stamped by build.rs
pub fn app_version() -> &'static str {
    env!("GIT_VERSION")
}

/// External camera-control tool (gphoto2) invocation constants
pub mod gphoto {
    use super::Duration;

    /// Default program name, resolved through PATH
    pub const DEFAULT_TOOL: &str = "gphoto2";

    /// `--version` probe
    pub const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

    /// `--auto-detect` probe
    pub const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// One `--capture-preview` attempt
    pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(3);

    /// `--capture-image-and-download`
    pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

    /// `--get-config` / `--list-config`
    pub const CONFIG_TIMEOUT: Duration = Duration::from_secs(10);

    /// `--set-config`
    pub const SET_CONFIG_TIMEOUT: Duration = Duration::from_secs(5);

    /// `--summary`
    pub const SUMMARY_TIMEOUT: Duration = Duration::from_secs(15);

    /// `--exit` release command
    pub const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Marker in auto-detect output identifying a USB-attached camera
    pub const USB_MARKER: &str = "usb:";

    /// Substring in the error stream identifying a USB claim conflict
    pub const CLAIM_CONFLICT_MARKER: &str = "could not claim";

    /// Config key holding the capture (remote control) mode
    pub const CAPTURE_MODE_KEY: &str = "capture";
}

/// DSLR live view policy
pub mod dslr {
    use super::Duration;

    /// Live view cadence: 2 frames per second
    pub const PREVIEW_INTERVAL: Duration = Duration::from_millis(500);

    /// Consecutive failed cycles before live view gives up
    pub const FAILURE_BUDGET: u32 = 5;

    /// Number of temp file names rotated between cycles
    pub const PREVIEW_FILE_ROTATION: u64 = 3;

    /// Preview frames wider than this are downscaled
    pub const MAX_PREVIEW_WIDTH: u32 = 1920;

    /// Wait after `--exit` before re-detecting
    pub const RESET_SETTLE: Duration = Duration::from_secs(2);

    /// Number of config keys kept from `--list-config` for display
    pub const CONFIG_LIST_LIMIT: usize = 20;
}

/// USB conflict remediation
pub mod usb {
    use super::Duration;

    /// Background services known to claim cameras exclusively
    pub const CONFLICTING_SERVICES: &[&str] = &[
        "gvfs-gphoto2-volume-monitor",
        "gvfs-mtp-volume-monitor",
        "gvfs-afc-volume-monitor",
        "gvfs-goa-volume-monitor",
    ];

    /// Wait for the device to settle after terminating services
    pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

    /// Timeout for pgrep/pkill/systemctl invocations
    pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

    /// USB vendor ids of supported camera makers, with display names
    pub const CAMERA_VENDORS: &[(&str, &str)] = &[("04a9", "Canon"), ("04b0", "Nikon")];

    /// GNOME schema controlling removable media handling
    pub const MEDIA_HANDLING_SCHEMA: &str = "org.gnome.desktop.media-handling";

    /// Keys written to stop the desktop from mounting cameras
    pub const AUTOMOUNT_OVERRIDES: &[(&str, &str)] = &[
        ("automount", "false"),
        ("automount-open", "false"),
        ("autorun-never", "true"),
    ];

    /// File name of the generated udev rules
    pub const UDEV_RULES_FILE: &str = "99-camera-gphoto2.rules";

    /// Where the kernel exposes USB devices
    pub const SYSFS_USB_DEVICES: &str = "/sys/bus/usb/devices";

    /// Pause between de- and re-authorizing a device
    pub const REAUTHORIZE_DELAY: Duration = Duration::from_secs(1);
}

/// Webcam (frame-grabber) defaults
pub mod webcam {
    /// Device index probed and opened
    pub const DEVICE_INDEX: u32 = 0;

    pub const WIDTH: u32 = 640;
    pub const HEIGHT: u32 = 480;
    pub const FPS: u32 = 60;

    /// Minimal driver-side buffering for low latency
    pub const BUFFER_COUNT: u32 = 1;
}

/// Synthetic backend defaults
pub mod synthetic {
    pub const WIDTH: u32 = 640;
    pub const HEIGHT: u32 = 480;

    /// Placeholder frame rate (30-60 fps range)
    pub const FPS: u32 = 30;

    /// Fake exposure caption rendered on placeholder frames
    pub const EXPOSURE_CAPTION: &str = "ISO: 100 | f/5.6 | 1/60s";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Granularity of interruptible sleeps in capture loops
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Terminal viewer refresh timer (~60 Hz)
    pub const TERMINAL_POLL_INTERVAL: Duration = Duration::from_millis(16);
}

/// Output file naming
pub mod files {
    /// Still photos taken by the DSLR backend
    pub const DSLR_PREFIX: &str = "photo";

    /// Still photos taken by the webcam backend
    pub const WEBCAM_PREFIX: &str = "webcam_photo";

    /// Still photos taken by the synthetic backend
    pub const SYNTHETIC_PREFIX: &str = "dummy_photo";

    /// Extension for all still captures
    pub const PHOTO_EXTENSION: &str = "jpg";

    /// JPEG quality for stills encoded in-process
    pub const JPEG_QUALITY: u8 = 92;
}
