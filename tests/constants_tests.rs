// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use photobox::constants::{dslr, files, gphoto, synthetic, timing, usb};
use std::time::Duration;

#[test]
fn test_dslr_live_view_cadence() {
    assert_eq!(dslr::PREVIEW_INTERVAL, Duration::from_millis(500));
    assert!(dslr::FAILURE_BUDGET > 1, "A single bad frame must not stop live view");
    assert!(dslr::PREVIEW_FILE_ROTATION >= 2);
}

#[test]
fn test_preview_fits_inside_interval_budget() {
    // One preview attempt must be able to time out well before capture does
    assert!(gphoto::PREVIEW_TIMEOUT < gphoto::CAPTURE_TIMEOUT);
    assert!(gphoto::VERSION_TIMEOUT <= gphoto::DETECT_TIMEOUT);
}

#[test]
fn test_conflicting_services_are_volume_monitors() {
    assert!(!usb::CONFLICTING_SERVICES.is_empty());
    assert!(usb::CONFLICTING_SERVICES.contains(&"gvfs-gphoto2-volume-monitor"));
    for service in usb::CONFLICTING_SERVICES {
        assert!(service.ends_with("volume-monitor"), "{}", service);
    }
}

#[test]
fn test_synthetic_rate_in_placeholder_range() {
    assert!((30..=60).contains(&synthetic::FPS));
}

#[test]
fn test_terminal_refresh_is_about_60hz() {
    assert!(timing::TERMINAL_POLL_INTERVAL <= Duration::from_millis(20));
    assert!(timing::STOP_POLL_INTERVAL < dslr::PREVIEW_INTERVAL);
}

#[test]
fn test_photo_prefixes_are_distinct() {
    let prefixes = [files::DSLR_PREFIX, files::WEBCAM_PREFIX, files::SYNTHETIC_PREFIX];
    for (i, a) in prefixes.iter().enumerate() {
        for b in &prefixes[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert!(files::JPEG_QUALITY > 80 && files::JPEG_QUALITY <= 100);
}
