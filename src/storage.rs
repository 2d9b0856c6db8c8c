// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for captured photos

use crate::constants::files::{JPEG_QUALITY, PHOTO_EXTENSION};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Time-stamped default file name, e.g. `photo_1760000000.jpg`
pub fn default_photo_name(prefix: &str, unix_secs: i64) -> String {
    format!("{}_{}.{}", prefix, unix_secs, PHOTO_EXTENSION)
}

/// Where a capture should be written
///
/// A bare file name lands in `photo_dir`; anything with a directory part
/// is used as given. Without a request the default time-stamped name is
/// used. The parent directory is created if needed.
pub fn resolve_capture_path(
    photo_dir: &Path,
    requested: Option<&Path>,
    prefix: &str,
) -> std::io::Result<PathBuf> {
    let path = match requested {
        Some(path) if path.parent().is_some_and(|p| !p.as_os_str().is_empty()) => {
            path.to_path_buf()
        }
        Some(name) => photo_dir.join(name),
        None => photo_dir.join(default_photo_name(prefix, chrono::Utc::now().timestamp())),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Copy a photo into the forwarding folder, keeping its file name
///
/// The original stays in place as a backup.
pub fn forward_copy(source: &Path, folder: &Path) -> std::io::Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;

    std::fs::create_dir_all(folder)?;
    let destination = folder.join(name);
    std::fs::copy(source, &destination)?;
    info!(from = %source.display(), to = %destination.display(), "Photo forwarded");
    Ok(destination)
}

/// Save a frame, using the configured quality for JPEG targets
pub fn save_image(image: &RgbImage, path: &Path) -> image::ImageResult<()> {
    let is_jpeg = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);

    if !is_jpeg {
        return image.save(path);
    }

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(image)?;
    Ok(())
}
