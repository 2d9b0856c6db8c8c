// SPDX-License-Identifier: MPL-2.0

//! Integration tests for photo naming and forwarding

use photobox::storage;
use std::path::Path;

#[test]
fn test_default_photo_name() {
    assert_eq!(
        storage::default_photo_name("photo", 1_760_000_000),
        "photo_1760000000.jpg"
    );
}

#[test]
fn test_bare_name_lands_in_photo_dir() {
    let dir = tempfile::tempdir().unwrap();
    let photo_dir = dir.path().join("photos");

    let path =
        storage::resolve_capture_path(&photo_dir, Some(Path::new("shot.jpg")), "photo").unwrap();
    assert_eq!(path, photo_dir.join("shot.jpg"));
    assert!(photo_dir.is_dir(), "Photo directory should be created");
}

#[test]
fn test_path_with_directory_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let requested = dir.path().join("elsewhere").join("shot.jpg");

    let path = storage::resolve_capture_path(Path::new("/unused"), Some(&requested), "photo")
        .unwrap();
    assert_eq!(path, requested);
    assert!(dir.path().join("elsewhere").is_dir());
}

#[test]
fn test_default_name_uses_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = storage::resolve_capture_path(dir.path(), None, "webcam_photo").unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("webcam_photo_"), "{}", name);
    assert!(name.ends_with(".jpg"));
    assert_eq!(path.parent(), Some(dir.path()));
}

#[test]
fn test_forward_copy_keeps_name_and_original() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("photo_1.jpg");
    std::fs::write(&original, b"jpeg bytes").unwrap();
    let outbox = dir.path().join("outbox");

    let copy = storage::forward_copy(&original, &outbox).unwrap();

    assert_eq!(copy, outbox.join("photo_1.jpg"));
    assert_eq!(std::fs::read(&copy).unwrap(), b"jpeg bytes");
    assert!(original.exists(), "Original must stay as a backup");
}

#[test]
fn test_forward_copy_of_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = storage::forward_copy(&dir.path().join("gone.jpg"), &dir.path().join("out"));
    assert!(result.is_err());
}

#[test]
fn test_save_image_writes_decodable_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.jpg");
    let image = image::RgbImage::from_pixel(32, 24, image::Rgb([10, 120, 240]));

    storage::save_image(&image, &path).unwrap();

    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 24));
}
