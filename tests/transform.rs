use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::path::Path;
use thumbcache::cache::ThumbnailStore;
use thumbcache::config::ThumbCacheConfig;
use thumbcache::transform::{decode_image, encode_image, thumbnail};
use thumbcache::{ResizeMode, ThumbCacheError, TransformSpec};

fn gradient(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 128])))
}

fn save(img: &DynamicImage, path: &Path) {
    img.save(path).unwrap();
}

#[test]
fn outbound_fills_box_exactly() {
    let out = thumbnail(&gradient(200, 100), 50, 50, ResizeMode::Outbound);
    assert_eq!(out.dimensions(), (50, 50));
}

#[test]
fn inset_fits_inside_box() {
    let out = thumbnail(&gradient(200, 100), 50, 50, ResizeMode::Inset);
    assert_eq!(out.dimensions(), (50, 25));
}

#[test]
fn small_sources_are_not_upscaled() {
    for mode in [ResizeMode::Outbound, ResizeMode::Inset] {
        let out = thumbnail(&gradient(40, 30), 100, 100, mode);
        assert_eq!(out.dimensions(), (40, 30), "{mode}");
    }
}

#[test]
fn outbound_box_is_clamped_to_source() {
    let out = thumbnail(&gradient(200, 100), 150, 150, ResizeMode::Outbound);
    assert_eq!(out.dimensions(), (150, 100));
}

#[test]
fn encodes_every_output_format() {
    let img = gradient(32, 32);
    for fmt in [image::ImageFormat::Jpeg, image::ImageFormat::Png, image::ImageFormat::WebP] {
        let out = encode_image(&img, fmt, 80).unwrap();
        assert!(!out.is_empty(), "{fmt:?}");
        assert_eq!(image::guess_format(&out).unwrap(), fmt);
    }
}

#[test]
fn jpeg_quality_changes_output_size() {
    let img = gradient(128, 128);
    let low = encode_image(&img, image::ImageFormat::Jpeg, 5).unwrap();
    let high = encode_image(&img, image::ImageFormat::Jpeg, 95).unwrap();
    assert!(low.len() < high.len());
}

#[test]
fn store_writes_real_thumbnails() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("photo.jpg");
    save(&gradient(100, 100), &source);

    let config = ThumbCacheConfig { cache_root: dir.path().to_path_buf(), ..Default::default() };
    let store = ThumbnailStore::new(config).unwrap();

    let outbound = store.generate(&source, &TransformSpec::new(50, 50, ResizeMode::Outbound)).unwrap();
    let inset = store.generate(&source, &TransformSpec::new(50, 50, ResizeMode::Inset)).unwrap();
    assert_ne!(outbound, inset);

    let shard = outbound.parent().unwrap();
    assert_eq!(shard.parent().unwrap(), dir.path().join("upload/thumb"));
    assert_eq!(outbound.extension().unwrap(), "jpg");

    let (decoded, format) = decode_image(&outbound).unwrap();
    assert_eq!(decoded.dimensions(), (50, 50));
    assert_eq!(format, Some(image::ImageFormat::Jpeg));
}

#[test]
fn png_source_stays_png() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("icon.png");
    save(&gradient(80, 40), &source);

    let config = ThumbCacheConfig { cache_root: dir.path().to_path_buf(), ..Default::default() };
    let store = ThumbnailStore::new(config).unwrap();
    let path = store.generate(&source, &TransformSpec::new(20, 20, ResizeMode::Inset)).unwrap();

    let (decoded, format) = decode_image(&path).unwrap();
    assert_eq!(format, Some(image::ImageFormat::Png));
    assert_eq!(decoded.dimensions(), (20, 10));
}

#[test]
fn undecodable_source_is_processing_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("fake.jpg");
    std::fs::write(&source, b"this is not an image").unwrap();

    let config = ThumbCacheConfig { cache_root: dir.path().to_path_buf(), ..Default::default() };
    let store = ThumbnailStore::new(config).unwrap();
    let err = store
        .generate(&source, &TransformSpec::new(20, 20, ResizeMode::Outbound))
        .unwrap_err();
    assert!(matches!(err, ThumbCacheError::Processing(_)), "{err:?}");
}
