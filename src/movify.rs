//! Movify: turn per-snapshot figure directories into H.264 movies.
//!
//! Every selected leaf directory's `Image_*.png` sequence is decoded,
//! letterboxed onto a 1920x1080 canvas (scaled dimensions padded to even),
//! encoded in-process and muxed into `<movies_root>/<relative>/<leaf>.mp4`.
//! Leaves with no matching images are logged as errors and skipped; the
//! run succeeds if any leaf does.

use anyhow::{Context, Result};
use cluster_common::ClusterError;
use image::imageops::FilterType;
use image::RgbaImage;
use log::{error, info};
use minimp4::Mp4Muxer;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate};
use openh264::formats::YUVBuffer;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Output canvas, h.264-friendly.
const CANVAS_W: u32 = 1920;
const CANVAS_H: u32 = 1080;

/// Outcome counts of one movify run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovifyStats {
    pub encoded: usize,
    pub skipped: usize,
}

/// Collects the `Image_*.png` files of one directory, sorted by name.
pub fn frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("Image_") && n.ends_with(".png"))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Leaf directories (no subdirectories) under a figure tree.
pub fn leaf_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut leaves = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut subdirs = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("cannot read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                subdirs.push(path);
            }
        }
        if subdirs.is_empty() {
            if dir != *root {
                leaves.push(dir);
            }
        } else {
            stack.extend(subdirs);
        }
    }
    leaves.sort();
    Ok(leaves)
}

/// Scales a frame to fit the canvas, pads the scaled size to even pixel
/// counts and centers it on black.
fn letterbox(frame: &RgbaImage) -> RgbaImage {
    let (w, h) = frame.dimensions();
    let scale = (CANVAS_W as f64 / w as f64).min(CANVAS_H as f64 / h as f64);
    let mut sw = ((w as f64 * scale) as u32).min(CANVAS_W);
    let mut sh = ((h as f64 * scale) as u32).min(CANVAS_H);
    // Pad to even, as the 4:2:0 chroma planes demand.
    sw -= sw % 2;
    sh -= sh % 2;
    let scaled = image::imageops::resize(frame, sw.max(2), sh.max(2), FilterType::Triangle);
    let mut canvas = RgbaImage::from_pixel(CANVAS_W, CANVAS_H, image::Rgba([0, 0, 0, 255]));
    let x0 = (CANVAS_W - scaled.width()) / 2;
    let y0 = (CANVAS_H - scaled.height()) / 2;
    image::imageops::overlay(&mut canvas, &scaled, x0 as i64, y0 as i64);
    canvas
}

/// RGB to YUV 4:2:0 conversion (BT.601) for the encoder.
fn rgb_to_yuv420(image: &RgbaImage) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut yuv = vec![0u8; width * height + (width * height) / 2];

    for y in 0..height {
        for x in 0..width {
            let pixel = image.get_pixel(x as u32, y as u32);
            let r = pixel[0] as f32;
            let g = pixel[1] as f32;
            let b = pixel[2] as f32;
            yuv[y * width + x] = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        }
    }

    let u_plane_offset = width * height;
    let v_plane_offset = u_plane_offset + u_plane_offset / 4;
    let uv_width = width / 2;
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let mut sum_u = 0f32;
            let mut sum_v = 0f32;
            let mut count = 0;
            for dy in 0..2 {
                for dx in 0..2 {
                    if y + dy < height && x + dx < width {
                        let pixel = image.get_pixel((x + dx) as u32, (y + dy) as u32);
                        let r = pixel[0] as f32;
                        let g = pixel[1] as f32;
                        let b = pixel[2] as f32;
                        sum_u += -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
                        sum_v += 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
                        count += 1;
                    }
                }
            }
            let uv_idx = (y / 2) * uv_width + x / 2;
            yuv[u_plane_offset + uv_idx] = (sum_u / count as f32).round() as u8;
            yuv[v_plane_offset + uv_idx] = (sum_v / count as f32).round() as u8;
        }
    }
    yuv
}

/// Encodes one leaf directory's frames into an MP4.
pub fn encode_directory(leaf: &Path, out: &Path, framerate: u32) -> Result<()> {
    let frames = frame_files(leaf)?;
    anyhow::ensure!(
        !frames.is_empty(),
        "{} holds no Image_*.png frames",
        leaf.display()
    );

    let mut encoder = Encoder::with_api_config(
        openh264::OpenH264API::from_source(),
        EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(framerate as f32))
            .bitrate(BitRate::from_bps(5_000_000)),
    )
    .context("failed to initialize H.264 encoder")?;

    let mut h264_data = Vec::new();
    for frame_path in &frames {
        let decoded = image::open(frame_path)
            .with_context(|| format!("cannot decode {}", frame_path.display()))?
            .to_rgba8();
        let framed = letterbox(&decoded);
        let yuv = rgb_to_yuv420(&framed);
        let source = YUVBuffer::from_vec(yuv, CANVAS_W as usize, CANVAS_H as usize);
        let bitstream = encoder
            .encode(&source)
            .with_context(|| format!("failed to encode {}", frame_path.display()))?;
        bitstream.write_vec(&mut h264_data);
    }

    let mut video_buffer = Cursor::new(Vec::new());
    let mut muxer = Mp4Muxer::new(&mut video_buffer);
    muxer.init_video(
        CANVAS_W as i32,
        CANVAS_H as i32,
        false,
        &format!("{} ({} frames)", leaf.display(), frames.len()),
    );
    muxer.write_video_with_fps(&h264_data, framerate);
    muxer.close();

    video_buffer.seek(SeekFrom::Start(0))?;
    let mut video_bytes = Vec::new();
    video_buffer.read_to_end(&mut video_bytes)?;
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(out, &video_bytes)
        .with_context(|| format!("failed to write video file {}", out.display()))?;
    info!("encoded {} frames into {}", frames.len(), out.display());
    Ok(())
}

/// Output path of a leaf's movie, mirroring the figure tree under the
/// movies root.
fn movie_path(leaf: &Path, figures_root: &Path, movies_root: &Path) -> PathBuf {
    let leaf_name = leaf.file_name().and_then(|n| n.to_str()).unwrap_or("movie");
    match leaf.parent().and_then(|p| p.strip_prefix(figures_root).ok()) {
        Some(rel) => movies_root.join(rel).join(format!("{leaf_name}.mp4")),
        None => movies_root.join(format!("{leaf_name}.mp4")),
    }
}

/// Encodes a selected set of leaf directories. Empty leaves are logged and
/// skipped; the call fails only when every leaf fails.
pub fn movify(
    leaves: &[PathBuf],
    figures_root: &Path,
    movies_root: &Path,
    framerate: u32,
) -> Result<MovifyStats, ClusterError> {
    if leaves.is_empty() {
        return Err(ClusterError::PipelinePlot(
            "no figure directories selected for movify".into(),
        ));
    }
    let mut stats = MovifyStats::default();
    for leaf in leaves {
        let frames = frame_files(leaf).unwrap_or_default();
        if frames.is_empty() {
            error!("{} holds no Image_*.png frames, skipping", leaf.display());
            stats.skipped += 1;
            continue;
        }
        let out = movie_path(leaf, figures_root, movies_root);
        match encode_directory(leaf, &out, framerate) {
            Ok(()) => stats.encoded += 1,
            Err(e) => {
                error!("encoding {} failed: {e:#}", leaf.display());
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Image_00002.png", "Image_00001.png", "notes.txt", "x.png"] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }
        let frames = frame_files(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Image_00001.png", "Image_00002.png"]);
    }

    #[test]
    fn leaf_directories_finds_the_bottom_of_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("sim_a/rho-(I-true)/01-01-2026_00-00-00");
        std::fs::create_dir_all(&deep).unwrap();
        let shallow = dir.path().join("sim_b");
        std::fs::create_dir_all(&shallow).unwrap();
        let leaves = leaf_directories(dir.path()).unwrap();
        assert!(leaves.contains(&deep));
        assert!(leaves.contains(&shallow));
        assert_eq!(leaves.len(), 2);
    }

    #[test]
    fn empty_directories_are_skipped_not_fatal() {
        let figs = tempfile::tempdir().unwrap();
        let movies = tempfile::tempdir().unwrap();
        let empty = figs.path().join("sim/temp-(I-false)/stamp");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::write(empty.join("readme.txt"), b"no frames here").unwrap();

        let stats = movify(&[empty], figs.path(), movies.path(), 24).unwrap();
        assert_eq!(stats.encoded, 0);
        assert_eq!(stats.skipped, 1);
        // Nothing was produced.
        assert!(std::fs::read_dir(movies.path()).unwrap().next().is_none());
    }

    #[test]
    fn movie_paths_mirror_the_figure_tree() {
        let out = movie_path(
            Path::new("/figs/sim_a/rho-(I-true)/stamp"),
            Path::new("/figs"),
            Path::new("/movies"),
        );
        assert_eq!(out, PathBuf::from("/movies/sim_a/rho-(I-true)/stamp.mp4"));
    }

    #[test]
    fn letterbox_output_is_canvas_sized() {
        let frame = RgbaImage::from_pixel(901, 733, image::Rgba([10, 20, 30, 255]));
        let boxed = letterbox(&frame);
        assert_eq!(boxed.dimensions(), (CANVAS_W, CANVAS_H));
    }

    #[test]
    fn yuv_buffer_has_420_layout() {
        let frame = RgbaImage::from_pixel(16, 8, image::Rgba([255, 0, 0, 255]));
        let yuv = rgb_to_yuv420(&frame);
        assert_eq!(yuv.len(), 16 * 8 * 3 / 2);
        // Pure red: Y ~ 76, U ~ 85, V ~ 255 under BT.601.
        assert!((yuv[0] as i32 - 76).abs() <= 2);
    }
}
