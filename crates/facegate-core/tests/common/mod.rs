#![allow(dead_code)]

use facegate_core::{AnalyzerError, BoundingBox, Embedding, FaceAnalysis, FaceAnalyzer};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Analyzer that answers by image size, so tests pick a scenario by
/// choosing the dimensions of the image they write.
#[derive(Default, Clone)]
pub struct SizeKeyedAnalyzer {
    faces: HashMap<(u32, u32), Vec<Vec<f32>>>,
    failing: Vec<(u32, u32)>,
    calls: Arc<AtomicUsize>,
}

impl SizeKeyedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, size: (u32, u32), embeddings: Vec<Vec<f32>>) -> Self {
        self.faces.insert(size, embeddings);
        self
    }

    pub fn failing_on(mut self, size: (u32, u32)) -> Self {
        self.failing.push(size);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl FaceAnalyzer for SizeKeyedAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<FaceAnalysis, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let size = image.dimensions();
        if self.failing.contains(&size) {
            return Err(AnalyzerError::InferenceFailed(format!("no tensor for {size:?}")));
        }
        let embeddings = self.faces.get(&size).cloned().unwrap_or_default();
        Ok(FaceAnalysis {
            regions: embeddings
                .iter()
                .enumerate()
                .map(|(i, _)| BoundingBox {
                    x: 10.0 * i as f32,
                    y: 10.0,
                    width: 30.0,
                    height: 30.0,
                    confidence: 0.9,
                    landmarks: None,
                })
                .collect(),
            embeddings: embeddings.into_iter().map(Embedding::new).collect(),
        })
    }
}

pub fn write_rgb(dir: &Path, name: &str, size: (u32, u32)) -> PathBuf {
    let path = dir.join(name);
    let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Png);
    DynamicImage::ImageRgb8(RgbImage::new(size.0, size.1))
        .save_with_format(&path, format)
        .unwrap();
    path
}

pub fn write_gray(dir: &Path, name: &str, size: (u32, u32)) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::ImageLuma8(GrayImage::new(size.0, size.1))
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

pub fn png_bytes(size: (u32, u32)) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(size.0, size.1))
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
