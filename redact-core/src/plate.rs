//! Heuristic license-plate locator.
//!
//! There is no trained plate model, so plates are found geometrically: a Sobel
//! edge mask of a downscaled grayscale copy is scanned with plate-shaped windows in
//! the lower part of the frame. A window qualifies when its aspect ratio is
//! plate-like and the share of edge pixels inside it falls in the band typical of
//! printed characters. Confidence peaks when that share sits in the middle of the
//! band.

use image::{DynamicImage, GrayImage};
use imageproc::gradients::sobel_gradients;
use log::debug;
use redact_utils::{config::PlateSettings, luma_with_max_dimension, timing_guard};

use crate::{
    cancel::CancelToken,
    detection::{BoundingBox, Category, Detection},
    nms::non_max_suppression,
};

pub const PLATE_DETECTOR_NAME: &str = "plate-heuristic";

/// Overlap at which two qualifying windows count as the same plate.
const WINDOW_OVERLAP: f32 = 0.3;
/// Windows smaller than this (in analysed pixels) carry too few edges to judge.
const MIN_WINDOW_HEIGHT: u32 = 6;

/// Binary edge mask with a summed-area table for O(1) window counts.
struct EdgeIntegral {
    width: u32,
    height: u32,
    sums: Vec<u32>,
}

impl EdgeIntegral {
    fn new(gray: &GrayImage, threshold: f32) -> Self {
        let gradients = sobel_gradients(gray);
        let (width, height) = gray.dimensions();
        let stride = width as usize + 1;
        let mut sums = vec![0u32; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row_sum = 0u32;
            for x in 0..width as usize {
                if f32::from(gradients.get_pixel(x as u32, y as u32)[0]) > threshold {
                    row_sum += 1;
                }
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    /// Share of edge pixels inside the window.
    fn density(&self, x: u32, y: u32, w: u32, h: u32) -> f32 {
        let stride = self.width as usize + 1;
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let count = self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0];
        count as f32 / (w * h) as f32
    }
}

/// Scans one image for plate-like regions.
#[derive(Debug, Clone)]
pub struct PlateLocator {
    settings: PlateSettings,
}

impl PlateLocator {
    pub fn new(settings: PlateSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlateSettings {
        &self.settings
    }

    /// Confidence for a window of the given size and edge density, or `None`
    /// when the window falls outside the aspect or density bands.
    pub fn score_window(&self, width: f32, height: f32, edge_density: f32) -> Option<f32> {
        let s = &self.settings;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let aspect = width / height;
        if aspect < s.min_aspect || aspect > s.max_aspect {
            return None;
        }
        if edge_density < s.min_edge_density || edge_density > s.max_edge_density {
            return None;
        }

        let mid = (s.min_edge_density + s.max_edge_density) * 0.5;
        let half_band = (s.max_edge_density - s.min_edge_density) * 0.5;
        let centrality = if half_band > 0.0 {
            (1.0 - (edge_density - mid).abs() / half_band).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Some(s.min_confidence + (s.max_confidence - s.min_confidence) * centrality)
    }

    /// Plate candidates in `image` pixel space, best first, at most
    /// `max_candidates` of them. Returns `None` when cancelled mid-scan.
    pub fn locate(&self, image: &DynamicImage, cancel: &CancelToken) -> Option<Vec<Detection>> {
        if !self.settings.enabled {
            return Some(Vec::new());
        }
        let _guard = timing_guard("redact_core::plate_scan", log::Level::Debug);

        let (gray, back) = luma_with_max_dimension(image, self.settings.analysis_max_dimension);
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Some(Vec::new());
        }
        let edges = EdgeIntegral::new(&gray, self.settings.gradient_threshold);

        let search_top = (self.settings.search_start.clamp(0.0, 1.0) * height as f32).floor() as u32;
        let mut candidates = Vec::new();

        for (win_w, win_h) in self.window_shapes(width, height) {
            if search_top + win_h > height {
                continue;
            }
            let step_x = ((win_h as f32 * self.settings.stride).round() as u32).max(1);
            let step_y = step_x;

            let mut y = search_top;
            while y + win_h <= edges.height {
                if cancel.is_cancelled() {
                    debug!("Plate scan cancelled");
                    return None;
                }
                let mut x = 0;
                while x + win_w <= edges.width {
                    let density = edges.density(x, y, win_w, win_h);
                    if let Some(confidence) =
                        self.score_window(win_w as f32, win_h as f32, density)
                    {
                        candidates.push(Detection {
                            bbox: BoundingBox::new(
                                x as f32 * back,
                                y as f32 * back,
                                win_w as f32 * back,
                                win_h as f32 * back,
                            ),
                            confidence,
                            category: Category::Plate,
                            source_scale: 1.0,
                            source_detector: PLATE_DETECTOR_NAME.to_string(),
                        });
                    }
                    x += step_x;
                }
                y += step_y;
            }
        }

        let windows = candidates.len();
        let mut plates = non_max_suppression(candidates, WINDOW_OVERLAP);
        plates.truncate(self.settings.max_candidates);
        debug!(
            "Plate scan on {width}x{height}: {windows} qualifying windows, {} kept",
            plates.len()
        );
        Some(plates)
    }

    /// Distinct `(width, height)` window sizes for an analysed image.
    fn window_shapes(&self, width: u32, height: u32) -> Vec<(u32, u32)> {
        let mut shapes = Vec::new();
        for &fraction in &self.settings.window_heights {
            let win_h = (fraction * height as f32).round() as u32;
            if win_h < MIN_WINDOW_HEIGHT {
                continue;
            }
            for &aspect in &self.settings.window_aspects {
                let win_w = (win_h as f32 * aspect).round() as u32;
                if win_w == 0 || win_w > width || win_h > height {
                    continue;
                }
                if !shapes.contains(&(win_w, win_h)) {
                    shapes.push((win_w, win_h));
                }
            }
        }
        shapes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

    /// Grey scene with a white plate of dark vertical strokes at `(x, y)`.
    fn scene_with_plate(x: i32, y: i32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([128, 128, 128]));
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(100, 30), Rgb([255, 255, 255]));
        for i in 0..12 {
            draw_filled_rect_mut(
                &mut img,
                Rect::at(x + 6 + i * 8, y + 6).of_size(4, 18),
                Rgb([0, 0, 0]),
            );
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn extreme_aspect_ratio_is_rejected() {
        let locator = PlateLocator::new(PlateSettings::default());
        assert_eq!(locator.score_window(80.0, 10.0, 0.35), None);
        assert!(locator.score_window(40.0, 10.0, 0.35).is_some());
        assert_eq!(locator.score_window(10.0, 10.0, 0.35), None);
    }

    #[test]
    fn density_outside_band_is_rejected() {
        let locator = PlateLocator::new(PlateSettings::default());
        assert_eq!(locator.score_window(30.0, 10.0, 0.1), None);
        assert_eq!(locator.score_window(30.0, 10.0, 0.7), None);
    }

    #[test]
    fn confidence_peaks_at_band_centre() {
        let locator = PlateLocator::new(PlateSettings::default());
        let centre = locator.score_window(30.0, 10.0, 0.375).unwrap();
        let edge = locator.score_window(30.0, 10.0, 0.16).unwrap();
        assert!((centre - 0.8).abs() < 1e-5);
        assert!(edge < centre);
        assert!(edge >= 0.3);
    }

    #[test]
    fn finds_plate_in_lower_half() {
        let image = scene_with_plate(150, 220);
        let plate = BoundingBox::new(150.0, 220.0, 100.0, 30.0);
        let locator = PlateLocator::new(PlateSettings::default());

        let found = locator.locate(&image, &CancelToken::new()).expect("not cancelled");
        assert!(!found.is_empty());
        assert!(found.len() <= 10);
        for det in &found {
            assert_eq!(det.category, Category::Plate);
            assert!(det.bbox.y >= 150.0);
            assert!(det.bbox.iou(&plate) > 0.0, "{:?} misses the plate", det.bbox);
        }
    }

    #[test]
    fn upper_half_is_not_searched() {
        let image = scene_with_plate(150, 40);
        let locator = PlateLocator::new(PlateSettings::default());
        let found = locator.locate(&image, &CancelToken::new()).expect("not cancelled");
        assert!(found.is_empty());
    }

    #[test]
    fn flat_image_has_no_candidates() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([90])));
        let locator = PlateLocator::new(PlateSettings::default());
        assert_eq!(locator.locate(&image, &CancelToken::new()), Some(Vec::new()));
    }

    #[test]
    fn cancelled_scan_returns_none() {
        let token = CancelToken::new();
        token.cancel();
        let locator = PlateLocator::new(PlateSettings::default());
        assert!(locator.locate(&scene_with_plate(150, 220), &token).is_none());
    }

    #[test]
    fn disabled_locator_returns_nothing() {
        let locator = PlateLocator::new(PlateSettings {
            enabled: false,
            ..PlateSettings::default()
        });
        let found = locator.locate(&scene_with_plate(150, 220), &CancelToken::new());
        assert_eq!(found, Some(Vec::new()));
    }
}
