//! Camera module for pan/zoom transforms.
//!
//! Coordinates are viewport-centered: the world origin sits in the middle of
//! the viewport when the camera is at rest.
//!
//! ```text
//! world  = (screen - viewport / 2) / zoom - pan
//! screen = (world + pan) * zoom + viewport / 2
//! ```

use crate::config::CameraConfig;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Default minimum zoom level.
pub const DEFAULT_MIN_ZOOM: f64 = 0.1;
/// Default maximum zoom level.
pub const DEFAULT_MAX_ZOOM: f64 = 5.0;

/// Camera manages the view transform for the canvas.
///
/// It handles panning (translation) and zooming (scaling) operations,
/// converting between screen coordinates and world coordinates, and builds
/// the view-projection matrix consumed by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredCamera")]
pub struct Camera {
    /// World-space pan offset along X.
    pub x: f64,
    /// World-space pan offset along Y.
    pub y: f64,
    /// Current zoom level, always within `[min_zoom, max_zoom]`.
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    /// Viewport width in screen pixels.
    #[serde(skip)]
    pub viewport_width: f64,
    /// Viewport height in screen pixels.
    #[serde(skip)]
    pub viewport_height: f64,
    /// Device pixels per screen pixel.
    #[serde(skip)]
    pub device_pixel_ratio: f64,
}

/// Persisted camera fields, validated on the way in.
#[derive(Deserialize)]
#[serde(default)]
struct StoredCamera {
    x: f64,
    y: f64,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
}

impl Default for StoredCamera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

impl From<StoredCamera> for Camera {
    fn from(stored: StoredCamera) -> Self {
        let mut camera = Camera::default();
        camera.set_zoom_limits(stored.min_zoom, stored.max_zoom);
        camera.set_position(
            if stored.x.is_finite() { stored.x } else { 0.0 },
            if stored.y.is_finite() { stored.y } else { 0.0 },
        );
        camera.set_zoom(stored.zoom);
        camera
    }
}

/// Order a pair of zoom limits, replacing unusable values with the defaults.
fn normalize_limits(min_zoom: f64, max_zoom: f64) -> (f64, f64) {
    let usable = |z: f64| z.is_finite() && z > 0.0;
    let min = if usable(min_zoom) { min_zoom } else { DEFAULT_MIN_ZOOM };
    let max = if usable(max_zoom) { max_zoom } else { DEFAULT_MAX_ZOOM };
    if min <= max { (min, max) } else { (max, min) }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            viewport_width: 0.0,
            viewport_height: 0.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera using the zoom limits from config.
    pub fn with_config(config: &CameraConfig) -> Self {
        let mut camera = Self::default();
        camera.set_zoom_limits(config.min_zoom, config.max_zoom);
        camera
    }

    /// Current zoom level.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    /// Change the zoom limits and re-clamp the current zoom.
    ///
    /// Limits given in the wrong order are swapped; non-positive or
    /// non-finite limits fall back to the defaults.
    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) {
        let (min, max) = normalize_limits(min_zoom, max_zoom);
        self.min_zoom = min;
        self.max_zoom = max;
        self.zoom = self.zoom.clamp(min, max);
    }

    /// Update the viewport size (screen pixels) and device pixel ratio.
    pub fn set_viewport(&mut self, width: f64, height: f64, device_pixel_ratio: f64) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.device_pixel_ratio = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.zoom;
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Pan the camera by a delta in screen coordinates.
    ///
    /// The delta is divided by zoom so content tracks the pointer 1:1.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.x += dx / self.zoom;
        self.y += dy / self.zoom;
    }

    /// Zoom by `factor`, keeping the world point under the given screen point fixed.
    pub fn zoom_at(&mut self, factor: f64, screen_x: f64, screen_y: f64) {
        let new_zoom = self.clamp_zoom(self.zoom * factor);
        if new_zoom == self.zoom {
            return;
        }

        let world_x = self.screen_to_world_x(screen_x);
        let world_y = self.screen_to_world_y(screen_y);

        self.zoom = new_zoom;

        // Solve screen = (world + pan) * zoom + viewport / 2 for pan
        self.x = (screen_x - self.viewport_width / 2.0) / self.zoom - world_x;
        self.y = (screen_y - self.viewport_height / 2.0) / self.zoom - world_y;
    }

    /// Set the zoom level directly (clamped).
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = self.clamp_zoom(zoom);
    }

    /// Set the pan offset directly.
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    /// Reset camera to the origin at 100% zoom.
    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.zoom = self.clamp_zoom(1.0);
    }

    pub fn screen_to_world_x(&self, screen_x: f64) -> f64 {
        (screen_x - self.viewport_width / 2.0) / self.zoom - self.x
    }

    pub fn screen_to_world_y(&self, screen_y: f64) -> f64 {
        (screen_y - self.viewport_height / 2.0) / self.zoom - self.y
    }

    pub fn world_to_screen_x(&self, world_x: f64) -> f64 {
        (world_x + self.x) * self.zoom + self.viewport_width / 2.0
    }

    pub fn world_to_screen_y(&self, world_y: f64) -> f64 {
        (world_y + self.y) * self.zoom + self.viewport_height / 2.0
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            self.screen_to_world_x(screen_point.x),
            self.screen_to_world_y(screen_point.y),
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            self.world_to_screen_x(world_point.x),
            self.world_to_screen_y(world_point.y),
        )
    }

    /// The world-space rectangle currently visible in the viewport.
    pub fn visible_world_rect(&self) -> Rect {
        Rect::from_points(
            self.screen_to_world(Point::ZERO),
            self.screen_to_world(Point::new(self.viewport_width, self.viewport_height)),
        )
    }

    /// Build the column-major view-projection matrix for the renderer.
    ///
    /// The view step maps world coordinates to device pixels (zoom and device
    /// pixel ratio folded in), the projection maps device pixels to clip space
    /// with Y flipped because canvas Y grows downward.
    pub fn view_projection_matrix(&self) -> [f32; 16] {
        let dpr = self.device_pixel_ratio;
        let device_width = (self.viewport_width * dpr).max(1.0);
        let device_height = (self.viewport_height * dpr).max(1.0);

        // World -> device pixels
        let view_scale = self.zoom * dpr;
        let view_tx = (self.x * self.zoom + self.viewport_width / 2.0) * dpr;
        let view_ty = (self.y * self.zoom + self.viewport_height / 2.0) * dpr;

        // Device pixels -> clip space
        let proj_sx = 2.0 / device_width;
        let proj_sy = -2.0 / device_height;

        let sx = view_scale * proj_sx;
        let sy = view_scale * proj_sy;
        let tx = view_tx * proj_sx - 1.0;
        let ty = view_ty * proj_sy + 1.0;

        [
            sx as f32, 0.0, 0.0, 0.0, //
            0.0, sy as f32, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            tx as f32, ty as f32, 0.0, 1.0,
        ]
    }

    /// Fit the camera to show the given bounding box with padding (world units).
    pub fn fit_bounds(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64, padding: f64) {
        let padded_width = (max_x - min_x) + padding * 2.0;
        let padded_height = (max_y - min_y) + padding * 2.0;

        let scale_x = self.viewport_width / padded_width;
        let scale_y = self.viewport_height / padded_height;
        let fitted = scale_x.min(scale_y);
        self.zoom = if fitted.is_nan() {
            self.clamp_zoom(1.0)
        } else {
            self.clamp_zoom(fitted)
        };

        // Center the bounds' centroid in the viewport
        self.x = -(min_x + max_x) / 2.0;
        self.y = -(min_y + max_y) / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_800x600() -> Camera {
        let mut camera = Camera::new();
        camera.set_viewport(800.0, 600.0, 1.0);
        camera
    }

    #[test]
    fn test_default_camera() {
        let camera = Camera::new();
        assert_eq!(camera.x, 0.0);
        assert_eq!(camera.y, 0.0);
        assert!((camera.zoom() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_viewport_center_is_world_origin() {
        let camera = camera_800x600();
        assert!(camera.screen_to_world_x(400.0).abs() < f64::EPSILON);
        assert!(camera.screen_to_world_y(300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_screen_to_world_with_pan_and_zoom() {
        let mut camera = camera_800x600();
        camera.set_position(50.0, -20.0);
        camera.set_zoom(2.0);
        // (500 - 400) / 2 - 50 = 0
        assert!(camera.screen_to_world_x(500.0).abs() < 1e-10);
        // (300 - 300) / 2 + 20 = 20
        assert!((camera.screen_to_world_y(300.0) - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut camera = camera_800x600();
        camera.set_position(30.0, -20.0);
        camera.set_zoom(1.5);

        let original = Point::new(123.0, 456.0);
        let back = camera.world_to_screen(camera.screen_to_world(original));

        assert!((back.x - original.x).abs() < 1e-10);
        assert!((back.y - original.y).abs() < 1e-10);
    }

    #[test]
    fn test_pan_scales_with_zoom() {
        let mut camera = camera_800x600();
        camera.set_zoom(2.0);
        let before = camera.world_to_screen_x(10.0);
        camera.pan(40.0, 10.0);
        assert!((camera.x - 20.0).abs() < f64::EPSILON);
        assert!((camera.y - 5.0).abs() < f64::EPSILON);
        // On-screen motion matches pointer motion
        assert!((camera.world_to_screen_x(10.0) - before - 40.0).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut camera = camera_800x600();
        camera.zoom_at(0.001, 0.0, 0.0);
        assert!((camera.zoom() - camera.min_zoom()).abs() < f64::EPSILON);

        camera.set_zoom(1.0);
        camera.zoom_at(1000.0, 0.0, 0.0);
        assert!((camera.zoom() - camera.max_zoom()).abs() < f64::EPSILON);

        camera.set_zoom(-3.0);
        assert!((camera.zoom() - camera.min_zoom()).abs() < f64::EPSILON);

        camera.set_zoom(f64::NAN);
        assert!((camera.zoom() - camera.min_zoom()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_never_leaves_range() {
        let mut camera = camera_800x600();
        let factors = [1.7, 3.0, 0.2, 0.05, 9.0, 1.0, 0.5, 40.0, 0.01];
        for (i, factor) in factors.iter().enumerate() {
            camera.zoom_at(*factor, i as f64 * 37.0, 600.0 - i as f64 * 11.0);
            assert!(camera.zoom() >= camera.min_zoom());
            assert!(camera.zoom() <= camera.max_zoom());
            camera.set_zoom(camera.zoom() * factor);
            assert!(camera.zoom() >= camera.min_zoom());
            assert!(camera.zoom() <= camera.max_zoom());
        }
    }

    #[test]
    fn test_zoom_at_keeps_anchor_under_cursor() {
        let mut camera = camera_800x600();
        camera.set_position(12.0, -40.0);
        let (sx, sy) = (620.0, 145.0);
        let world_x = camera.screen_to_world_x(sx);
        let world_y = camera.screen_to_world_y(sy);

        camera.zoom_at(1.25, sx, sy);
        assert!((camera.zoom() - 1.25).abs() < 1e-12);
        assert!((camera.screen_to_world_x(sx) - world_x).abs() < 1e-9);
        assert!((camera.screen_to_world_y(sy) - world_y).abs() < 1e-9);

        camera.zoom_at(0.3, sx, sy);
        assert!((camera.screen_to_world_x(sx) - world_x).abs() < 1e-9);
        assert!((camera.screen_to_world_y(sy) - world_y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_at_noop_when_clamped() {
        let mut camera = camera_800x600();
        camera.set_zoom(camera.max_zoom());
        camera.set_position(5.0, 6.0);
        camera.zoom_at(2.0, 10.0, 10.0);
        assert_eq!(camera.x, 5.0);
        assert_eq!(camera.y, 6.0);
    }

    #[test]
    fn test_reset() {
        let mut camera = camera_800x600();
        camera.pan(100.0, 100.0);
        camera.set_zoom(3.0);
        camera.reset();
        assert_eq!(camera.x, 0.0);
        assert_eq!(camera.y, 0.0);
        assert!((camera.zoom() - 1.0).abs() < f64::EPSILON);
    }

    fn apply(m: &[f32; 16], x: f64, y: f64) -> (f32, f32) {
        let (x, y) = (x as f32, y as f32);
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }

    #[test]
    fn test_view_projection_maps_viewport_corners() {
        let mut camera = camera_800x600();
        camera.set_position(25.0, 10.0);
        camera.set_zoom(2.0);
        let m = camera.view_projection_matrix();

        let top_left = camera.screen_to_world(Point::new(0.0, 0.0));
        let (cx, cy) = apply(&m, top_left.x, top_left.y);
        assert!((cx + 1.0).abs() < 1e-5);
        assert!((cy - 1.0).abs() < 1e-5);

        let bottom_right = camera.screen_to_world(Point::new(800.0, 600.0));
        let (cx, cy) = apply(&m, bottom_right.x, bottom_right.y);
        assert!((cx - 1.0).abs() < 1e-5);
        assert!((cy + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_view_projection_independent_of_pixel_ratio() {
        let mut camera = camera_800x600();
        camera.set_position(-13.0, 7.0);
        camera.set_zoom(0.75);
        let standard = camera.view_projection_matrix();
        camera.set_viewport(800.0, 600.0, 2.0);
        let retina = camera.view_projection_matrix();
        for (a, b) in standard.iter().zip(retina.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(retina[15], 1.0);
        assert_eq!(retina[10], 1.0);
    }

    #[test]
    fn test_fit_bounds() {
        let mut camera = camera_800x600();
        camera.fit_bounds(0.0, 0.0, 400.0, 200.0, 0.0);
        assert!((camera.zoom() - 2.0).abs() < 1e-12);
        assert!((camera.x + 200.0).abs() < 1e-12);
        assert!((camera.y + 100.0).abs() < 1e-12);
        // Centroid lands at the viewport center
        let center = camera.world_to_screen(Point::new(200.0, 100.0));
        assert!((center.x - 400.0).abs() < 1e-9);
        assert!((center.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_bounds_with_padding_and_cap() {
        let mut camera = camera_800x600();
        camera.fit_bounds(-100.0, -100.0, 100.0, 100.0, 50.0);
        // 600 / 300 = 2
        assert!((camera.zoom() - 2.0).abs() < 1e-12);

        camera.fit_bounds(10.0, 10.0, 11.0, 11.0, 0.0);
        assert!((camera.zoom() - camera.max_zoom()).abs() < f64::EPSILON);

        camera.fit_bounds(5.0, 5.0, 5.0, 5.0, 0.0);
        assert!(camera.zoom() <= camera.max_zoom());
        assert!((camera.x + 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_limits_are_normalized() {
        let mut camera = camera_800x600();
        camera.set_zoom(3.0);
        camera.set_zoom_limits(5.0, 1.0);
        assert_eq!((camera.min_zoom(), camera.max_zoom()), (1.0, 5.0));
        assert!((camera.zoom() - 3.0).abs() < f64::EPSILON);

        camera.set_zoom(2.0);
        assert!((camera.zoom() - 2.0).abs() < f64::EPSILON);
        camera.zoom_at(0.01, 10.0, 10.0);
        assert!((camera.zoom() - 1.0).abs() < f64::EPSILON);

        camera.set_zoom_limits(0.5, 0.8);
        assert!((camera.zoom() - 0.8).abs() < f64::EPSILON);

        camera.set_zoom_limits(f64::NAN, -1.0);
        assert_eq!((camera.min_zoom(), camera.max_zoom()), (DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM));
    }

    #[test]
    fn test_with_config_swaps_inverted_limits() {
        let config = CameraConfig {
            min_zoom: 4.0,
            max_zoom: 0.5,
        };
        let mut camera = Camera::with_config(&config);
        assert_eq!((camera.min_zoom(), camera.max_zoom()), (0.5, 4.0));
        camera.set_zoom(10.0);
        assert!((camera.zoom() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_clamps_zoom() {
        let camera: Camera = serde_json::from_str(r#"{"zoom":99.0,"min_zoom":0.1,"max_zoom":5.0}"#).unwrap();
        assert!((camera.zoom() - 5.0).abs() < f64::EPSILON);

        let mut camera: Camera = serde_json::from_str(r#"{"min_zoom":5.0,"max_zoom":1.0}"#).unwrap();
        assert_eq!((camera.min_zoom(), camera.max_zoom()), (1.0, 5.0));
        camera.set_zoom(2.0);
        assert!((camera.zoom() - 2.0).abs() < f64::EPSILON);
        assert!((camera.device_pixel_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_view() {
        let mut camera = camera_800x600();
        camera.set_zoom_limits(0.2, 3.0);
        camera.set_position(12.5, -4.0);
        camera.set_zoom(2.5);
        let json = serde_json::to_string(&camera).unwrap();
        let restored: Camera = serde_json::from_str(&json).unwrap();
        assert_eq!((restored.x, restored.y), (12.5, -4.0));
        assert!((restored.zoom() - 2.5).abs() < f64::EPSILON);
        assert_eq!((restored.min_zoom(), restored.max_zoom()), (0.2, 3.0));
    }

    #[test]
    fn test_visible_world_rect() {
        let mut camera = camera_800x600();
        camera.set_zoom(2.0);
        let rect = camera.visible_world_rect();
        assert!((rect.width() - 400.0).abs() < 1e-9);
        assert!((rect.height() - 300.0).abs() < 1e-9);
        assert!((rect.center().x).abs() < 1e-9);
    }
}
