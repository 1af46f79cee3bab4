//! Planar geometry and coordinate transforms for image-space keypoints.
//!
//! Image coordinates have their origin at the top-left corner, x grows to the
//! right and y grows downward. All angles are returned in degrees.

use nalgebra::Vector2;

use crate::types::{Keypoint, PoseFrame};

/// Interior angle at `b` formed by the segments `b→a` and `b→c`, in degrees [0, 180].
///
/// A zero-length segment yields 0°.
pub fn angle_between_points(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let ba = Vector2::new(a.0 - b.0, a.1 - b.1);
    let bc = Vector2::new(c.0 - b.0, c.1 - b.1);

    let mag_ba = ba.norm();
    let mag_bc = bc.norm();
    if mag_ba == 0.0 || mag_bc == 0.0 {
        return 0.0;
    }

    let cos_angle = (ba.dot(&bc) / (mag_ba * mag_bc)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Angle between the segment `top→bottom` and the vertical axis, in degrees.
///
/// 0° is perfectly vertical, 90° is horizontal.
pub fn angle_from_vertical(top: (f64, f64), bottom: (f64, f64)) -> f64 {
    let dx = bottom.0 - top.0;
    let dy = bottom.1 - top.1;

    if dy == 0.0 {
        return 90.0;
    }

    (dx.abs() / dy.abs()).atan().to_degrees()
}

pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// Midpoint of whichever of the two points are present
pub fn available_midpoint(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some(a), Some(b)) => Some(midpoint(a, b)),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

/// Pixel coordinate to [0, 1]
pub fn normalize(pixel: f64, dimension: f64) -> f64 {
    pixel / dimension
}

/// [0, 1] coordinate to pixels
pub fn denormalize(normalized: f64, dimension: f64) -> f64 {
    normalized * dimension
}

/// Horizontal mirror of an x coordinate: `frame_width - x`
pub fn mirror_x(x: f64, frame_width: f64) -> f64 {
    frame_width - x
}

/// Swap a `left_`/`right_` prefix; other names are returned unchanged
pub fn mirror_keypoint_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("left_") {
        format!("right_{rest}")
    } else if let Some(rest) = name.strip_prefix("right_") {
        format!("left_{rest}")
    } else {
        name.to_string()
    }
}

/// Mirror a whole frame horizontally.
///
/// X is flipped, y never changes, and left/right keypoint names are swapped so
/// the anatomical labels follow the mirrored image.
pub fn mirror_frame(frame: &PoseFrame, frame_width: f64) -> PoseFrame {
    let keypoints = frame
        .keypoints
        .iter()
        .map(|kp| Keypoint {
            name: mirror_keypoint_name(&kp.name),
            x: mirror_x(kp.x, frame_width),
            y: kp.y,
            z: kp.z,
            score: kp.score,
        })
        .collect();

    PoseFrame {
        timestamp: frame.timestamp,
        keypoints,
        is_valid: frame.is_valid,
    }
}

/// Population mean, `None` when there are no values
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Population standard deviation, 0 for fewer than two values
pub fn std_dev<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let values = values.into_iter();
    let n = values.clone().count();
    if n < 2 {
        return 0.0;
    }
    let m = values.clone().sum::<f64>() / n as f64;
    (values.map(|v| (v - m).powi(2)).sum::<f64>() / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{names, Timestamp};

    #[test]
    fn test_right_angle() {
        let angle = angle_between_points((0.0, 0.0), (1.0, 0.0), (1.0, 1.0));
        assert!((angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_straight_line() {
        let angle = angle_between_points((0.0, 0.0), (1.0, 0.0), (2.0, 0.0));
        assert!((angle - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_obtuse_angle() {
        let angle = angle_between_points((0.0, 0.0), (1.0, 0.0), (2.0, 1.0));
        assert!((angle - 135.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_length_segment() {
        let angle = angle_between_points((1.0, 1.0), (1.0, 1.0), (2.0, 2.0));
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn test_vertex_order_matters() {
        let at_b = angle_between_points((0.0, 0.0), (1.0, 0.0), (1.0, 1.0));
        let at_c = angle_between_points((1.0, 0.0), (1.0, 1.0), (0.0, 0.0));
        assert!((at_b - at_c).abs() > 1.0);
    }

    #[test]
    fn test_angle_from_vertical() {
        assert!(angle_from_vertical((100.0, 0.0), (100.0, 100.0)).abs() < 1e-3);
        assert!((angle_from_vertical((100.0, 0.0), (200.0, 100.0)) - 45.0).abs() < 1e-3);
        assert!((angle_from_vertical((100.0, 100.0), (200.0, 100.0)) - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_denormalize() {
        assert_eq!(normalize(320.0, 640.0), 0.5);
        assert_eq!(denormalize(0.25, 640.0), 160.0);
        assert!((denormalize(normalize(123.0, 640.0), 640.0) - 123.0).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_x() {
        assert_eq!(mirror_x(100.0, 640.0), 540.0);
        assert_eq!(mirror_x(320.0, 640.0), 320.0);
        assert_eq!(mirror_x(0.0, 640.0), 640.0);
        assert_eq!(mirror_x(mirror_x(150.0, 640.0), 640.0), 150.0);
    }

    #[test]
    fn test_mirror_frame_swaps_sides_and_keeps_y() {
        let frame = PoseFrame::new(
            Timestamp::from_millis(1000.0),
            vec![
                Keypoint::new(names::LEFT_SHOULDER, 380.0, 180.0, 0.95),
                Keypoint::new(names::RIGHT_SHOULDER, 260.0, 180.0, 0.95),
                Keypoint::new(names::NOSE, 320.0, 100.0, 0.9),
            ],
        );

        let mirrored = mirror_frame(&frame, 640.0);
        let left = mirrored.keypoint(names::LEFT_SHOULDER).unwrap();
        let right = mirrored.keypoint(names::RIGHT_SHOULDER).unwrap();
        assert_eq!(left.x, 380.0);
        assert_eq!(right.x, 260.0);
        assert_eq!(left.y, 180.0);
        assert_eq!(mirrored.keypoint(names::NOSE).unwrap().x, 320.0);

        let back = mirror_frame(&mirrored, 640.0);
        assert_eq!(back, frame);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(std_dev([1.0]), 0.0);
        assert!((std_dev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([1.0, 2.0, 6.0]), Some(3.0));
    }
}
