//! Per-frame eye geometry: blink ratio, iris circles and gaze direction.
//!
//! Every function returns `None` for degenerate input (zero-length eye span,
//! coincident points) so callers can tell "no usable signal" apart from a
//! reading that is genuinely zero.

use crate::landmarks::{EyeIndices, LandmarkSet, LEFT_EYE, RIGHT_EYE};
use crate::types::GazeVector;

const EPS: f64 = 1e-9;

/// A circle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let d = ((p.0 - self.cx).powi(2) + (p.1 - self.cy).powi(2)).sqrt();
        d <= self.radius + 1e-7 * self.radius.max(1.0)
    }
}

fn dist3(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Openness of one eye: mean cubed lid gap over cubed corner span.
///
/// Uses three upper/lower lid pairs of the eight-point contour on normalized
/// 3D coordinates.
fn eye_openness(landmarks: &LandmarkSet, eye: &EyeIndices) -> Option<f64> {
    let p = |i: usize| landmarks.point3(eye.contour[i]);
    let span = dist3(p(0), p(4));
    if span < EPS {
        return None;
    }
    let gaps = dist3(p(1), p(7)).powi(3) + dist3(p(2), p(6)).powi(3) + dist3(p(3), p(5)).powi(3);
    Some(gaps / (3.0 * span.powi(3)))
}

/// Blink ratio averaged over both eyes.
///
/// Computed as `(left + right + 1) / 2`, so an open eye sits slightly above
/// 0.5 and a closed eye converges on 0.5; the default closed threshold of
/// 0.51 is calibrated against this offset.
pub fn blink_ratio(landmarks: &LandmarkSet) -> Option<f64> {
    let left = eye_openness(landmarks, &LEFT_EYE)?;
    let right = eye_openness(landmarks, &RIGHT_EYE)?;
    Some((left + right + 1.0) / 2.0)
}

/// Circumcircle of three points, `None` if they are collinear.
fn circumcircle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<Circle> {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < EPS {
        return None;
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let cx = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let cy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    Some(Circle { cx, cy, radius: dist2((cx, cy), a) })
}

/// Smallest circle containing every point.
///
/// Exhaustive over the 2-point and 3-point support sets, which is exact and
/// cheap for the handful of points on an iris ring.
pub fn min_enclosing_circle(points: &[(f64, f64)]) -> Option<Circle> {
    match points.len() {
        0 => return None,
        1 => return Some(Circle { cx: points[0].0, cy: points[0].1, radius: 0.0 }),
        _ => {}
    }

    let mut best: Option<Circle> = None;
    let mut consider = |candidate: Circle| {
        if !candidate.radius.is_finite() || !points.iter().all(|&p| candidate.contains(p)) {
            return;
        }
        if best.map_or(true, |b| candidate.radius < b.radius) {
            best = Some(candidate);
        }
    };

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let (a, b) = (points[i], points[j]);
            consider(Circle {
                cx: (a.0 + b.0) / 2.0,
                cy: (a.1 + b.1) / 2.0,
                radius: dist2(a, b) / 2.0,
            });
            for k in (j + 1)..points.len() {
                if let Some(c) = circumcircle(a, b, points[k]) {
                    consider(c);
                }
            }
        }
    }

    best
}

/// Iris circle of one eye in pixel coordinates.
pub fn iris_circle(
    landmarks: &LandmarkSet,
    eye: &EyeIndices,
    width: u32,
    height: u32,
) -> Option<Circle> {
    let ring: Vec<(f64, f64)> = eye
        .iris
        .iter()
        .map(|&i| landmarks.pixel(i, width, height))
        .collect();
    min_enclosing_circle(&ring)
}

/// Raw iris offset for one eye: x across the corner span, y across the lid gap.
fn eye_gaze(
    landmarks: &LandmarkSet,
    eye: &EyeIndices,
    width: u32,
    height: u32,
) -> Option<(f64, f64)> {
    let iris = iris_circle(landmarks, eye, width, height)?;
    let left = landmarks.pixel(eye.left_corner, width, height);
    let right = landmarks.pixel(eye.right_corner, width, height);
    let span = dist2(left, right);
    if span < EPS {
        return None;
    }
    let x = ((iris.cx - left.0) / span - 0.5) * 2.0;

    let upper = landmarks.pixel(eye.lids.0, width, height);
    let lower = landmarks.pixel(eye.lids.1, width, height);
    let lid_gap = (lower.1 - upper.1).abs();
    let y = if lid_gap < EPS {
        0.0
    } else {
        let lid_mid = (upper.1 + lower.1) / 2.0;
        (iris.cy - lid_mid) / (lid_gap / 2.0)
    };

    Some((x, y))
}

/// Gaze direction averaged over the eyes that produced a usable reading.
///
/// When the raw magnitude of either component exceeds `sanity_bound` the
/// vector is clamped and flagged unreliable.
pub fn gaze_vector(
    landmarks: &LandmarkSet,
    width: u32,
    height: u32,
    sanity_bound: f64,
) -> Option<GazeVector> {
    let eyes: Vec<(f64, f64)> = [LEFT_EYE, RIGHT_EYE]
        .iter()
        .filter_map(|eye| eye_gaze(landmarks, eye, width, height))
        .collect();
    if eyes.is_empty() {
        return None;
    }
    let n = eyes.len() as f64;
    let x = eyes.iter().map(|e| e.0).sum::<f64>() / n;
    let y = eyes.iter().map(|e| e.1).sum::<f64>() / n;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }

    let reliable = x.abs() <= sanity_bound && y.abs() <= sanity_bound;
    Some(GazeVector {
        x: x.clamp(-1.0, 1.0),
        y: y.clamp(-1.0, 1.0),
        reliable,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::landmarks::{Landmark, FACE_MESH_POINTS};

    /// Place both eyes with their image-left corners at `origins`, each `w`
    /// wide with lid gap `gap`, irises shifted by `iris_dx` of the half span.
    pub(crate) fn place_eyes(
        pts: &mut [Landmark],
        origins: [(f32, f32); 2],
        w: f32,
        gap: f32,
        iris_dx: f32,
    ) {
        for (eye, (x0, y)) in [LEFT_EYE, RIGHT_EYE].into_iter().zip(origins) {
            pts[eye.contour[0]] = Landmark::new(x0, y, 0.0);
            pts[eye.contour[4]] = Landmark::new(x0 + w, y, 0.0);
            for (k, (up, down)) in [(1usize, 7usize), (2, 6), (3, 5)].iter().enumerate() {
                let x = x0 + w * (k as f32 + 1.0) / 4.0;
                pts[eye.contour[*up]] = Landmark::new(x, y - gap / 2.0, 0.0);
                pts[eye.contour[*down]] = Landmark::new(x, y + gap / 2.0, 0.0);
            }
            let cx = x0 + w / 2.0 + iris_dx * w / 2.0;
            let r = 0.01f32;
            pts[eye.iris[0]] = Landmark::new(cx + r, y, 0.0);
            pts[eye.iris[1]] = Landmark::new(cx, y - r, 0.0);
            pts[eye.iris[2]] = Landmark::new(cx - r, y, 0.0);
            pts[eye.iris[3]] = Landmark::new(cx, y + r, 0.0);
        }
    }

    /// Mesh with two 0.08-wide eyes and nothing else placed.
    pub(crate) fn synthetic_eyes(gap: f32, iris_dx: f32) -> Vec<Landmark> {
        let mut pts = vec![Landmark::new(0.5, 0.5, 0.0); FACE_MESH_POINTS];
        place_eyes(&mut pts, [(0.35, 0.4), (0.57, 0.4)], 0.08, gap, iris_dx);
        pts
    }

    #[test]
    fn test_blink_ratio_open_vs_closed() {
        let open = LandmarkSet::new(synthetic_eyes(0.024, 0.0)).unwrap();
        let closed = LandmarkSet::new(synthetic_eyes(0.004, 0.0)).unwrap();
        let r_open = blink_ratio(&open).unwrap();
        let r_closed = blink_ratio(&closed).unwrap();
        // gap/width = 0.3 → 0.027 per eye → (0.054 + 1) / 2
        assert!((r_open - 0.527).abs() < 1e-3, "open ratio {r_open}");
        assert!(r_open > 0.51);
        assert!(r_closed <= 0.51, "closed ratio {r_closed}");
    }

    #[test]
    fn test_blink_ratio_degenerate_span() {
        let mut pts = synthetic_eyes(0.02, 0.0);
        pts[LEFT_EYE.contour[4]] = pts[LEFT_EYE.contour[0]];
        let set = LandmarkSet::new(pts).unwrap();
        assert!(blink_ratio(&set).is_none());
    }

    #[test]
    fn test_min_enclosing_circle_square() {
        let pts = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        let c = min_enclosing_circle(&pts).unwrap();
        assert!(c.cx.abs() < 1e-9 && c.cy.abs() < 1e-9);
        assert!((c.radius - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_enclosing_circle_uses_diameter_when_possible() {
        // Third point lies inside the circle on the first two.
        let pts = [(0.0, 0.0), (4.0, 0.0), (2.0, 1.0)];
        let c = min_enclosing_circle(&pts).unwrap();
        assert!((c.cx - 2.0).abs() < 1e-9 && c.cy.abs() < 1e-9);
        assert!((c.radius - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_enclosing_circle_triangle() {
        // Equilateral triangle: circumcircle beats every diametral circle.
        let h = 3f64.sqrt();
        let pts = [(0.0, 0.0), (2.0, 0.0), (1.0, h)];
        let c = min_enclosing_circle(&pts).unwrap();
        assert!((c.radius - 2.0 / h).abs() < 1e-9, "radius {}", c.radius);
    }

    #[test]
    fn test_gaze_centered() {
        let set = LandmarkSet::new(synthetic_eyes(0.024, 0.0)).unwrap();
        let g = gaze_vector(&set, 640, 480, 2.0).unwrap();
        assert!(g.x.abs() < 1e-4, "x = {}", g.x);
        assert!(g.y.abs() < 1e-4, "y = {}", g.y);
        assert!(g.reliable);
    }

    #[test]
    fn test_gaze_follows_iris() {
        let set = LandmarkSet::new(synthetic_eyes(0.024, 0.5)).unwrap();
        let g = gaze_vector(&set, 640, 480, 2.0).unwrap();
        assert!((g.x - 0.5).abs() < 1e-3, "x = {}", g.x);
    }

    #[test]
    fn test_gaze_beyond_sanity_bound_is_unreliable() {
        // Iris pushed 3 half-spans out of the eye.
        let set = LandmarkSet::new(synthetic_eyes(0.024, 3.0)).unwrap();
        let g = gaze_vector(&set, 640, 480, 2.0).unwrap();
        assert!(!g.reliable);
        assert_eq!(g.x, 1.0);
    }

    #[test]
    fn test_gaze_degenerate_eyes() {
        let mut pts = synthetic_eyes(0.024, 0.0);
        for eye in [LEFT_EYE, RIGHT_EYE] {
            pts[eye.right_corner] = pts[eye.left_corner];
        }
        let set = LandmarkSet::new(pts).unwrap();
        assert!(gaze_vector(&set, 640, 480, 2.0).is_none());
    }
}
