//! Head pose from six face landmarks.
//!
//! Solves the perspective-n-point problem for a generic 3D face model with a
//! damped least-squares (Levenberg–Marquardt) fit over a rotation vector and
//! translation, then decomposes the rotation into pitch/yaw/roll.

use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, Vector3};
use thiserror::Error;
use tracing::trace;

use crate::landmarks::{LandmarkSet, POSE_POINTS};
use crate::types::AngleTriple;

/// Model face width in model units. The reference points below are scaled by
/// `face_width_mm / MODEL_FACE_WIDTH`.
const MODEL_FACE_WIDTH: f64 = 150.0;

/// Reference face in model units, in [`POSE_POINTS`] order.
const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, -330.0, -65.0],
    [-225.0, 170.0, -135.0],
    [225.0, 170.0, -135.0],
    [-150.0, -150.0, -125.0],
    [150.0, -150.0, -125.0],
];

const MAX_ITERATIONS: usize = 100;
const MAX_DAMPING_TRIES: usize = 10;
const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-9;
const CONVERGED_ERROR: f64 = 1e-10;

type Params = SVector<f64, 6>;
type Residual = SVector<f64, 12>;

#[derive(Error, Debug, PartialEq)]
pub enum PoseError {
    #[error("pose landmarks are degenerate")]
    Degenerate,
    #[error("pose solver diverged")]
    Diverged,
}

/// Result of one pose fit.
#[derive(Debug, Clone, Copy)]
pub struct PoseEstimate {
    pub angles: AngleTriple,
    /// Face position in camera coordinates, model units.
    pub translation: Vector3<f64>,
    /// Root-mean-square reprojection error in pixels.
    pub reprojection_rms: f64,
}

/// Pinhole camera with focal length equal to the image width and the
/// principal point at the image centre.
#[derive(Debug, Clone, Copy)]
struct Camera {
    focal: f64,
    cx: f64,
    cy: f64,
}

impl Camera {
    fn for_frame(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }
}

pub struct HeadPoseSolver {
    model: [Vector3<f64>; 6],
    normalize_pitch: bool,
}

impl HeadPoseSolver {
    pub fn new(face_width_mm: f64, normalize_pitch: bool) -> Self {
        let scale = face_width_mm / MODEL_FACE_WIDTH;
        let model = MODEL_POINTS.map(|p| Vector3::new(p[0], p[1], p[2]) * scale);
        Self { model, normalize_pitch }
    }

    /// Fit the model to the landmarks of a `width` x `height` frame.
    pub fn solve(
        &self,
        landmarks: &LandmarkSet,
        width: u32,
        height: u32,
    ) -> Result<PoseEstimate, PoseError> {
        let camera = Camera::for_frame(width, height);
        let image: [(f64, f64); 6] = POSE_POINTS.map(|i| landmarks.pixel(i, width, height));

        let mut params = self.initial_guess(&image, &camera)?;
        let mut residual = self.residual(&params, &image, &camera);
        let mut error = residual.norm_squared();
        let mut damping = INITIAL_DAMPING;

        for iteration in 0..MAX_ITERATIONS {
            let jacobian = self.jacobian(&params, &image, &camera);
            let jtj = jacobian.transpose() * jacobian;
            let jtr = jacobian.transpose() * residual;

            let mut improved = false;
            for _ in 0..MAX_DAMPING_TRIES {
                let mut lhs = jtj;
                for d in 0..6 {
                    lhs[(d, d)] += damping * jtj[(d, d)];
                }
                let Some(step) = lhs.lu().solve(&(-jtr)) else {
                    damping *= 10.0;
                    continue;
                };
                let candidate = params + step;
                let candidate_residual = self.residual(&candidate, &image, &camera);
                let candidate_error = candidate_residual.norm_squared();
                if candidate_error < error {
                    params = candidate;
                    residual = candidate_residual;
                    error = candidate_error;
                    damping = (damping / 10.0).max(MIN_DAMPING);
                    improved = true;
                    break;
                }
                damping *= 10.0;
            }

            if !improved || error < CONVERGED_ERROR {
                trace!(iteration, error, "pose fit finished");
                break;
            }
        }

        if !error.is_finite() || params.iter().any(|v| !v.is_finite()) || params[5] <= 0.0 {
            return Err(PoseError::Diverged);
        }

        let rotation = rotation_from_vector(&params);
        let (pitch, yaw, roll) = rq_euler_degrees(&rotation);
        let pitch = if self.normalize_pitch { normalize_pitch(pitch) } else { pitch };

        Ok(PoseEstimate {
            angles: AngleTriple::new(pitch, yaw, roll),
            translation: Vector3::new(params[3], params[4], params[5]),
            reprojection_rms: (error / 6.0).sqrt(),
        })
    }

    /// Face-forward rotation, depth from the eye-corner span, and x/y from the nose.
    fn initial_guess(&self, image: &[(f64, f64); 6], camera: &Camera) -> Result<Params, PoseError> {
        let (left, right) = (image[2], image[3]);
        let span = ((right.0 - left.0).powi(2) + (right.1 - left.1).powi(2)).sqrt();
        if span < 1e-6 {
            return Err(PoseError::Degenerate);
        }
        let model_span = (self.model[3] - self.model[2]).norm();
        let z = camera.focal * model_span / span;
        let nose = image[0];
        Ok(Params::from_column_slice(&[
            std::f64::consts::PI,
            0.0,
            0.0,
            (nose.0 - camera.cx) * z / camera.focal,
            (nose.1 - camera.cy) * z / camera.focal,
            z,
        ]))
    }

    fn residual(&self, params: &Params, image: &[(f64, f64); 6], camera: &Camera) -> Residual {
        let rotation = rotation_from_vector(params);
        let translation = Vector3::new(params[3], params[4], params[5]);
        let mut out = Residual::zeros();
        for (k, point) in self.model.iter().enumerate() {
            let p = rotation * point + translation;
            let u = camera.focal * p.x / p.z + camera.cx;
            let v = camera.focal * p.y / p.z + camera.cy;
            out[2 * k] = u - image[k].0;
            out[2 * k + 1] = v - image[k].1;
        }
        out
    }

    /// Central-difference Jacobian of the residual.
    fn jacobian(
        &self,
        params: &Params,
        image: &[(f64, f64); 6],
        camera: &Camera,
    ) -> SMatrix<f64, 12, 6> {
        let mut jacobian = SMatrix::<f64, 12, 6>::zeros();
        for j in 0..6 {
            let h = 1e-6 * params[j].abs().max(1.0);
            let mut plus = *params;
            let mut minus = *params;
            plus[j] += h;
            minus[j] -= h;
            let column = (self.residual(&plus, image, camera)
                - self.residual(&minus, image, camera))
                / (2.0 * h);
            jacobian.set_column(j, &column);
        }
        jacobian
    }
}

fn rotation_from_vector(params: &Params) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2])).into_inner()
}

/// Decompose a rotation into Euler angles (x, y, z) in degrees using three
/// Givens rotations, with the sign conventions of the common RQ decomposition.
pub fn rq_euler_degrees(m: &Matrix3<f64>) -> (f64, f64, f64) {
    const EPS: f64 = f64::EPSILON;

    let givens = |s: f64, c: f64| {
        let z = 1.0 / (c * c + s * s + EPS).sqrt();
        (s * z, c * z)
    };

    let (s, c) = givens(m[(2, 1)], m[(2, 2)]);
    let mut qx = Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c);
    let r = m * qx;

    let (s, c) = givens(-r[(2, 0)], r[(2, 2)]);
    let mut qy = Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c);
    let m2 = r * qy;

    let (s, c) = givens(m2[(1, 0)], m2[(1, 1)]);
    let mut qz = Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0);
    let r = m2 * qz;

    let negate = |q: &mut Matrix3<f64>, cells: [(usize, usize); 4]| {
        for cell in cells {
            q[cell] = -q[cell];
        }
    };
    if r[(0, 0)] < 0.0 {
        if r[(1, 1)] < 0.0 {
            negate(&mut qz, [(0, 0), (0, 1), (1, 0), (1, 1)]);
        } else {
            negate(&mut qy, [(0, 0), (0, 2), (2, 0), (2, 2)]);
        }
    } else if r[(1, 1)] < 0.0 {
        negate(&mut qx, [(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    let angle = |cos: f64, sign_of: f64| {
        let sign = if sign_of >= 0.0 { 1.0 } else { -1.0 };
        cos.clamp(-1.0, 1.0).acos().to_degrees() * sign
    };
    (
        angle(qx[(1, 1)], qx[(1, 2)]),
        angle(qy[(0, 0)], qy[(0, 2)]),
        angle(qz[(0, 0)], qz[(0, 1)]),
    )
}

/// Fold the raw pitch into [-90, 90] so that looking up is positive and the
/// 180° model flip does not leak into the reading.
pub fn normalize_pitch(raw: f64) -> f64 {
    let mut p = if raw > 180.0 { raw - 360.0 } else { raw };
    p = -p;
    if p < -90.0 {
        p = -(180.0 + p);
    } else if p > 90.0 {
        p = 180.0 - p;
    }
    -p
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::landmarks::{Landmark, FACE_MESH_POINTS};

    const W: u32 = 640;
    const H: u32 = 480;

    fn rot(axis: Vector3<f64>, deg: f64) -> Matrix3<f64> {
        Rotation3::from_scaled_axis(axis * deg.to_radians()).into_inner()
    }

    fn base() -> Matrix3<f64> {
        rot(Vector3::x(), 180.0)
    }

    /// Mesh whose pose points are the reference face projected with `r`, `t`.
    pub(crate) fn projected_face(r: Matrix3<f64>, t: Vector3<f64>) -> Vec<Landmark> {
        let solver = HeadPoseSolver::new(140.0, true);
        let camera = Camera::for_frame(W, H);
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); FACE_MESH_POINTS];
        for (k, &idx) in POSE_POINTS.iter().enumerate() {
            let p = r * solver.model[k] + t;
            let u = camera.focal * p.x / p.z + camera.cx;
            let v = camera.focal * p.y / p.z + camera.cy;
            points[idx] = Landmark::new((u / W as f64) as f32, (v / H as f64) as f32, 0.0);
        }
        points
    }

    pub(crate) fn frontal_face() -> Vec<Landmark> {
        projected_face(base(), Vector3::new(0.0, 0.0, 1000.0))
    }

    fn solve(r: Matrix3<f64>, t: Vector3<f64>) -> PoseEstimate {
        let set = LandmarkSet::new(projected_face(r, t)).unwrap();
        HeadPoseSolver::new(140.0, true).solve(&set, W, H).unwrap()
    }

    fn assert_angles(actual: AngleTriple, pitch: f64, yaw: f64, roll: f64) {
        // f32 landmark storage limits precision to a few hundredths of a degree.
        let tol = 0.1;
        assert!((actual.pitch - pitch).abs() < tol, "pitch {} != {pitch}", actual.pitch);
        assert!((actual.yaw - yaw).abs() < tol, "yaw {} != {yaw}", actual.yaw);
        assert!((actual.roll - roll).abs() < tol, "roll {} != {roll}", actual.roll);
    }

    #[test]
    fn test_frontal_face_is_zero() {
        let est = solve(base(), Vector3::new(0.0, 0.0, 1000.0));
        assert_angles(est.angles, 0.0, 0.0, 0.0);
        assert!((est.translation.z - 1000.0).abs() < 5.0, "z = {}", est.translation.z);
        assert!(est.reprojection_rms < 0.05);
    }

    #[test]
    fn test_yaw() {
        let est = solve(rot(Vector3::y(), 20.0) * base(), Vector3::new(0.0, 0.0, 1000.0));
        assert_angles(est.angles, 0.0, -20.0, 0.0);
    }

    #[test]
    fn test_pitch_sign() {
        let down = solve(rot(Vector3::x(), 10.0) * base(), Vector3::new(0.0, 0.0, 1000.0));
        assert_angles(down.angles, -10.0, 0.0, 0.0);
        let up = solve(rot(Vector3::x(), -10.0) * base(), Vector3::new(0.0, 0.0, 1000.0));
        assert_angles(up.angles, 10.0, 0.0, 0.0);
    }

    #[test]
    fn test_roll() {
        let est = solve(rot(Vector3::z(), 15.0) * base(), Vector3::new(0.0, 0.0, 1000.0));
        assert_angles(est.angles, 0.0, 0.0, 15.0);
    }

    #[test]
    fn test_off_center_face() {
        let est = solve(rot(Vector3::y(), -25.0) * base(), Vector3::new(40.0, -30.0, 900.0));
        assert_angles(est.angles, 0.0, 25.0, 0.0);
    }

    #[test]
    fn test_compound_rotation() {
        let r = rot(Vector3::x(), 12.0) * rot(Vector3::y(), -18.0) * base();
        let est = solve(r, Vector3::new(0.0, 0.0, 800.0));
        assert_angles(est.angles, -12.598, 17.594, -3.865);
    }

    #[test]
    fn test_degenerate_eyes() {
        let mut points = frontal_face();
        points[POSE_POINTS[3]] = points[POSE_POINTS[2]];
        let set = LandmarkSet::new(points).unwrap();
        let err = HeadPoseSolver::new(140.0, true).solve(&set, W, H).unwrap_err();
        assert_eq!(err, PoseError::Degenerate);
    }

    #[test]
    fn test_normalize_pitch() {
        assert_eq!(normalize_pitch(0.0), 0.0);
        assert_eq!(normalize_pitch(170.0), 10.0);
        assert_eq!(normalize_pitch(-170.0), -10.0);
        assert_eq!(normalize_pitch(350.0), -10.0);
        assert_eq!(normalize_pitch(30.0), 30.0);
    }

    #[test]
    fn test_rq_euler_identity() {
        let (x, y, z) = rq_euler_degrees(&Matrix3::identity());
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9 && z.abs() < 1e-9);
    }
}
