//! Face-mesh landmark set with named anatomical indices.
//!
//! Indices follow the 478-point refined face mesh (468 surface points plus
//! two five-point iris rings). "Left" and "right" refer to image space of an
//! unmirrored frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points the refined face mesh produces.
pub const FACE_MESH_POINTS: usize = 478;

pub const NOSE_TIP: usize = 4;
pub const CHIN: usize = 152;
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const LEFT_MOUTH_CORNER: usize = 61;
pub const RIGHT_MOUTH_CORNER: usize = 291;

pub const LEFT_IRIS: [usize; 4] = [469, 470, 471, 472];
pub const RIGHT_IRIS: [usize; 4] = [474, 475, 476, 477];

/// Eight-point eye contours: corner, three upper-lid points, corner, three lower-lid points.
pub const LEFT_EYE_CONTOUR: [usize; 8] = [33, 160, 159, 158, 133, 153, 145, 144];
pub const RIGHT_EYE_CONTOUR: [usize; 8] = [362, 385, 386, 387, 263, 373, 374, 380];

/// Upper and lower lid midpoints, used for the vertical gaze component.
pub const LEFT_EYE_LIDS: (usize, usize) = (159, 145);
pub const RIGHT_EYE_LIDS: (usize, usize) = (386, 374);

/// Indices describing one eye. Corners are named by image side so both eyes
/// measure iris offset in the same direction.
#[derive(Debug, Clone, Copy)]
pub struct EyeIndices {
    pub left_corner: usize,
    pub right_corner: usize,
    pub iris: [usize; 4],
    pub contour: [usize; 8],
    pub lids: (usize, usize),
}

pub const LEFT_EYE: EyeIndices = EyeIndices {
    left_corner: LEFT_EYE_OUTER,
    right_corner: LEFT_EYE_INNER,
    iris: LEFT_IRIS,
    contour: LEFT_EYE_CONTOUR,
    lids: LEFT_EYE_LIDS,
};

pub const RIGHT_EYE: EyeIndices = EyeIndices {
    left_corner: RIGHT_EYE_INNER,
    right_corner: RIGHT_EYE_OUTER,
    iris: RIGHT_IRIS,
    contour: RIGHT_EYE_CONTOUR,
    lids: RIGHT_EYE_LIDS,
};

/// Six points matched against the 3D reference model for head pose,
/// in model order: nose tip, chin, left eye corner, right eye corner,
/// left mouth corner, right mouth corner.
pub const POSE_POINTS: [usize; 6] = [
    NOSE_TIP,
    CHIN,
    LEFT_EYE_OUTER,
    RIGHT_EYE_OUTER,
    LEFT_MOUTH_CORNER,
    RIGHT_MOUTH_CORNER,
];

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("expected at least {expected} landmarks, got {actual}")]
    TooFewPoints { expected: usize, actual: usize },
    #[error("landmark {0} is not finite")]
    NonFinite(usize),
}

/// A normalized 3D landmark. `x` and `y` are fractions of the frame size,
/// `z` is depth on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Landmarks of one detected face for one frame.
#[derive(Debug, Clone)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    /// Validate and wrap a landmark list. Extra points beyond the mesh are kept.
    pub fn new(points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() < FACE_MESH_POINTS {
            return Err(LandmarkError::TooFewPoints {
                expected: FACE_MESH_POINTS,
                actual: points.len(),
            });
        }
        if let Some(i) = points
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(LandmarkError::NonFinite(i));
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Landmark {
        self.points[index]
    }

    /// Normalized 3D point as f64.
    pub fn point3(&self, index: usize) -> [f64; 3] {
        let p = self.points[index];
        [p.x as f64, p.y as f64, p.z as f64]
    }

    /// Point in pixel coordinates for a frame of the given size.
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> (f64, f64) {
        let p = self.points[index];
        (p.x as f64 * width as f64, p.y as f64 * height as f64)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}
