// src/detection/kalman.rs
//
// Constant-velocity Kalman filter over (cx, cy, aspect, height), the box
// motion model used by SORT/ByteTrack. The tracker associates detections
// against `predicted_box()` so a subject keeps its id through fast motion
// and short occlusions.

use nalgebra::{SMatrix, SVector};

type StateVector = SVector<f32, 8>;
type StateMatrix = SMatrix<f32, 8, 8>;
type MeasureVector = SVector<f32, 4>;
type MeasureMatrix = SMatrix<f32, 4, 4>;
type Projection = SMatrix<f32, 4, 8>;

const STD_WEIGHT_POSITION: f32 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f32 = 1.0 / 160.0;
const MIN_SIDE: f32 = 1e-5;

#[derive(Debug, Clone)]
pub struct BoxKalman {
    mean: StateVector,
    covariance: StateMatrix,
}

impl BoxKalman {
    pub fn new(bbox: &[f32; 4]) -> Self {
        let z = to_xyah(bbox);
        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&z);

        let h = z[3];
        let p = 2.0 * STD_WEIGHT_POSITION * h;
        let v = 10.0 * STD_WEIGHT_VELOCITY * h;
        Self {
            mean,
            covariance: squared_diagonal([p, p, 1e-2, p, v, v, 1e-5, v]),
        }
    }

    /// Advance one frame.
    pub fn predict(&mut self) {
        let h = self.mean[3];
        let p = STD_WEIGHT_POSITION * h;
        let v = STD_WEIGHT_VELOCITY * h;
        let motion_noise = squared_diagonal([p, p, 1e-2, p, v, v, 1e-5, v]);

        let motion = motion_matrix();
        self.mean = motion * self.mean;
        self.covariance = motion * self.covariance * motion.transpose() + motion_noise;
    }

    /// Correct with a matched detection.
    pub fn update(&mut self, bbox: &[f32; 4]) {
        let h = self.mean[3];
        let p = STD_WEIGHT_POSITION * h;
        let measurement_noise = MeasureMatrix::from_diagonal(&MeasureVector::new(p * p, p * p, 1e-2, p * p));

        let projection = Projection::identity();
        let innovation_cov = projection * self.covariance * projection.transpose() + measurement_noise;
        let Some(innovation_inv) = innovation_cov.try_inverse() else {
            // Degenerate covariance: restart from the measurement
            *self = Self::new(bbox);
            return;
        };

        let gain = self.covariance * projection.transpose() * innovation_inv;
        let innovation = to_xyah(bbox) - projection * self.mean;
        self.mean += gain * innovation;
        self.covariance -= gain * innovation_cov * gain.transpose();
    }

    /// Current estimate as `[x1, y1, x2, y2]`.
    pub fn predicted_box(&self) -> [f32; 4] {
        let (x, y, a, h) = (self.mean[0], self.mean[1], self.mean[2], self.mean[3]);
        let w = a * h;
        [x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0]
    }

    /// Estimated centroid velocity in px/frame.
    pub fn velocity(&self) -> (f32, f32) {
        (self.mean[4], self.mean[5])
    }
}

fn to_xyah(bbox: &[f32; 4]) -> MeasureVector {
    let w = (bbox[2] - bbox[0]).max(MIN_SIDE);
    let h = (bbox[3] - bbox[1]).max(MIN_SIDE);
    MeasureVector::new((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0, w / h, h)
}

fn motion_matrix() -> StateMatrix {
    let mut motion = StateMatrix::identity();
    for i in 0..4 {
        motion[(i, 4 + i)] = 1.0;
    }
    motion
}

fn squared_diagonal(std: [f32; 8]) -> StateMatrix {
    StateMatrix::from_diagonal(&StateVector::from_iterator(std.iter().map(|s| s * s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(y: f32) -> [f32; 4] {
        [100.0, y, 140.0, y + 80.0]
    }

    #[test]
    fn test_new_filter_reproduces_box() {
        let kf = BoxKalman::new(&person(100.0));
        let b = kf.predicted_box();
        for (got, want) in b.iter().zip(person(100.0).iter()) {
            assert!((got - want).abs() < 1e-3);
        }
        assert_eq!(kf.velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_learns_vertical_velocity() {
        let mut kf = BoxKalman::new(&person(100.0));
        for t in 1..10 {
            kf.predict();
            kf.update(&person(100.0 + 30.0 * t as f32));
        }
        let (vx, vy) = kf.velocity();
        assert!(vx.abs() < 1e-3);
        assert!(vy > 20.0 && vy < 35.0, "vy = {}", vy);

        // Prediction leads the last measurement
        kf.predict();
        assert!(kf.predicted_box()[1] > 100.0 + 30.0 * 9.0);
    }
}
