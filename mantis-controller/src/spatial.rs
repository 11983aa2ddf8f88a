//! Conversions between the orientation encodings used at the arm boundary.
//!
//! The device talks in Euler angles while the external interface exchanges
//! orientation vectors, with quaternions and rotation vectors as interchange
//! forms. All conversions here are pure functions over `f64` and every
//! returned quaternion and direction is unit normalized.
//!
//! Convention, fixed for both directions: intrinsic yaw-pitch-roll in a
//! right handed frame with +Y up. Yaw rotates about +Y, pitch about +X and
//! roll about +Z, applied in that order. The orientation vector direction is
//! the quaternion-rotated forward axis (-Z) and `theta` is the residual
//! twist about it.
//!
//! Angles are radians everywhere except the explicit degree helpers; degrees
//! exist only at the device boundary.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use thiserror::Error;

/// Half-width of the pitch band around ±90° inside which the direction part
/// of an orientation vector no longer separates yaw from roll. Inside the
/// band the recovered roll is zero and the lost roll is folded into yaw via
/// `theta`, with the sign of `oy`.
pub const POLE_BAND: f64 = 1e-3;

/// Rotations with a magnitude below this are treated as the identity.
const ZERO_ROTATION: f64 = 1e-9;

/// Sine-of-pitch guard for the gimbal-lock branch of the Euler extraction.
const GIMBAL_GUARD: f64 = 0.999_999_9;

#[derive(Error, Debug)]
pub enum SpatialError {
    #[error("zero magnitude vector where a direction was required")]
    DegenerateOrientation,
}

fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle % TAU;
    if wrapped > PI {
        wrapped - TAU
    } else if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Intrinsic yaw-pitch-roll angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EulerAngles {
    /// Rotation about the body forward axis (+Z)
    pub roll: f64,
    /// Rotation about +X
    pub pitch: f64,
    /// Rotation about the up axis (+Y)
    pub yaw: f64,
}

impl EulerAngles {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> EulerAngles {
        EulerAngles { roll, pitch, yaw }
    }

    /// Angles in degrees, as the device reports them
    pub fn from_degrees(roll: f64, pitch: f64, yaw: f64) -> EulerAngles {
        EulerAngles::new(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
    }

    /// (roll, pitch, yaw) in degrees for the device boundary
    pub fn to_degrees(&self) -> (f64, f64, f64) {
        (
            self.roll.to_degrees(),
            self.pitch.to_degrees(),
            self.yaw.to_degrees(),
        )
    }

    /// Extract Euler angles from a unit quaternion.
    ///
    /// At gimbal lock (pitch within float rounding of ±90°) yaw and roll are
    /// no longer independent; the convention here is roll = 0 with the whole
    /// residual rotation reported as yaw.
    pub fn from_quaternion(q: &Quaternion) -> EulerAngles {
        let q = q.renormalized();
        let sin_pitch = (2.0 * (q.w * q.x - q.y * q.z)).clamp(-1.0, 1.0);
        let pitch = sin_pitch.asin();
        if sin_pitch.abs() < GIMBAL_GUARD {
            let yaw = (2.0 * (q.x * q.z + q.w * q.y))
                .atan2(1.0 - 2.0 * (q.x * q.x + q.y * q.y));
            let roll = (2.0 * (q.x * q.y + q.w * q.z))
                .atan2(1.0 - 2.0 * (q.x * q.x + q.z * q.z));
            EulerAngles::new(roll, pitch, yaw)
        } else {
            let yaw = (-2.0 * (q.x * q.z - q.w * q.y))
                .atan2(1.0 - 2.0 * (q.y * q.y + q.z * q.z));
            EulerAngles::new(0.0, pitch, yaw)
        }
    }

    pub fn from_orientation_vector(ov: &OrientationVector) -> Result<EulerAngles, SpatialError> {
        Ok(EulerAngles::from_quaternion(
            &Quaternion::from_orientation_vector(ov)?,
        ))
    }

    pub fn from_rotation_vector(rv: &RotationVector) -> EulerAngles {
        EulerAngles::from_quaternion(&Quaternion::from_rotation_vector(rv))
    }
}

/// Unit quaternion, scalar part first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::identity()
    }
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Quaternion {
        Quaternion { w, x, y, z }
    }

    pub fn identity() -> Quaternion {
        Quaternion::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-normalized copy; a zero quaternion has no direction to keep.
    pub fn normalized(&self) -> Result<Quaternion, SpatialError> {
        let norm = self.norm();
        if norm < ZERO_ROTATION {
            return Err(SpatialError::DegenerateOrientation);
        }
        Ok(self.scaled(1.0 / norm))
    }

    // Internal: inputs are products of unit quaternions, so the norm is
    // always positive.
    fn renormalized(&self) -> Quaternion {
        self.scaled(1.0 / self.norm())
    }

    fn scaled(&self, factor: f64) -> Quaternion {
        Quaternion::new(
            self.w * factor,
            self.x * factor,
            self.y * factor,
            self.z * factor,
        )
    }

    fn conjugate(&self) -> Quaternion {
        Quaternion::new(self.w, -self.x, -self.y, -self.z)
    }

    fn from_axis_angle(x: f64, y: f64, z: f64, angle: f64) -> Quaternion {
        let half = angle / 2.0;
        let sin_half = half.sin();
        Quaternion::new(half.cos(), x * sin_half, y * sin_half, z * sin_half)
    }

    fn rotate(&self, v: [f64; 3]) -> [f64; 3] {
        // v' = v + 2 w (u × v) + 2 (u × (u × v)) with u the vector part
        let u = [self.x, self.y, self.z];
        let uv = cross(u, v);
        let uuv = cross(u, uv);
        [
            v[0] + 2.0 * (self.w * uv[0] + uuv[0]),
            v[1] + 2.0 * (self.w * uv[1] + uuv[1]),
            v[2] + 2.0 * (self.w * uv[2] + uuv[2]),
        ]
    }

    pub fn from_euler(e: &EulerAngles) -> Quaternion {
        let q_yaw = Quaternion::from_axis_angle(0.0, 1.0, 0.0, e.yaw);
        let q_pitch = Quaternion::from_axis_angle(1.0, 0.0, 0.0, e.pitch);
        let q_roll = Quaternion::from_axis_angle(0.0, 0.0, 1.0, e.roll);
        (q_yaw * q_pitch * q_roll).renormalized()
    }

    pub fn from_orientation_vector(ov: &OrientationVector) -> Result<Quaternion, SpatialError> {
        let ov = ov.normalized()?;
        let pitch = ov.oy.clamp(-1.0, 1.0).asin();
        let yaw = if FRAC_PI_2 - pitch.abs() < POLE_BAND {
            0.0
        } else {
            (-ov.ox).atan2(-ov.oz)
        };
        let swing = Quaternion::from_axis_angle(0.0, 1.0, 0.0, yaw)
            * Quaternion::from_axis_angle(1.0, 0.0, 0.0, pitch);
        Ok((swing * Quaternion::from_axis_angle(0.0, 0.0, 1.0, -ov.theta)).renormalized())
    }

    pub fn from_rotation_vector(rv: &RotationVector) -> Quaternion {
        let angle = rv.angle();
        if angle < ZERO_ROTATION {
            return Quaternion::identity();
        }
        Quaternion::from_axis_angle(rv.x / angle, rv.y / angle, rv.z / angle, angle).renormalized()
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        Quaternion::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Unit direction of the rotated forward axis plus a twist angle about it.
///
/// The direction alone carries two degrees of freedom (yaw and pitch);
/// `theta` carries the third. When the direction is within [`POLE_BAND`] of
/// ±Y both legs of the conversion treat yaw as zero, so the twist absorbs
/// the rotation that Euler angles would split between yaw and roll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationVector {
    pub ox: f64,
    pub oy: f64,
    pub oz: f64,
    /// Twist about the direction, radians
    pub theta: f64,
}

impl Default for OrientationVector {
    fn default() -> Self {
        // identity rotation leaves the forward axis at -Z
        OrientationVector::new(0.0, 0.0, -1.0, 0.0)
    }
}

impl OrientationVector {
    pub fn new(ox: f64, oy: f64, oz: f64, theta: f64) -> OrientationVector {
        OrientationVector { ox, oy, oz, theta }
    }

    /// Copy with a unit direction component.
    pub fn normalized(&self) -> Result<OrientationVector, SpatialError> {
        let mag = (self.ox * self.ox + self.oy * self.oy + self.oz * self.oz).sqrt();
        if mag < ZERO_ROTATION {
            return Err(SpatialError::DegenerateOrientation);
        }
        Ok(OrientationVector::new(
            self.ox / mag,
            self.oy / mag,
            self.oz / mag,
            self.theta,
        ))
    }

    pub fn from_quaternion(q: &Quaternion) -> OrientationVector {
        let q = q.renormalized();
        let direction = q.rotate([0.0, 0.0, -1.0]);
        let pitch = direction[1].clamp(-1.0, 1.0).asin();
        let yaw = if FRAC_PI_2 - pitch.abs() < POLE_BAND {
            0.0
        } else {
            (-direction[0]).atan2(-direction[2])
        };
        let swing = Quaternion::from_axis_angle(0.0, 1.0, 0.0, yaw)
            * Quaternion::from_axis_angle(1.0, 0.0, 0.0, pitch);
        let twist = (swing.conjugate() * q).renormalized();
        let theta = wrap_angle(-2.0 * twist.z.atan2(twist.w));
        let mag = (direction[0] * direction[0]
            + direction[1] * direction[1]
            + direction[2] * direction[2])
            .sqrt();
        OrientationVector::new(
            direction[0] / mag,
            direction[1] / mag,
            direction[2] / mag,
            theta,
        )
    }

    pub fn from_euler(e: &EulerAngles) -> OrientationVector {
        OrientationVector::from_quaternion(&Quaternion::from_euler(e))
    }
}

/// Axis-angle rotation compressed into one vector: the direction is the
/// rotation axis and the magnitude the angle in radians. The zero rotation
/// is the zero vector, since its axis is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RotationVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RotationVector {
    pub fn new(x: f64, y: f64, z: f64) -> RotationVector {
        RotationVector { x, y, z }
    }

    pub fn angle(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn from_quaternion(q: &Quaternion) -> RotationVector {
        let mut q = q.renormalized();
        if q.w < 0.0 {
            // same rotation, keeps the angle in [0, π]
            q = q.scaled(-1.0);
        }
        let sin_half = (1.0 - q.w * q.w).max(0.0).sqrt();
        if sin_half < ZERO_ROTATION {
            return RotationVector::new(0.0, 0.0, 0.0);
        }
        let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
        RotationVector::new(
            q.x / sin_half * angle,
            q.y / sin_half * angle,
            q.z / sin_half * angle,
        )
    }

    pub fn from_euler(e: &EulerAngles) -> RotationVector {
        RotationVector::from_quaternion(&Quaternion::from_euler(e))
    }
}

/// Tagged union over the orientation encodings exchanged at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrientationValue {
    Euler(EulerAngles),
    Quaternion(Quaternion),
    OrientationVector(OrientationVector),
    RotationVector(RotationVector),
}

impl Default for OrientationValue {
    fn default() -> Self {
        OrientationValue::OrientationVector(OrientationVector::default())
    }
}

impl OrientationValue {
    pub fn quaternion(&self) -> Result<Quaternion, SpatialError> {
        match self {
            OrientationValue::Euler(e) => Ok(Quaternion::from_euler(e)),
            OrientationValue::Quaternion(q) => q.normalized(),
            OrientationValue::OrientationVector(ov) => Quaternion::from_orientation_vector(ov),
            OrientationValue::RotationVector(rv) => Ok(Quaternion::from_rotation_vector(rv)),
        }
    }

    pub fn euler(&self) -> Result<EulerAngles, SpatialError> {
        match self {
            OrientationValue::Euler(e) => Ok(*e),
            other => Ok(EulerAngles::from_quaternion(&other.quaternion()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn assert_same_rotation(a: &Quaternion, b: &Quaternion) {
        // q and -q encode the same rotation
        let direct = (a.w - b.w)
            .abs()
            .max((a.x - b.x).abs())
            .max((a.y - b.y).abs())
            .max((a.z - b.z).abs());
        let flipped = (a.w + b.w)
            .abs()
            .max((a.x + b.x).abs())
            .max((a.y + b.y).abs())
            .max((a.z + b.z).abs());
        assert!(
            direct.min(flipped) < 1e-6,
            "rotations differ: {a:?} vs {b:?}"
        );
    }

    fn sample_euler(rng: &mut StdRng) -> EulerAngles {
        EulerAngles::new(
            rng.gen_range(-3.1..3.1),
            rng.gen_range(-FRAC_PI_2 + 0.01..FRAC_PI_2 - 0.01),
            rng.gen_range(-3.1..3.1),
        )
    }

    #[test]
    fn euler_quaternion_round_trip_outside_gimbal_lock() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let e = sample_euler(&mut rng);
            let back = EulerAngles::from_quaternion(&Quaternion::from_euler(&e));
            assert_relative_eq!(back.roll, e.roll, epsilon = 1e-6);
            assert_relative_eq!(back.pitch, e.pitch, epsilon = 1e-6);
            assert_relative_eq!(back.yaw, e.yaw, epsilon = 1e-6);
        }
    }

    #[test]
    fn returned_quaternions_are_unit_norm() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let e = sample_euler(&mut rng);
            let q = Quaternion::from_euler(&e);
            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-9);
            let ov = OrientationVector::from_quaternion(&q);
            let q2 = Quaternion::from_orientation_vector(&ov).unwrap();
            assert_relative_eq!(q2.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn orientation_vector_direction_is_unit() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let ov = OrientationVector::from_euler(&sample_euler(&mut rng));
            let mag = (ov.ox * ov.ox + ov.oy * ov.oy + ov.oz * ov.oz).sqrt();
            assert_relative_eq!(mag, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn orientation_vector_round_trip_preserves_rotation() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let q = Quaternion::from_euler(&sample_euler(&mut rng));
            let back = Quaternion::from_orientation_vector(&OrientationVector::from_quaternion(&q))
                .unwrap();
            assert_same_rotation(&q, &back);
        }
    }

    #[test]
    fn positive_pole_folds_roll_into_yaw() {
        for roll in [0.3, -1.2, 2.0] {
            let e = EulerAngles::new(roll, FRAC_PI_2, 0.0);
            let ov = OrientationVector::from_euler(&e);
            let back = EulerAngles::from_orientation_vector(&ov).unwrap();
            assert_relative_eq!(back.roll, 0.0, epsilon = 1e-9);
            assert_relative_eq!(back.pitch, FRAC_PI_2, epsilon = 1e-9);
            assert_relative_eq!(back.yaw, ov.theta, epsilon = 1e-9);
        }
    }

    #[test]
    fn negative_pole_subtracts_theta_from_yaw() {
        for roll in [0.3, -1.2] {
            let e = EulerAngles::new(roll, -FRAC_PI_2, 0.0);
            let ov = OrientationVector::from_euler(&e);
            let back = EulerAngles::from_orientation_vector(&ov).unwrap();
            assert_relative_eq!(back.roll, 0.0, epsilon = 1e-9);
            assert_relative_eq!(back.pitch, -FRAC_PI_2, epsilon = 1e-9);
            assert_relative_eq!(back.yaw, -ov.theta, epsilon = 1e-9);
        }
    }

    #[test]
    fn pole_round_trip_preserves_rotation() {
        let q = Quaternion::from_euler(&EulerAngles::new(0.7, FRAC_PI_2, 1.1));
        let back =
            Quaternion::from_orientation_vector(&OrientationVector::from_quaternion(&q)).unwrap();
        assert_same_rotation(&q, &back);
    }

    #[test]
    fn zero_rotation_maps_to_zero_vector() {
        let rv = RotationVector::from_quaternion(&Quaternion::identity());
        assert_eq!(rv, RotationVector::new(0.0, 0.0, 0.0));
        let q = Quaternion::from_rotation_vector(&rv);
        assert_same_rotation(&q, &Quaternion::identity());
    }

    #[test]
    fn rotation_vector_round_trip_preserves_rotation() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..1000 {
            let q = Quaternion::from_euler(&sample_euler(&mut rng));
            let back = Quaternion::from_rotation_vector(&RotationVector::from_quaternion(&q));
            assert_same_rotation(&q, &back);
        }
    }

    #[test]
    fn zero_direction_is_degenerate() {
        assert!(OrientationVector::new(0.0, 0.0, 0.0, 1.0).normalized().is_err());
        assert!(Quaternion::from_orientation_vector(&OrientationVector::new(0.0, 0.0, 0.0, 1.0))
            .is_err());
    }

    #[test]
    fn yaw_quarter_turn_survives_round_trip() {
        let e = EulerAngles::from_degrees(0.0, 0.0, 90.0);
        let back = EulerAngles::from_quaternion(&Quaternion::from_euler(&e));
        assert_relative_eq!(back.yaw.to_degrees(), 90.0, epsilon = 1e-6);
        assert_relative_eq!(back.roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(back.pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn euler_variant_survives_orientation_value_round_trip() {
        let value = OrientationValue::Euler(EulerAngles::new(0.2, -0.4, 1.3));
        let e = value.euler().unwrap();
        assert_relative_eq!(e.roll, 0.2);
        let q = value.quaternion().unwrap();
        let recovered = EulerAngles::from_quaternion(&q);
        assert_relative_eq!(recovered.yaw, 1.3, epsilon = 1e-9);
    }
}
