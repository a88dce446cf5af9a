use std::f64::consts::{PI, TAU};

use nalgebra::{Matrix4, Rotation3, Unit, Vector3};

/// Homogeneous bone transform. Column 3 holds the translation, columns 0..3
/// hold the bone's forward/right/up basis vectors.
pub type Transform = Matrix4<f64>;

/// Builds a rotation-only transform from Euler angles applied Z, then Y, then X
/// (`Rz * Ry * Rx`).
///
/// # Arguments
///
/// * `angles` - Rotation around X, Y and Z in radians.
///
/// # Returns
///
/// A 4x4 transform with zero translation.
pub fn rotation_from_euler(angles: &Vector3<f64>) -> Transform {
    Rotation3::from_euler_angles(angles.x, angles.y, angles.z).to_homogeneous()
}

/// Builds a transform from Euler angles and a translation.
///
/// # Arguments
///
/// * `angles` - Rotation around X, Y and Z in radians (Z-Y-X application).
/// * `translation` - Position relative to the parent space.
///
/// # Returns
///
/// The combined rotation + translation transform.
pub fn from_euler_translation(angles: &Vector3<f64>, translation: &Vector3<f64>) -> Transform {
    let mut m = rotation_from_euler(angles);
    set_translation(&mut m, translation);
    m
}

/// Decodes the Euler angles of a transform, inverse of [`rotation_from_euler`].
///
/// The pitch (Y) is always in `[-π/2, π/2]`; the decomposition stays finite
/// at gimbal lock.
///
/// # Arguments
///
/// * `m` - Transform whose upper-left 3x3 block is a rotation.
///
/// # Returns
///
/// Angles around X, Y and Z in radians.
pub fn euler_angles(m: &Transform) -> Vector3<f64> {
    let yaw = m[(1, 0)].atan2(m[(0, 0)]);
    let c2 = (m[(2, 1)] * m[(2, 1)] + m[(2, 2)] * m[(2, 2)]).sqrt();
    let pitch = (-m[(2, 0)]).atan2(c2);
    let (s1, c1) = yaw.sin_cos();
    let roll = (s1 * m[(0, 2)] - c1 * m[(1, 2)]).atan2(c1 * m[(1, 1)] - s1 * m[(0, 1)]);
    Vector3::new(roll, pitch, yaw)
}

/// Returns the translation column of a transform.
pub fn translation(m: &Transform) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Overwrites the translation column of a transform, keeping `w = 1`.
pub fn set_translation(m: &mut Transform, t: &Vector3<f64>) {
    m[(0, 3)] = t.x;
    m[(1, 3)] = t.y;
    m[(2, 3)] = t.z;
    m[(3, 3)] = 1.0;
}

/// Returns basis vector `axis` (0 = X, 1 = Y, 2 = Z) of a transform.
pub fn basis(m: &Transform, axis: usize) -> Vector3<f64> {
    Vector3::new(m[(0, axis)], m[(1, axis)], m[(2, axis)])
}

/// Inverts a bone transform. Bone transforms are rigid and therefore always
/// invertible; a degenerate matrix falls back to identity.
pub fn inverse(m: &Transform) -> Transform {
    m.try_inverse().unwrap_or_else(Transform::identity)
}

/// Rotates `m` around its own basis axes by `angles` (X, then Y, then Z) while
/// keeping its translation.
///
/// Each axis is taken from `m` before any of the three rotations is applied,
/// and the result is `Rz * Ry * Rx * m`.
///
/// # Arguments
///
/// * `m` - Transform to rotate.
/// * `angles` - Rotation deltas around the transform's X, Y and Z axes.
///
/// # Returns
///
/// The rotated transform with the original translation.
pub fn rotate_about_own_axes(m: &Transform, angles: &Vector3<f64>) -> Transform {
    let about = |axis: usize, angle: f64| -> Transform {
        let direction = basis(m, axis);
        if direction.norm() == 0.0 {
            return Transform::identity();
        }
        Rotation3::from_axis_angle(&Unit::new_normalize(direction), angle).to_homogeneous()
    };

    let mut rotated = about(2, angles.z) * about(1, angles.y) * about(0, angles.x) * m;
    set_translation(&mut rotated, &translation(m));
    rotated
}

/// Rotates `m` around the fixed axes of the space it is expressed in, keeping
/// its translation. The result is `Rz * Ry * Rx * m` with world-aligned axes.
pub fn rotate_about_fixed_axes(m: &Transform, angles: &Vector3<f64>) -> Transform {
    let mut rotated = rotation_from_euler(angles) * m;
    set_translation(&mut rotated, &translation(m));
    rotated
}

/// Wraps every angle into `[-π, π]`.
pub fn wrap_angles(angles: &mut Vector3<f64>) {
    for angle in angles.iter_mut() {
        while *angle > PI {
            *angle -= TAU;
        }
        while *angle < -PI {
            *angle += TAU;
        }
    }
}

/// Replaces components that print as `-0.000000` with `+0.0` so serialized
/// files never contain negative zeros.
pub fn canonicalize_zero(v: &mut Vector3<f64>) {
    for c in v.iter_mut() {
        if c.abs() < 5e-7 {
            *c = 0.0;
        }
    }
}
