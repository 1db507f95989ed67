//! 2D and 3D transforms and their composition.

use std::ops::Mul;

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

/// A transform that can be expressed as a homogeneous matrix.
pub trait Transform {
    type Matrix: Copy + Mul<Output = Self::Matrix>;
    const IDENTITY: Self::Matrix;

    fn to_mat(&self) -> Self::Matrix;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform2 {
    Translation(Vec2),
    Scale(Vec2),
    /// Counter-clockwise rotation in radians.
    Rotation(f32),
}

impl Transform for Transform2 {
    type Matrix = Mat3;
    const IDENTITY: Mat3 = Mat3::IDENTITY;

    fn to_mat(&self) -> Mat3 {
        match *self {
            Self::Translation(t) => Mat3::from_translation(t),
            Self::Scale(s) => Mat3::from_scale(s),
            Self::Rotation(angle) => Mat3::from_angle(angle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform3 {
    Translation(Vec3),
    Scale(Vec3),
    /// Rotation in radians about `axis`.
    RotationAxis { angle: f32, axis: Vec3 },
    /// Quaternion given as (w, x, y, z).
    RotationQuat { w: f32, x: f32, y: f32, z: f32 },
}

impl Transform for Transform3 {
    type Matrix = Mat4;
    const IDENTITY: Mat4 = Mat4::IDENTITY;

    fn to_mat(&self) -> Mat4 {
        match *self {
            Self::Translation(t) => Mat4::from_translation(t),
            Self::Scale(s) => Mat4::from_scale(s),
            Self::RotationAxis { angle, axis } => {
                let axis = axis.try_normalize().unwrap_or(Vec3::Z);
                Mat4::from_axis_angle(axis, angle)
            }
            Self::RotationQuat { w, x, y, z } => {
                Mat4::from_quat(Quat::from_xyzw(x, y, z, w).normalize())
            }
        }
    }
}

/// Compose transforms so that the first one in the list is applied first:
/// `T_n * ... * T_1 * T_0`. An empty list gives the identity.
pub fn consolidate_transforms<T: Transform>(transforms: &[T]) -> T::Matrix {
    transforms
        .iter()
        .fold(T::IDENTITY, |acc, t| t.to_mat() * acc)
}

/// Matrix that transforms normals under `model`: the inverse transpose of its
/// upper 3x3 block.
pub fn transform_for_normals(model: &Mat4) -> Mat3 {
    Mat3::from_mat4(*model).inverse().transpose()
}

/// Pad a 3x3 matrix to three vec4 columns, the std140 layout of a `mat3x3`.
pub fn mat3_to_std140(mat: &Mat3) -> [[f32; 4]; 3] {
    let c = mat.to_cols_array_2d();
    [
        [c[0][0], c[0][1], c[0][2], 0.0],
        [c[1][0], c[1][1], c[1][2], 0.0],
        [c[2][0], c[2][1], c[2][2], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_empty_list_is_identity() {
        assert_eq!(consolidate_transforms::<Transform2>(&[]), Mat3::IDENTITY);
        assert_eq!(consolidate_transforms::<Transform3>(&[]), Mat4::IDENTITY);
    }

    #[test]
    fn test_first_transform_applies_first() {
        // Scale then translate: (1,0) -> (2,0) -> (3,0)
        let m = consolidate_transforms(&[
            Transform2::Scale(Vec2::splat(2.0)),
            Transform2::Translation(Vec2::new(1.0, 0.0)),
        ]);
        let p = m.transform_point2(Vec2::new(1.0, 0.0));
        assert!((p - Vec2::new(3.0, 0.0)).length() < 1e-6);

        // Translate then scale: (1,0) -> (2,0) -> (4,0)
        let m = consolidate_transforms(&[
            Transform2::Translation(Vec2::new(1.0, 0.0)),
            Transform2::Scale(Vec2::splat(2.0)),
        ]);
        let p = m.transform_point2(Vec2::new(1.0, 0.0));
        assert!((p - Vec2::new(4.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_rotation_2d() {
        let p = Transform2::Rotation(FRAC_PI_2)
            .to_mat()
            .transform_point2(Vec2::X);
        assert!((p - Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn test_rotations_3d_agree() {
        let axis = Transform3::RotationAxis {
            angle: FRAC_PI_2,
            axis: Vec3::Z,
        }
        .to_mat();
        let q = Quat::from_rotation_z(FRAC_PI_2);
        let quat = Transform3::RotationQuat {
            w: q.w,
            x: q.x,
            y: q.y,
            z: q.z,
        }
        .to_mat();

        let a = axis.transform_point3(Vec3::X);
        let b = quat.transform_point3(Vec3::X);
        assert!((a - Vec3::Y).length() < 1e-6);
        assert!((a - b).length() < 1e-6);
    }

    #[test]
    fn test_consolidate_3d_order() {
        let m = consolidate_transforms(&[
            Transform3::Translation(Vec3::X),
            Transform3::RotationAxis {
                angle: FRAC_PI_2,
                axis: Vec3::Z,
            },
        ]);
        // (0,0,0) -> (1,0,0) -> (0,1,0)
        let p = m.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_normals_under_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal_mat = transform_for_normals(&model);
        // A surface tilted at 45 degrees in xy has its normal bent toward y
        // when stretched along x.
        let n = (normal_mat * Vec3::new(1.0, 1.0, 0.0).normalize()).normalize();
        assert!(n.y > n.x);

        let rotation = Mat4::from_rotation_z(0.3);
        let normal_mat = transform_for_normals(&rotation);
        assert!(normal_mat.abs_diff_eq(Mat3::from_mat4(rotation), 1e-5));
    }

    #[test]
    fn test_mat3_std140_padding() {
        let padded = mat3_to_std140(&Mat3::IDENTITY);
        assert_eq!(padded[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(padded[2], [0.0, 0.0, 1.0, 0.0]);
    }
}
