//! Axis-aligned ranges.

use glam::{Vec2, Vec3};

/// An axis-aligned box from `min` to `max`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

macro_rules! impl_range {
    ($vec:ty) => {
        impl Range<$vec> {
            pub fn new(min: $vec, max: $vec) -> Self {
                Self { min, max }
            }

            pub fn dimensions(&self) -> $vec {
                self.max - self.min
            }

            pub fn center(&self) -> $vec {
                // Does not overflow near f32::MAX.
                self.min * 0.5 + self.max * 0.5
            }

            pub fn contains(&self, point: $vec) -> bool {
                point.cmpge(self.min).all() && point.cmple(self.max).all()
            }
        }
    };
}

impl_range!(Vec2);
impl_range!(Vec3);

pub type Range2 = Range<Vec2>;
pub type Range3 = Range<Vec3>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_and_center() {
        let range = Range2::new(Vec2::new(-1.0, 2.0), Vec2::new(3.0, 4.0));
        assert_eq!(range.dimensions(), Vec2::new(4.0, 2.0));
        assert_eq!(range.center(), Vec2::new(1.0, 3.0));
    }

    #[test]
    fn test_center_of_huge_range_is_finite() {
        let range = Range2::new(Vec2::splat(f32::MAX), Vec2::splat(f32::MAX));
        assert!(range.center().is_finite());
    }

    #[test]
    fn test_contains_is_inclusive_per_component() {
        let range = Range3::new(Vec3::ZERO, Vec3::ONE);
        assert!(range.contains(Vec3::ZERO));
        assert!(range.contains(Vec3::ONE));
        assert!(range.contains(Vec3::splat(0.5)));
        assert!(!range.contains(Vec3::new(0.5, 1.5, 0.5)));
        assert!(!range.contains(Vec3::new(-0.1, 0.5, 0.5)));
    }
}
