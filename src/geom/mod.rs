//! Geometry: transforms, ranges and meshes.

pub mod mesh;
pub mod range;
pub mod transforms;

pub use mesh::{Mesh2, Mesh3, MeshFormat};
pub use range::{Range, Range2, Range3};
pub use transforms::{consolidate_transforms, transform_for_normals, Transform, Transform2, Transform3};
