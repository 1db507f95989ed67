//! Debug drawing helpers.

pub mod lines;

pub use lines::{
    LinesPipeline2, LinesPipelineSettings, MeshHandle, SimpleDisplayUniforms, SimpleMesh2,
    SimpleMeshUniforms, SimpleModelUniforms,
};
