//! WGSL shaders compiled to SPIR-V with naga.

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

/// A shader stage's WGSL source and entry point.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource {
    pub source: &'static str,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static str,
}

impl ShaderSource {
    pub fn vertex(source: &'static str) -> Self {
        Self {
            source,
            stage: vk::ShaderStageFlags::VERTEX,
            entry_point: "vs_main",
        }
    }

    pub fn fragment(source: &'static str) -> Self {
        Self {
            source,
            stage: vk::ShaderStageFlags::FRAGMENT,
            entry_point: "fs_main",
        }
    }

    pub fn compute(source: &'static str) -> Self {
        Self {
            source,
            stage: vk::ShaderStageFlags::COMPUTE,
            entry_point: "cs_main",
        }
    }
}

fn naga_stage(stage: vk::ShaderStageFlags) -> VlkResult<naga::ShaderStage> {
    match stage {
        vk::ShaderStageFlags::VERTEX => Ok(naga::ShaderStage::Vertex),
        vk::ShaderStageFlags::FRAGMENT => Ok(naga::ShaderStage::Fragment),
        vk::ShaderStageFlags::COMPUTE => Ok(naga::ShaderStage::Compute),
        other => Err(VlkError::Shader(format!(
            "Unsupported shader stage {:?}",
            other
        ))),
    }
}

/// Compile one entry point of a WGSL module to SPIR-V words.
pub fn compile_wgsl(source: &str, stage: vk::ShaderStageFlags, entry_point: &str) -> VlkResult<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| VlkError::Shader(format!("WGSL parse error: {}", e.emit_to_string(source))))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| VlkError::Shader(format!("Validation error: {e}")))?;

    let shader_stage = naga_stage(stage)?;
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == shader_stage)
    {
        return Err(VlkError::Shader(format!(
            "Entry point '{}' not found for stage {:?}",
            entry_point, shader_stage
        )));
    }

    // WGSL cannot write PointSize, which point-list pipelines read.
    let flags = if shader_stage == naga::ShaderStage::Vertex {
        naga::back::spv::WriterFlags::FORCE_POINT_SIZE
    } else {
        naga::back::spv::WriterFlags::empty()
    };
    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags,
        capabilities: None,
        bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
        binding_map: Default::default(),
        debug_info: None,
        zero_initialize_workgroup_memory: naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage,
        entry_point: entry_point.to_string(),
    };

    naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| VlkError::Shader(format!("SPIR-V generation error: {e}")))
}

/// A `vk::ShaderModule` destroyed on drop. Only needed until the pipeline
/// using it has been created.
pub struct ShaderModule {
    device: ash::Device,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    entry_point: std::ffi::CString,
}

impl ShaderModule {
    pub fn from_wgsl(
        device: &ash::Device,
        source: &str,
        stage: vk::ShaderStageFlags,
        entry_point: &str,
    ) -> VlkResult<Self> {
        let spv = compile_wgsl(source, stage, entry_point)?;
        let entry_point = std::ffi::CString::new(entry_point).map_err(|e| {
            VlkError::InvalidParameter(format!("Invalid entry point name: {}", e))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&spv);
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self {
            device: device.clone(),
            module,
            stage,
            entry_point,
        })
    }

    pub fn from_source(device: &ash::Device, source: &ShaderSource) -> VlkResult<Self> {
        Self::from_wgsl(device, source.source, source.stage, source.entry_point)
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage create info borrowing this module's entry point name.
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) - 1);
    let y = f32(i32(index & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn test_compile_vertex_and_fragment() {
        let vs = compile_wgsl(TRIANGLE, vk::ShaderStageFlags::VERTEX, "vs_main").unwrap();
        let fs = compile_wgsl(TRIANGLE, vk::ShaderStageFlags::FRAGMENT, "fs_main").unwrap();
        // SPIR-V magic number
        assert_eq!(vs[0], 0x0723_0203);
        assert_eq!(fs[0], 0x0723_0203);
    }

    #[test]
    fn test_missing_entry_point() {
        let err = compile_wgsl(TRIANGLE, vk::ShaderStageFlags::VERTEX, "main").unwrap_err();
        assert!(matches!(err, VlkError::Shader(_)));
        let err = compile_wgsl(TRIANGLE, vk::ShaderStageFlags::FRAGMENT, "vs_main").unwrap_err();
        assert!(matches!(err, VlkError::Shader(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = compile_wgsl("fn broken(", vk::ShaderStageFlags::VERTEX, "vs_main").unwrap_err();
        assert!(err.to_string().contains("WGSL parse error"));
    }

    #[test]
    fn test_unsupported_stage() {
        assert!(naga_stage(vk::ShaderStageFlags::GEOMETRY).is_err());
    }

    #[test]
    fn test_shipped_shaders_compile() {
        let shaders = [
            (include_str!("../../shaders/mesh.wgsl"), false),
            (include_str!("../../shaders/particles.wgsl"), false),
            (include_str!("../../shaders/lines_2d.wgsl"), false),
            (include_str!("../../shaders/particles_compute.wgsl"), true),
        ];
        for (source, compute) in shaders {
            let stages = if compute {
                vec![ShaderSource::compute(source)]
            } else {
                vec![ShaderSource::vertex(source), ShaderSource::fragment(source)]
            };
            for shader in stages {
                let words = compile_wgsl(shader.source, shader.stage, shader.entry_point).unwrap();
                assert_eq!(words[0], 0x0723_0203);
            }
        }
    }
}
