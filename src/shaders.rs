use std::fs;

use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Result};

/// Paths of the pre-compiled SPIR-V shader programs, read at
/// startup. The GLSL sources live alongside them; see the
/// shaders/ directory for how to rebuild the blobs.
pub const VERTEX_SHADER_PATH: &str = "shaders/shader.vert.spv";
pub const FRAGMENT_SHADER_PATH: &str = "shaders/shader.frag.spv";

/// Reads a compiled shader from disk. The contents are opaque
/// bytecode handed to the driver as-is; the only sanity check
/// applied here is that the file is not empty.
pub fn load_shader(path: &str) -> Result<Vec<u8>> {
    let bytecode = fs::read(path)
        .map_err(|e| anyhow!("Failed to read shader {}: {}", path, e))?;

    if bytecode.is_empty() {
        return Err(anyhow!("Shader {} is empty.", path));
    }

    Ok(bytecode)
}

pub unsafe fn create_shader_module(
    device: &Device,
    bytecode: &[u8],
) -> Result<vk::ShaderModule> {
    // The info struct wants the bytecode as u32 words, while the
    // file was read as bytes. Realigning the slice splits it in
    // a prefix, an aligned middle, and a suffix; non-empty outer
    // parts mean the bytecode was misaligned or truncated, which
    // the driver would reject anyway, so it is caught here.
    let bytecode = Vec::<u8>::from(bytecode);
    let (prefix, code, suffix) = bytecode.align_to::<u32>();
    if !prefix.is_empty() || !suffix.is_empty() {
        return Err(anyhow!("Shader bytecode is not properly aligned."));
    }

    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.len())
        .code(code);

    Ok(device.create_shader_module(&info, None)?)
}
