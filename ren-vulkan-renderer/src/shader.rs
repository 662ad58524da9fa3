use ash::{util::read_spv, vk, Device};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use crate::error::{RendererError, Result};

/// A compiled shader, kept as opaque bytes until module creation.
///
/// Only the framing is checked here (word alignment and the SPIR-V magic
/// number); everything else is left to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinary {
    bytes: Cow<'static, [u8]>,
}

impl ShaderBinary {
    pub fn from_bytes(bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RendererError::ShaderRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reinterprets the bytes as SPIR-V words.
    pub fn words(&self) -> Result<Vec<u32>> {
        if self.bytes.is_empty() {
            return Err(RendererError::InvalidShader("shader binary is empty".to_string()));
        }
        // read_spv rejects lengths that are not a multiple of four and blobs
        // without the magic number, byte-swapping big-endian input.
        read_spv(&mut Cursor::new(&self.bytes[..]))
            .map_err(|e| RendererError::InvalidShader(e.to_string()))
    }
}

/// Creates a shader module from `binary`. The caller owns the module.
pub fn create_shader_module(device: &Device, binary: &ShaderBinary) -> Result<vk::ShaderModule> {
    let code = binary.words()?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(RendererError::setup("vkCreateShaderModule"))
}
