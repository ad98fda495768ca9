//! Standard and low-resolution chunk presets

use serde::Serialize;
use wallet_core::QrConfig;

use crate::chunk::{self, chunk_capacity, ChunkTag};

/// QR density selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QrResolution {
    #[default]
    Standard,
    LowRes,
}

impl QrResolution {
    pub fn toggled(self) -> Self {
        match self {
            Self::Standard => Self::LowRes,
            Self::LowRes => Self::Standard,
        }
    }
}

/// Chunk sizes for both resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPresets {
    pub standard: usize,
    pub low_res: usize,
}

impl ChunkPresets {
    pub fn chunk_size(&self, resolution: QrResolution) -> usize {
        match resolution {
            QrResolution::Standard => self.standard,
            QrResolution::LowRes => self.low_res,
        }
    }

    pub fn encode(&self, tag: ChunkTag, payload: &str, resolution: QrResolution) -> Vec<String> {
        chunk::encode(tag, payload, self.chunk_size(resolution))
    }

    /// Switching only makes sense when the low-res preset would split the payload
    pub fn offers_toggle(&self, payload: &str) -> bool {
        payload.chars().count() > chunk_capacity(self.low_res)
    }
}

impl Default for ChunkPresets {
    fn default() -> Self {
        Self::from(&QrConfig::default())
    }
}

impl From<&QrConfig> for ChunkPresets {
    fn from(config: &QrConfig) -> Self {
        Self {
            standard: config.standard_chunk_size,
            low_res: config.low_res_chunk_size,
        }
    }
}
