use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::PoolResult;
use crate::brick::VirtualAddress;

/// Persisted description of a brick pool, enough to reopen it later.
///
/// The free list and the residency state are not part of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolManifest {
    pub brick_memory_size_bytes: usize,
    pub max_single_buffer_size_bytes: usize,
    pub single_buffer_size_bytes: usize,
    pub num_brick_slots_per_buffer: usize,
    pub buffer_files: Vec<PathBuf>,
    pub brick_pool_path: PathBuf,
    pub buffer_file_prefix: String,
    pub next_virtual_memory_address: VirtualAddress,
}

impl PoolManifest {
    pub fn load(path: &Path) -> PoolResult<Self> {
        let content = fs::read_to_string(path)?;
        let manifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> PoolResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Bytes occupied on disk by the buffer files
    pub fn disk_footprint(&self) -> u64 {
        self.buffer_files.len() as u64 * self.single_buffer_size_bytes as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolManifest {
        PoolManifest {
            brick_memory_size_bytes: 4096,
            max_single_buffer_size_bytes: 16384,
            single_buffer_size_bytes: 12288,
            num_brick_slots_per_buffer: 3,
            buffer_files: vec![PathBuf::from("/pool/buffer_0")],
            brick_pool_path: PathBuf::from("/pool"),
            buffer_file_prefix: "buffer_".to_string(),
            next_virtual_memory_address: 8192,
        }
    }

    #[test]
    fn test_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        for key in [
            "maxSingleBufferSizeBytes",
            "singleBufferSizeBytes",
            "numBrickSlotsPerBuffer",
            "bufferFiles",
            "brickPoolPath",
            "bufferFilePrefix",
            "nextVirtualMemoryAddress",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pool.json");
        let manifest = sample();
        manifest.save(&path).unwrap();
        assert_eq!(PoolManifest::load(&path).unwrap(), manifest);
        assert_eq!(manifest.disk_footprint(), 12288);
    }
}
