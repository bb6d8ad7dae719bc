use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::buffer::BufferMemory;
use super::error::{PoolError, PoolResult};
use super::geometry::PoolGeometry;
use super::BufferId;

/// Owns the pool directory and the naming and I/O of its buffer files
#[derive(Debug, Clone)]
pub struct BufferFileManager {
    /// Absolute pool directory
    pool_path: PathBuf,
    prefix: String,
}

impl BufferFileManager {
    /// Attach to an existing pool directory
    pub fn open<P: AsRef<Path>>(pool_path: P, prefix: &str) -> PoolResult<Self> {
        let path = pool_path.as_ref();
        if !path.is_dir() {
            return Err(PoolError::PoolDirectoryMissing(path.display().to_string()));
        }
        let pool_path = path
            .canonicalize()
            .map_err(|_| PoolError::PoolDirectoryMissing(path.display().to_string()))?;
        Ok(Self {
            pool_path,
            prefix: prefix.to_string(),
        })
    }

    /// Create the pool directory (and parents) if needed, then attach to it
    pub fn create<P: AsRef<Path>>(pool_path: P, prefix: &str) -> PoolResult<Self> {
        fs::create_dir_all(pool_path.as_ref())?;
        Self::open(pool_path, prefix)
    }

    pub fn pool_path(&self) -> &Path {
        &self.pool_path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path of the file backing `buffer`: `<pool>/<prefix><buffer>`
    pub fn buffer_file_path(&self, buffer: BufferId) -> PathBuf {
        self.pool_path.join(format!("{}{}", self.prefix, buffer))
    }

    /// Check a persisted buffer file exists and has exactly `expected` bytes
    pub fn check_buffer_file(&self, path: &Path, expected: u64) -> PoolResult<()> {
        let metadata = fs::metadata(path)
            .map_err(|_| PoolError::MissingBufferFile(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(PoolError::MissingBufferFile(path.display().to_string()));
        }
        if metadata.len() != expected {
            return Err(PoolError::BufferFileSize {
                path: path.display().to_string(),
                expected,
                actual: metadata.len(),
            });
        }
        Ok(())
    }

    /// Truncate and rewrite a buffer file with the full buffer image.
    /// Returns false if a borrowed brick had to be written as zeros.
    pub fn write_buffer(&self, path: &Path, memory: &BufferMemory) -> PoolResult<bool> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        let complete = memory.write_to(&mut writer)?;
        writer.flush()?;
        Ok(complete)
    }

    /// Read a full buffer image from its file
    pub fn read_buffer(&self, path: &Path, geometry: &PoolGeometry) -> PoolResult<BufferMemory> {
        let file = File::open(path)
            .map_err(|_| PoolError::MissingBufferFile(path.display().to_string()))?;
        let mut reader = BufReader::new(file);
        let memory = BufferMemory::read_from(&mut reader, geometry)?;
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_open_missing_directory() {
        let temp_dir = setup_test_dir();
        let result = BufferFileManager::open(temp_dir.path().join("nope"), "buffer_");
        assert!(matches!(result, Err(PoolError::PoolDirectoryMissing(_))));
    }

    #[test]
    fn test_create_nested_directory() {
        let temp_dir = setup_test_dir();
        let nested = temp_dir.path().join("a").join("b");
        let manager = BufferFileManager::create(&nested, "buffer_").unwrap();
        assert!(nested.is_dir());
        assert!(manager.pool_path().is_absolute());
    }

    #[test]
    fn test_buffer_file_naming() {
        let temp_dir = setup_test_dir();
        let manager = BufferFileManager::open(temp_dir.path(), "bb").unwrap();
        let path = manager.buffer_file_path(12);
        assert_eq!(path.file_name().unwrap(), "bb12");
        assert_eq!(path.parent().unwrap(), manager.pool_path());
    }

    #[test]
    fn test_write_read_buffer() {
        let temp_dir = setup_test_dir();
        let manager = BufferFileManager::open(temp_dir.path(), "buffer_").unwrap();
        let geometry = PoolGeometry::new(8, 32).unwrap();
        let path = manager.buffer_file_path(0);

        let memory = BufferMemory::zeroed(&geometry);
        memory.brick(3).write()[7] = 0xAB;
        manager.write_buffer(&path, &memory).unwrap();
        manager.check_buffer_file(&path, 32).unwrap();

        let loaded = manager.read_buffer(&path, &geometry).unwrap();
        assert_eq!(loaded.brick(3).read()[7], 0xAB);
        assert_eq!(loaded.brick(0).read()[0], 0);
    }

    #[test]
    fn test_write_truncates() {
        let temp_dir = setup_test_dir();
        let manager = BufferFileManager::open(temp_dir.path(), "buffer_").unwrap();
        let geometry = PoolGeometry::new(8, 16).unwrap();
        let path = manager.buffer_file_path(0);

        fs::write(&path, vec![1u8; 100]).unwrap();
        manager
            .write_buffer(&path, &BufferMemory::zeroed(&geometry))
            .unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 16);
    }

    #[test]
    fn test_check_buffer_file() {
        let temp_dir = setup_test_dir();
        let manager = BufferFileManager::open(temp_dir.path(), "buffer_").unwrap();
        let path = manager.buffer_file_path(0);

        let result = manager.check_buffer_file(&path, 16);
        assert!(matches!(result, Err(PoolError::MissingBufferFile(_))));

        fs::write(&path, vec![0u8; 10]).unwrap();
        let result = manager.check_buffer_file(&path, 16);
        assert!(matches!(
            result,
            Err(PoolError::BufferFileSize {
                expected: 16,
                actual: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = setup_test_dir();
        let manager = BufferFileManager::open(temp_dir.path(), "buffer_").unwrap();
        let geometry = PoolGeometry::new(8, 16).unwrap();
        let result = manager.read_buffer(&manager.buffer_file_path(4), &geometry);
        assert!(matches!(result, Err(PoolError::MissingBufferFile(_))));
    }
}
