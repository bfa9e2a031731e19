#![allow(dead_code)]

pub mod command;
pub mod file;
pub mod history;

use gitcore::areas::repository::Repository;
use gitcore::areas::storage::MemoryStorage;
use gitcore::artifacts::core::config::StoreConfig;
use std::io::Write;
use std::sync::{Arc, Mutex};

const TMPDIR: &str = "../playground";

pub fn redirect_temp_dir() {
    unsafe {
        std::env::set_var("TMPDIR", TMPDIR);
    }

    // Ensure the TMPDIR exists
    if !std::path::Path::new(TMPDIR).exists() {
        std::fs::create_dir_all(TMPDIR).expect("Failed to create TMPDIR");
    }
}

/// Command output captured from a repository's writer
#[derive(Debug, Clone, Default)]
pub struct Output(Arc<Mutex<Vec<u8>>>);

impl Output {
    /// Everything written since the last call
    pub fn take(&self) -> String {
        let mut buffer = self.0.lock().unwrap();
        String::from_utf8(std::mem::take(&mut *buffer)).unwrap()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// An initialized repository held entirely in memory
pub struct MemoryRepository {
    pub repository: Repository,
    pub storage: Arc<MemoryStorage>,
    pub output: Output,
}

pub fn memory_repository() -> MemoryRepository {
    memory_repository_with(StoreConfig::default())
}

pub fn memory_repository_with(config: StoreConfig) -> MemoryRepository {
    let storage = Arc::new(MemoryStorage::new());
    let output = Output::default();
    let repository =
        Repository::with_storage("/repo", storage.clone(), config, Box::new(output.clone()))
            .expect("Failed to open repository");

    repository.init().expect("Failed to initialize repository");
    output.take();

    MemoryRepository {
        repository,
        storage,
        output,
    }
}
