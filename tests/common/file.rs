use derive_new::new;
use filetime::FileTime;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct FileSpec {
    pub path: PathBuf,
    pub content: String,
}

pub fn write_generated_files(dir: &Path, files_count: usize) -> Vec<FileSpec> {
    use fake::{
        Fake,
        faker::lorem::en::{Word, Words},
    };

    (0..files_count)
        .map(|index| {
            let file_name = format!("{}-{index}.txt", Word().fake::<String>());
            let file_path = dir.join(&file_name);
            let file_content = Words(5..10).fake::<Vec<String>>().join(" ");

            let file_spec = FileSpec::new(file_path, file_content);
            write_file(file_spec.clone());

            file_spec
        })
        .collect::<Vec<_>>()
}

pub fn write_file(file_spec: FileSpec) {
    // make sure the parent directory exists
    if let Some(parent) = file_spec.path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("Failed to create directory {:?}: {}", parent, e));
    }

    std::fs::write(&file_spec.path, &file_spec.content)
        .unwrap_or_else(|e| panic!("Failed to write file {:?}: {}", file_spec.path, e));
}

/// Move a file's modification time into the future without changing its content
pub fn touch_file(path: &Path) {
    let metadata = std::fs::metadata(path)
        .unwrap_or_else(|e| panic!("Failed to stat {:?}: {}", path, e));
    let mtime = FileTime::from_last_modification_time(&metadata);
    let later = FileTime::from_unix_time(mtime.unix_seconds() + 10, mtime.nanoseconds());

    filetime::set_file_mtime(path, later)
        .unwrap_or_else(|e| panic!("Failed to touch {:?}: {}", path, e));
}

/// Rewrite a file and set its modification time back to what it was
pub fn rewrite_keeping_mtime(path: &Path, content: &str) {
    let metadata = std::fs::metadata(path)
        .unwrap_or_else(|e| panic!("Failed to stat {:?}: {}", path, e));
    let mtime = FileTime::from_last_modification_time(&metadata);

    std::fs::write(path, content).unwrap_or_else(|e| panic!("Failed to write {:?}: {}", path, e));
    filetime::set_file_mtime(path, mtime)
        .unwrap_or_else(|e| panic!("Failed to reset mtime of {:?}: {}", path, e));
}
