use crate::common::file::{FileSpec, write_file};
use crate::common::redirect_temp_dir;
use assert_cmd::Command;
use assert_fs::TempDir;
use rstest::fixture;
use std::path::Path;

#[fixture]
pub fn repository_dir() -> TempDir {
    redirect_temp_dir();
    TempDir::new().expect("Failed to create temp dir")
}

/// An initialized repository with `1.txt`, `a/2.txt` and `a/b/3.txt` staged
#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_gitcore_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    let file1 = FileSpec::new(repository_dir.path().join("1.txt"), "one".to_string());
    write_file(file1);

    let file2 = FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two".to_string(),
    );
    write_file(file2);

    let file3 = FileSpec::new(
        repository_dir.path().join("a").join("b").join("3.txt"),
        "three".to_string(),
    );
    write_file(file3);

    run_gitcore_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();

    repository_dir
}

pub fn run_gitcore_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("gitcore").expect("Failed to find gitcore binary");
    cmd.env("RUST_LOG", "off");
    cmd.current_dir(dir);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

/// Run a command expected to succeed and return its trimmed stdout
pub fn gitcore_output(dir: &Path, args: &[&str]) -> String {
    let output = run_gitcore_command(dir, args).assert().success();
    String::from_utf8(output.get_output().stdout.clone())
        .expect("stdout is not UTF-8")
        .trim_end()
        .to_string()
}

/// Store `content` as an object of `object_type` through `hash-object -w`
pub fn hash_object(dir: &Path, object_type: &str, content: &str) -> String {
    let file_name = format!("object-{}.tmp", rand_suffix());
    std::fs::write(dir.join(&file_name), content).expect("Failed to write object file");
    let oid = gitcore_output(dir, &["hash-object", "-w", "-t", object_type, &file_name]);
    std::fs::remove_file(dir.join(&file_name)).expect("Failed to remove object file");
    oid
}

/// Store a commit of `tree` with `parents` and return its address
pub fn commit_tree(dir: &Path, tree: &str, parents: &[&str], timestamp: i64, message: &str) -> String {
    let mut content = format!("tree {tree}\n");
    for parent in parents {
        content.push_str(&format!("parent {parent}\n"));
    }
    content.push_str(&format!(
        "author A U Thor <author@example.com> {timestamp} +0000\n\
         committer A U Thor <author@example.com> {timestamp} +0000\n\n{message}\n"
    ));

    hash_object(dir, "commit", &content)
}

fn rand_suffix() -> String {
    use fake::Fake;
    use fake::faker::lorem::en::Word;

    format!("{}-{}", Word().fake::<String>(), (0..u32::MAX).fake::<u32>())
}
