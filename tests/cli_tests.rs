use assert_fs::TempDir;
use bytes::Bytes;
use gitcore::areas::repository::Repository;
use gitcore::artifacts::objects::object_id::ObjectId;
use gitcore::artifacts::transport::advertisement::{AdvertisedRef, RefAdvertisement};
use gitcore::artifacts::transport::pkt_line::{PktLine, SideBand, encode_lines};
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;

mod common;

use common::command::{
    commit_tree, gitcore_output, hash_object, init_repository_dir, repository_dir,
    run_gitcore_command,
};
use common::file::{FileSpec, rewrite_keeping_mtime, touch_file, write_file, write_generated_files};
use common::history;

fn open(dir: &Path) -> Repository {
    Repository::new(&dir.to_string_lossy(), Box::new(std::io::sink())).unwrap()
}

/// Three commits on master, built through the library on disk
fn linear_history(dir: &Path) -> [ObjectId; 3] {
    history::linear_history(&open(dir))
}

#[rstest]
fn init_creates_the_git_directory(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir_absolute_path = repository_dir.path().canonicalize()?.display().to_string();

    run_gitcore_command(repository_dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^Initialized empty Git repository in .+\.git\n$")?)
        .stdout(predicate::str::contains(dir_absolute_path));

    assert_eq!(
        std::fs::read_to_string(repository_dir.path().join(".git/HEAD"))?,
        "ref: refs/heads/master\n"
    );
    assert!(repository_dir.path().join(".git/objects/pack").is_dir());

    run_gitcore_command(repository_dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Reinitialized existing Git repository in"));

    Ok(())
}

#[rstest]
fn init_at_a_path(repository_dir: TempDir) {
    let target = repository_dir.path().join("nested").join("repo");

    run_gitcore_command(repository_dir.path(), &["init", target.to_str().unwrap()])
        .assert()
        .success();

    assert!(target.join(".git/refs/heads").is_dir());
}

#[rstest]
fn hash_object_and_cat_file_agree(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    run_gitcore_command(repository_dir.path(), &["init"]).assert().success();
    let files = write_generated_files(repository_dir.path(), 1);
    let file = &files[0];
    let file_name = file.path.file_name().unwrap().to_str().unwrap();

    let unwritten = gitcore_output(repository_dir.path(), &["hash-object", file_name]);
    let written = gitcore_output(repository_dir.path(), &["hash-object", "-w", file_name]);
    assert_eq!(unwritten, written);

    let object_type = gitcore_output(repository_dir.path(), &["cat-file", "-t", &written]);
    let size = gitcore_output(repository_dir.path(), &["cat-file", "-s", &written[..7]]);
    let content = run_gitcore_command(repository_dir.path(), &["cat-file", "-p", &written])
        .assert()
        .success();

    assert_eq!(object_type, "blob");
    assert_eq!(size, file.content.len().to_string());
    assert_eq!(String::from_utf8(content.get_output().stdout.clone())?, file.content);

    Ok(())
}

#[rstest]
fn hash_object_rejects_malformed_commits(repository_dir: TempDir) {
    run_gitcore_command(repository_dir.path(), &["init"]).assert().success();
    write_file(FileSpec::new(
        repository_dir.path().join("bogus"),
        "not a commit\n".to_string(),
    ));

    run_gitcore_command(repository_dir.path(), &["hash-object", "-t", "commit", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("format error"));
}

#[rstest]
fn cat_file_of_a_missing_object_fails(repository_dir: TempDir) {
    run_gitcore_command(repository_dir.path(), &["init"]).assert().success();

    run_gitcore_command(
        repository_dir.path(),
        &["cat-file", "-p", "0123456789012345678901234567890123456789"],
    )
    .assert()
    .failure()
    .stderr(predicate::str::contains("not found"));
}

#[rstest]
fn status_is_empty_right_after_add(init_repository_dir: TempDir) {
    let output = gitcore_output(init_repository_dir.path(), &["status"]);

    assert_eq!(output, "");
}

#[rstest]
fn status_reports_modified_and_deleted_files(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "uno".to_string()));
    write_file(FileSpec::new(dir.join("a/b/3.txt"), "three, longer".to_string()));
    std::fs::remove_file(dir.join("a/2.txt")).unwrap();

    let output = gitcore_output(dir, &["status"]);

    assert_eq!(output, " M 1.txt\n D a/2.txt\n M a/b/3.txt");
}

#[rstest]
fn status_ignores_touched_files(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    touch_file(&dir.join("1.txt"));

    assert_eq!(gitcore_output(dir, &["status"]), "");
    // the refreshed stat is written back, so a second run agrees
    assert_eq!(gitcore_output(dir, &["status"]), "");
}

#[rstest]
fn status_detects_changes_that_keep_size_and_mtime(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    rewrite_keeping_mtime(&dir.join("a/2.txt"), "TWO");

    assert_eq!(gitcore_output(dir, &["status"]), " M a/2.txt");
}

#[rstest]
fn add_skips_missing_paths_and_drops_deleted_files(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    std::fs::remove_dir_all(dir.join("a")).unwrap();

    run_gitcore_command(dir, &["add", "no-such-file.txt", "a"])
        .assert()
        .success();

    assert_eq!(gitcore_output(dir, &["status"]), "");
}

#[rstest]
fn rev_list_over_cli_built_commits(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();

    let tree = hash_object(dir, "tree", "");
    let c1 = commit_tree(dir, &tree, &[], 1_700_000_000, "first");
    let c2 = commit_tree(dir, &tree, &[&c1], 1_700_000_100, "second");
    run_gitcore_command(dir, &["update-ref", "refs/heads/master", &c2])
        .assert()
        .success();

    assert_eq!(gitcore_output(dir, &["rev-list", "HEAD"]), format!("{c2}\n{c1}"));
    assert_eq!(gitcore_output(dir, &["rev-list", "master", "^master~1"]), c2);
    assert_eq!(
        gitcore_output(dir, &["rev-list", "--objects", "HEAD~1..HEAD"]),
        c2
    );
}

#[rstest]
fn update_ref_compare_and_swap(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();
    let [c1, c2, c3] = linear_history(dir);

    run_gitcore_command(dir, &["update-ref", "refs/heads/topic", &c1.to_hex()])
        .assert()
        .success();
    run_gitcore_command(
        dir,
        &["update-ref", "refs/heads/topic", &c3.to_hex(), &c2.to_hex()],
    )
    .assert()
    .failure();
    run_gitcore_command(
        dir,
        &["update-ref", "refs/heads/topic", &c3.to_hex(), &c1.to_hex()],
    )
    .assert()
    .success();

    assert_eq!(
        gitcore_output(dir, &["show-ref", "--heads"]),
        format!("{c3} refs/heads/master\n{c3} refs/heads/topic")
    );

    run_gitcore_command(dir, &["update-ref", "-d", "refs/heads/topic"])
        .assert()
        .success();
    assert_eq!(
        gitcore_output(dir, &["show-ref"]),
        format!("{c3} refs/heads/master")
    );
}

#[rstest]
fn show_ref_fails_without_references(repository_dir: TempDir) {
    run_gitcore_command(repository_dir.path(), &["init"]).assert().success();

    run_gitcore_command(repository_dir.path(), &["show-ref"])
        .assert()
        .code(1);
}

#[rstest]
fn symbolic_ref_round_trip(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();

    assert_eq!(gitcore_output(dir, &["symbolic-ref", "HEAD"]), "refs/heads/master");
    run_gitcore_command(dir, &["symbolic-ref", "HEAD", "refs/heads/main"])
        .assert()
        .success();
    assert_eq!(gitcore_output(dir, &["symbolic-ref", "HEAD"]), "refs/heads/main");
}

#[rstest]
#[case("refs/heads/main", 0)]
#[case("refs/heads/.hidden", 1)]
#[case("refs/heads/with space", 1)]
#[case("refs/heads/x.lock", 1)]
fn check_ref_format_exit_codes(repository_dir: TempDir, #[case] name: &str, #[case] code: i32) {
    run_gitcore_command(repository_dir.path(), &["check-ref-format", name])
        .assert()
        .code(code);
}

#[rstest]
fn pack_refs_keeps_references_resolvable(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();
    let [_, _, c3] = linear_history(dir);

    assert_eq!(gitcore_output(dir, &["pack-refs"]), "packed 1 refs");
    assert!(!dir.join(".git/refs/heads/master").exists());
    assert_eq!(
        gitcore_output(dir, &["show-ref"]),
        format!("{c3} refs/heads/master")
    );
}

#[rstest]
fn packs_are_written_verified_indexed_and_unpacked(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();
    let [c1, _, c3] = linear_history(dir);

    let checksum = gitcore_output(dir, &["pack-objects", "out/pack", "HEAD"]);
    let pack_path = format!("out/pack-{checksum}.pack");
    let index_path = format!("out/pack-{checksum}.idx");
    assert!(dir.join(&index_path).exists());

    let verbose = gitcore_output(dir, &["verify-pack", "-v", &index_path]);
    let lines = verbose.lines().collect::<Vec<_>>();
    assert!(lines.last().unwrap().ends_with(": ok"));
    assert!(lines.iter().any(|line| line.starts_with(&format!("{c3} commit "))));
    // 3 commits, 3 trees, 3 blobs and the status line
    assert_eq!(lines.len(), 10);

    let original_index = std::fs::read(dir.join(&index_path)).unwrap();
    std::fs::remove_file(dir.join(&index_path)).unwrap();
    assert_eq!(gitcore_output(dir, &["index-pack", &pack_path]), checksum);
    assert_eq!(std::fs::read(dir.join(&index_path)).unwrap(), original_index);

    let other = TempDir::new().unwrap();
    run_gitcore_command(other.path(), &["init"]).assert().success();
    run_gitcore_command(other.path(), &["unpack-objects"])
        .write_stdin(std::fs::read(dir.join(&pack_path)).unwrap())
        .assert()
        .success();
    assert_eq!(
        gitcore_output(other.path(), &["cat-file", "-t", &c1.to_hex()]),
        "commit"
    );
}

#[rstest]
fn verify_pack_detects_corruption(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();
    linear_history(dir);

    let checksum = gitcore_output(dir, &["pack-objects", "pack", "HEAD"]);
    let pack_path = dir.join(format!("pack-{checksum}.pack"));
    let mut data = std::fs::read(&pack_path).unwrap();
    data[20] ^= 0xff;
    std::fs::write(&pack_path, data).unwrap();

    run_gitcore_command(dir, &["verify-pack", &format!("pack-{checksum}.pack")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("integrity error"));
}

#[rstest]
fn fetch_pack_records_remote_tracking_refs(repository_dir: TempDir) {
    let remote = TempDir::new().unwrap();
    run_gitcore_command(remote.path(), &["init"]).assert().success();
    let [_, _, c3] = linear_history(remote.path());
    let checksum = gitcore_output(remote.path(), &["pack-objects", "served", "master"]);
    let pack = std::fs::read(remote.path().join(format!("served-{checksum}.pack"))).unwrap();

    let advertisement = RefAdvertisement::new(
        vec![
            AdvertisedRef::new("HEAD".to_string(), c3),
            AdvertisedRef::new("refs/heads/master".to_string(), c3),
        ],
        vec!["symref=HEAD:refs/heads/master".to_string()],
    );
    let mut lines = vec![PktLine::data("NAK\n")];
    lines.extend(
        pack.chunks(4096)
            .map(|chunk| SideBand::Data(Bytes::copy_from_slice(chunk)).to_pkt_line()),
    );
    lines.push(PktLine::Flush);
    let mut response = advertisement.encode().unwrap().to_vec();
    response.extend_from_slice(&encode_lines(&lines).unwrap());

    let dir = repository_dir.path();
    run_gitcore_command(dir, &["init"]).assert().success();
    std::fs::write(dir.join("response.bin"), response).unwrap();

    let written = gitcore_output(dir, &["fetch-pack", "--input", "response.bin"]);

    assert_eq!(written, "refs/remotes/origin/master\nrefs/remotes/origin/HEAD");
    assert_eq!(
        gitcore_output(dir, &["rev-list", "refs/remotes/origin/master"])
            .lines()
            .count(),
        3
    );
    assert!(dir.join(format!(".git/objects/pack/pack-{checksum}.idx")).exists());
}
