#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Tests that drive real external tools skip themselves when the tool is
/// missing from the host.
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=pagehook",
            "-c",
            "user.email=pagehook@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("git should launch");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create `<root>/<owner>/<name>` as a repository with one commit on
/// `master` holding `files`.
pub fn init_remote(root: &Path, owner: &str, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let repo = root.join(owner).join(name);
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    for (path, content) in files {
        write_file(&repo.join(path), content);
    }
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "initial"]);
    repo
}

pub fn commit_all(repo: &Path, message: &str) {
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", message]);
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Clone URL template resolving to repositories created by [`init_remote`].
pub fn url_template(root: &Path) -> String {
    format!("{}/{{owner}}/{{name}}", root.display())
}

/// Relative paths of every file under `dir`, sorted. Git metadata is
/// skipped, so a working copy compares by its worktree only.
pub fn file_set(dir: &Path) -> Vec<String> {
    worktree(dir).into_iter().map(|(path, _)| path).collect()
}

/// Relative path and content of every file under `dir`, sorted by path,
/// skipping `.git`.
pub fn worktree(dir: &Path) -> Vec<(String, Vec<u8>)> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.file_name().is_some_and(|n| n == ".git") {
                continue;
            }
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let relative = path.strip_prefix(base).unwrap().display().to_string();
                out.push((relative, fs::read(&path).unwrap()));
            }
        }
    }
    let mut files = Vec::new();
    walk(dir, dir, &mut files);
    files.sort();
    files
}

/// `git rev-parse HEAD` in `dir`.
pub fn head(dir: &Path) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .expect("git should launch");
    assert!(output.status.success(), "rev-parse failed in {}", dir.display());
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
