mod common;

use common::{
    commit_all, file_set, git, head, init_remote, tool_available, url_template, worktree, write_file,
};
use pagehook_core::contract::{RepositorySynchroniser, SyncOutcome};
use pagehook_core::error::DeployError;
use pagehook_core::identity::RepositoryIdentity;
use pagehook_core::synchronise::GitSynchroniser;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_absent_working_copy_is_cloned() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    init_remote(remotes.path(), "alice", "blog", &[("site/index.html", "hello")]);

    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "blog", "master").unwrap();
    let working = repos.path().join("alice-blog");

    let outcome = sync.synchronise(&identity, &working).expect("clone should succeed");
    assert_eq!(outcome, SyncOutcome::Cloned);
    assert_eq!(fs::read_to_string(working.join("site/index.html")).unwrap(), "hello");
}

#[test]
fn test_synchronise_twice_is_idempotent() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    init_remote(remotes.path(), "alice", "blog", &[("a.md", "a"), ("dir/b.md", "b")]);

    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "blog", "master").unwrap();
    let working = repos.path().join("alice-blog");

    sync.synchronise(&identity, &working).unwrap();
    let before = worktree(&working);
    let before_head = head(&working);
    let second = sync.synchronise(&identity, &working).expect("second sync succeeds");
    let third = sync.synchronise(&identity, &working).expect("third sync succeeds");

    assert_eq!(second, SyncOutcome::Unchanged);
    assert_eq!(third, SyncOutcome::Unchanged);
    assert_eq!(file_set(&working), vec!["a.md", "dir/b.md"]);
    assert_eq!(worktree(&working), before);
    assert_eq!(head(&working), before_head);
}

#[test]
fn test_update_resets_local_drift_to_remote_head() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    let remote = init_remote(remotes.path(), "alice", "blog", &[("index.md", "v1")]);

    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "blog", "master").unwrap();
    let working = repos.path().join("alice-blog");
    sync.synchronise(&identity, &working).unwrap();

    // Local edits and stray files must not survive.
    write_file(&working.join("index.md"), "locally edited");
    write_file(&working.join("stray.txt"), "junk");
    write_file(&remote.join("index.md"), "v2");
    commit_all(&remote, "second");

    let outcome = sync.synchronise(&identity, &working).unwrap();
    assert_eq!(outcome, SyncOutcome::Updated);
    assert_eq!(fs::read_to_string(working.join("index.md")).unwrap(), "v2");
    assert!(!working.join("stray.txt").exists());
}

#[test]
fn test_failed_fetch_falls_back_to_reclone() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    init_remote(remotes.path(), "alice", "blog", &[("index.md", "fresh")]);

    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "blog", "master").unwrap();
    let working = repos.path().join("alice-blog");
    sync.synchronise(&identity, &working).unwrap();

    // Point origin somewhere unreachable so the fetch fails.
    let missing = remotes.path().join("does-not-exist");
    git(&working, &["remote", "set-url", "origin", &missing.display().to_string()]);
    write_file(&working.join("index.md"), "half fetched");

    let outcome = sync.synchronise(&identity, &working).unwrap();
    assert_eq!(outcome, SyncOutcome::Recloned);
    assert_eq!(fs::read_to_string(working.join("index.md")).unwrap(), "fresh");

    let leftovers: Vec<_> = fs::read_dir(repos.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["alice-blog".to_string()], "temp clone must be moved into place");
}

#[test]
fn test_directory_without_git_metadata_is_replaced() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    init_remote(remotes.path(), "alice", "blog", &[("index.md", "fresh")]);
    let working = repos.path().join("alice-blog");
    write_file(&working.join("garbage.bin"), "x");

    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "blog", "master").unwrap();

    let outcome = sync.synchronise(&identity, &working).unwrap();
    assert_eq!(outcome, SyncOutcome::Recloned);
    assert!(working.join(".git").exists());
    assert!(!working.join("garbage.bin").exists());
}

#[test]
fn test_unreachable_remote_is_sync_failed() {
    if !tool_available("git") {
        eprintln!("git not available; skipping");
        return;
    }
    let remotes = tempdir().unwrap();
    let repos = tempdir().unwrap();
    let sync = GitSynchroniser::new(&url_template(remotes.path()));
    let identity = RepositoryIdentity::new("alice", "missing", "master").unwrap();
    let working = repos.path().join("alice-missing");

    let err = sync.synchronise(&identity, &working).expect_err("nothing to clone");
    assert!(matches!(err, DeployError::SyncFailed { .. }), "got {err:?}");
    assert!(!working.exists(), "failed clone must not leave a working copy");
}
