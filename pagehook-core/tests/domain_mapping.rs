use pagehook_core::config::DeployConfig;
use pagehook_core::error::DeployError;
use pagehook_core::mapping::{AssignOutcome, MappingStore};
use std::fs;
use tempfile::tempdir;

#[cfg(unix)]
use std::os::unix::fs::symlink;

#[test]
fn test_reserved_namespace_belongs_to_its_user() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();

    let mut bob = store.find_or_create("bob").unwrap();
    bob.custom_domain = Some("bob.ruhoh.com".into());
    store.save(&mut bob).expect("bob may use bob.ruhoh.com");

    let mut alice = store.find_or_create("alice").unwrap();
    alice.custom_domain = Some("bob.ruhoh.com".into());
    let err = store.save(&mut alice).expect_err("alice may not use bob.ruhoh.com");
    assert!(matches!(err, DeployError::ReservedDomain { .. }), "got {err:?}");
    assert!(store.find_by_user("alice").unwrap().is_none(), "rejected save must not persist");
}

#[test]
fn test_save_upserts_one_mapping_per_user() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();

    let mut mapping = store.find_or_create("alice").unwrap();
    mapping.custom_domain = Some("alice.dev".into());
    store.save(&mut mapping).unwrap();
    mapping.custom_domain = Some("www.alice.dev".into());
    let outcome = store.save(&mut mapping).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.stale_alias.as_deref(), Some("alice.dev"));
    assert!(store.find_by_domain("alice.dev").unwrap().is_none());
    let stored = store.find_by_user("alice").unwrap().expect("mapping persisted");
    assert_eq!(stored.custom_domain.as_deref(), Some("www.alice.dev"));
    assert!(stored.is_saved());
}

#[test]
fn test_domain_owned_by_another_user_is_a_conflict() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();
    store
        .assign_domain("plusjade", "plusjade.ruhoh.com", "cooldomain.com")
        .unwrap();

    let err = store
        .assign_domain("alice", "alice.ruhoh.com", "CoolDomain.com")
        .expect_err("domain belongs to plusjade");
    assert!(matches!(err, DeployError::DomainConflict { .. }), "got {err:?}");
    assert!(store.find_by_user("alice").unwrap().is_none());
}

#[test]
fn test_domain_bound_to_another_of_the_users_sites() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();
    store
        .assign_domain("plusjade", "plusjade.ruhoh.com", "cooldomain.com")
        .unwrap();

    let err = store
        .assign_domain("plusjade", "plusjade-blog.ruhoh.com", "cooldomain.com")
        .expect_err("domain is bound to the canonical site");
    match err {
        DeployError::DomainAlreadyBound { site, .. } => assert_eq!(site, "plusjade.ruhoh.com"),
        other => panic!("expected DomainAlreadyBound, got {other:?}"),
    }
}

#[test]
fn test_same_domain_same_site_is_a_no_op() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();
    let first = store
        .assign_domain("plusjade", "plusjade.ruhoh.com", "cooldomain.com")
        .unwrap();
    assert!(matches!(first, AssignOutcome::Saved(ref o) if o.changed));

    let second = store
        .assign_domain("plusjade", "plusjade.ruhoh.com", "cooldomain.com")
        .unwrap();
    assert_eq!(second, AssignOutcome::Unchanged);
}

#[test]
fn test_empty_domain_clears_the_mapping() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();
    store
        .assign_domain("alice", "alice.ruhoh.com", "alice.dev")
        .unwrap();

    match store.assign_domain("alice", "alice.ruhoh.com", "  ").unwrap() {
        AssignOutcome::Saved(outcome) => {
            assert_eq!(outcome.stale_alias.as_deref(), Some("alice.dev"))
        }
        other => panic!("expected a save, got {other:?}"),
    }
    let stored = store.find_by_user("alice").unwrap().unwrap();
    assert_eq!(stored.custom_domain, None);
}

#[cfg(unix)]
#[test]
fn test_reassigning_a_domain_removes_the_old_alias() {
    let home = tempdir().unwrap();
    let config = DeployConfig::from_home(home.path());
    let site_a = config.www_root.join("alice.ruhoh.com");
    fs::create_dir_all(&site_a).unwrap();
    let alias = config.www_root.join("custom.example.com");
    symlink(&site_a, &alias).unwrap();

    let store = MappingStore::from_config(&config).unwrap();
    store
        .assign_domain("alice", "alice.ruhoh.com", "custom.example.com")
        .unwrap();

    let mut mapping = store.find_or_create("alice").unwrap();
    mapping.site = Some("alice-blog.ruhoh.com".into());
    let outcome = store.save(&mut mapping).unwrap();

    assert_eq!(outcome.stale_alias.as_deref(), Some("custom.example.com"));
    assert!(outcome.removed_alias);
    assert!(fs::symlink_metadata(&alias).is_err(), "old alias should be gone");
    assert!(site_a.is_dir(), "canonical content must survive");
}

#[test]
fn test_stale_alias_that_is_a_real_directory_is_kept() {
    let home = tempdir().unwrap();
    let config = DeployConfig::from_home(home.path());
    let real = config.www_root.join("custom.example.com");
    fs::create_dir_all(&real).unwrap();
    fs::write(real.join("index.html"), "hand-made").unwrap();

    let store = MappingStore::from_config(&config).unwrap();
    store
        .assign_domain("alice", "alice.ruhoh.com", "custom.example.com")
        .unwrap();
    let outcome = match store.assign_domain("alice", "alice.ruhoh.com", "other.example.com").unwrap() {
        AssignOutcome::Saved(outcome) => outcome,
        other => panic!("expected a save, got {other:?}"),
    };

    assert!(!outcome.removed_alias);
    assert!(real.join("index.html").exists());
}

#[test]
fn test_mappings_survive_reopening_the_database() {
    let home = tempdir().unwrap();
    let config = DeployConfig::from_home(home.path());
    {
        let store = MappingStore::from_config(&config).unwrap();
        store
            .assign_domain("alice", "alice.ruhoh.com", "alice.dev")
            .unwrap();
    }
    let store = MappingStore::from_config(&config).unwrap();
    let found = store.find_by_domain("alice.dev").unwrap().expect("persisted");
    assert_eq!(found.user, "alice");
    assert_eq!(found.previous_domain(), Some("alice.dev"));
}

#[test]
fn test_domains_that_are_not_hostnames_are_rejected() {
    let home = tempdir().unwrap();
    let config = DeployConfig::from_home(home.path());
    let store = MappingStore::from_config(&config).unwrap();

    for domain in ["../../outside", "/etc/cron.d", "alice..dev", ".alice.dev", "localhost"] {
        let err = store
            .assign_domain("alice", "alice.ruhoh.com", domain)
            .expect_err("not a hostname");
        assert!(matches!(err, DeployError::InvalidDomain { .. }), "{domain}: got {err:?}");
    }
    assert!(store.find_by_user("alice").unwrap().is_none(), "nothing may be persisted");

    let mut mapping = store.find_or_create("carol").unwrap();
    mapping.custom_domain = Some("/etc/cron.d".into());
    let err = store.save(&mut mapping).expect_err("save validates too");
    assert!(matches!(err, DeployError::InvalidDomain { .. }), "got {err:?}");
    assert!(store.find_by_user("carol").unwrap().is_none());
}

#[test]
fn test_another_sites_address_cannot_be_claimed() {
    let store = MappingStore::open_in_memory("ruhoh.com").unwrap();

    // bob-x.ruhoh.com is the canonical site of user bob-x.
    let err = store
        .assign_domain("bob", "bob.ruhoh.com", "bob-x.ruhoh.com")
        .expect_err("another user's site");
    assert!(matches!(err, DeployError::SiteDomainTaken { .. }), "got {err:?}");

    // alice-blog.ruhoh.com is where alice/blog publishes.
    let err = store
        .assign_domain("alice", "alice.ruhoh.com", "alice-blog.ruhoh.com")
        .expect_err("another of alice's sites");
    assert!(matches!(err, DeployError::SiteDomainTaken { .. }), "got {err:?}");
    assert!(store.find_by_user("bob").unwrap().is_none());
    assert!(store.find_by_user("alice").unwrap().is_none());

    // A name in her own namespace that no repository can publish to is fine.
    store
        .assign_domain("alice", "alice.ruhoh.com", "alice.www.ruhoh.com")
        .expect("not a site address");
}
