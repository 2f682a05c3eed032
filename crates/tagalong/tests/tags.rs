// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for tagged writes and invalidation.

use std::collections::BTreeSet;
use std::time::Duration;

use tagalong::{Error, ErrorKind, TagCache, ttl};
use tagalong_store::testing::{MockStore, StoreOp};
use tick::{Clock, ClockControl};

type TestResult = Result<(), Error>;

fn block_on<F: Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn cache_with(store: &MockStore) -> TagCache<MockStore> {
    TagCache::builder(Clock::new_frozen()).store(store.clone()).build()
}

fn members(store: &MockStore, tag: &str) -> Vec<String> {
    store.set_members(tag).unwrap_or_default().into_iter().collect()
}

#[test]
fn tagged_write_records_key_under_every_tag() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("post:1", "hello", &["posts", "author:7"], ttl::HOUR).await?;

        assert_eq!(cache.get::<String>("post:1").await?, "hello");
        assert_eq!(members(&store, "posts"), ["post:1"]);
        assert_eq!(members(&store, "author:7"), ["post:1"]);
        Ok(())
    })
}

#[test]
fn tagged_write_is_a_single_transaction() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("post:1", &1, &["a", "b", "c"], ttl::HOUR).await?;

        let ops = store.operations();
        assert_eq!(ops.len(), 1);
        let StoreOp::Execute(tx) = &ops[0] else {
            panic!("expected a transaction, got {ops:?}");
        };
        // SADD + EXPIRE per tag, then SET
        assert_eq!(tx.len(), 7);
        Ok(())
    })
}

#[test]
fn failed_tagged_write_leaves_nothing_behind() {
    block_on(async {
        let store = MockStore::new();
        store.fail_when(|op| matches!(op, StoreOp::Execute(_)));
        let cache = cache_with(&store);

        let error = cache
            .set_with_tags("post:1", "hello", &["posts", "author:7"], ttl::HOUR)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Store);
        assert!(!store.contains_key("post:1"));
        assert!(!store.contains_key("posts"));
        assert!(!store.contains_key("author:7"));
    });
}

#[test]
fn rejected_tagged_write_leaves_nothing_behind() {
    block_on(async {
        let store = MockStore::new();
        // a plain value where a tag set is expected makes the transaction invalid
        store.insert_raw("author:7", b"1".to_vec());
        let cache = cache_with(&store);

        let error = cache
            .set_with_tags("post:1", "hello", &["posts", "author:7"], ttl::HOUR)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Store);
        assert!(!store.contains_key("post:1"));
        assert!(!store.contains_key("posts"));
    });
}

#[test]
fn unencodable_tagged_write_submits_nothing() {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);
        let value = std::collections::HashMap::from([((1, 2), "pair")]);

        let error = cache.set_with_tags("k", &value, &["t"], ttl::HOUR).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Encoding);
        assert!(store.operations().is_empty());
    });
}

#[test]
fn tagged_write_without_tags_is_a_plain_set() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("k", &1, &[] as &[&str], ttl::HOUR).await?;

        assert!(matches!(store.operations().as_slice(), [StoreOp::Set { key, .. }] if key == "k"));
        Ok(())
    })
}

#[test]
fn invalidate_removes_all_tagged_keys() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;
        cache.set_with_tags("user:2", "bob", &["users"], ttl::HOUR).await?;

        let report = cache.invalidate(&["users"]).await?;

        assert_eq!(report.keys_collected(), 2);
        assert_eq!(report.keys_removed(), 3);
        assert!(report.is_complete());
        assert!(cache.get::<String>("user:1").await.unwrap_err().is_cache_miss());
        assert!(cache.get::<String>("user:2").await.unwrap_err().is_cache_miss());
        assert!(!store.contains_key("users"));
        Ok(())
    })
}

#[test]
fn invalidate_leaves_other_tags_alone() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("post:1", "a", &["posts", "author:1"], ttl::HOUR).await?;
        cache.set_with_tags("post:2", "b", &["posts", "author:2"], ttl::HOUR).await?;
        cache.set("about", "static", ttl::HOUR).await?;

        cache.invalidate(&["author:1"]).await?;

        assert!(!cache.contains("post:1").await?);
        assert_eq!(cache.get::<String>("post:2").await?, "b");
        assert_eq!(cache.get::<String>("about").await?, "static");
        assert_eq!(members(&store, "author:2"), ["post:2"]);
        // the shared tag still lists the deleted key; a later invalidation tolerates that
        assert_eq!(members(&store, "posts"), ["post:1", "post:2"]);
        Ok(())
    })
}

#[test]
fn invalidate_several_tags_at_once() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        cache.set_with_tags("a", &1, &["x"], ttl::HOUR).await?;
        cache.set_with_tags("b", &2, &["y"], ttl::HOUR).await?;
        cache.set_with_tags("c", &3, &["x", "y"], ttl::HOUR).await?;
        cache.set_with_tags("d", &4, &["z"], ttl::HOUR).await?;

        let report = cache.invalidate(&["x", "y"]).await?;

        assert_eq!(report.keys_collected(), 3);
        let left: BTreeSet<String> = cache.keys().await?.into_iter().collect();
        assert_eq!(left, BTreeSet::from(["d".to_string(), "z".to_string()]));
        Ok(())
    })
}

#[test]
fn invalidating_unknown_tags_is_not_an_error() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);

        let report = cache.invalidate(&["nobody"]).await?;
        assert_eq!(report.keys_collected(), 0);
        assert_eq!(report.keys_removed(), 0);

        store.clear_operations();
        let report = cache.invalidate(&[] as &[String]).await?;
        assert_eq!(report.keys_collected(), 0);
        assert!(store.operations().is_empty());
        Ok(())
    })
}

#[test]
fn failed_tag_read_deletes_nothing() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        store.fail_when(|op| matches!(op, StoreOp::Members(_)));
        let error = cache.invalidate(&["users"]).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Store);
        assert_eq!(error.subject(), "users");
        assert!(store.contains_key("user:1"));
        assert!(!store.operations().iter().any(|op| matches!(op, StoreOp::Delete(_))));
        Ok(())
    })
}

#[test]
fn failed_delete_is_reported() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        store.fail_when(|op| matches!(op, StoreOp::Delete(_)));
        let error = cache.invalidate(&["users"]).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Store);
        assert!(store.contains_key("user:1"));
        Ok(())
    })
}

#[test]
fn tag_ttl_follows_the_latest_write() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let store = MockStore::with_clock(clock.clone());
        let cache = TagCache::builder(clock).store(store.clone()).build();

        cache.set_with_tags("a", &1, &["t"], ttl::DAY).await?;
        assert_eq!(store.remaining_ttl("t"), Some(ttl::DAY));

        cache.set_with_tags("b", &2, &["t"], ttl::MINUTE).await?;
        assert_eq!(store.remaining_ttl("t"), Some(ttl::MINUTE));

        // the tag expires before "a" does, leaving "a" reachable only by key
        control.advance(ttl::MINUTE + Duration::from_secs(1));
        assert!(!store.contains_key("t"));
        assert_eq!(cache.get::<i32>("a").await?, 1);

        let report = cache.invalidate(&["t"]).await?;
        assert_eq!(report.keys_collected(), 0);
        assert_eq!(cache.get::<i32>("a").await?, 1);
        Ok(())
    })
}

#[test]
fn tagged_write_without_ttl_never_expires() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let store = MockStore::with_clock(clock.clone());
        let cache = TagCache::builder(clock).store(store.clone()).build();

        cache.set_with_tags("a", &1, &["t"], ttl::FOREVER).await?;
        control.advance(ttl::YEAR);

        assert_eq!(members(&store, "t"), ["a"]);
        assert_eq!(cache.get::<i32>("a").await?, 1);
        Ok(())
    })
}

#[test]
fn key_tagged_mid_invalidation_survives_without_verification() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        // a concurrent writer tags a new key right after the tag was read
        store.after_operation(|op, store| {
            if matches!(op, StoreOp::Members(tag) if tag == "users") {
                store.insert_raw("user:2", b"\"bob\"".to_vec());
                store.insert_member("users", "user:2");
            }
        });

        let report = cache.invalidate(&["users"]).await?;

        assert!(report.is_complete());
        assert!(!store.contains_key("user:1"));
        assert!(store.contains_key("user:2"));
        Ok(())
    })
}

#[test]
fn verification_catches_key_tagged_mid_invalidation() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = TagCache::builder(Clock::new_frozen())
            .store(store.clone())
            .verify_invalidation(true)
            .build();
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        // a concurrent writer tags a new key while the first keys are being deleted
        store.after_operation(|op, store| {
            if matches!(op, StoreOp::Delete(keys) if *keys == ["user:1"]) {
                store.insert_raw("user:2", b"\"bob\"".to_vec());
                store.insert_member("users", "user:2");
            }
        });

        let report = cache.invalidate(&["users"]).await?;

        assert!(!report.is_complete());
        assert_eq!(report.late_keys(), ["user:2"]);
        assert_eq!(report.keys_collected(), 1);
        assert_eq!(report.keys_removed(), 3);
        assert!(!store.contains_key("user:1"));
        assert!(!store.contains_key("user:2"));
        assert!(!store.contains_key("users"));
        Ok(())
    })
}

#[test]
fn verification_catches_known_key_written_again_mid_invalidation() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = TagCache::builder(Clock::new_frozen())
            .store(store.clone())
            .verify_invalidation(true)
            .build();
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        // a concurrent recompute writes and tags the same key right after it was deleted
        store.after_operation(|op, store| {
            if matches!(op, StoreOp::Delete(keys) if *keys == ["user:1"]) {
                store.insert_raw("user:1", b"\"ada lovelace\"".to_vec());
                store.insert_member("users", "user:1");
            }
        });

        let report = cache.invalidate(&["users"]).await?;

        assert!(!report.is_complete());
        assert_eq!(report.late_keys(), ["user:1"]);
        assert_eq!(report.keys_collected(), 1);
        assert_eq!(report.keys_removed(), 3);
        assert!(!store.contains_key("user:1"));
        assert!(!store.contains_key("users"));
        Ok(())
    })
}

#[test]
fn verification_without_a_race_is_complete() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = TagCache::builder(Clock::new_frozen())
            .store(store.clone())
            .verify_invalidation(true)
            .build();
        cache.set_with_tags("user:1", "ada", &["users"], ttl::HOUR).await?;

        let report = cache.invalidate(&["users"]).await?;

        assert!(report.is_complete());
        assert_eq!(report.keys_removed(), 2);
        assert_eq!(store.entry_count(), 0);
        Ok(())
    })
}

#[test]
fn tagged_profile_lifecycle() -> TestResult {
    block_on(async {
        let store = MockStore::new();
        let cache = cache_with(&store);
        let ttl = Duration::from_secs(600);

        let profile = cache
            .remember_with_tags("profile:42", &["user:42", "profiles"], ttl, || async { "Ada".to_string() })
            .await?;
        assert_eq!(profile, "Ada");
        cache.set_with_tags("avatar:42", "ada.png", &["user:42"], ttl).await?;
        cache.set_with_tags("profile:43", "Bob", &["profiles"], ttl).await?;

        // a second call is served from the cache
        let again: String = cache
            .remember_with_tags("profile:42", &["user:42"], ttl, || async { "recomputed".to_string() })
            .await?;
        assert_eq!(again, "Ada");

        let report = cache.invalidate(&["user:42"]).await?;
        assert_eq!(report.keys_collected(), 2);
        assert!(!cache.contains("profile:42").await?);
        assert!(!cache.contains("avatar:42").await?);
        assert_eq!(cache.get::<String>("profile:43").await?, "Bob");

        // recomputed after invalidation
        let fresh: String = cache
            .remember_with_tags("profile:42", &["user:42"], ttl, || async { "Ada Lovelace".to_string() })
            .await?;
        assert_eq!(fresh, "Ada Lovelace");
        assert_eq!(members(&store, "user:42"), ["profile:42"]);
        Ok(())
    })
}
