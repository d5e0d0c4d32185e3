//! Integration tests exercising the public API end to end.
//!
//! These tests verify that:
//! 1. The registry dispatches on scheme and streams copies across backends
//! 2. Listing order and per-branch error isolation hold through the public API
//! 3. Stream decorators compose over backend streams without altering data
//! 4. A custom backend plugs into the registry without dispatcher changes

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use omnifs::*;

fn mem_registry() -> Registry {
    Registry::with_defaults(Config::new())
}

fn loc(s: &str) -> Locator {
    Locator::parse(s).unwrap()
}

// =============================================================================
// Registry dispatch and cross-backend copy
// =============================================================================

#[test]
fn copy_streams_between_local_and_memory_backends() {
    let registry = mem_registry();
    let tmp = tempfile::tempdir().unwrap();
    let payload: Vec<u8> = (0..10_000u32).flat_map(u32::to_le_bytes).collect();

    let on_disk = loc(&format!("file://{}/src.bin", tmp.path().display()));
    let mut w = registry.open_write(&on_disk).unwrap();
    w.write_all(&payload).unwrap();
    drop(w);

    let in_mem = loc("mem:///copies/src.bin");
    registry.mkdir(&loc("mem:///copies")).unwrap();
    let copied = registry.copy(&on_disk, &in_mem).unwrap();
    assert_eq!(copied, payload.len() as u64);

    let mut out = Vec::new();
    registry.open_read(&in_mem).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, payload);

    // And back again to a second file on disk.
    let round = loc(&format!("file://{}/round.bin", tmp.path().display()));
    registry.copy(&in_mem, &round).unwrap();
    assert_eq!(std::fs::read(tmp.path().join("round.bin")).unwrap(), payload);
}

#[test]
fn copy_to_an_unreachable_remote_reports_the_failure() {
    let mut config = Config::new();
    config.add_scope(
        "sftp://127.0.0.1",
        Credentials {
            user: Some("u".into()),
            fingerprint: Some("aa:bb".into()),
            password: Some("pw".into()),
            ..Default::default()
        },
    );
    let registry = Registry::with_defaults(config);

    let src = loc("mem:///payload.bin");
    registry
        .open_write(&src)
        .unwrap()
        .write_all(b"fifteen bytes!!")
        .unwrap();

    // Nothing listens on the destination port; the delivery failure must
    // propagate out of `copy`, naming the destination.
    let dst = loc("sftp://127.0.0.1:1/out.bin");
    let err = registry.copy(&src, &dst).unwrap_err();
    assert!(err.to_string().contains("sftp://127.0.0.1:1/out.bin"));
}

#[test]
fn exists_false_only_for_absence() {
    let registry = mem_registry();
    assert!(!registry.exists(&loc("mem:///nope")).unwrap());

    // An unregistered scheme is a failure, not `false`.
    assert!(registry.exists(&loc("s3://bucket/key")).is_err());
}

#[test]
fn stat_includes_locator_in_not_found_message() {
    let registry = mem_registry();
    let err = registry.stat(&loc("mem:///ghost"), false).unwrap_err();
    assert!(err.to_string().contains("mem:///ghost"));
}

// =============================================================================
// Listing contract
// =============================================================================

#[test]
fn recursive_listing_order_through_the_registry() {
    let registry = mem_registry();
    registry.mkdir(&loc("mem:///a")).unwrap();
    registry.mkdir(&loc("mem:///a/b")).unwrap();
    registry
        .open_write(&loc("mem:///a/x.txt"))
        .unwrap()
        .write_all(b"x")
        .unwrap();
    registry
        .open_write(&loc("mem:///a/b/y.txt"))
        .unwrap()
        .write_all(b"y")
        .unwrap();

    let entries = registry
        .list(&loc("mem:///a"), ListOptions::recursive())
        .unwrap()
        .collect_all()
        .unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.locator.path()).collect();
    assert_eq!(paths, ["/a/b/", "/a/b/y.txt", "/a/x.txt"]);
    assert_eq!(entries[0].size, None);
    assert_eq!(entries[1].size, Some(1));
}

#[test]
fn listing_is_lazy_and_abandonable() {
    let registry = mem_registry();
    registry.mkdir(&loc("mem:///big")).unwrap();
    for i in 0..100 {
        registry
            .open_write(&loc(&format!("mem:///big/f{i:03}")))
            .unwrap()
            .write_all(b".")
            .unwrap();
    }
    let mut iter = registry
        .list(&loc("mem:///big"), ListOptions::shallow())
        .unwrap();
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.locator.name(), "f000");
    // Abandoning the iterator mid-way must be fine.
    drop(iter);
}

// =============================================================================
// Decorators over backend streams
// =============================================================================

#[test]
fn counting_and_digesting_a_backend_read() {
    let registry = mem_registry();
    let file = loc("mem:///hashme");
    let data = b"content to verify".to_vec();
    registry.open_write(&file).unwrap().write_all(&data).unwrap();

    let reader = registry.open_read(&file).unwrap();
    let counted = CountingReader::new(reader);
    let counter = counted.counter();
    let mut digesting = DigestReader::new("sha256", counted).unwrap();

    // Consume for verification only: a null sink is a valid destination.
    std::io::copy(&mut digesting, &mut NullSink).unwrap();

    assert_eq!(counter.get(), data.len() as u64);
    let first = digesting.close_and_digest();
    assert_eq!(first.len(), 32);
    assert_eq!(digesting.close_and_digest(), first);
}

#[test]
fn digest_writer_observes_exactly_what_the_backend_stores() {
    let registry = mem_registry();
    let file = loc("mem:///signed");
    let data = b"bytes with a signature".to_vec();

    let writer = registry.open_write(&file).unwrap();
    let mut digesting = DigestWriter::new("md5", writer).unwrap();
    digesting.write_all(&data).unwrap();
    let digest = digesting.close_and_digest().unwrap();
    drop(digesting);

    let mut stored = Vec::new();
    registry.open_read(&file).unwrap().read_to_end(&mut stored).unwrap();
    assert_eq!(stored, data);
    assert_eq!(digest.len(), 16);
}

// =============================================================================
// Custom backend registration
// =============================================================================

/// Minimal backend that counts calls; proves third-party schemes plug in.
struct ProbeBackend {
    calls: Arc<AtomicUsize>,
}

impl FsBackend for ProbeBackend {
    fn open_read(&self, locator: &Locator) -> Result<Box<dyn Read + Send>, OmniError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OmniError::NotFound {
            locator: locator.to_string(),
        })
    }

    fn open_write(&self, locator: &Locator) -> Result<Box<dyn Write + Send>, OmniError> {
        Err(OmniError::NotFound {
            locator: locator.to_string(),
        })
    }

    fn stat_opt(
        &self,
        _locator: &Locator,
        _extended: bool,
    ) -> Result<Option<DirectoryEntry>, OmniError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn delete(&self, locator: &Locator) -> Result<(), OmniError> {
        Err(OmniError::NotFound {
            locator: locator.to_string(),
        })
    }

    fn mkdir(&self, _locator: &Locator) -> Result<(), OmniError> {
        Ok(())
    }

    fn list(&self, _locator: &Locator, _opts: ListOptions) -> Result<EntryIter, OmniError> {
        Ok(EntryIter::from_vec(vec![]))
    }
}

#[test]
fn custom_backend_registers_without_dispatcher_changes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::with_defaults(Config::new());
    registry.register("probe", Arc::new(ProbeBackend { calls: calls.clone() }));

    let target = loc("probe://somewhere/thing");
    assert!(!registry.exists(&target).unwrap());
    assert!(registry.open_read(&target).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Scoped cleanup as the resource backstop
// =============================================================================

#[test]
fn finalizer_backstop_fires_when_owner_is_dropped_undrained() {
    let released = Arc::new(AtomicUsize::new(0));

    struct Guarded {
        _cleanup: Finalizer,
    }

    let counted = released.clone();
    let guarded = Guarded {
        _cleanup: Finalizer::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    };
    assert_eq!(released.load(Ordering::SeqCst), 0);
    drop(guarded);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
