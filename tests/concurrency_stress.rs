//! Concurrent readers/writers stress tests
//!
//! The package handle is shared by reference across threads; reads use the
//! shared lock, writes the exclusive one.

use novuspack::{
    CancellationToken, NovusPackError, Package, PackageConfig, TagValue, ValidationOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_10_concurrent_readers_2_writers() {
    let pkg = Arc::new(Package::create(PackageConfig::default()).unwrap());
    pkg.add_directory("/data").unwrap();
    pkg.set_tag("/data", "tier", "hot").unwrap();

    // Pre-populate
    for i in 0..50 {
        pkg.add_file(&format!("/data/file{}.txt", i), format!("data{}", i).into_bytes())
            .unwrap();
    }

    let handles: Vec<_> = (0..12)
        .map(|thread_id| {
            let pkg = pkg.clone();
            std::thread::spawn(move || {
                if thread_id < 2 {
                    // Writer thread
                    for i in 0..100 {
                        pkg.add_file(&format!("/data/writer{}_{}.txt", thread_id, i), b"new data".to_vec())
                            .unwrap();
                    }
                } else {
                    // Reader thread
                    for _ in 0..200 {
                        let idx = rand::random::<usize>() % 50;
                        let body = pkg.read_file(&format!("/data/file{}.txt", idx), None).unwrap();
                        assert_eq!(body, format!("data{}", idx).into_bytes());

                        let hot = pkg.get_files_by_tag("tier", &TagValue::from("hot")).unwrap();
                        assert!(hot.len() >= 50);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // Verify integrity
    assert_eq!(pkg.len(), 1 + 50 + 200);
    assert_eq!(pkg.header().unwrap().file_count, 250);
    assert!(pkg.validate(&ValidationOptions::new()).unwrap().is_valid());
}

#[test]
fn test_queries_see_complete_tag_writes() {
    let pkg = Arc::new(Package::create(PackageConfig::default()).unwrap());
    for i in 0..20 {
        pkg.add_file(&format!("/f{}", i), Vec::new()).unwrap();
    }

    let writer = {
        let pkg = pkg.clone();
        std::thread::spawn(move || {
            for i in 0..20 {
                pkg.set_tag(&format!("/f{}", i), "state", "done").unwrap();
            }
        })
    };

    let seen = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pkg = pkg.clone();
            let seen = seen.clone();
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..100 {
                    let n = pkg
                        .get_files_by_tag("state", &TagValue::from("done"))
                        .unwrap()
                        .len();
                    // Tags are only ever added, so counts never go backwards
                    assert!(n >= last);
                    last = n;
                }
                seen.fetch_max(last, Ordering::SeqCst);
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(
        pkg.get_files_by_tag("state", &TagValue::from("done")).unwrap().len(),
        20
    );
    assert!(seen.load(Ordering::SeqCst) <= 20);
}

#[test]
fn test_cancel_from_another_thread() {
    let pkg = Arc::new(Package::create(PackageConfig::default()).unwrap());
    for i in 0..500 {
        pkg.add_file(&format!("/bulk/{}", i), vec![0u8; 4]).unwrap();
    }

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || token.cancel())
    };
    canceller.join().unwrap();

    let result = pkg.validate(&ValidationOptions::new().with_cancel(token));
    assert!(matches!(result, Err(NovusPackError::Cancelled)));
}

#[test]
fn test_deadline_cancels_validation() {
    let pkg = Package::create(PackageConfig::default()).unwrap();
    pkg.add_file("/a", b"x".to_vec()).unwrap();

    let token = CancellationToken::with_timeout(Duration::from_millis(1));
    std::thread::sleep(Duration::from_millis(5));
    assert!(matches!(
        pkg.validate(&ValidationOptions::new().with_cancel(token)),
        Err(NovusPackError::Cancelled)
    ));
}

#[test]
fn test_read_only_handle_shared_across_threads() {
    let pkg = Package::create(PackageConfig::default()).unwrap();
    pkg.add_file("/shared.txt", b"same".to_vec()).unwrap();
    let pkg = Arc::new(pkg.into_read_only());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pkg = pkg.clone();
            std::thread::spawn(move || {
                assert_eq!(pkg.read_file("/shared.txt", None).unwrap(), b"same");
                assert!(matches!(
                    pkg.set_tag("/shared.txt", "k", 1i64),
                    Err(NovusPackError::ReadOnly)
                ));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
