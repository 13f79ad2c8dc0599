//! Processor E2E tests: completion, latest election, deletion, moves and
//! the `any` fan-out, against a real catalog and recorded index commands.

#[cfg(test)]
mod tests {
  use std::{path::PathBuf, sync::Arc, time::Duration};

  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{
      Completion,
      __tests__::helpers::{IndexCall, ProcessorTestContext, wait_for},
      events::{IN_CLOSE_WRITE, IN_CREATE, IN_DELETE, IN_ISDIR, IN_MOVED_FROM, IN_MOVED_TO},
    },
    db::UserRow,
    ipc::FsEvent,
    server::{Dispatcher, DispatcherConfig},
  };

  fn add(index: PathBuf, package: PathBuf) -> IndexCall {
    IndexCall::Add { index, package }
  }

  fn remove(index: PathBuf, name: &str) -> IndexCall {
    IndexCall::Remove {
      index,
      name: name.to_string(),
    }
  }

  // ==========================================================================
  // Completion
  // ==========================================================================

  #[tokio::test]
  async fn test_first_version_becomes_latest() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");

    let completion = ctx.processor.complete(&path).await.unwrap();
    assert!(matches!(completion, Completion::Stored { partial: false, .. }));

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(row.enabled);
    assert!(row.latest);
    assert_eq!(row.file_path, path.to_string_lossy());
    assert_eq!(row.build_date, Some(1_700_000_000));
    assert_eq!(row.depends(), vec!["glibc"]);
    assert_eq!(ctx.indexer.calls(), vec![add(ctx.index("x86_64"), path)]);
  }

  #[tokio::test]
  async fn test_newer_version_replaces_latest_and_older_does_not() {
    let ctx = ProcessorTestContext::new().await;
    let v9 = ctx.write_package("x86_64/foo-1.2.9-1-x86_64.pkg.tar.xz", "foo", "1.2.9-1", "x86_64");
    let v10 = ctx.write_package("x86_64/foo-1.2.10-1-x86_64.pkg.tar.xz", "foo", "1.2.10-1", "x86_64");
    let v8 = ctx.write_package("x86_64/foo-1.2.8-1-x86_64.pkg.tar.xz", "foo", "1.2.8-1", "x86_64");

    ctx.processor.complete(&v9).await.unwrap();
    ctx.processor.complete(&v10).await.unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.2.10-1"));

    ctx.processor.complete(&v8).await.unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.2.10-1"));

    assert_eq!(
      ctx.indexer.calls(),
      vec![add(ctx.index("x86_64"), v9), add(ctx.index("x86_64"), v10)]
    );
  }

  #[tokio::test]
  async fn test_partial_package_is_stored_disabled() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_partial_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");

    let completion = ctx.processor.complete(&path).await.unwrap();
    assert!(matches!(completion, Completion::Stored { partial: true, .. }));

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(!row.enabled);
    assert!(!row.latest);
    assert!(ctx.indexer.calls().is_empty());
  }

  #[tokio::test]
  async fn test_latest_turning_partial_elects_previous() {
    let ctx = ProcessorTestContext::new().await;
    let old = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let new = ctx.write_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    ctx.processor.complete(&old).await.unwrap();
    ctx.processor.complete(&new).await.unwrap();
    ctx.indexer.take();

    // the same version re-uploaded, now damaged
    ctx.write_partial_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    ctx.processor.complete(&new).await.unwrap();

    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));
    assert_eq!(ctx.indexer.calls(), vec![add(ctx.index("x86_64"), old)]);
  }

  #[tokio::test]
  async fn test_repaired_upload_is_published() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_partial_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&path).await.unwrap();

    ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&path).await.unwrap();

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(row.enabled);
    assert!(row.latest);
    assert_eq!(ctx.indexer.calls(), vec![add(ctx.index("x86_64"), path)]);
  }

  #[tokio::test]
  async fn test_busy_rejected_and_index_files_are_skipped() {
    let ctx = ProcessorTestContext::new().await;

    let busy = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.probe.set_busy(&busy, true);
    assert_eq!(ctx.processor.complete(&busy).await.unwrap(), Completion::Busy);

    let junk = ctx.path("x86_64/junk.pkg.tar.xz");
    std::fs::write(&junk, b"not a package").unwrap();
    assert_eq!(ctx.processor.complete(&junk).await.unwrap(), Completion::Rejected);

    let index = ctx.index("x86_64");
    assert_eq!(index, ctx.path("x86_64/test.db.tar.gz"));
    let lock = ctx.path("x86_64/test.db.tar.gz.lck");
    for file in [&index, &lock] {
      std::fs::write(file, b"index").unwrap();
      assert_eq!(ctx.processor.complete(file).await.unwrap(), Completion::Skipped);
    }

    let missing = ctx.path("x86_64/missing.pkg.tar.xz");
    assert_eq!(ctx.processor.complete(&missing).await.unwrap(), Completion::Skipped);

    assert!(ctx.db.file_paths().await.unwrap().is_empty());
    assert!(ctx.indexer.calls().is_empty());

    // the writer finished; the close event retries
    ctx.probe.set_busy(&busy, false);
    assert!(matches!(
      ctx.processor.complete(&busy).await.unwrap(),
      Completion::Stored { .. }
    ));
  }

  #[tokio::test]
  async fn test_owner_resolved_from_packager() {
    let ctx = ProcessorTestContext::new().await;
    ctx
      .db
      .upsert_user(&UserRow {
        id: 7,
        username: Some("jane doe".to_string()),
        email: Some("Jane@Example.org".to_string()),
        title: None,
        realname: None,
      })
      .await
      .unwrap();

    let path = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&path).await.unwrap();

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert_eq!(row.owner, Some(7));
    assert!(row.uploader.is_some());
  }

  #[tokio::test]
  async fn test_auto_rename_to_canonical_path() {
    let ctx = ProcessorTestContext::with_config(|config| config.auto_rename = true).await;
    let upload = ctx.write_package("incoming/upload.pkg.tar.zst", "foo", "1.0-1", "x86_64");

    ctx.processor.complete(&upload).await.unwrap();

    let dest = ctx.path("x86_64/foo-1.0-1-x86_64.pkg.tar.zst");
    assert!(dest.exists());
    assert!(!upload.exists());

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert_eq!(row.file_path, dest.to_string_lossy());

    // the rename's own MOVED pair must not touch the row
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_FROM, upload.clone()).with_cookie(11))
      .await
      .unwrap();
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_TO, dest.clone()).with_cookie(11))
      .await
      .unwrap();
    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert_eq!(row.file_path, dest.to_string_lossy());
  }

  // ==========================================================================
  // Deletion
  // ==========================================================================

  #[tokio::test]
  async fn test_delete_latest_elects_next_best() {
    let ctx = ProcessorTestContext::new().await;
    let v1 = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let v2 = ctx.write_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    ctx.processor.complete(&v1).await.unwrap();
    ctx.processor.complete(&v2).await.unwrap();
    ctx.indexer.take();

    std::fs::remove_file(&v2).unwrap();
    ctx.processor.delete(&v2).await.unwrap();

    let row = ctx.db.find_version("foo", "x86_64", "2.0-1").await.unwrap().unwrap();
    assert!(!row.enabled);
    assert_eq!(row.file_path, "");
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));
    assert_eq!(ctx.indexer.take(), vec![add(ctx.index("x86_64"), v1.clone())]);

    std::fs::remove_file(&v1).unwrap();
    ctx.processor.delete(&v1).await.unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await, None);
    assert_eq!(ctx.indexer.take(), vec![remove(ctx.index("x86_64"), "foo")]);
  }

  #[tokio::test]
  async fn test_delete_non_latest_leaves_index_alone() {
    let ctx = ProcessorTestContext::new().await;
    let v1 = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let v2 = ctx.write_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    ctx.processor.complete(&v1).await.unwrap();
    ctx.processor.complete(&v2).await.unwrap();
    ctx.indexer.take();

    ctx.processor.delete(&v1).await.unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("2.0-1"));
    assert!(ctx.indexer.calls().is_empty());
  }

  #[tokio::test]
  async fn test_missing_winner_is_cleaned_up() {
    let ctx = ProcessorTestContext::new().await;
    let v1 = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let v2 = ctx.write_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    let v3 = ctx.write_package("x86_64/foo-3.0-1-x86_64.pkg.tar.xz", "foo", "3.0-1", "x86_64");
    for path in [&v1, &v2, &v3] {
      ctx.processor.complete(path).await.unwrap();
    }

    // 2.0 vanished without an event
    std::fs::remove_file(&v2).unwrap();
    std::fs::remove_file(&v3).unwrap();
    ctx.processor.delete(&v3).await.unwrap();

    let settled = wait_for(Duration::from_secs(5), || async {
      ctx.latest("foo", "x86_64").await.as_deref() == Some("1.0-1")
    })
    .await;
    assert!(settled, "1.0 should end up latest");

    let v2_row = ctx.db.find_version("foo", "x86_64", "2.0-1").await.unwrap().unwrap();
    assert!(!v2_row.enabled);
    assert!(ctx.indexer.calls().contains(&remove(ctx.index("x86_64"), "foo")));
    assert_eq!(ctx.indexer.calls().last(), Some(&add(ctx.index("x86_64"), v1)));
  }

  #[tokio::test]
  async fn test_delete_ignores_unknown_and_non_package_paths() {
    let ctx = ProcessorTestContext::new().await;
    ctx.processor.delete(&ctx.path("x86_64/readme.txt")).await.unwrap();
    ctx.processor.delete(&ctx.path("x86_64/ghost.pkg.tar.xz")).await.unwrap();
    assert!(ctx.indexer.calls().is_empty());
  }

  // ==========================================================================
  // Architecture-independent packages
  // ==========================================================================

  #[tokio::test]
  async fn test_any_package_is_linked_into_every_arch() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_package("any/docs-1.0-1-any.pkg.tar.xz", "docs", "1.0-1", "any");

    ctx.processor.complete(&path).await.unwrap();

    let mut expected = Vec::new();
    for arch in ["i686", "x86_64"] {
      let link = ctx.path(&format!("{arch}/docs-1.0-1-any.pkg.tar.xz"));
      let meta = std::fs::symlink_metadata(&link).unwrap();
      assert!(meta.file_type().is_symlink());
      assert_eq!(
        std::fs::read_link(&link).unwrap(),
        PathBuf::from("../any/docs-1.0-1-any.pkg.tar.xz")
      );
      assert_eq!(std::fs::canonicalize(&link).unwrap(), std::fs::canonicalize(&path).unwrap());
      expected.push(add(ctx.index(arch), link));
    }
    assert_eq!(ctx.indexer.take(), expected);

    std::fs::remove_file(&path).unwrap();
    ctx.processor.delete(&path).await.unwrap();

    for arch in ["i686", "x86_64"] {
      let link = ctx.path(&format!("{arch}/docs-1.0-1-any.pkg.tar.xz"));
      assert!(std::fs::symlink_metadata(&link).is_err());
    }
    assert_eq!(
      ctx.indexer.take(),
      vec![remove(ctx.index("i686"), "docs"), remove(ctx.index("x86_64"), "docs")]
    );
  }

  #[tokio::test]
  async fn test_any_symlink_events_are_ignored() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_package("any/docs-1.0-1-any.pkg.tar.xz", "docs", "1.0-1", "any");
    ctx.processor.complete(&path).await.unwrap();
    ctx.indexer.take();

    let link = ctx.path("x86_64/docs-1.0-1-any.pkg.tar.xz");
    assert_eq!(ctx.processor.complete(&link).await.unwrap(), Completion::Skipped);
    assert!(ctx.indexer.calls().is_empty());
  }

  // ==========================================================================
  // Moves
  // ==========================================================================

  #[tokio::test]
  async fn test_paired_move_updates_path() {
    let ctx = ProcessorTestContext::new().await;
    let src = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&src).await.unwrap();
    ctx.indexer.take();

    let dest = ctx.path("x86_64/renamed.pkg.tar.xz");
    std::fs::rename(&src, &dest).unwrap();
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_FROM, src.clone()).with_cookie(42))
      .await
      .unwrap();
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_TO, dest.clone()).with_cookie(42))
      .await
      .unwrap();

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert_eq!(row.file_path, dest.to_string_lossy());
    assert!(row.enabled);

    // nothing fires after the grace window
    tokio::time::sleep(Duration::from_millis(400)).await;
    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(row.enabled);
    assert!(ctx.indexer.calls().is_empty());
  }

  #[tokio::test]
  async fn test_move_out_of_tree_becomes_delete() {
    let ctx = ProcessorTestContext::new().await;
    let src = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&src).await.unwrap();
    ctx.indexer.take();

    std::fs::remove_file(&src).unwrap();
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_FROM, src.clone()).with_cookie(5))
      .await
      .unwrap();

    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(row.enabled, "nothing happens inside the grace window");

    let deleted = wait_for(Duration::from_secs(3), || async {
      let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
      !row.enabled
    })
    .await;
    assert!(deleted);
    assert_eq!(ctx.indexer.calls(), vec![remove(ctx.index("x86_64"), "foo")]);
  }

  #[tokio::test]
  async fn test_move_into_tree_becomes_completion() {
    let ctx = ProcessorTestContext::new().await;
    let dest = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");

    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_TO, dest.clone()).with_cookie(9))
      .await
      .unwrap();
    assert!(ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().is_none());

    let stored = wait_for(Duration::from_secs(3), || async {
      ctx.latest("foo", "x86_64").await.is_some()
    })
    .await;
    assert!(stored);
  }

  #[tokio::test]
  async fn test_shutdown_waits_for_unpaired_move() {
    let ctx = ProcessorTestContext::new().await;
    let src = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    ctx.processor.complete(&src).await.unwrap();
    ctx.indexer.take();

    std::fs::remove_file(&src).unwrap();
    ctx
      .processor
      .handle_event(FsEvent::new(IN_MOVED_FROM, src.clone()).with_cookie(77))
      .await
      .unwrap();

    let dispatcher = Dispatcher::bind(DispatcherConfig::from(&ctx.config)).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    dispatcher.run(Arc::new(ctx.processor.clone()), cancel).await;

    // the fallback ran before the dispatcher returned
    let row = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert!(!row.enabled);
    assert_eq!(ctx.indexer.calls(), vec![remove(ctx.index("x86_64"), "foo")]);
  }

  #[tokio::test]
  async fn test_drain_finishes_missing_file_cleanup() {
    let ctx = ProcessorTestContext::new().await;
    let v1 = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let v2 = ctx.write_package("x86_64/foo-2.0-1-x86_64.pkg.tar.xz", "foo", "2.0-1", "x86_64");
    let v3 = ctx.write_package("x86_64/foo-3.0-1-x86_64.pkg.tar.xz", "foo", "3.0-1", "x86_64");
    for path in [&v1, &v2, &v3] {
      ctx.processor.complete(path).await.unwrap();
    }

    std::fs::remove_file(&v2).unwrap();
    std::fs::remove_file(&v3).unwrap();
    ctx.processor.delete(&v3).await.unwrap();
    ctx.processor.drain().await;

    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));
  }

  // ==========================================================================
  // Event routing
  // ==========================================================================

  #[tokio::test]
  async fn test_event_routing() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");

    // create alone does nothing, close-write completes
    ctx.processor.handle_event(FsEvent::new(IN_CREATE, path.clone())).await.unwrap();
    assert!(ctx.db.file_paths().await.unwrap().is_empty());
    ctx
      .processor
      .handle_event(FsEvent::new(IN_CLOSE_WRITE, path.clone()))
      .await
      .unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));

    // directory events are ignored
    ctx
      .processor
      .handle_event(FsEvent::new(IN_DELETE | IN_ISDIR, ctx.path("x86_64")))
      .await
      .unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));

    std::fs::remove_file(&path).unwrap();
    ctx.processor.handle_event(FsEvent::new(IN_DELETE, path)).await.unwrap();
    assert_eq!(ctx.latest("foo", "x86_64").await, None);
  }

  // ==========================================================================
  // Adoption
  // ==========================================================================

  #[tokio::test]
  async fn test_auto_adopt_claims_matching_orphans() {
    let ctx = ProcessorTestContext::new().await;
    let foo = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let bar = ctx.write_package_json(
      "x86_64/bar-1.0-1-x86_64.pkg.tar.xz",
      serde_json::json!({"pkgname": "bar", "pkgver": "1.0-1", "arch": "x86_64", "packager": "Someone Else"}),
    );
    ctx.processor.complete(&foo).await.unwrap();
    ctx.processor.complete(&bar).await.unwrap();

    ctx
      .db
      .upsert_user(&UserRow {
        id: 2,
        username: Some("jdoe".to_string()),
        email: Some("jane@example.org".to_string()),
        title: None,
        realname: Some("Jane Doe".to_string()),
      })
      .await
      .unwrap();

    assert_eq!(ctx.processor.auto_adopt(2).await.unwrap(), 1);
    let foo = ctx.db.find_version("foo", "x86_64", "1.0-1").await.unwrap().unwrap();
    let bar = ctx.db.find_version("bar", "x86_64", "1.0-1").await.unwrap().unwrap();
    assert_eq!(foo.owner, Some(2));
    assert_eq!(bar.owner, None);

    assert_eq!(ctx.processor.auto_adopt(99).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_versions_keep_one_latest() {
    let ctx = ProcessorTestContext::new().await;
    let paths: Vec<PathBuf> = (1..=8)
      .map(|minor| {
        ctx.write_package(
          &format!("x86_64/foo-1.{minor}-1-x86_64.pkg.tar.xz"),
          "foo",
          &format!("1.{minor}-1"),
          "x86_64",
        )
      })
      .collect();

    let tasks: Vec<_> = paths
      .iter()
      .cloned()
      .map(|path| {
        let processor = ctx.processor.clone();
        tokio::spawn(async move { processor.complete(&path).await })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.8-1"));
  }

  // ==========================================================================
  // Serialization
  // ==========================================================================

  #[tokio::test]
  async fn test_repeated_completion_of_one_file_stores_one_row() {
    let ctx = ProcessorTestContext::new().await;
    let path = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");

    let tasks: Vec<_> = (0..8)
      .map(|_| {
        let processor = ctx.processor.clone();
        let path = path.clone();
        tokio::spawn(async move { processor.complete(&path).await })
      })
      .collect();
    for task in tasks {
      assert!(matches!(task.await.unwrap().unwrap(), Completion::Stored { .. }));
    }

    // unchanged content again, after the burst
    ctx.processor.complete(&path).await.unwrap();

    assert_eq!(ctx.db.file_paths().await.unwrap().len(), 1);
    assert_eq!(ctx.latest("foo", "x86_64").await.as_deref(), Some("1.0-1"));
    assert_eq!(ctx.indexer.calls(), vec![add(ctx.index("x86_64"), path)]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_index_commands_never_overlap_per_arch() {
    let ctx = ProcessorTestContext::new().await;
    ctx.indexer.set_latency(Duration::from_millis(2));

    let mut paths = Vec::new();
    for i in 0..24 {
      let name = format!("pkg{i}");
      paths.push(ctx.write_package(&format!("x86_64/{name}-1.0-1-x86_64.pkg.tar.xz"), &name, "1.0-1", "x86_64"));
    }
    for i in 0..8 {
      let name = format!("doc{i}");
      paths.push(ctx.write_package(&format!("any/{name}-1.0-1-any.pkg.tar.xz"), &name, "1.0-1", "any"));
    }

    let tasks: Vec<_> = paths
      .into_iter()
      .map(|path| {
        let processor = ctx.processor.clone();
        tokio::spawn(async move { processor.complete(&path).await })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    let calls = ctx.indexer.calls();
    let on = |arch: &str| {
      let index = ctx.index(arch);
      calls
        .iter()
        .filter(|call| matches!(call, IndexCall::Add { index: i, .. } if *i == index))
        .count()
    };
    assert_eq!(calls.len(), 40);
    assert_eq!(on("x86_64"), 32);
    assert_eq!(on("i686"), 8);
    assert_eq!(ctx.indexer.overlaps(), 0);
  }
}
