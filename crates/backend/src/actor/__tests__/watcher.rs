//! Watcher relay tests: notify event translation and the full
//! watcher -> dispatcher -> processor path on a real directory.

#[cfg(test)]
mod tests {
  use std::{path::PathBuf, sync::Arc, time::Duration};

  use notify::{
    Event, EventKind,
    event::{AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode},
  };
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{
      ProcessorHandle, WatcherTask,
      __tests__::helpers::{ProcessorTestContext, wait_for},
      events::{IN_CLOSE_WRITE, IN_CREATE, IN_DELETE, IN_ISDIR, IN_MODIFY, IN_MOVED_FROM, IN_MOVED_TO},
      watcher::to_frames,
    },
    ipc::FsEvent,
    server::{Dispatcher, DispatcherConfig},
  };

  fn event(kind: EventKind, path: &str) -> Event {
    Event::new(kind).add_path(PathBuf::from(path))
  }

  #[test]
  fn test_translation_of_notify_events() {
    assert_eq!(
      to_frames(&event(EventKind::Create(CreateKind::File), "/r/a")),
      vec![FsEvent::new(IN_CREATE, "/r/a")]
    );
    assert_eq!(
      to_frames(&event(EventKind::Create(CreateKind::Folder), "/r/d")),
      vec![FsEvent::new(IN_CREATE | IN_ISDIR, "/r/d")]
    );
    assert_eq!(
      to_frames(&event(EventKind::Remove(RemoveKind::File), "/r/a")),
      vec![FsEvent::new(IN_DELETE, "/r/a")]
    );
    assert_eq!(
      to_frames(&event(EventKind::Access(AccessKind::Close(AccessMode::Write)), "/r/a")),
      vec![FsEvent::new(IN_CLOSE_WRITE, "/r/a")]
    );
    assert_eq!(
      to_frames(&event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "/r/a")),
      vec![FsEvent::new(IN_MODIFY, "/r/a")]
    );
    assert!(to_frames(&event(EventKind::Access(AccessKind::Read), "/r/a")).is_empty());
  }

  #[test]
  fn test_only_moves_carry_cookies() {
    let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), "/r/a").set_tracker(77);
    let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/r/b").set_tracker(77);
    let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
      .add_path(PathBuf::from("/r/a"))
      .add_path(PathBuf::from("/r/b"))
      .set_tracker(77);
    let created = event(EventKind::Create(CreateKind::File), "/r/c").set_tracker(3);

    assert_eq!(to_frames(&from), vec![FsEvent::new(IN_MOVED_FROM, "/r/a").with_cookie(77)]);
    assert_eq!(to_frames(&to), vec![FsEvent::new(IN_MOVED_TO, "/r/b").with_cookie(77)]);
    assert!(to_frames(&both).is_empty());
    assert_eq!(to_frames(&created), vec![FsEvent::new(IN_CREATE, "/r/c")]);
  }

  #[tokio::test]
  async fn test_upload_and_rename_reach_the_catalog() {
    let ctx = ProcessorTestContext::new().await;
    let dispatcher = Dispatcher::bind(DispatcherConfig::from(&ctx.config)).await.unwrap();
    assert!(dispatcher.is_ready());

    let cancel = CancellationToken::new();
    let watcher = WatcherTask::spawn(
      ctx.config.path.clone(),
      ProcessorHandle::Queue(dispatcher.sender()),
      cancel.child_token(),
    )
    .unwrap();
    let run = tokio::spawn(dispatcher.run(Arc::new(ctx.processor.clone()), cancel.child_token()));

    let path = ctx.write_package("x86_64/foo-1.0-1-x86_64.pkg.tar.xz", "foo", "1.0-1", "x86_64");
    let stored = wait_for(Duration::from_secs(5), || async {
      ctx.latest("foo", "x86_64").await.is_some()
    })
    .await;
    assert!(stored, "upload should be cataloged");

    let dest = ctx.path("x86_64/foo-renamed.pkg.tar.xz");
    std::fs::rename(&path, &dest).unwrap();
    let moved = wait_for(Duration::from_secs(5), || async {
      ctx
        .db
        .find_version("foo", "x86_64", "1.0-1")
        .await
        .unwrap()
        .is_some_and(|row| row.file_path == dest.to_string_lossy())
    })
    .await;
    assert!(moved, "rename should update the stored path");

    cancel.cancel();
    run.await.unwrap();
    watcher.await.unwrap();
  }
}
