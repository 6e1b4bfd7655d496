mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use lumpkit_archive::error::Result;
use lumpkit_archive::{Archive, ArchiveEvent, ArchiveOptions, DirEntryChange, EntryRecord};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

use common::{populate, touch_later};

#[traced_test]
#[test]
fn external_edits_are_detected_in_order_and_applied() -> Result<()> {
    let root = tempfile::tempdir()?;
    let path = |p: &str| root.path().join(p);
    populate(
        root.path(),
        &[("a.txt", "a"), ("b.txt", "b"), ("keep/c.txt", "c")],
    )?;
    fs::create_dir(path("gone"))?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    assert!(archive.pending_changes()?.is_empty());

    fs::remove_file(path("b.txt"))?;
    touch_later(&path("a.txt"), "changed")?;
    fs::remove_dir(path("gone"))?;
    populate(root.path(), &[("fresh/d.txt", "d"), ("e.txt", "e")])?;

    let mtime = |p: &str| -> Result<_> { Ok(fs::metadata(path(p))?.modified()?) };
    let expected = vec![
        DirEntryChange::DeletedDir { path: path("gone") },
        DirEntryChange::DeletedFile { path: path("b.txt") },
        DirEntryChange::UpdatedFile {
            path: path("a.txt"),
            mtime: mtime("a.txt")?,
        },
        DirEntryChange::AddedDir { path: path("fresh") },
        DirEntryChange::AddedFile {
            path: path("e.txt"),
            mtime: mtime("e.txt")?,
        },
        DirEntryChange::AddedFile {
            path: path("fresh/d.txt"),
            mtime: mtime("fresh/d.txt")?,
        },
    ];
    let changes = archive.pending_changes()?;
    assert_eq!(changes, expected);

    let summary = archive.apply_changes(&changes)?;
    assert_eq!(summary.applied, 6);
    assert!(summary.failures.is_empty());

    assert!(archive.dir("gone").is_none());
    assert!(archive.entry("b.txt").is_none());
    assert!(archive.entry("e.txt").is_some());
    assert!(archive.entry("fresh/d.txt").is_some());
    let a = archive.entry("a.txt").expect("a.txt");
    assert_eq!(archive.entry_data(a)?, b"changed");

    assert!(!archive.is_modified());
    assert!(archive.pending_changes()?.is_empty());
    assert!(logs_contain("reconciled external changes"));

    Ok(())
}

#[test]
fn applying_keeps_a_dirty_archive_dirty() -> Result<()> {
    let root = tempfile::tempdir()?;
    populate(root.path(), &[("a.txt", "a")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    let top = archive.tree().root();
    archive.add_entry(EntryRecord::with_data("NEW.TXT", "unsaved"), top, None)?;
    assert!(archive.is_modified());

    populate(root.path(), &[("z.txt", "z")])?;
    let changes = archive.pending_changes()?;
    assert_eq!(changes.len(), 1);

    archive.apply_changes(&changes)?;
    assert!(archive.is_modified());
    assert!(archive.entry("z.txt").is_some());

    Ok(())
}

#[test]
fn reloading_an_edited_entry_keeps_the_archive_dirty() -> Result<()> {
    let root = tempfile::tempdir()?;
    populate(root.path(), &[("a.txt", "a")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    let a = archive.entry("a.txt").expect("a.txt");
    archive.set_entry_data(a, "in memory")?;
    assert!(archive.is_modified());

    touch_later(&root.path().join("a.txt"), "on disk")?;
    let changes = archive.pending_changes()?;
    assert!(matches!(changes.as_slice(), [DirEntryChange::UpdatedFile { .. }]));

    let summary = archive.apply_changes(&changes)?;
    assert_eq!(summary.applied, 1);
    assert_eq!(archive.entry_data(a)?, b"on disk");
    assert!(archive.is_modified());

    Ok(())
}

#[test]
fn applied_change_is_not_reported_again() -> Result<()> {
    let root = tempfile::tempdir()?;
    populate(root.path(), &[("a.txt", "a")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    touch_later(&root.path().join("a.txt"), "edited")?;

    let changes = archive.pending_changes()?;
    assert!(matches!(changes.as_slice(), [DirEntryChange::UpdatedFile { .. }]));

    let first = archive.apply_changes(&changes)?;
    assert_eq!(first.applied, 1);
    assert!(archive
        .reconciler()
        .is_some_and(|r| r.should_ignore(&changes[0])));
    assert!(archive.pending_changes()?.is_empty());

    let second = archive.apply_changes(&changes)?;
    assert!(second.failures.is_empty());
    let a = archive.entry("a.txt").expect("a.txt");
    assert_eq!(archive.entry_data(a)?, b"edited");
    assert!(!archive.is_modified());

    Ok(())
}

#[test]
fn ignored_change_returns_once_the_file_changes_again() -> Result<()> {
    let root = tempfile::tempdir()?;
    let file = root.path().join("a.txt");
    populate(root.path(), &[("a.txt", "a")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    touch_later(&file, "first edit")?;

    let changes = archive.pending_changes()?;
    assert_eq!(changes.len(), 1);
    archive.ignore_changes(&changes)?;
    assert!(archive.pending_changes()?.is_empty());

    touch_later(&file, "second edit")?;
    let changes = archive.pending_changes()?;
    assert_eq!(
        changes,
        vec![DirEntryChange::UpdatedFile {
            path: file.clone(),
            mtime: fs::metadata(&file)?.modified()?,
        }]
    );

    Ok(())
}

#[test]
fn files_of_a_deleted_directory_are_skipped() -> Result<()> {
    let root = tempfile::tempdir()?;
    populate(root.path(), &[("sub/x.txt", "x"), ("sub/y.txt", "y")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    fs::remove_dir_all(root.path().join("sub"))?;

    let changes = archive.pending_changes()?;
    assert_eq!(
        changes,
        vec![
            DirEntryChange::DeletedDir {
                path: root.path().join("sub")
            },
            DirEntryChange::DeletedFile {
                path: root.path().join("sub").join("x.txt")
            },
            DirEntryChange::DeletedFile {
                path: root.path().join("sub").join("y.txt")
            },
        ]
    );

    let summary = archive.apply_changes(&changes)?;
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.skipped, 2);
    assert!(summary.failures.is_empty());
    assert_eq!(archive.tree().num_entries(), 0);
    assert!(!archive.is_modified());

    Ok(())
}

#[test]
fn files_queued_for_removal_are_not_added_back() -> Result<()> {
    let root = tempfile::tempdir()?;
    populate(root.path(), &[("a.txt", "a"), ("b.txt", "b")])?;

    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;
    let a = archive.entry("a.txt").expect("a.txt");
    let b = archive.entry("b.txt").expect("b.txt");
    archive.rename_entry(a, "renamed.txt")?;
    archive.remove_entry(b)?;

    assert!(archive.pending_changes()?.is_empty());

    Ok(())
}

#[test]
fn subscribers_get_one_event_per_batch() -> Result<()> {
    let root = tempfile::tempdir()?;
    let mut archive = Archive::open_dir(root.path(), ArchiveOptions::default())?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    archive.subscribe(move |event| sink.lock().expect("lock").push(event.clone()));

    populate(root.path(), &[("one.txt", "1"), ("two/three.txt", "3")])?;
    let changes = archive.pending_changes()?;
    assert_eq!(changes.len(), 3);
    archive.apply_changes(&changes)?;

    assert_eq!(
        *events.lock().expect("lock"),
        vec![ArchiveEvent::Reconciled {
            applied: 3,
            failed: 0
        }]
    );
    assert!(!archive.is_muted());

    Ok(())
}
