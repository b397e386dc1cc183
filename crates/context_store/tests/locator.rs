#![cfg(unix)]

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use context_store::{
    owner_record_path, ContextStore, LocateError, Locator, OwnerRecordLocator, ProcScanner,
    Signaller, StoreOptions,
};
use tempfile::TempDir;

const SELF_PID: u32 = 10;

#[derive(Default)]
struct RecordingSignaller {
    signalled: RefCell<Vec<u32>>,
}

impl RecordingSignaller {
    fn signalled(&self) -> Vec<u32> {
        self.signalled.borrow().clone()
    }
}

impl Signaller for RecordingSignaller {
    fn terminate(&self, pid: u32) -> Result<(), LocateError> {
        self.signalled.borrow_mut().push(pid);
        Ok(())
    }
}

struct ProcTree {
    dir: TempDir,
    exe: PathBuf,
    context: PathBuf,
}

impl ProcTree {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::create_dir(dir.path().join("proc")).expect("proc root");
        let exe = dir.path().join("bin").join("llmq");
        let context = dir.path().join("data").join("chat.yml");
        ContextStore::create(&context).expect("context created");
        let context = fs::canonicalize(&context).expect("canonical context");
        Self { dir, exe, context }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("proc")
    }

    /// Adds a process whose `exe` and `fd/*` links point at the given paths.
    fn process(&self, pid: u32, exe: &Path, open: &[&Path]) {
        let process = self.root().join(pid.to_string());
        fs::create_dir_all(process.join("fd")).expect("fd dir");
        symlink(exe, process.join("exe")).expect("exe link");
        for (fd, target) in open.iter().enumerate() {
            symlink(target, process.join("fd").join(fd.to_string())).expect("fd link");
        }
    }

    fn scanner(&self) -> ProcScanner<RecordingSignaller> {
        ProcScanner::with_root(
            self.root(),
            SELF_PID,
            self.exe.clone(),
            RecordingSignaller::default(),
        )
    }
}

#[test]
fn signals_only_the_sibling_holding_the_context() {
    let tree = ProcTree::new();
    let other = tree.dir.path().join("data").join("other.yml");
    tree.process(101, &tree.exe, &[Path::new("/dev/null"), &other]);
    tree.process(102, &tree.exe, &[Path::new("/dev/null"), &tree.context]);
    tree.process(103, &tree.exe, &[]);

    let scanner = tree.scanner();
    let pid = scanner.find_and_signal(&tree.context).expect("holder found");
    assert_eq!(pid, 102);
    assert_eq!(scanner.signaller().signalled(), vec![102]);
}

#[test]
fn no_holder_is_not_found_and_signals_nothing() {
    let tree = ProcTree::new();
    tree.process(101, &tree.exe, &[Path::new("/dev/null")]);
    tree.process(102, &tree.exe, &[]);
    tree.process(103, &tree.exe, &[]);

    let scanner = tree.scanner();
    let error = scanner.find_and_signal(&tree.context).expect_err("nobody holds it");
    assert!(matches!(error, LocateError::NotFound { .. }));
    assert!(scanner.signaller().signalled().is_empty());
}

#[test]
fn other_executables_and_self_are_ignored() {
    let tree = ProcTree::new();
    tree.process(SELF_PID, &tree.exe, &[&tree.context]);
    tree.process(201, Path::new("/usr/bin/vim"), &[&tree.context]);
    fs::create_dir_all(tree.root().join("self")).expect("non-numeric entry");

    let scanner = tree.scanner();
    assert!(scanner.holders(&tree.context).expect("scan").is_empty());
}

#[test]
fn replaced_executable_still_matches() {
    let tree = ProcTree::new();
    let deleted = PathBuf::from(format!("{} (deleted)", tree.exe.display()));
    tree.process(301, &deleted, &[&tree.context]);

    assert_eq!(tree.scanner().holders(&tree.context).expect("scan"), vec![301]);
}

#[test]
fn several_holders_signal_the_lowest_pid_once() {
    let tree = ProcTree::new();
    tree.process(402, &tree.exe, &[&tree.context]);
    tree.process(401, &tree.exe, &[&tree.context]);

    let scanner = tree.scanner();
    assert_eq!(scanner.find_and_signal(&tree.context).expect("holder"), 401);
    assert_eq!(scanner.signaller().signalled(), vec![401]);
}

#[test]
fn owner_record_locator_finds_live_holder() {
    let tree = ProcTree::new();
    let _store = ContextStore::open_with(&tree.context, StoreOptions { record_owner: true })
        .expect("held context");

    let locator = OwnerRecordLocator::new(RecordingSignaller::default());
    let pid = locator.find_and_signal(&tree.context).expect("live holder");
    assert_eq!(pid, std::process::id());
    assert_eq!(locator.signaller().signalled(), vec![std::process::id()]);
}

#[test]
fn owner_record_locator_rejects_stale_record() {
    let tree = ProcTree::new();
    fs::write(owner_record_path(&tree.context), "4242\n").expect("stale record");

    let locator = OwnerRecordLocator::new(RecordingSignaller::default());
    let error = locator.find_and_signal(&tree.context).expect_err("lock is free");
    assert!(matches!(error, LocateError::NotFound { .. }));
    assert!(locator.signaller().signalled().is_empty());
}

#[test]
fn owner_record_locator_without_record_is_not_found() {
    let tree = ProcTree::new();
    let locator = OwnerRecordLocator::new(RecordingSignaller::default());
    assert!(matches!(
        locator.find_and_signal(&tree.context),
        Err(LocateError::NotFound { .. })
    ));
}
