#![allow(dead_code)]

use readall::FileHandle;
use readall::io::fs::MemoryFileSystem;

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Store newline-terminated `lines` in memory and return a seekable handle to them.
pub fn mem_lines<S: AsRef<str>>(fs: &MemoryFileSystem, path: &str, lines: &[S]) -> FileHandle {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    let size = fs.insert(path, text);
    FileHandle::new(path, size)
}
