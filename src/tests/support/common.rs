// Common helpers for building cache folders in tests.

use std::fs::{self, File, FileTimes};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use crate::index::FileMeta;

/// `n` files named `f00`, `f01`, ... with both timestamps `base` plus
/// `n - i` seconds in the past, so `f00` is the oldest.
pub fn aged_files(n: usize, base: Duration) -> Vec<(String, FileMeta)> {
    let now = SystemTime::now();
    (0..n)
        .map(|i| {
            let at = now - base - Duration::from_secs((n - i) as u64);
            (format!("f{i:02}"), FileMeta::new(at, at))
        })
        .collect()
}

/// Creates the files on disk with their access and modification times.
pub fn write_files(dir: &Path, files: &[(String, FileMeta)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, meta) in files {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_times(
            FileTimes::new()
                .set_accessed(meta.accessed_at)
                .set_modified(meta.updated_at),
        )
        .unwrap();
    }
}

/// Number of regular files directly inside `dir`.
pub fn count_files(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count(),
        Err(_) => 0,
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
