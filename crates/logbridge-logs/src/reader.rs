//! Cursor-based reads and follow for session files

use logbridge_core::{JsonlRow, Level, Result};
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::rotation::list_backups;

/// Filters for [`read`]. Applied in order: levels, project, contains, since_ms.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Byte offset to resume from
    pub since_id: u64,
    /// Identity of the file `since_id` points into, as returned by [`read`].
    /// When it no longer names the live file, the rotated backup it belongs
    /// to is drained first.
    pub file_id: Option<u64>,
    pub since_ms: Option<i64>,
    pub levels: Option<Vec<Level>>,
    pub project: Option<String>,
    pub contains: Option<String>,
    pub limit: Option<usize>,
}

impl ReadOptions {
    pub fn from_cursor(since_id: u64) -> Self {
        Self {
            since_id,
            ..Default::default()
        }
    }

    /// Resume exactly where a previous read stopped
    pub fn resume(result: &ReadResult) -> Self {
        Self {
            since_id: result.next_since_id,
            file_id: result.file_id,
            ..Default::default()
        }
    }

    fn accepts(&self, row: &JsonlRow) -> bool {
        if let Some(levels) = &self.levels {
            if !levels.contains(&row.level) {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if row.project.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !row.message.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if row.timestamp < since {
                return false;
            }
        }
        true
    }

    fn is_full(&self, rows: &[JsonlRow]) -> bool {
        self.limit.is_some_and(|limit| rows.len() >= limit)
    }
}

/// Rows read plus the cursor to resume from
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub rows: Vec<JsonlRow>,
    /// Starting byte offset of the last returned row (unchanged if none)
    pub next_since_id: u64,
    /// Identity of the file `next_since_id` points into
    pub file_id: Option<u64>,
}

/// Identity of an open file; a rename keeps it, a recreated file gets a new one
#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<u64> {
    None
}

/// Scan complete lines from `start`, pushing accepted rows into `rows` until
/// the limit is reached. Returns the start offset of the last accepted row.
fn scan(
    mut handle: File,
    start: u64,
    options: &ReadOptions,
    rows: &mut Vec<JsonlRow>,
) -> Result<Option<u64>> {
    handle.seek(SeekFrom::Start(start))?;
    let mut reader = BufReader::new(handle);

    let mut last = None;
    let mut offset = start;
    let mut skip_first = start > 0;
    let mut buf = Vec::new();

    loop {
        if options.is_full(rows) {
            break;
        }

        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }

        let line_start = offset;
        offset += n as u64;

        if skip_first {
            skip_first = false;
            continue;
        }

        if buf.last() != Some(&b'\n') {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let row: JsonlRow = match serde_json::from_str(line) {
            Ok(row) => row,
            Err(e) => {
                debug!("Skipping malformed line at offset {}: {}", line_start, e);
                continue;
            }
        };

        if options.accepts(&row) {
            rows.push(row);
            // A row at offset 0 is reported as 1 so that resuming still
            // discards it instead of reading from the top again
            last = Some(line_start.max(1));
        }
    }

    Ok(last)
}

/// Backups of `file` from the generation identified by `id` onwards, oldest first.
/// Empty if that generation was pruned.
fn backups_from(file: &Path, id: u64) -> Result<Vec<(PathBuf, Option<u64>)>> {
    let backups: Vec<(PathBuf, Option<u64>)> = list_backups(file)?
        .into_iter()
        .map(|path| {
            let id = std::fs::metadata(&path).ok().and_then(|m| file_id(&m));
            (path, id)
        })
        .collect();

    Ok(match backups.iter().position(|(_, backup)| *backup == Some(id)) {
        Some(index) => backups[index..].to_vec(),
        None => vec![],
    })
}

/// Read rows from `file` starting at `options.since_id`.
///
/// When resuming from a non-zero offset the first line is discarded: it is
/// either the already-returned row the cursor points at or a partial record.
/// A trailing line without a newline is still being written and is left for
/// the next read. Malformed lines are skipped.
///
/// If `options.file_id` names a rotated generation, the rest of that backup
/// and any newer backups are read before the live file, so rotation never
/// drops rows. Without a file id, a cursor past the end of the file restarts
/// at 0.
pub fn read(file: &Path, options: &ReadOptions) -> Result<ReadResult> {
    let handle = match File::open(file) {
        Ok(handle) => handle,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReadResult {
                rows: vec![],
                next_since_id: options.since_id,
                file_id: options.file_id,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let meta = handle.metadata()?;
    let current = file_id(&meta);
    let mut rows = Vec::new();

    let start = match (options.file_id, current) {
        (Some(saved), Some(live)) if saved != live => {
            debug!("{} was rotated under the cursor, draining backups", file.display());

            let mut from = options.since_id;
            for (path, id) in backups_from(file, saved)? {
                if options.is_full(&rows) {
                    return Ok(ReadResult {
                        rows,
                        next_since_id: from,
                        file_id: id,
                    });
                }

                let backup = match File::open(&path) {
                    Ok(backup) => backup,
                    Err(e) => {
                        debug!("Skipping backup {}: {}", path.display(), e);
                        from = 0;
                        continue;
                    }
                };

                let last = scan(backup, from, options, &mut rows)?;
                if options.is_full(&rows) {
                    return Ok(ReadResult {
                        rows,
                        next_since_id: last.unwrap_or(from),
                        file_id: id,
                    });
                }
                from = 0;
            }
            0
        }
        _ if options.since_id > meta.len() => {
            // The file shrank under the cursor (rotated); start over
            debug!(
                "Cursor {} is past the end of {} ({} bytes), restarting",
                options.since_id,
                file.display(),
                meta.len()
            );
            0
        }
        _ => options.since_id,
    };

    let last = scan(handle, start, options, &mut rows)?;

    Ok(ReadResult {
        rows,
        next_since_id: last.unwrap_or(start),
        file_id: current,
    })
}

/// Follow a session file, yielding new rows as they are appended.
///
/// Starts from `since_id` (in the file named by `options.file_id`, if set)
/// with the same cursor rules as [`read`], so rows written just before a
/// rotation are still delivered. The file is re-read on change notifications
/// and at least every 500ms.
pub fn follow(file: PathBuf, since_id: u64, options: ReadOptions) -> mpsc::Receiver<JsonlRow> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        if let Err(e) = follow_file(&file, since_id, options, tx).await {
            debug!("Follow ended: {}", e);
        }
    });

    rx
}

async fn follow_file(
    path: &Path,
    mut cursor: u64,
    options: ReadOptions,
    tx: mpsc::Sender<JsonlRow>,
) -> Result<()> {
    use notify::{RecommendedWatcher, RecursiveMode, Watcher};

    let (watch_tx, mut watch_rx) = mpsc::channel::<()>(1);
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = watch_tx.try_send(());
            }
        },
        notify::Config::default(),
    );

    // Without a watcher the poll interval still picks up changes
    let _watcher = match watcher {
        Ok(mut watcher) => {
            let target = path.parent().unwrap_or(path);
            if let Err(e) = watcher.watch(target, RecursiveMode::NonRecursive) {
                debug!("Failed to watch {}: {}", target.display(), e);
            }
            Some(watcher)
        }
        Err(e) => {
            debug!("Failed to create watcher: {}", e);
            None
        }
    };

    let mut identity = options.file_id;

    loop {
        tokio::select! {
            _ = watch_rx.recv() => {}
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }

        if tx.is_closed() {
            break;
        }

        let mut read_options = options.clone();
        read_options.since_id = cursor;
        read_options.file_id = identity;
        read_options.limit = None;
        let result = read(path, &read_options)?;

        // An empty read after a restart still moves the cursor back to 0
        cursor = result.next_since_id;
        identity = result.file_id;
        for row in result.rows {
            if tx.send(row).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}
