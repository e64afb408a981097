// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Last-N-lines log reader
//!
//! Reads backwards from the end of the file in fixed-size blocks, so the cost
//! is proportional to the requested tail rather than the file size. Failures
//! are reported inline as `Error reading log: <reason>`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Upper bound on lines returned by a single read
pub const MAX_TAIL_LINES: usize = 10_000;

const BLOCK_SIZE: u64 = 8192;

/// Clamp a requested line count into `1..=MAX_TAIL_LINES`
pub fn clamp_lines(requested: usize) -> usize {
    requested.clamp(1, MAX_TAIL_LINES)
}

/// Return the last `lines` lines of `path`, or an inline error string
pub async fn read_last_lines(path: PathBuf, lines: usize) -> String {
    let lines = clamp_lines(lines);
    match tokio::task::spawn_blocking(move || last_lines(&path, lines)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => format!("Error reading log: {}", e),
        Err(e) => format!("Error reading log: {}", e),
    }
}

fn last_lines(path: &Path, count: usize) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let metadata = file.metadata()?;
    if metadata.is_dir() {
        return Err(std::io::Error::other(format!(
            "{} is a directory",
            path.display()
        )));
    }

    let mut position = metadata.len();
    let mut tail: Vec<u8> = Vec::new();

    while position > 0 && complete_lines(&tail) < count {
        let step = BLOCK_SIZE.min(position);
        position -= step;

        file.seek(SeekFrom::Start(position))?;
        let mut block = vec![0u8; step as usize];
        file.read_exact(&mut block)?;
        block.extend_from_slice(&tail);
        tail = block;
    }

    let body_end = if tail.ends_with(b"\n") {
        tail.len() - 1
    } else {
        tail.len()
    };

    let mut seen = 0;
    let mut start = 0;
    for i in (0..body_end).rev() {
        if tail[i] == b'\n' {
            seen += 1;
            if seen == count {
                start = i + 1;
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&tail[start..]).into_owned())
}

/// Newlines in the buffer, not counting a final terminator
fn complete_lines(buffer: &[u8]) -> usize {
    let body = buffer.strip_suffix(b"\n").unwrap_or(buffer);
    body.iter().filter(|&&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_last_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\nfive\n").unwrap();

        assert_eq!(read_last_lines(path.clone(), 2).await, "four\nfive\n");
        assert_eq!(read_last_lines(path, 1).await, "five\n");
    }

    #[tokio::test]
    async fn test_fewer_lines_than_requested() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("error.log");
        std::fs::write(&path, "only\nlines\n").unwrap();

        assert_eq!(read_last_lines(path, 100).await, "only\nlines\n");
    }

    #[tokio::test]
    async fn test_missing_final_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("error.log");
        std::fs::write(&path, "a\nb\nc").unwrap();

        assert_eq!(read_last_lines(path, 2).await, "b\nc");
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").unwrap();

        assert_eq!(read_last_lines(path, 10).await, "");
    }

    #[tokio::test]
    async fn test_spans_multiple_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        let content: String = (0..5000).map(|n| format!("request {:05}\n", n)).collect();
        std::fs::write(&path, content).unwrap();

        let tail = read_last_lines(path, 1500).await;
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), 1500);
        assert_eq!(lines[0], "request 03500");
        assert_eq!(lines[1499], "request 04999");
    }

    #[tokio::test]
    async fn test_missing_file_reported_inline() {
        let dir = TempDir::new().unwrap();
        let text = read_last_lines(dir.path().join("absent.log"), 10).await;
        assert!(text.starts_with("Error reading log:"));
    }

    #[test]
    fn test_clamp_lines() {
        assert_eq!(clamp_lines(0), 1);
        assert_eq!(clamp_lines(250), 250);
        assert_eq!(clamp_lines(1_000_000), MAX_TAIL_LINES);
    }
}
