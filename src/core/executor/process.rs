//! Isolated-process workers.
//!
//! The parent starts `<program> worker --max-pixels N` children and talks to
//! each over its stdin/stdout, one JSON object per line:
//!
//! ```text
//! parent -> child  {"index":3,"path":"/photos/a.jpg"}
//! child  -> parent {"index":3,"outcome":{"status":"record", ...}}
//! ```
//!
//! Children exit when their stdin closes. Logs go to stderr.

use super::{CancellationToken, Progress};
use crate::core::extractor::{ExtractOutcome, Extractor};
use crate::core::record::ImageFormat;
use crate::core::scanner::DiscoveredFile;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

/// One unit of work sent to a child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub index: usize,
    pub path: PathBuf,
}

/// A child's answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub index: usize,
    pub outcome: ExtractOutcome,
}

/// Child side of the protocol: answer requests until the input closes
pub fn run_worker<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    extractor: &Extractor<'_>,
) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let file = DiscoveredFile {
            format: ImageFormat::from_path(&request.path),
            path: request.path,
        };
        let response = WorkerResponse {
            index: request.index,
            outcome: extractor.extract(&file, request.index),
        };
        serde_json::to_writer(&mut output, &response).map_err(io::Error::other)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}

/// Parent side: spread the empty slots over child processes.
///
/// Spawn failures return before any work is sent. A child that dies mid-run
/// leaves its in-flight slot empty for the thread fallback.
pub(super) fn run(
    program: &Path,
    workers: usize,
    files: &[DiscoveredFile],
    extractor: &Extractor<'_>,
    cancel: &CancellationToken,
    progress: &Progress<'_>,
    slots: &mut [Option<ExtractOutcome>],
) -> io::Result<()> {
    let pending = slots.iter().filter(|slot| slot.is_none()).count();
    if pending == 0 {
        return Ok(());
    }

    let mut children = Vec::new();
    for _ in 0..workers.min(pending).max(1) {
        match spawn(program, extractor.max_pixels()) {
            Ok(child) => children.push(child),
            Err(e) => {
                shutdown(&mut children);
                return Err(e);
            }
        }
    }

    let (job_tx, job_rx) = unbounded::<usize>();
    for index in (0..files.len()).filter(|&i| slots[i].is_none()) {
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded::<(usize, ExtractOutcome)>();
    let mut first_error = None;

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for child in children.iter_mut() {
            let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
                continue;
            };
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            handles.push(scope.spawn(move || {
                drive(stdin, stdout, &job_rx, files, cancel, &result_tx)
            }));
        }
        drop(result_tx);

        for (index, outcome) in result_rx.iter() {
            progress.record(&outcome);
            slots[index] = Some(outcome);
        }

        for handle in handles {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("worker driver panicked")));
            if let Err(e) = result {
                warn!("Worker process failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    });

    shutdown(&mut children);

    match first_error {
        Some(e) => Err(e),
        None if children.is_empty() => Err(io::Error::other("no worker processes started")),
        None => Ok(()),
    }
}

fn spawn(program: &Path, max_pixels: u64) -> io::Result<Child> {
    debug!("Starting worker {}", program.display());
    Command::new(program)
        .arg("worker")
        .arg("--max-pixels")
        .arg(max_pixels.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
}

/// Feed one child until the queue drains, cancellation, or a protocol error
fn drive(
    stdin: ChildStdin,
    stdout: ChildStdout,
    jobs: &Receiver<usize>,
    files: &[DiscoveredFile],
    cancel: &CancellationToken,
    results: &Sender<(usize, ExtractOutcome)>,
) -> io::Result<()> {
    let mut writer = BufWriter::new(stdin);
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    while !cancel.is_cancelled() {
        let Ok(index) = jobs.try_recv() else {
            break;
        };

        let request = WorkerRequest {
            index,
            path: files[index].path.clone(),
        };
        serde_json::to_writer(&mut writer, &request).map_err(io::Error::other)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "worker closed its output",
            ));
        }
        let response: WorkerResponse = serde_json::from_str(line.trim())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if response.index != index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected result {}, got {}", index, response.index),
            ));
        }
        let _ = results.send((index, response.outcome));
    }
    Ok(())
}

fn shutdown(children: &mut [Child]) {
    for child in children.iter_mut() {
        // Closing stdin ends the worker loop
        drop(child.stdin.take());
        if let Ok(None) = child.try_wait() {
            let _ = child.wait();
        }
    }
}
