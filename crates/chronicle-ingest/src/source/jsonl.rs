//! JSONL event source adapter.
//!
//! Reads events from JSONL files (one JSON event per line), parses each
//! one and hands it to the caller.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chronicle_core::{Event, parse_event};

use super::{EventSource, SourceStats};
use crate::{Error, Result};

/// Configuration for the JSONL source.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Input file or directory path.
    pub input: PathBuf,

    /// Continue processing on errors (log and skip invalid events).
    pub continue_on_error: bool,

    /// Limit number of files to process.
    pub limit: Option<usize>,

    /// Progress reporting interval (events).
    pub progress_interval: usize,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            continue_on_error: true,
            limit: None,
            progress_interval: 100_000,
        }
    }
}

/// JSONL file event source.
pub struct JsonlSource {
    config: JsonlConfig,
}

impl JsonlSource {
    pub fn new(config: JsonlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JsonlConfig {
        &self.config
    }

    /// Collect files to process based on input path.
    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let input = &self.config.input;
        let mut files = Vec::new();

        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(input)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext == "jsonl" || ext == "ndjson")
                })
                .collect();

            // Sort for deterministic processing order
            entries.sort();
            files = entries;
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input path does not exist: {}", input.display()),
            )));
        }

        if let Some(limit) = self.config.limit {
            files.truncate(limit);
        }

        Ok(files)
    }

    /// Process a single JSONL file. Returns `Ok(false)` if the handler
    /// asked to stop.
    fn process_file<F>(
        &self,
        path: &Path,
        handler: &mut F,
        stats: &mut SourceStats,
    ) -> Result<bool>
    where
        F: FnMut(Event) -> Result<bool>,
    {
        let reader = BufReader::new(File::open(path)?);

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!("Line {}: I/O error: {}", line_num + 1, e);
                    stats.invalid_events += 1;
                    stats.parse_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(Error::Io(e));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            stats.total_events += 1;

            let event = match parse_event(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Line {}: {}", line_num + 1, e);
                    stats.invalid_events += 1;
                    stats.parse_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(e.into());
                }
            };

            stats.valid_events += 1;

            match handler(event) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("Handler signaled stop");
                    return Ok(false);
                }
                Err(e) => {
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                    tracing::warn!("Handler error: {}", e);
                }
            }

            if stats.total_events.is_multiple_of(self.config.progress_interval) {
                tracing::info!(
                    "Progress: {} events, {} valid, {} invalid",
                    stats.total_events,
                    stats.valid_events,
                    stats.invalid_events
                );
            }
        }

        Ok(true)
    }
}

impl EventSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn process<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(Event) -> Result<bool>,
    {
        let mut stats = SourceStats::default();

        let files = self.collect_files()?;
        tracing::info!("Found {} JSONL files to process", files.len());

        for (file_idx, path) in files.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Processing: {}",
                file_idx + 1,
                files.len(),
                path.display()
            );

            stats.bytes_read += fs::metadata(path)?.len() as usize;

            match self.process_file(path, &mut handler, &mut stats) {
                Ok(true) => stats.files_processed += 1,
                Ok(false) => {
                    stats.files_processed += 1;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Error processing {}: {}", path.display(), e);
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }

        Ok(stats)
    }
}
