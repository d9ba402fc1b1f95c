//! Line-oriented output destination shared by both pipelines.
//!
//! A sink is built once per run. File sinks are opened lazily: the file is
//! created (or truncated) by the first line written and appended to after
//! that, so a run that fails before producing anything leaves an existing
//! file untouched. Every line is flushed as soon as it is written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use coenroll_shared::{CoenrollError, Result};

/// Where result or diagnostic lines go.
#[derive(Debug)]
pub struct OutputSink {
    target: Target,
    lines_written: usize,
}

#[derive(Debug)]
enum Target {
    Stdout,
    File {
        path: PathBuf,
        writer: Option<BufWriter<File>>,
    },
}

impl OutputSink {
    /// Write to standard output.
    pub fn stdout() -> Self {
        Self {
            target: Target::Stdout,
            lines_written: 0,
        }
    }

    /// Write to `path`, replacing its contents on the first line.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::File {
                path: path.into(),
                writer: None,
            },
            lines_written: 0,
        }
    }

    /// A file sink when `path` is given, standard output otherwise.
    pub fn from_option(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::file(path),
            None => Self::stdout(),
        }
    }

    /// Append one line.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        match &mut self.target {
            Target::Stdout => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{line}")
                    .and_then(|()| stdout.flush())
                    .map_err(|e| CoenrollError::io("<stdout>", e))?;
            }
            Target::File { path, writer } => {
                if writer.is_none() {
                    let file = File::create(&*path).map_err(|e| CoenrollError::io(&*path, e))?;
                    *writer = Some(BufWriter::new(file));
                }
                if let Some(out) = writer {
                    writeln!(out, "{line}")
                        .and_then(|()| out.flush())
                        .map_err(|e| CoenrollError::io(&*path, e))?;
                }
            }
        }

        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Destination file, if this sink writes to one.
    pub fn path(&self) -> Option<&Path> {
        match &self.target {
            Target::Stdout => None,
            Target::File { path, .. } => Some(path),
        }
    }
}
