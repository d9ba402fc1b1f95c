//! Row-iteration drivers for the two pipelines.
//!
//! Validation: CSV → per-row checks → diagnostics (or the "no problems" line).
//! Enrollment: CSV → per-row lookup-or-create → `...,accessid` result rows.
//!
//! Rows are processed strictly in input order and every output line is
//! written before the next row starts.

use std::path::Path;
use std::time::{Duration, Instant};

use coenroll_shared::{
    CoenrollError, EnrollmentResult, FailurePolicy, OrganizationSet, Result, UserRecord,
    numbered_lines,
};
use coenroll_validator::{MxResolver, ValidationReport};
use tracing::{error, info, instrument, warn};

use crate::output::OutputSink;
use crate::workflow::{EnrollOutcome, Enroller};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate `input` and write the report to `sink`.
#[instrument(skip_all, fields(input = %input.display()))]
pub async fn run_validation<R: MxResolver>(
    input: &Path,
    organizations: &OrganizationSet,
    resolver: &R,
    sink: &mut OutputSink,
) -> Result<ValidationReport> {
    let report = coenroll_validator::validate_file(input, organizations, resolver).await?;
    for line in report.lines() {
        sink.write_line(&line)?;
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Enrollment
// ---------------------------------------------------------------------------

/// What happened to one input row.
#[derive(Debug)]
pub enum RowOutcome {
    /// A new person was created.
    Enrolled(EnrollmentResult),
    /// The email already had an access id.
    Existing(EnrollmentResult),
    /// The row itself is unusable; nothing was sent to the registry.
    Invalid { reason: String },
    /// The registry or the network failed part way through.
    Failed { error: CoenrollError },
}

impl From<EnrollOutcome> for RowOutcome {
    fn from(outcome: EnrollOutcome) -> Self {
        match outcome {
            EnrollOutcome::Created(result) => Self::Enrolled(result),
            EnrollOutcome::Existing(result) => Self::Existing(result),
        }
    }
}

impl RowOutcome {
    pub fn result(&self) -> Option<&EnrollmentResult> {
        match self {
            Self::Enrolled(result) | Self::Existing(result) => Some(result),
            Self::Invalid { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Counts for a finished (or aborted) bulk enrollment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollSummary {
    pub enrolled: usize,
    pub existing: usize,
    pub invalid: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting enrollment status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each row has been handled.
    fn row_done(&self, line: usize, outcome: &RowOutcome);
    /// Called when the run completes.
    fn done(&self, summary: &EnrollSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn row_done(&self, _line: usize, _outcome: &RowOutcome) {}
    fn done(&self, _summary: &EnrollSummary) {}
}

/// Enroll one input line. Never fails: problems come back as
/// [`RowOutcome::Invalid`] or [`RowOutcome::Failed`].
pub async fn enroll_row(enroller: &Enroller<'_>, text: &str) -> RowOutcome {
    let record = match UserRecord::from_line(text) {
        Ok(record) => record,
        Err(e) => {
            return RowOutcome::Invalid {
                reason: e.to_string(),
            };
        }
    };

    if let Some(reason) = missing_fields_reason(&record) {
        return RowOutcome::Invalid { reason };
    }

    match enroller.enroll(&record).await {
        Ok(outcome) => outcome.into(),
        Err(error) => RowOutcome::Failed { error },
    }
}

/// Enroll every row of the CSV file at `input`. An unreadable file is fatal.
pub async fn enroll_file(
    enroller: &Enroller<'_>,
    input: &Path,
    sink: &mut OutputSink,
    policy: FailurePolicy,
    progress: &dyn ProgressReporter,
) -> Result<EnrollSummary> {
    let content = std::fs::read_to_string(input).map_err(|e| CoenrollError::io(input, e))?;
    enroll_content(enroller, &content, sink, policy, progress).await
}

/// Enroll every row of `content`, writing a result line per enrolled or
/// matched user.
///
/// Invalid rows are logged and skipped. A failed row either aborts the run
/// with its error or is logged and skipped, according to `policy`. Lines
/// already written stay written either way.
#[instrument(skip_all, fields(policy = %policy))]
pub async fn enroll_content(
    enroller: &Enroller<'_>,
    content: &str,
    sink: &mut OutputSink,
    policy: FailurePolicy,
    progress: &dyn ProgressReporter,
) -> Result<EnrollSummary> {
    let start = Instant::now();
    let mut summary = EnrollSummary::default();

    progress.phase("Enrolling users");

    for (line, text) in numbered_lines(content) {
        let outcome = enroll_row(enroller, text).await;

        if let Some(result) = outcome.result() {
            sink.write_line(&result.to_csv_line())?;
        }
        progress.row_done(line, &outcome);

        match outcome {
            RowOutcome::Enrolled(_) => summary.enrolled += 1,
            RowOutcome::Existing(_) => summary.existing += 1,
            RowOutcome::Invalid { reason } => {
                warn!(line, %reason, "skipping invalid row");
                summary.invalid += 1;
            }
            RowOutcome::Failed { error } => {
                summary.failed += 1;
                match policy {
                    FailurePolicy::Abort => {
                        error!(line, error = %error, "enrollment failed, aborting run");
                        return Err(error);
                    }
                    FailurePolicy::Skip => {
                        error!(line, error = %error, "enrollment failed, continuing with next row");
                    }
                }
            }
        }
    }

    summary.elapsed = start.elapsed();
    progress.done(&summary);

    info!(
        enrolled = summary.enrolled,
        existing = summary.existing,
        invalid = summary.invalid,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis(),
        "enrollment complete"
    );

    Ok(summary)
}

/// Enroll a single record given directly rather than read from a file.
pub async fn enroll_single(
    enroller: &Enroller<'_>,
    record: &UserRecord,
    sink: &mut OutputSink,
) -> Result<EnrollmentResult> {
    if let Some(reason) = missing_fields_reason(record) {
        return Err(CoenrollError::validation(reason));
    }

    let result = enroller.enroll(record).await?.into_result();
    sink.write_line(&result.to_csv_line())?;
    Ok(result)
}

fn missing_fields_reason(record: &UserRecord) -> Option<String> {
    let missing = record.missing_fields();
    if missing.is_empty() {
        return None;
    }
    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
    Some(format!("missing parameter: {}", names.join(", ")))
}
