//! Bulk CSV validation for user enrollment files.
//!
//! Each row is checked for required fields, last-name length, organization
//! membership, email syntax and a live MX record on the email domain. Every
//! row is checked and every problem collected; nothing stops at the first bad
//! row.

mod checks;
mod dns;
mod organizations;

use std::fmt;
use std::path::Path;

use coenroll_shared::{CoenrollError, OrganizationSet, Result, UserRecord, numbered_lines};
use tracing::{debug, info, instrument};

pub use checks::{MIN_LAST_NAME_LEN, Problem, check_record, email_domain};
pub use dns::{DnsMxResolver, MxResolver};
pub use organizations::load_organizations;

/// Summary line emitted when a file has no problems at all.
pub const NO_PROBLEMS: &str = "no problems found";

// ---------------------------------------------------------------------------
// Diagnostic / ValidationReport
// ---------------------------------------------------------------------------

/// One problem tagged with the 1-based input line it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub problem: Problem,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}:{}", self.line, self.problem)
    }
}

/// Outcome of validating a whole file.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Number of non-blank rows checked.
    pub rows_checked: usize,
    /// Problems in input order.
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The report as output lines: one per diagnostic, or the single
    /// [`NO_PROBLEMS`] summary when there are none.
    pub fn lines(&self) -> Vec<String> {
        if self.is_clean() {
            return vec![NO_PROBLEMS.to_string()];
        }
        self.diagnostics.iter().map(ToString::to_string).collect()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate the CSV file at `path`. An unreadable file is fatal.
pub async fn validate_file<R: MxResolver>(
    path: &Path,
    organizations: &OrganizationSet,
    resolver: &R,
) -> Result<ValidationReport> {
    let content = std::fs::read_to_string(path).map_err(|e| CoenrollError::io(path, e))?;
    Ok(validate_content(&content, organizations, resolver).await)
}

/// Validate CSV content row by row, in input order.
///
/// The MX lookup only runs for emails that pass the format check; a
/// malformed address has no domain to query.
#[instrument(skip_all)]
pub async fn validate_content<R: MxResolver>(
    content: &str,
    organizations: &OrganizationSet,
    resolver: &R,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (line, text) in numbered_lines(content) {
        report.rows_checked += 1;

        let record = match UserRecord::from_line(text) {
            Ok(record) => record,
            Err(_) => {
                let found = coenroll_shared::split_fields(text).len();
                report.diagnostics.push(Diagnostic {
                    line,
                    problem: Problem::WrongFieldCount { found },
                });
                continue;
            }
        };

        let mut problems = check_record(&record, organizations);

        if let Some(domain) = email_domain(&record.email) {
            if !resolver.has_mx(domain).await {
                problems.push(Problem::DomainNotValid(domain.to_string()));
            }
        }

        debug!(line, problems = problems.len(), "row checked");
        report
            .diagnostics
            .extend(problems.into_iter().map(|problem| Diagnostic { line, problem }));
    }

    info!(
        rows = report.rows_checked,
        problems = report.diagnostics.len(),
        "validation complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;

    /// In-memory resolver that records every query it receives.
    struct StaticMxResolver {
        domains_with_mx: HashSet<&'static str>,
        queries: RefCell<Vec<String>>,
    }

    impl StaticMxResolver {
        fn new(domains: &[&'static str]) -> Self {
            Self {
                domains_with_mx: domains.iter().copied().collect(),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl MxResolver for StaticMxResolver {
        async fn has_mx(&self, domain: &str) -> bool {
            self.queries.borrow_mut().push(domain.to_string());
            self.domains_with_mx.contains(domain)
        }
    }

    fn orgs() -> OrganizationSet {
        OrganizationSet::from_lines(
            &std::fs::read_to_string("../../../fixtures/organizations.txt")
                .expect("read organizations fixture"),
        )
    }

    #[tokio::test]
    async fn scenario_a_clean_row() {
        let resolver = StaticMxResolver::new(&["example.edu"]);
        let report = validate_content(
            "Jane,,Doe,Example University,jane@example.edu\n",
            &orgs(),
            &resolver,
        )
        .await;

        assert!(report.is_clean());
        assert_eq!(report.lines(), vec![NO_PROBLEMS.to_string()]);
    }

    #[tokio::test]
    async fn scenario_b_skips_mx_for_malformed_email() {
        let resolver = StaticMxResolver::new(&[]);
        let report = validate_content("J,,D,Unknown College,bad-email\n", &orgs(), &resolver).await;

        assert_eq!(
            report.lines(),
            vec![
                "Line 1:last name too short (must be at least 2 characters)",
                "Line 1:invalid organization: Unknown College",
                "Line 1:invalid email format: bad-email",
            ]
        );
        assert!(resolver.queries.borrow().is_empty());
    }

    #[tokio::test]
    async fn domain_without_mx_is_reported() {
        let resolver = StaticMxResolver::new(&["example.edu"]);
        let report = validate_content(
            "Jane,,Doe,Example University,jane@nomail.example\n",
            &orgs(),
            &resolver,
        )
        .await;

        assert_eq!(
            report.diagnostics,
            vec![Diagnostic {
                line: 1,
                problem: Problem::DomainNotValid("nomail.example".into()),
            }]
        );
    }

    #[tokio::test]
    async fn diagnostic_lines_have_no_space_after_line_number() {
        let resolver = StaticMxResolver::new(&[]);
        let report =
            validate_content("Jane,,Doe,Nope U,jane@example.edu\n", &orgs(), &resolver).await;

        assert_eq!(
            report.lines(),
            vec![
                "Line 1:invalid organization: Nope U",
                "Line 1:domain not valid: example.edu has no MX record",
            ]
        );
    }

    #[tokio::test]
    async fn every_row_is_checked_and_repeated_domains_requeried() {
        let content = std::fs::read_to_string("../../../fixtures/csv/mixed.csv")
            .expect("read mixed fixture");
        let resolver = StaticMxResolver::new(&["example.edu", "state.edu"]);

        let report = validate_content(&content, &orgs(), &resolver).await;

        assert_eq!(report.rows_checked, 6);
        let lines = report.lines();
        assert_eq!(
            lines,
            vec![
                "Line 2:missing parameter: first name",
                "Line 3:invalid organization: example university",
                "Line 5:invalid email format: sam@@state.edu",
                "Line 6:domain not valid: nowhere.invalid has no MX record",
                "Line 7:wrong number of fields: expected 5, found 6",
            ]
        );
        assert_eq!(
            resolver.queries.borrow().as_slice(),
            ["example.edu", "example.edu", "example.edu", "nowhere.invalid"]
        );
    }

    #[tokio::test]
    async fn unreadable_file_is_fatal() {
        let resolver = StaticMxResolver::new(&[]);
        let err = validate_file(Path::new("/nonexistent/input.csv"), &orgs(), &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, CoenrollError::Io { .. }));
    }
}
