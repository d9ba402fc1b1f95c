//! Per-row structural and semantic checks that need no network access.

use std::fmt;

use coenroll_shared::{OrganizationSet, RequiredField, UserRecord};

/// Minimum accepted last-name length, in characters.
pub const MIN_LAST_NAME_LEN: usize = 2;

/// A single problem found in one input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// The row has more fields than the input format allows.
    WrongFieldCount { found: usize },
    /// A required field is empty.
    MissingParameter(RequiredField),
    /// The last name is shorter than [`MIN_LAST_NAME_LEN`].
    LastNameTooShort,
    /// The organization is not in the organization list.
    InvalidOrganization(String),
    /// The email is not `local@domain` with exactly one `@`.
    InvalidEmailFormat(String),
    /// The email domain has no MX record (or the lookup failed).
    DomainNotValid(String),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongFieldCount { found } => write!(
                f,
                "wrong number of fields: expected {}, found {found}",
                coenroll_shared::FIELD_COUNT
            ),
            Self::MissingParameter(field) => write!(f, "missing parameter: {field}"),
            Self::LastNameTooShort => write!(
                f,
                "last name too short (must be at least {MIN_LAST_NAME_LEN} characters)"
            ),
            Self::InvalidOrganization(org) => write!(f, "invalid organization: {org}"),
            Self::InvalidEmailFormat(email) => write!(f, "invalid email format: {email}"),
            Self::DomainNotValid(domain) => write!(f, "domain not valid: {domain} has no MX record"),
        }
    }
}

/// Run every offline check against `record`.
///
/// Checks are independent; a row can report several problems at once. A check
/// on a field is skipped when that field is empty, since the missing-parameter
/// problem already covers it.
pub fn check_record(record: &UserRecord, organizations: &OrganizationSet) -> Vec<Problem> {
    let mut problems: Vec<Problem> = record
        .missing_fields()
        .into_iter()
        .map(Problem::MissingParameter)
        .collect();

    if !record.last_name.is_empty() && record.last_name.chars().count() < MIN_LAST_NAME_LEN {
        problems.push(Problem::LastNameTooShort);
    }

    if !record.organization.is_empty() && !organizations.contains(&record.organization) {
        problems.push(Problem::InvalidOrganization(record.organization.clone()));
    }

    if !record.email.is_empty() && email_domain(&record.email).is_none() {
        problems.push(Problem::InvalidEmailFormat(record.email.clone()));
    }

    problems
}

/// The domain part of a well-formed email address.
///
/// Well-formed means exactly one `@` with non-empty text on both sides.
pub fn email_domain(email: &str) -> Option<&str> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(domain)
}
