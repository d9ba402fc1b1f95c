//! Core domain types shared by the validator and the enroller.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoenrollError, Result};

/// Number of comma-separated fields in an input row:
/// `firstname,middlename,lastname,organization,emailaddress`.
pub const FIELD_COUNT: usize = 5;

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// One user as read from an input CSV row.
///
/// Construction never checks field contents; that is the validator's job.
/// It only enforces the row shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub first_name: String,
    /// May be empty.
    pub middle_name: String,
    pub last_name: String,
    pub organization: String,
    pub email: String,
}

/// A required field of [`UserRecord`], used to name missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    FirstName,
    LastName,
    Organization,
    Email,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FirstName => "first name",
            Self::LastName => "last name",
            Self::Organization => "organization",
            Self::Email => "email",
        };
        f.write_str(name)
    }
}

impl UserRecord {
    /// Parse one input line.
    ///
    /// Lines with fewer than five fields treat the absent trailing fields as
    /// empty. More than five fields is an error, since a literal comma inside
    /// a field is not supported.
    pub fn from_line(line: &str) -> Result<Self> {
        let fields = split_fields(line);
        if fields.len() > FIELD_COUNT {
            return Err(CoenrollError::validation(format!(
                "wrong number of fields: expected {FIELD_COUNT}, found {}",
                fields.len()
            )));
        }

        let field = |i: usize| fields.get(i).copied().unwrap_or_default().to_string();

        Ok(Self {
            first_name: field(0),
            middle_name: field(1),
            last_name: field(2),
            organization: field(3),
            email: field(4),
        })
    }

    /// Required fields that are empty, in column order.
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        [
            (RequiredField::FirstName, &self.first_name),
            (RequiredField::LastName, &self.last_name),
            (RequiredField::Organization, &self.organization),
            (RequiredField::Email, &self.email),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// The five fields joined back into the input CSV shape.
    pub fn to_csv_line(&self) -> String {
        [
            self.first_name.as_str(),
            self.middle_name.as_str(),
            self.last_name.as_str(),
            self.organization.as_str(),
            self.email.as_str(),
        ]
        .join(",")
    }
}

/// Split a raw line into fields. Only a trailing `\r` is stripped; field
/// contents are otherwise kept exactly as written.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.strip_suffix('\r').unwrap_or(line).split(',').collect()
}

/// Iterate over the non-blank lines of an input file together with their
/// 1-based physical line numbers.
pub fn numbered_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
}

// ---------------------------------------------------------------------------
// OrganizationSet
// ---------------------------------------------------------------------------

/// The set of organization names a row's organization must match exactly.
///
/// Matching is case-sensitive string equality; no normalization is applied to
/// lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationSet(HashSet<String>);

impl OrganizationSet {
    /// Build a set from a one-name-per-line list. Surrounding whitespace is
    /// trimmed from each line and blank lines are ignored.
    pub fn from_lines(content: &str) -> Self {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for OrganizationSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// EnrollmentResult
// ---------------------------------------------------------------------------

/// A user together with the access identifier the registry holds for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    pub record: UserRecord,
    pub access_id: String,
}

impl EnrollmentResult {
    /// Output row: `firstname,middlename,lastname,organization,email,accessid`.
    pub fn to_csv_line(&self) -> String {
        format!("{},{}", self.record.to_csv_line(), self.access_id)
    }
}
