//! JSON request and response bodies for the registry REST API.
//!
//! The v1 endpoints wrap every request in a `RequestType`/`Version` envelope
//! with PascalCase fields; the core people endpoint takes a snake_case
//! document instead. Ids come back as strings or numbers depending on the
//! endpoint, so both are accepted.

use serde::{Deserialize, Deserializer, Serialize};

/// Envelope version accepted by the v1 endpoints.
pub(crate) const API_VERSION: &str = "1.0";

/// Status the registry uses for active people, roles and identifiers.
pub(crate) const STATUS_ACTIVE: &str = "Active";

/// Name/email type for values supplied by the enrolling institution.
pub(crate) const TYPE_OFFICIAL: &str = "official";

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CoPeopleResponse {
    #[serde(default)]
    pub co_people: Vec<CoPersonEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CoPersonEntry {
    #[serde(rename = "Id", deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct IdentifiersResponse {
    #[serde(default)]
    pub identifiers: Vec<IdentifierEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct IdentifierEntry {
    #[serde(rename = "Type")]
    pub kind: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TermsAndConditionsResponse {
    #[serde(default)]
    pub co_terms_and_conditions: Vec<TermsAndConditionsEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TermsAndConditionsEntry {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Body returned by v1 `POST` endpoints on success.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct NewObjectResponse {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

// ---------------------------------------------------------------------------
// v1 requests
// ---------------------------------------------------------------------------

/// A reference from a v1 sub-record to the person or org identity that owns it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PersonRef<'a> {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    pub id: &'a str,
}

impl<'a> PersonRef<'a> {
    pub fn org(id: &'a str) -> Self {
        Self { kind: "Org", id }
    }

    pub fn co(id: &'a str) -> Self {
        Self { kind: "CO", id }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OrgIdentitiesRequest {
    pub request_type: &'static str,
    pub version: &'static str,
    pub org_identities: Vec<OrgIdentityBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OrgIdentityBody {
    pub version: &'static str,
    pub co_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CoOrgIdentityLinksRequest<'a> {
    pub request_type: &'static str,
    pub version: &'static str,
    pub co_org_identity_links: Vec<CoOrgIdentityLinkBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CoOrgIdentityLinkBody<'a> {
    pub version: &'static str,
    pub co_person_id: &'a str,
    pub org_identity_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct NamesRequest<'a> {
    pub request_type: &'static str,
    pub version: &'static str,
    pub names: Vec<NameBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct NameBody<'a> {
    pub version: &'static str,
    pub given: &'a str,
    pub middle: &'a str,
    pub family: &'a str,
    #[serde(rename = "Type")]
    pub kind: &'static str,
    pub primary_name: bool,
    pub person: PersonRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct IdentifiersRequest<'a> {
    pub request_type: &'static str,
    pub version: &'static str,
    pub identifiers: Vec<IdentifierBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct IdentifierBody<'a> {
    pub version: &'static str,
    #[serde(rename = "Type")]
    pub kind: &'a str,
    pub identifier: String,
    pub login: bool,
    pub person: PersonRef<'a>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TAndCAgreementsRequest<'a> {
    pub request_type: &'static str,
    pub version: &'static str,
    pub co_t_and_c_agreements: Vec<TAndCAgreementBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TAndCAgreementBody<'a> {
    pub version: &'static str,
    pub co_terms_and_conditions_id: &'a str,
    pub person: PersonRef<'a>,
}

// ---------------------------------------------------------------------------
// Core API person document
// ---------------------------------------------------------------------------

/// New-person document for the core people endpoint: the person, their group
/// memberships, their role in an organization, and their official email and
/// name.
#[derive(Debug, Serialize)]
pub(crate) struct NewPersonDocument<'a> {
    #[serde(rename = "CoPerson")]
    pub co_person: CorePerson,
    #[serde(rename = "CoGroupMember")]
    pub group_members: Vec<CoreGroupMember>,
    #[serde(rename = "CoPersonRole")]
    pub roles: Vec<CoreRole<'a>>,
    #[serde(rename = "EmailAddress")]
    pub email_addresses: Vec<CoreEmailAddress<'a>>,
    #[serde(rename = "Name")]
    pub names: Vec<CoreName<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CorePerson {
    pub co_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CoreGroupMember {
    pub co_group_id: String,
    pub member: bool,
    pub owner: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CoreRole<'a> {
    pub affiliation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cou_id: Option<String>,
    pub o: &'a str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CoreEmailAddress<'a> {
    pub mail: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CoreName<'a> {
    pub given: &'a str,
    pub middle: &'a str,
    pub family: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub primary_name: bool,
}
