//! Registry REST API adapter.
//!
//! [`RegistryClient`] turns enrollment intents into authenticated HTTP calls
//! against the registry and parses the JSON answers into typed results.
//! Lookups treat "no content" and "not found" as an empty answer. Every
//! mutating call must come back `201 Created`; anything else is an error the
//! caller is expected to treat as fatal.

mod wire;

use std::fmt;
use std::time::Duration;

use coenroll_shared::{CoenrollError, RegistrySettings, Result, UserRecord};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use wire::{
    API_VERSION, CoOrgIdentityLinkBody, CoOrgIdentityLinksRequest, CoPeopleResponse,
    CoreEmailAddress, CoreGroupMember, CoreName, CorePerson, CoreRole, IdentifierBody,
    IdentifiersRequest, IdentifiersResponse, NameBody, NamesRequest, NewObjectResponse,
    NewPersonDocument, OrgIdentitiesRequest, OrgIdentityBody, PersonRef, STATUS_ACTIVE,
    TAndCAgreementBody, TAndCAgreementsRequest, TYPE_OFFICIAL, TermsAndConditionsResponse,
};

/// User-Agent string for registry requests.
const USER_AGENT: &str = concat!("coenroll/", env!("CARGO_PKG_VERSION"));

/// Status code every mutating call must return.
const CREATED: StatusCode = StatusCode::CREATED;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// The registry's internal id for an enrolled person (CoPerson).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonId(pub String);

/// The registry's id for an organizational identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrgIdentityId(pub String);

/// The id of a terms-and-conditions document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermsId(pub String);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(PersonId, OrgIdentityId, TermsId);

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// Authenticated client for one registry and one CO.
pub struct RegistryClient {
    http: Client,
    settings: RegistrySettings,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Create a client with the given settings.
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| CoenrollError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    // -- lookups ------------------------------------------------------------

    /// Search for a person by email address. If the registry returns several
    /// matches the first one is used.
    #[instrument(skip(self))]
    pub async fn find_person_by_email(&self, email: &str) -> Result<Option<PersonId>> {
        let co_id = self.settings.co_id.to_string();
        let request = self
            .get("registry/co_people.json")?
            .query(&[("coid", co_id.as_str()), ("search.mail", email)]);

        let Some(response) = self
            .fetch_json::<CoPeopleResponse>("find person by email", request)
            .await?
        else {
            return Ok(None);
        };

        if response.co_people.len() > 1 {
            warn!(
                matches = response.co_people.len(),
                "several people share this email, using the first"
            );
        }

        Ok(response
            .co_people
            .into_iter()
            .next()
            .map(|person| PersonId(person.id)))
    }

    /// List a person's identifiers and return the one of the access-id type.
    #[instrument(skip_all, fields(person_id = %person_id))]
    pub async fn find_access_id_by_person_id(&self, person_id: &PersonId) -> Result<Option<String>> {
        let request = self
            .get("registry/identifiers.json")?
            .query(&[("copersonid", person_id.0.as_str())]);

        let Some(response) = self
            .fetch_json::<IdentifiersResponse>("find access id", request)
            .await?
        else {
            return Ok(None);
        };

        Ok(response
            .identifiers
            .into_iter()
            .find(|identifier| identifier.kind == self.settings.identifier_type)
            .map(|identifier| identifier.identifier))
    }

    /// Person search followed by identifier search. `None` if either is missing.
    pub async fn find_access_id_by_email(&self, email: &str) -> Result<Option<String>> {
        match self.find_person_by_email(email).await? {
            Some(person_id) => self.find_access_id_by_person_id(&person_id).await,
            None => Ok(None),
        }
    }

    /// The CO's currently active terms-and-conditions document, if any.
    #[instrument(skip(self))]
    pub async fn active_terms_and_conditions(&self) -> Result<Option<TermsId>> {
        let co_id = self.settings.co_id.to_string();
        let request = self
            .get("registry/co_terms_and_conditions.json")?
            .query(&[("coid", co_id.as_str())]);

        let Some(response) = self
            .fetch_json::<TermsAndConditionsResponse>("list terms and conditions", request)
            .await?
        else {
            return Ok(None);
        };

        Ok(response
            .co_terms_and_conditions
            .into_iter()
            .find(|tc| tc.status == STATUS_ACTIVE)
            .map(|tc| TermsId(tc.id)))
    }

    // -- mutations ----------------------------------------------------------

    /// Create a person with their group memberships, organization role,
    /// official email and official name.
    #[instrument(skip_all, fields(email = %record.email))]
    pub async fn create_person(&self, record: &UserRecord) -> Result<()> {
        let document = NewPersonDocument {
            co_person: CorePerson {
                co_id: self.settings.co_id.to_string(),
                status: "A",
            },
            group_members: self
                .settings
                .group_ids
                .iter()
                .map(|id| CoreGroupMember {
                    co_group_id: id.to_string(),
                    member: true,
                    owner: false,
                })
                .collect(),
            roles: vec![CoreRole {
                affiliation: &self.settings.affiliation,
                cou_id: self.settings.cou_id.map(|id| id.to_string()),
                o: &record.organization,
                status: "A",
            }],
            email_addresses: vec![CoreEmailAddress {
                mail: &record.email,
                kind: TYPE_OFFICIAL,
                verified: true,
            }],
            names: vec![CoreName {
                given: &record.first_name,
                middle: &record.middle_name,
                family: &record.last_name,
                kind: TYPE_OFFICIAL,
                primary_name: true,
            }],
        };

        let path = format!("registry/api/co/{}/core/v1/people", self.settings.co_id);
        self.post_created("create person", &path, &document).await?;
        info!("person created");
        Ok(())
    }

    /// Create an empty organizational identity in the CO and return its id.
    #[instrument(skip(self))]
    pub async fn create_org_identity(&self) -> Result<OrgIdentityId> {
        let body = OrgIdentitiesRequest {
            request_type: "OrgIdentities",
            version: API_VERSION,
            org_identities: vec![OrgIdentityBody {
                version: API_VERSION,
                co_id: self.settings.co_id.to_string(),
            }],
        };

        let created = self
            .post_created("create org identity", "registry/org_identities.json", &body)
            .await?;
        let id = OrgIdentityId(new_object_id("create org identity", created).await?);
        info!(org_identity_id = %id, "org identity created");
        Ok(id)
    }

    /// Link a person to an organizational identity.
    #[instrument(skip_all, fields(person_id = %person_id, org_identity_id = %org_identity_id))]
    pub async fn link_person_to_org_identity(
        &self,
        person_id: &PersonId,
        org_identity_id: &OrgIdentityId,
    ) -> Result<()> {
        let body = CoOrgIdentityLinksRequest {
            request_type: "CoOrgIdentityLinks",
            version: API_VERSION,
            co_org_identity_links: vec![CoOrgIdentityLinkBody {
                version: API_VERSION,
                co_person_id: &person_id.0,
                org_identity_id: &org_identity_id.0,
            }],
        };

        self.post_created("link org identity", "registry/co_org_identity_links.json", &body)
            .await?;
        Ok(())
    }

    /// Attach an official primary name to an organizational identity.
    #[instrument(skip_all, fields(org_identity_id = %org_identity_id))]
    pub async fn attach_name(
        &self,
        first_name: &str,
        middle_name: &str,
        last_name: &str,
        org_identity_id: &OrgIdentityId,
    ) -> Result<()> {
        let body = NamesRequest {
            request_type: "Names",
            version: API_VERSION,
            names: vec![NameBody {
                version: API_VERSION,
                given: first_name,
                middle: middle_name,
                family: last_name,
                kind: TYPE_OFFICIAL,
                primary_name: true,
                person: PersonRef::org(&org_identity_id.0),
            }],
        };

        self.post_created("attach name", "registry/names.json", &body)
            .await?;
        Ok(())
    }

    /// Register the login identifier `<access_id>@<login_domain>` on an
    /// organizational identity.
    #[instrument(skip_all, fields(org_identity_id = %org_identity_id))]
    pub async fn attach_identifier(
        &self,
        access_id: &str,
        org_identity_id: &OrgIdentityId,
    ) -> Result<()> {
        let body = IdentifiersRequest {
            request_type: "Identifiers",
            version: API_VERSION,
            identifiers: vec![IdentifierBody {
                version: API_VERSION,
                kind: &self.settings.login_identifier_type,
                identifier: self.login_identifier(access_id),
                login: true,
                person: PersonRef::org(&org_identity_id.0),
                status: STATUS_ACTIVE,
            }],
        };

        self.post_created("attach identifier", "registry/identifiers.json", &body)
            .await?;
        Ok(())
    }

    /// Record that a person agreed to a terms-and-conditions document.
    #[instrument(skip_all, fields(terms_id = %terms_id, person_id = %person_id))]
    pub async fn record_terms_agreement(&self, terms_id: &TermsId, person_id: &PersonId) -> Result<()> {
        let body = TAndCAgreementsRequest {
            request_type: "CoTAndCAgreements",
            version: API_VERSION,
            co_t_and_c_agreements: vec![TAndCAgreementBody {
                version: API_VERSION,
                co_terms_and_conditions_id: &terms_id.0,
                person: PersonRef::co(&person_id.0),
            }],
        };

        self.post_created(
            "record terms agreement",
            "registry/co_t_and_c_agreements.json",
            &body,
        )
        .await?;
        Ok(())
    }

    /// The login identifier derived from an access id.
    pub fn login_identifier(&self, access_id: &str) -> String {
        format!("{access_id}@{}", self.settings.login_domain)
    }

    // -- plumbing -----------------------------------------------------------

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.settings
            .base_url
            .join(path)
            .map_err(|e| CoenrollError::config(format!("invalid endpoint path {path}: {e}")))
    }

    fn get(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self.authorize(self.http.get(self.endpoint(path)?)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a lookup. `204 No Content` and `404 Not Found` mean "nothing matched".
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| CoenrollError::Network(format!("{operation}: {e}")))?;

        let status = response.status();
        debug!(operation, %status, "registry lookup answered");

        match status {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = response.text().await.map_err(|e| {
                    CoenrollError::Network(format!("{operation}: failed to read body: {e}"))
                })?;
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| CoenrollError::parse(format!("{operation}: {e}")))
            }
            s => Err(CoenrollError::registry(operation, format!("HTTP {s}"))),
        }
    }

    /// POST a JSON body and require `201 Created`.
    async fn post_created<B: Serialize>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .authorize(self.http.post(self.endpoint(path)?))
            .json(body)
            .send()
            .await
            .map_err(|e| CoenrollError::Network(format!("{operation}: {e}")))?;

        let status = response.status();
        if status != CREATED {
            let detail = response.text().await.unwrap_or_default();
            warn!(operation, %status, body = %truncate(&detail, 200), "registry rejected request");
            return Err(CoenrollError::unexpected_status(
                operation,
                CREATED.as_u16(),
                status.as_u16(),
            ));
        }

        debug!(operation, "registry created object");
        Ok(response)
    }
}

/// Parse the id out of a v1 `NewObject` response.
async fn new_object_id(operation: &'static str, response: reqwest::Response) -> Result<String> {
    let body = response
        .text()
        .await
        .map_err(|e| CoenrollError::Network(format!("{operation}: failed to read body: {e}")))?;

    serde_json::from_str::<NewObjectResponse>(&body)
        .map(|created| created.id)
        .map_err(|e| CoenrollError::parse(format!("{operation}: {e}")))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{basic_auth, body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/registry/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn client(server: &MockServer) -> RegistryClient {
        RegistryClient::new(RegistrySettings {
            base_url: coenroll_shared::base_url(&server.uri()).unwrap(),
            co_id: 2,
            username: "co_2.enroller".into(),
            password: "hunter2".into(),
            group_ids: vec![11],
            cou_id: None,
            affiliation: "member".into(),
            identifier_type: "accessid".into(),
            login_identifier_type: "eppn".into(),
            login_domain: "access-ci.org".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn jane() -> UserRecord {
        UserRecord::from_line("Jane,Q,Doe,Example University,jane@example.edu").unwrap()
    }

    #[tokio::test]
    async fn finds_person_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/co_people.json"))
            .and(query_param("coid", "2"))
            .and(query_param("search.mail", "jane@example.edu"))
            .and(basic_auth("co_2.enroller", "hunter2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("co_people.json")))
            .mount(&server)
            .await;

        let person = client(&server)
            .find_person_by_email("jane@example.edu")
            .await
            .unwrap();
        assert_eq!(person, Some(PersonId("123".into())));
    }

    #[tokio::test]
    async fn no_content_means_no_person() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/co_people.json"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let person = client(&server)
            .find_person_by_email("nobody@example.edu")
            .await
            .unwrap();
        assert_eq!(person, None);
    }

    #[tokio::test]
    async fn access_id_filters_by_identifier_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/identifiers.json"))
            .and(query_param("copersonid", "123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("identifiers.json")))
            .mount(&server)
            .await;

        let access_id = client(&server)
            .find_access_id_by_person_id(&PersonId("123".into()))
            .await
            .unwrap();
        assert_eq!(access_id.as_deref(), Some("jdoe"));
    }

    #[tokio::test]
    async fn access_id_by_email_stops_when_person_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/co_people.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/registry/identifiers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("identifiers.json")))
            .expect(0)
            .mount(&server)
            .await;

        let access_id = client(&server)
            .find_access_id_by_email("nobody@example.edu")
            .await
            .unwrap();
        assert_eq!(access_id, None);
    }

    #[tokio::test]
    async fn lookup_server_error_is_registry_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .find_person_by_email("jane@example.edu")
            .await
            .unwrap_err();
        assert!(matches!(err, CoenrollError::Registry { .. }));
    }

    #[tokio::test]
    async fn unparsable_lookup_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .find_person_by_email("jane@example.edu")
            .await
            .unwrap_err();
        assert!(matches!(err, CoenrollError::Parse { .. }));
    }

    #[tokio::test]
    async fn create_person_sends_core_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/api/co/2/core/v1/people"))
            .and(body_partial_json(serde_json::json!({
                "CoPerson": {"co_id": "2", "status": "A"},
                "CoGroupMember": [{"co_group_id": "11", "member": true, "owner": false}],
                "CoPersonRole": [{"affiliation": "member", "o": "Example University", "status": "A"}],
                "EmailAddress": [{"mail": "jane@example.edu", "type": "official", "verified": true}],
                "Name": [{"given": "Jane", "middle": "Q", "family": "Doe", "type": "official", "primary_name": true}]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).create_person(&jane()).await.unwrap();
    }

    #[tokio::test]
    async fn create_person_rejects_non_created_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client(&server).create_person(&jane()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "registry error during create person: expected HTTP 201, got HTTP 200"
        );
    }

    #[tokio::test]
    async fn create_org_identity_returns_new_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/org_identities.json"))
            .and(body_partial_json(serde_json::json!({
                "RequestType": "OrgIdentities",
                "OrgIdentities": [{"Version": "1.0", "CoId": "2"}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_string(fixture("new_org_identity.json")))
            .mount(&server)
            .await;

        let id = client(&server).create_org_identity().await.unwrap();
        assert_eq!(id, OrgIdentityId("456".into()));
    }

    #[tokio::test]
    async fn link_sends_person_and_org_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/co_org_identity_links.json"))
            .and(basic_auth("co_2.enroller", "hunter2"))
            .and(body_partial_json(serde_json::json!({
                "RequestType": "CoOrgIdentityLinks",
                "Version": "1.0",
                "CoOrgIdentityLinks": [{
                    "Version": "1.0",
                    "CoPersonId": "123",
                    "OrgIdentityId": "456"
                }]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .link_person_to_org_identity(&PersonId("123".into()), &OrgIdentityId("456".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn attach_name_sends_official_primary_name_on_org_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/names.json"))
            .and(body_partial_json(serde_json::json!({
                "RequestType": "Names",
                "Names": [{
                    "Given": "Jane",
                    "Middle": "Q",
                    "Family": "Doe",
                    "Type": "official",
                    "PrimaryName": true,
                    "Person": {"Type": "Org", "Id": "456"}
                }]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .attach_name("Jane", "Q", "Doe", &OrgIdentityId("456".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn attach_identifier_appends_login_domain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/identifiers.json"))
            .and(body_partial_json(serde_json::json!({
                "Identifiers": [{
                    "Type": "eppn",
                    "Identifier": "jdoe@access-ci.org",
                    "Login": true,
                    "Person": {"Type": "Org", "Id": "456"},
                    "Status": "Active"
                }]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .attach_identifier("jdoe", &OrgIdentityId("456".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn active_terms_skips_inactive_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/co_terms_and_conditions.json"))
            .and(query_param("coid", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(fixture("terms_and_conditions.json")),
            )
            .mount(&server)
            .await;

        let terms = client(&server).active_terms_and_conditions().await.unwrap();
        assert_eq!(terms, Some(TermsId("3".into())));
    }

    #[tokio::test]
    async fn no_active_terms_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/co_terms_and_conditions.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"CoTermsAndConditions":[{"Id":"1","Status":"Suspended"}]}"#,
            ))
            .mount(&server)
            .await;

        let terms = client(&server).active_terms_and_conditions().await.unwrap();
        assert_eq!(terms, None);
    }

    #[tokio::test]
    async fn record_terms_agreement_posts_agreement() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registry/co_t_and_c_agreements.json"))
            .and(body_partial_json(serde_json::json!({
                "CoTAndCAgreements": [{
                    "CoTermsAndConditionsId": "3",
                    "Person": {"Type": "CO", "Id": "123"}
                }]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .record_terms_agreement(&TermsId("3".into()), &PersonId("123".into()))
            .await
            .unwrap();
    }

    #[test]
    fn debug_output_hides_password() {
        let client = RegistryClient::new(RegistrySettings {
            base_url: coenroll_shared::base_url("registry.example.org").unwrap(),
            co_id: 2,
            username: "user".into(),
            password: "hunter2".into(),
            group_ids: vec![],
            cou_id: None,
            affiliation: "member".into(),
            identifier_type: "accessid".into(),
            login_identifier_type: "eppn".into(),
            login_domain: "access-ci.org".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
