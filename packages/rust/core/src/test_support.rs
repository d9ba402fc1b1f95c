//! Mock registry wiring shared by the workflow and pipeline tests.

use coenroll_registry::RegistryClient;
use coenroll_shared::{RegistrySettings, UserRecord};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) fn fixture(name: &str) -> String {
    let path = format!("../../../fixtures/{name}");
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
}

pub(crate) fn registry(server: &MockServer) -> RegistryClient {
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

pub(crate) fn jane() -> UserRecord {
    UserRecord::from_line("Jane,,Doe,Example University,jane@example.edu").unwrap()
}

/// Every lookup finds person 123 with access id `jdoe`.
pub(crate) async fn mount_existing_person(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/registry/co_people.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(fixture("registry/co_people.json")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/registry/identifiers.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(fixture("registry/identifiers.json")))
        .mount(server)
        .await;
}

/// The first person search finds nobody; the person is then created once and
/// every later search finds person 123 with access id `jdoe`.
pub(crate) async fn mount_created_person(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/registry/co_people.json"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/registry/api/co/2/core/v1/people"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
    mount_existing_person(server).await;
}

/// Org identity, link, name and identifier creation all succeed once; the
/// terms agreement is expected `agreements` times.
pub(crate) async fn mount_creation_steps(server: &MockServer, agreements: u64) {
    Mock::given(method("POST"))
        .and(path("/registry/org_identities.json"))
        .respond_with(
            ResponseTemplate::new(201).set_body_string(fixture("registry/new_org_identity.json")),
        )
        .expect(1)
        .mount(server)
        .await;

    for endpoint in [
        "/registry/co_org_identity_links.json",
        "/registry/names.json",
        "/registry/identifiers.json",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/registry/co_t_and_c_agreements.json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(agreements)
        .mount(server)
        .await;
}

/// `METHOD /path` for every request the mock server saw, in arrival order.
pub(crate) async fn request_log(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| format!("{} {}", request.method, request.url.path()))
        .collect()
}
