//! Lookup-or-create enrollment of a single user.
//!
//! ```text
//! LookupExisting ─ found ──────────────────────────────────────────────► Done
//!        └─ not found ► CreatePerson ► ResolveIds ► CreateOrgIdentity
//!                       ► LinkIdentity ► AttachName ► AttachIdentifier
//!                       ► RecordAgreement (only with active terms) ► Done
//! ```
//!
//! Steps run strictly in order and none is retried. A failure after
//! `CreatePerson` leaves the person in the registry without the remaining
//! records; nothing is rolled back. Re-running the same row later takes the
//! `found` branch only if the access id exists. A person left without one is
//! not found by the lookup, so a re-run creates the person again.

use std::fmt;

use coenroll_registry::{PersonId, RegistryClient, TermsId};
use coenroll_shared::{CoenrollError, EnrollmentResult, Result, UserRecord};
use tracing::{debug, info, instrument, warn};

/// One step of the enrollment sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollStep {
    LookupExisting,
    CreatePerson,
    ResolveIds,
    CreateOrgIdentity,
    LinkIdentity,
    AttachName,
    AttachIdentifier,
    RecordAgreement,
}

impl fmt::Display for EnrollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LookupExisting => "lookup existing",
            Self::CreatePerson => "create person",
            Self::ResolveIds => "resolve ids",
            Self::CreateOrgIdentity => "create org identity",
            Self::LinkIdentity => "link identity",
            Self::AttachName => "attach name",
            Self::AttachIdentifier => "attach identifier",
            Self::RecordAgreement => "record agreement",
        };
        f.write_str(name)
    }
}

/// How a user ended up with their access id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// The registry already knew this email; nothing was written.
    Existing(EnrollmentResult),
    /// A new person was created.
    Created(EnrollmentResult),
}

impl EnrollOutcome {
    pub fn result(&self) -> &EnrollmentResult {
        match self {
            Self::Existing(result) | Self::Created(result) => result,
        }
    }

    pub fn into_result(self) -> EnrollmentResult {
        match self {
            Self::Existing(result) | Self::Created(result) => result,
        }
    }
}

/// Runs the enrollment sequence against one registry.
///
/// The active terms-and-conditions id is resolved once when the enroller is
/// prepared and reused for every user.
#[derive(Debug)]
pub struct Enroller<'a> {
    registry: &'a RegistryClient,
    terms: Option<TermsId>,
}

impl<'a> Enroller<'a> {
    /// Look up the active terms and conditions and build an enroller.
    ///
    /// No active terms is not an error: agreements are simply not recorded.
    pub async fn prepare(registry: &'a RegistryClient) -> Result<Self> {
        let terms = registry.active_terms_and_conditions().await?;
        match &terms {
            Some(id) => info!(terms_id = %id, "active terms and conditions found"),
            None => warn!("no active terms and conditions; agreements will not be recorded"),
        }
        Ok(Self::new(registry, terms))
    }

    pub fn new(registry: &'a RegistryClient, terms: Option<TermsId>) -> Self {
        Self { registry, terms }
    }

    pub fn terms(&self) -> Option<&TermsId> {
        self.terms.as_ref()
    }

    /// Return the user's existing access id, or enroll them and return the new one.
    #[instrument(skip_all, fields(email = %record.email))]
    pub async fn enroll(&self, record: &UserRecord) -> Result<EnrollOutcome> {
        debug!(step = %EnrollStep::LookupExisting, "enrollment step");
        if let Some(access_id) = self.registry.find_access_id_by_email(&record.email).await? {
            info!(%access_id, "user already enrolled");
            return Ok(EnrollOutcome::Existing(EnrollmentResult {
                record: record.clone(),
                access_id,
            }));
        }

        debug!(step = %EnrollStep::CreatePerson, "enrollment step");
        self.registry.create_person(record).await?;

        let result = self.finish_enrollment(record).await;
        match &result {
            Ok(access_id) => info!(%access_id, "user enrolled"),
            Err(e) => warn!(
                error = %e,
                "enrollment stopped after the person was created; the registry holds a partial record"
            ),
        }

        Ok(EnrollOutcome::Created(EnrollmentResult {
            record: record.clone(),
            access_id: result?,
        }))
    }

    /// Everything after `CreatePerson`. Returns the newly issued access id.
    async fn finish_enrollment(&self, record: &UserRecord) -> Result<String> {
        debug!(step = %EnrollStep::ResolveIds, "enrollment step");
        let (person_id, access_id) = self.resolve_ids(&record.email).await?;

        debug!(step = %EnrollStep::CreateOrgIdentity, "enrollment step");
        let org_identity_id = self.registry.create_org_identity().await?;

        debug!(step = %EnrollStep::LinkIdentity, "enrollment step");
        self.registry
            .link_person_to_org_identity(&person_id, &org_identity_id)
            .await?;

        debug!(step = %EnrollStep::AttachName, "enrollment step");
        self.registry
            .attach_name(
                &record.first_name,
                &record.middle_name,
                &record.last_name,
                &org_identity_id,
            )
            .await?;

        debug!(step = %EnrollStep::AttachIdentifier, "enrollment step");
        self.registry
            .attach_identifier(&access_id, &org_identity_id)
            .await?;

        if let Some(terms_id) = &self.terms {
            debug!(step = %EnrollStep::RecordAgreement, "enrollment step");
            self.registry
                .record_terms_agreement(terms_id, &person_id)
                .await?;
        }

        Ok(access_id)
    }

    /// Re-query the person just created. Both ids must exist by now.
    async fn resolve_ids(&self, email: &str) -> Result<(PersonId, String)> {
        let person_id = self.registry.find_person_by_email(email).await?.ok_or_else(|| {
            CoenrollError::registry(
                "resolve ids",
                format!("person for {email} was created but cannot be found"),
            )
        })?;

        let access_id = self
            .registry
            .find_access_id_by_person_id(&person_id)
            .await?
            .ok_or_else(|| {
                CoenrollError::registry(
                    "resolve ids",
                    format!("person {person_id} has no access id after creation"),
                )
            })?;

        Ok((person_id, access_id))
    }
}
