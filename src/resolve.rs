//! Reference resolution: follow a reference field on one resource to the
//! resource it points at.

use std::collections::HashMap;
use std::fmt;

use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::api::{ApiError, FetchOptions, FhirClient, SearchQuery};
use crate::models::{PatientPayor, PayorDetails};

/// Where an Account keeps its payor reference.
pub const GUARANTOR_PATH: &str = "guarantor.party.reference";

const ACCOUNT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{resource} has no reference at '{path}'")]
    MissingReference { resource: String, path: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A `Type/id` pointer to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub resource_type: String,
    pub id: String,
}

impl Reference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse a FHIR reference string.
    ///
    /// Accepts relative (`Organization/123`) and absolute URLs, and drops any
    /// `_history/<version>` suffix. Contained (`#x`) and bare-ID strings are
    /// not references.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.split(['?', '#']).next()?;
        let mut segments: Vec<&str> = s.split('/').filter(|seg| !seg.is_empty()).collect();
        if let Some(pos) = segments.iter().position(|seg| *seg == "_history") {
            segments.truncate(pos);
        }

        let [.., resource_type, id] = segments.as_slice() else {
            return None;
        };
        if !resource_type.starts_with(|c: char| c.is_ascii_uppercase()) {
            return None;
        }

        Some(Reference::new(*resource_type, *id))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Human label for a resource in error messages, e.g. `Account/acc-1`.
fn describe_resource(resource: &Value) -> String {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or("resource");
    match resource.get("id").and_then(Value::as_str) {
        Some(id) => format!("{}/{}", resource_type, id),
        None => resource_type.to_string(),
    }
}

/// Collect every string found at a dotted `path`, walking arrays along the way.
fn values_at<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a str>) {
    match value {
        Value::Array(items) => {
            for item in items {
                values_at(item, path, out);
            }
        }
        _ => match path.split_first() {
            None => {
                if let Some(s) = value.as_str() {
                    out.push(s);
                }
            }
            Some((field, rest)) => {
                if let Some(child) = value.get(*field) {
                    values_at(child, rest, out);
                }
            }
        },
    }
}

/// Extract the references at `path` on `resource`.
///
/// Fails with `MissingReference` when the path holds no parseable reference.
pub fn references_at(resource: &Value, path: &str) -> Result<Vec<Reference>, ResolveError> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut raw = Vec::new();
    values_at(resource, &segments, &mut raw);

    let references: Vec<Reference> = raw.into_iter().filter_map(Reference::parse).collect();
    if references.is_empty() {
        return Err(ResolveError::MissingReference {
            resource: describe_resource(resource),
            path: path.to_string(),
        });
    }
    Ok(references)
}

/// Fetches referenced resources, each at most once.
pub struct Resolver<'a> {
    client: &'a mut FhirClient,
    resolved: HashMap<Reference, Value>,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a mut FhirClient) -> Self {
        Self {
            client,
            resolved: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, reference: &Reference) -> Result<&Value, ResolveError> {
        if !self.resolved.contains_key(reference) {
            debug!("Resolving {}", reference);
            let resource = self.client.read(&reference.resource_type, &reference.id)?;
            self.resolved.insert(reference.clone(), resource);
        } else {
            debug!("Already resolved {}", reference);
        }
        Ok(&self.resolved[reference])
    }

    /// Number of distinct references fetched so far.
    pub fn fetched(&self) -> usize {
        self.resolved.len()
    }
}

/// Patient -> Account (by subject) -> guarantor -> Organization.
pub fn find_patient_payor(
    client: &mut FhirClient,
    patient_id: &str,
) -> Result<PatientPayor, ResolveError> {
    let query = SearchQuery::new().with("subject", format!("Patient/{}", patient_id));
    let options = FetchOptions {
        page_size: ACCOUNT_PAGE_SIZE,
        max_pages: Some(1),
        active_default: None,
    };
    let accounts = client.search("Account", &query, &options)?;
    debug!("Patient {} has {} account(s)", patient_id, accounts.len());

    let mut payor_ids: Vec<String> = Vec::new();
    for account in &accounts.entries {
        for reference in references_at(account, GUARANTOR_PATH)? {
            if reference.resource_type == "Organization" && !payor_ids.contains(&reference.id) {
                payor_ids.push(reference.id);
            }
        }
    }

    let mut resolver = Resolver::new(client);
    let mut payor_details = Vec::with_capacity(payor_ids.len());
    for id in &payor_ids {
        let org = resolver.resolve(&Reference::new("Organization", id.as_str()))?;
        payor_details.push(PayorDetails::from_organization(org));
    }
    debug!("Resolved {} payor organization(s)", resolver.fetched());

    Ok(PatientPayor {
        patient_id: patient_id.to_string(),
        payor_ids,
        payor_details,
    })
}
