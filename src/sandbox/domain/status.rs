//! Status snapshots returned by single and batched status queries.

use super::{SandboxId, SandboxState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Last observed status of one sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatusResult {
    sandbox_id: SandboxId,
    state: SandboxState,
    last_observed_at: DateTime<Utc>,
    detail: Option<String>,
}

impl SandboxStatusResult {
    /// Creates a status snapshot.
    #[must_use]
    pub const fn new(
        sandbox_id: SandboxId,
        state: SandboxState,
        last_observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sandbox_id,
            state,
            last_observed_at,
            detail: None,
        }
    }

    /// Creates a `NotFound` snapshot.
    #[must_use]
    pub const fn not_found(sandbox_id: SandboxId, observed_at: DateTime<Utc>) -> Self {
        Self::new(sandbox_id, SandboxState::NotFound, observed_at)
    }

    /// Creates an `Unhealthy` snapshot describing why the status is unknown.
    #[must_use]
    pub fn unhealthy(
        sandbox_id: SandboxId,
        observed_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(sandbox_id, SandboxState::Unhealthy, observed_at).with_detail(detail)
    }

    /// Creates the snapshot reported when a status query exceeds its budget.
    #[must_use]
    pub fn timed_out(sandbox_id: SandboxId, observed_at: DateTime<Utc>, budget: Duration) -> Self {
        let detail = format!("status query timed out after {}ms", budget.as_millis());
        Self::unhealthy(sandbox_id, observed_at, detail)
    }

    /// Adds an explanatory detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let normalized = detail.into().trim().to_owned();
        if !normalized.is_empty() {
            self.detail = Some(normalized);
        }
        self
    }

    /// Returns the sandbox identifier.
    #[must_use]
    pub const fn sandbox_id(&self) -> &SandboxId {
        &self.sandbox_id
    }

    /// Returns the observed state.
    #[must_use]
    pub const fn state(&self) -> SandboxState {
        self.state
    }

    /// Returns when the state was observed.
    #[must_use]
    pub const fn last_observed_at(&self) -> DateTime<Utc> {
        self.last_observed_at
    }

    /// Returns an optional detail message.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

/// Outcome of a batched status query.
///
/// Every requested identifier appears exactly once, either in `results` or in
/// `failed_ids`. A `NotFound` state is a result, not a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResult {
    results: HashMap<SandboxId, SandboxStatusResult>,
    failed_ids: HashSet<SandboxId>,
}

impl BatchStatusResult {
    /// Creates an empty batch result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resolved status, clearing any failure entry for the id.
    pub fn insert(&mut self, result: SandboxStatusResult) {
        self.failed_ids.remove(result.sandbox_id());
        self.results.insert(result.sandbox_id().clone(), result);
    }

    /// Records an id whose status could not be resolved.
    pub fn mark_failed(&mut self, sandbox_id: SandboxId) {
        self.results.remove(&sandbox_id);
        self.failed_ids.insert(sandbox_id);
    }

    /// Returns the resolved status for an id, if any.
    #[must_use]
    pub fn get(&self, sandbox_id: &SandboxId) -> Option<&SandboxStatusResult> {
        self.results.get(sandbox_id)
    }

    /// Returns all resolved statuses keyed by sandbox id.
    #[must_use]
    pub const fn results(&self) -> &HashMap<SandboxId, SandboxStatusResult> {
        &self.results
    }

    /// Returns the ids whose status could not be resolved.
    #[must_use]
    pub const fn failed_ids(&self) -> &HashSet<SandboxId> {
        &self.failed_ids
    }

    /// Returns `true` when the id could not be resolved.
    #[must_use]
    pub fn is_failed(&self, sandbox_id: &SandboxId) -> bool {
        self.failed_ids.contains(sandbox_id)
    }

    /// Returns the number of ids accounted for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len() + self.failed_ids.len()
    }

    /// Returns `true` when no ids are accounted for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failed_ids.is_empty()
    }

    /// Returns `true` when every id in `requested` has an entry.
    #[must_use]
    pub fn covers<'a>(&self, requested: impl IntoIterator<Item = &'a SandboxId>) -> bool {
        requested
            .into_iter()
            .all(|id| self.results.contains_key(id) || self.failed_ids.contains(id))
    }

    /// Merges another batch result into this one.
    pub fn merge(&mut self, other: Self) {
        for result in other.results.into_values() {
            self.insert(result);
        }
        for sandbox_id in other.failed_ids {
            self.mark_failed(sandbox_id);
        }
    }
}
