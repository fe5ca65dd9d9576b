//! Authorization decision engine.
//!
//! The rules answer with a document mapping denial categories to reason
//! strings, e.g.
//!
//! ```json
//! {"cant_change_username": ["too_recent"], "cant_change_dob": []}
//! ```
//!
//! Each tracked capability looks up its category. An absent or empty
//! category means the capability is allowed; the rules must deny explicitly.

use super::PolicyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Query address of the settings-permission rules.
pub const SETTINGS_PERMISSIONS_QUERY: &str = "data.users.settings.permissions";

/// A user action with its own allow/deny decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ModifyOwnProfile,
    ChangeUsername,
    ChangeDateOfBirth,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::ModifyOwnProfile,
        Capability::ChangeUsername,
        Capability::ChangeDateOfBirth,
    ];

    /// Key of this capability's entry in the rules' denial document.
    pub fn denial_key(&self) -> &'static str {
        match self {
            Capability::ModifyOwnProfile => "not_allowed_change_settings",
            Capability::ChangeUsername => "cant_change_username",
            Capability::ChangeDateOfBirth => "cant_change_dob",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ModifyOwnProfile => "modify_own_profile",
            Capability::ChangeUsername => "change_username",
            Capability::ChangeDateOfBirth => "change_date_of_birth",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Allow/deny for one capability.
///
/// `allowed` is derived from `reasons`: a decision is allowed exactly when
/// it carries no denial reasons. The fields cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDecision")]
pub struct PermissionDecision {
    allowed: bool,
    reasons: Vec<String>,
}

impl PermissionDecision {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
        }
    }

    pub fn allow() -> Self {
        Self::from_reasons(Vec::new())
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

#[derive(Deserialize)]
struct RawDecision {
    allowed: bool,
    #[serde(default)]
    reasons: Vec<String>,
}

impl TryFrom<RawDecision> for PermissionDecision {
    type Error = String;

    fn try_from(raw: RawDecision) -> Result<Self, Self::Error> {
        if raw.allowed != raw.reasons.is_empty() {
            return Err(format!(
                "allowed={} is inconsistent with {} reason(s)",
                raw.allowed,
                raw.reasons.len()
            ));
        }
        Ok(Self::from_reasons(raw.reasons))
    }
}

/// Decisions for every tracked capability, serialized as a JSON object
/// keyed by capability name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsPermissions(BTreeMap<Capability, PermissionDecision>);

impl SettingsPermissions {
    pub fn decision(&self, capability: Capability) -> Option<&PermissionDecision> {
        self.0.get(&capability)
    }

    pub fn is_allowed(&self, capability: Capability) -> bool {
        self.decision(capability).is_some_and(|d| d.allowed())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Capability, &PermissionDecision)> {
        self.0.iter()
    }

    /// Build decisions from the rules' denial document. Categories the
    /// document does not mention are allowed.
    pub fn from_denials(denials: &BTreeMap<String, Vec<String>>) -> Self {
        let decisions = Capability::ALL
            .iter()
            .map(|capability| {
                let reasons = denials
                    .get(capability.denial_key())
                    .cloned()
                    .unwrap_or_default();
                (*capability, PermissionDecision::from_reasons(reasons))
            })
            .collect();
        Self(decisions)
    }
}

/// One result set returned by a rule evaluation: the values of the query's
/// expressions, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub expressions: Vec<serde_json::Value>,
}

/// A compiled rule set that can be queried with an input document.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate(&self, input: serde_json::Value) -> Result<Vec<ResultSet>, PolicyError>;
}

/// Evaluates authorization input into [`SettingsPermissions`].
pub struct DecisionEngine {
    evaluator: Arc<dyn RuleEvaluator>,
    span: tracing::Span,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine").finish_non_exhaustive()
    }
}

impl DecisionEngine {
    pub fn new(evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self {
            evaluator,
            span: tracing::info_span!("decision_engine"),
        }
    }

    /// Evaluate a raw JSON request body.
    pub async fn evaluate(
        &self,
        input: &[u8],
        deadline: Instant,
    ) -> Result<SettingsPermissions, PolicyError> {
        let input: serde_json::Value = serde_json::from_slice(input)
            .map_err(|e| PolicyError::InvalidInput(format!("unable to parse input: {}", e)))?;
        self.evaluate_value(input, deadline).await
    }

    /// Evaluate an already-parsed input document.
    pub async fn evaluate_value(
        &self,
        input: serde_json::Value,
        deadline: Instant,
    ) -> Result<SettingsPermissions, PolicyError> {
        self.run(input, deadline)
            .instrument(self.span.clone())
            .await
    }

    async fn run(
        &self,
        input: serde_json::Value,
        deadline: Instant,
    ) -> Result<SettingsPermissions, PolicyError> {
        let results = match tokio::time::timeout_at(deadline, self.evaluator.evaluate(input)).await
        {
            Ok(results) => results?,
            Err(_) => {
                tracing::warn!(action = "evaluation_timeout", "Policy evaluation exceeded its deadline");
                return Err(PolicyError::Evaluation("deadline exceeded".to_string()));
            }
        };

        let denials = denials_from_results(results)?;
        let permissions = SettingsPermissions::from_denials(&denials);

        tracing::debug!(
            denied = permissions.iter().filter(|(_, d)| !d.allowed()).count(),
            "Settings permissions evaluated"
        );
        Ok(permissions)
    }
}

/// Extract the denial document from the first expression of the first
/// result set. Anything other than an object of string arrays is rejected.
fn denials_from_results(
    results: Vec<ResultSet>,
) -> Result<BTreeMap<String, Vec<String>>, PolicyError> {
    let first = results
        .into_iter()
        .next()
        .ok_or_else(|| PolicyError::Evaluation("no results set".to_string()))?;

    let expression = first
        .expressions
        .into_iter()
        .next()
        .ok_or_else(|| PolicyError::Evaluation("no expressions found".to_string()))?;

    serde_json::from_value(expression).map_err(|e| {
        tracing::error!(error = %e, "Rules returned a malformed denial document");
        PolicyError::Evaluation(format!("malformed rule output: {}", e))
    })
}
