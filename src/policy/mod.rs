//! Settings-permission decisions.
//!
//! A directory of Rego rules is compiled once at startup by
//! [`bundle::load_bundle`] into an immutable [`RegoEvaluator`]. The
//! [`DecisionEngine`] feeds caller input through it and turns the rules'
//! denial-reason document into one typed [`PermissionDecision`] per
//! [`Capability`].

pub mod bundle;
pub mod engine;
pub mod input;

pub use bundle::{load_bundle, BundleError, RegoEvaluator};
pub use engine::{
    Capability, DecisionEngine, PermissionDecision, ResultSet, RuleEvaluator,
    SettingsPermissions, SETTINGS_PERMISSIONS_QUERY,
};
pub use input::{SettingsPermissionQuery, UpdateChange, UpdateHistory};

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The caller's input could not be parsed. Client fault.
    #[error("Invalid authorization input: {0}")]
    InvalidInput(String),

    /// The rule engine failed or produced output of the wrong shape.
    /// Indicates a broken deployment, not a bad request.
    #[error("Policy evaluation failed: {0}")]
    Evaluation(String),
}
