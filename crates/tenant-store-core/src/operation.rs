// crates/tenant-store-core/src/operation.rs
// ============================================================================
// Module: Store Operations
// Description: Operation model and burst-detection signatures.
// Purpose: Describe operations issued through client handles.
// Dependencies: serde, serde_jcs, serde_json
// ============================================================================

//! ## Overview
//! An [`Operation`] names an entity (model), an [`ActionKind`], and a JSON
//! argument object. Burst detection groups operations by an
//! [`OperationSignature`] of `{model}.{action}-{filter}`, where `filter` is the
//! canonical JSON of the `where` argument. Projection, ordering, and paging
//! arguments do not participate in the signature.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::InstrumentationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Argument key holding the operation filter.
pub const FILTER_ARGUMENT: &str = "where";
/// Maximum serialized filter size accepted into a signature.
pub const MAX_FILTER_BYTES: usize = 16 * 1024;

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Operation action kinds understood by client handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    /// Lookup by unique key.
    FindUnique,
    /// Lookup by unique key, failing when absent.
    FindUniqueOrThrow,
    /// Lookup of the first match.
    FindFirst,
    /// Lookup of the first match, failing when absent.
    FindFirstOrThrow,
    /// Lookup of every match.
    FindMany,
    /// Insert one record.
    Create,
    /// Insert many records.
    CreateMany,
    /// Update one record.
    Update,
    /// Update many records.
    UpdateMany,
    /// Insert or update one record.
    Upsert,
    /// Delete one record.
    Delete,
    /// Delete many records.
    DeleteMany,
    /// Count matches.
    Count,
    /// Aggregate matches.
    Aggregate,
    /// Group matches.
    GroupBy,
    /// Raw statement returning an affected-row count.
    ExecuteRaw,
    /// Raw query returning rows.
    QueryRaw,
}

impl ActionKind {
    /// Returns the stable label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FindUnique => "findUnique",
            Self::FindUniqueOrThrow => "findUniqueOrThrow",
            Self::FindFirst => "findFirst",
            Self::FindFirstOrThrow => "findFirstOrThrow",
            Self::FindMany => "findMany",
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "groupBy",
            Self::ExecuteRaw => "executeRaw",
            Self::QueryRaw => "queryRaw",
        }
    }

    /// Returns true for the read-set observed by burst detection.
    #[must_use]
    pub const fn is_instrumented_read(self) -> bool {
        matches!(self, Self::FindUnique | Self::FindFirst | Self::FindMany)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Operation issued through a client handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Entity (model) name.
    pub model: String,
    /// Action kind.
    pub action: ActionKind,
    /// Action arguments (`where`, `select`, `data`, ...).
    #[serde(default)]
    pub args: Value,
}

impl Operation {
    /// Creates a new operation.
    #[must_use]
    pub fn new(model: impl Into<String>, action: ActionKind, args: Value) -> Self {
        Self {
            model: model.into(),
            action,
            args,
        }
    }

    /// Returns the `where` argument when present.
    #[must_use]
    pub fn filter(&self) -> Option<&Value> {
        self.args.get(FILTER_ARGUMENT)
    }

    /// Builds the burst-detection signature for this operation.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentationError::Signature`] when the filter cannot be
    /// canonicalized or exceeds [`MAX_FILTER_BYTES`].
    pub fn signature(&self) -> Result<OperationSignature, InstrumentationError> {
        let filter = serde_jcs::to_string(self.filter().unwrap_or(&Value::Null))
            .map_err(|err| InstrumentationError::Signature(err.to_string()))?;
        if filter.len() > MAX_FILTER_BYTES {
            return Err(InstrumentationError::Signature(format!(
                "filter exceeds {MAX_FILTER_BYTES} bytes"
            )));
        }
        Ok(OperationSignature {
            key: format!("{}.{}-{}", self.model, self.action.as_str(), filter),
            model: self.model.clone(),
            action: self.action,
            filter,
        })
    }
}

/// Burst-detection grouping key and its components.
///
/// # Invariants
/// - `key` is `{model}.{action}-{filter}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationSignature {
    /// Grouping key.
    key: String,
    /// Entity (model) name.
    model: String,
    /// Action kind.
    action: ActionKind,
    /// Canonical JSON of the filter.
    filter: String,
}

impl OperationSignature {
    /// Returns the grouping key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Returns the entity name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the action kind.
    #[must_use]
    pub const fn action(&self) -> ActionKind {
        self.action
    }

    /// Returns the canonical filter JSON.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

impl fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ActionKind;
    use super::MAX_FILTER_BYTES;
    use super::Operation;
    use crate::error::InstrumentationError;

    #[test]
    fn signature_uses_model_action_and_filter() {
        let op = Operation::new("User", ActionKind::FindUnique, json!({"where": {"id": "1"}}));
        let signature = op.signature().ok();
        assert_eq!(
            signature.as_ref().map(super::OperationSignature::as_str),
            Some(r#"User.findUnique-{"id":"1"}"#)
        );
    }

    #[test]
    fn signature_ignores_projection() {
        let plain = Operation::new("User", ActionKind::FindMany, json!({"where": {"org": 7}}));
        let projected = Operation::new(
            "User",
            ActionKind::FindMany,
            json!({"where": {"org": 7}, "select": {"email": true}, "orderBy": {"id": "asc"}}),
        );
        assert_eq!(plain.signature().ok(), projected.signature().ok());
    }

    #[test]
    fn signature_is_key_order_independent() {
        let left = Operation::new("Post", ActionKind::FindFirst, json!({"where": {"a": 1, "b": 2}}));
        let right = Operation::new("Post", ActionKind::FindFirst, json!({"where": {"b": 2, "a": 1}}));
        assert_eq!(left.signature().ok(), right.signature().ok());
    }

    #[test]
    fn missing_filter_serializes_as_null() {
        let op = Operation::new("Post", ActionKind::FindMany, json!({}));
        let key = op.signature().map(|sig| sig.as_str().to_string()).ok();
        assert_eq!(key.as_deref(), Some("Post.findMany-null"));
    }

    #[test]
    fn oversized_filter_is_an_instrumentation_error() {
        let op = Operation::new(
            "Post",
            ActionKind::FindMany,
            json!({"where": {"body": "x".repeat(MAX_FILTER_BYTES)}}),
        );
        assert!(matches!(op.signature(), Err(InstrumentationError::Signature(_))));
    }

    #[test]
    fn read_set_is_exactly_three_actions() {
        let reads: Vec<ActionKind> = [
            ActionKind::FindUnique,
            ActionKind::FindUniqueOrThrow,
            ActionKind::FindFirst,
            ActionKind::FindFirstOrThrow,
            ActionKind::FindMany,
            ActionKind::Create,
            ActionKind::Update,
            ActionKind::Count,
            ActionKind::QueryRaw,
        ]
        .into_iter()
        .filter(|action| action.is_instrumented_read())
        .collect();
        assert_eq!(reads, vec![ActionKind::FindUnique, ActionKind::FindFirst, ActionKind::FindMany]);
    }
}
