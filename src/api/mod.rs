pub mod applications;
pub mod attendance;
pub mod connections;
pub mod interviews;
pub mod jobs;
pub mod leave_request;
pub mod loan_request;
pub mod notices;
pub mod users;
pub mod vendor_projects;

#[cfg(test)]
pub(crate) mod test_support;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::Lifecycle;
use crate::lifecycle::workflow::{StatusChange, set_status_with};
use crate::store::{Collection, Document, Guard, RecordStore, UpdateOutcome, from_document};
use crate::utils::patch::{FieldSpec, build_patch};

/// Body of the `/{id}/status` routes.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdate {
    #[schema(example = "shortlisted")]
    pub status: String,
    /// Skip the transition table. Admins only.
    #[serde(default)]
    pub force: bool,
}

/// Loads one record or answers 404 with "`label` not found".
pub(crate) async fn load<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    id: &str,
    label: &str,
) -> AppResult<T> {
    let doc = store
        .get(collection, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{label} not found")))?;
    Ok(from_document(doc)?)
}

/// Maps an update outcome onto the usual 404/409 replies.
pub(crate) fn updated(outcome: UpdateOutcome, label: &str) -> AppResult<Document> {
    match outcome {
        UpdateOutcome::Updated(doc) => Ok(doc),
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("{label} not found"))),
        UpdateOutcome::GuardFailed => Err(AppError::Conflict(format!(
            "{label} was changed by someone else; reload and try again"
        ))),
    }
}

/// Deletes by id; missing ids are a 404, not a silent success.
pub(crate) async fn delete_one(
    store: &dyn RecordStore,
    collection: Collection,
    id: &str,
    label: &str,
) -> AppResult<()> {
    if store.delete(collection, id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{label} not found")))
    }
}

/// Partial update that may also carry a `status`. Fields are validated up
/// front and written together with the status in one guarded update.
/// Without a status change the write is guarded by `guard`, if any.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn update_with_status<S: Lifecycle>(
    store: &dyn RecordStore,
    collection: Collection,
    label: &'static str,
    id: &str,
    payload: &Value,
    fields: &[FieldSpec],
    actor: &AuthUser,
    guard: Option<Guard>,
) -> AppResult<Document> {
    let mut body = payload
        .as_object()
        .cloned()
        .ok_or_else(|| AppError::validation("Payload must be a JSON object"))?;

    let status = match body.remove("status") {
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(AppError::validation("Field 'status' must be a string")),
        None => None,
    };
    let force = match body.remove("force") {
        Some(Value::Bool(b)) => b,
        Some(_) => return Err(AppError::validation("Field 'force' must be true or false")),
        None => false,
    };

    let patch = if body.is_empty() {
        None
    } else {
        Some(build_patch(&Value::Object(body), fields)?)
    };

    match (status, patch) {
        (Some(target), patch) => {
            set_status_with::<S>(
                store,
                StatusChange {
                    collection,
                    label,
                    id,
                    target: &target,
                    force,
                    actor: actor.role,
                },
                patch.unwrap_or_default(),
            )
            .await
        }
        (None, Some(patch)) => updated(
            store.update(collection, id, guard.as_ref(), patch).await?,
            label,
        ),
        (None, None) => Err(AppError::validation("No fields provided for update")),
    }
}
