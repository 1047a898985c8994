use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ApplicationStatus, InterviewStatus, Lifecycle, check_transition};
use crate::errors::{AppError, AppResult};
use crate::model::application::{Application, InterviewSchedule};
use crate::model::interview::{Interview, InterviewType};
use crate::model::role::Role;
use crate::store::{
    Collection, Document, Guard, RecordStore, StoreError, UpdateOutcome, WriteOp, from_document,
    to_document,
};

/// A request to move one record to a new status.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange<'a> {
    pub collection: Collection,
    /// Used in messages, e.g. "Leave request".
    pub label: &'static str,
    pub id: &'a str,
    pub target: &'a str,
    pub force: bool,
    pub actor: Role,
}

/// Moves a record along its transition table (or anywhere inside the enum
/// when an admin forces it). The write only lands if the status is still
/// the one that was read.
pub async fn set_status<S: Lifecycle>(
    store: &dyn RecordStore,
    change: StatusChange<'_>,
) -> AppResult<Document> {
    set_status_with::<S>(store, change, Document::new()).await
}

/// [`set_status`] with `fields` merged into the same guarded write, so the
/// status and the edit land together or not at all.
pub async fn set_status_with<S: Lifecycle>(
    store: &dyn RecordStore,
    change: StatusChange<'_>,
    fields: Document,
) -> AppResult<Document> {
    let target = S::parse(change.target)?;
    if change.force && change.actor != Role::Admin {
        return Err(AppError::forbidden("Only admins can force a status change"));
    }

    let doc = store
        .get(change.collection, change.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", change.label)))?;

    let current = doc.get("status").cloned();
    let current_raw = current
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !change.force {
        let from = S::from_str(&current_raw).map_err(|_| AppError::InvalidTransition {
            from: current_raw.clone(),
            to: target.as_ref().to_string(),
        })?;
        check_transition(from, target, false)?;
    }

    let guard = match current {
        Some(value) => Guard::Equals("status".into(), value),
        None => Guard::missing("status"),
    };

    let mut patch = fields;
    patch.insert("status".into(), json!(target.as_ref()));
    patch.insert("updatedAt".into(), json!(Utc::now()));

    match store
        .update(change.collection, change.id, Some(&guard), patch)
        .await?
    {
        UpdateOutcome::Updated(doc) => {
            info!(
                collection = %change.collection,
                id = change.id,
                from = %current_raw,
                to = target.as_ref(),
                forced = change.force,
                "Status changed"
            );
            Ok(doc)
        }
        UpdateOutcome::NotFound => Err(AppError::not_found(format!("{} not found", change.label))),
        UpdateOutcome::GuardFailed => Err(AppError::conflict(format!(
            "{} was changed by someone else; reload and try again",
            change.label
        ))),
    }
}

fn default_duration() -> u32 {
    60
}

/// Interview details supplied by the scheduler.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewDraft {
    #[schema(value_type = String, format = "date", example = "2026-03-10")]
    pub date: NaiveDate,
    #[schema(example = "14:30")]
    pub time: String,
    /// Minutes
    #[serde(default = "default_duration")]
    #[schema(example = 45)]
    pub duration: u32,
    #[serde(rename = "type")]
    pub kind: InterviewType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[schema(example = "Priya Shah")]
    pub interviewer: String,
    #[serde(default)]
    pub interviewer_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub agenda: Option<String>,
}

impl InterviewDraft {
    pub fn validate(&self) -> AppResult<()> {
        if self.interviewer.trim().is_empty() {
            return Err(AppError::validation("interviewer is required"));
        }
        if NaiveTime::parse_from_str(&self.time, "%H:%M").is_err() {
            return Err(AppError::validation("time must be formatted as HH:MM"));
        }
        if self.duration == 0 {
            return Err(AppError::validation("duration must be at least one minute"));
        }
        if self.kind == InterviewType::Video
            && self.meeting_link.as_deref().is_none_or(|l| l.trim().is_empty())
        {
            warn!(interviewer = %self.interviewer, "Video interview scheduled without a meetingLink");
        }
        Ok(())
    }
}

/// Creates the interview record and moves the application to
/// `interview-scheduled` with the details copied onto it, in one batch.
/// Rescheduling cancels the previous interview in the same batch.
pub async fn schedule_interview(
    store: &dyn RecordStore,
    application_id: &str,
    draft: InterviewDraft,
) -> AppResult<(Application, Interview)> {
    draft.validate()?;

    let doc = store
        .get(Collection::Applications, application_id)
        .await?
        .ok_or_else(|| AppError::not_found("Application not found"))?;
    let application: Application = from_document(doc)?;

    let target = ApplicationStatus::InterviewScheduled;
    let from = ApplicationStatus::parse(&application.status).map_err(|_| {
        AppError::InvalidTransition {
            from: application.status.clone(),
            to: target.as_ref().to_string(),
        }
    })?;
    check_transition(from, target, false)?;

    let now = Utc::now();
    let interview = Interview {
        id: Uuid::new_v4().to_string(),
        candidate_id: application.id.clone(),
        job_id: application.job_id.clone(),
        date: draft.date,
        time: draft.time,
        duration: draft.duration,
        kind: draft.kind,
        location: draft.location,
        meeting_link: draft.meeting_link,
        interviewer: draft.interviewer,
        interviewer_email: draft.interviewer_email,
        notes: draft.notes,
        agenda: draft.agenda,
        status: InterviewStatus::initial().as_ref().to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut patch = Document::new();
    patch.insert("status".into(), json!(target.as_ref()));
    patch.insert(
        "interviewSchedule".into(),
        serde_json::to_value(InterviewSchedule::from(&interview))?,
    );
    patch.insert("updatedAt".into(), json!(now));

    let mut ops = vec![
        WriteOp::Insert {
            collection: Collection::Interviews,
            doc: to_document(&interview)?,
        },
        WriteOp::Update {
            collection: Collection::Applications,
            id: application.id.clone(),
            guard: Some(Guard::equals("status", application.status.as_str())),
            patch,
        },
    ];

    if let Some(previous) = &application.interview_schedule {
        let still_scheduled = store
            .get(Collection::Interviews, &previous.interview_id)
            .await?
            .is_some_and(|d| d.get("status") == Some(&json!(InterviewStatus::Scheduled.as_ref())));
        if still_scheduled {
            let mut cancel = Document::new();
            cancel.insert("status".into(), json!(InterviewStatus::Cancelled.as_ref()));
            cancel.insert("updatedAt".into(), json!(now));
            ops.push(WriteOp::Update {
                collection: Collection::Interviews,
                id: previous.interview_id.clone(),
                guard: Some(Guard::equals("status", InterviewStatus::Scheduled.as_ref())),
                patch: cancel,
            });
        }
    }

    let written = match store.commit(ops).await {
        Ok(written) => written,
        Err(e @ (StoreError::GuardFailed { .. } | StoreError::NotFound { .. })) => {
            warn!(error = %e, application_id, "Interview scheduling aborted");
            return Err(AppError::WorkflowAborted(
                "the application or its previous interview changed while scheduling; nothing was saved"
                    .into(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let updated = written
        .into_iter()
        .nth(1)
        .ok_or_else(|| AppError::Internal("commit returned too few documents".into()))?;

    info!(application_id, interview_id = %interview.id, "Interview scheduled");
    Ok((from_document(updated)?, interview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RequestStatus;
    use crate::store::memory::MemoryStore;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn seed_application(store: &MemoryStore, id: &str, status: &str) {
        store
            .insert(
                Collection::Applications,
                doc(json!({
                    "id": id,
                    "jobId": "job-1",
                    "fullName": "Sam Carter",
                    "email": "sam@example.com",
                    "phone": "0113 496 0000",
                    "coverLetter": "",
                    "appliedAt": "2026-01-05T10:00:00Z",
                    "updatedAt": "2026-01-05T10:00:00Z",
                    "status": status
                })),
            )
            .await
            .unwrap();
    }

    fn draft() -> InterviewDraft {
        InterviewDraft {
            date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
            time: "10:30".into(),
            duration: 45,
            kind: InterviewType::Phone,
            location: None,
            meeting_link: None,
            interviewer: "Priya Shah".into(),
            interviewer_email: Some("priya@agency.test".into()),
            notes: None,
            agenda: Some("Rota and experience".into()),
        }
    }

    fn change<'a>(id: &'a str, target: &'a str, force: bool, actor: Role) -> StatusChange<'a> {
        StatusChange {
            collection: Collection::Applications,
            label: "Application",
            id,
            target,
            force,
            actor,
        }
    }

    #[actix_web::test]
    async fn set_status_is_visible_on_refetch() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "applied").await;

        set_status::<ApplicationStatus>(&store, change("a1", "shortlisted", false, Role::Client))
            .await
            .unwrap();

        let fetched = store.get(Collection::Applications, "a1").await.unwrap().unwrap();
        assert_eq!(fetched["status"], "shortlisted");
    }

    #[actix_web::test]
    async fn set_status_rejects_edges_outside_the_table() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "rejected").await;

        let err = set_status::<ApplicationStatus>(&store, change("a1", "hired", false, Role::Client))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let err = set_status::<ApplicationStatus>(&store, change("a1", "hired", true, Role::Client))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let forced = set_status::<ApplicationStatus>(&store, change("a1", "hired", true, Role::Admin))
            .await
            .unwrap();
        assert_eq!(forced["status"], "hired");
    }

    #[actix_web::test]
    async fn set_status_validates_enum_membership_even_when_forced() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "applied").await;
        let err = set_status::<ApplicationStatus>(&store, change("a1", "promoted", true, Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn set_status_on_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = set_status::<RequestStatus>(
            &store,
            StatusChange {
                collection: Collection::LeaveRequests,
                label: "Leave request",
                id: "nope",
                target: "approved",
                force: false,
                actor: Role::Admin,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Leave request not found");
    }

    #[actix_web::test]
    async fn scheduling_writes_interview_and_application_together() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "shortlisted").await;

        let (application, interview) = schedule_interview(&store, "a1", draft()).await.unwrap();

        assert_eq!(application.status, "interview-scheduled");
        let schedule = application.interview_schedule.unwrap();
        assert_eq!(schedule.date, NaiveDate::from_ymd_opt(2026, 2, 3).unwrap());
        assert_eq!(schedule.time, "10:30");
        assert_eq!(schedule.kind, InterviewType::Phone);
        assert_eq!(schedule.interviewer, "Priya Shah");
        assert_eq!(schedule.interview_id, interview.id);

        let stored = store
            .get(Collection::Interviews, &interview.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["candidateId"], "a1");
        assert_eq!(stored["status"], "scheduled");
    }

    #[actix_web::test]
    async fn scheduling_from_a_terminal_state_writes_nothing() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "hired").await;

        let err = schedule_interview(&store, "a1", draft()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let interviews = store
            .count(Collection::Interviews, &crate::store::Query::new())
            .await
            .unwrap();
        assert_eq!(interviews, 0);
    }

    #[actix_web::test]
    async fn rescheduling_cancels_the_previous_interview() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "shortlisted").await;

        let (_, first) = schedule_interview(&store, "a1", draft()).await.unwrap();
        let mut second_draft = draft();
        second_draft.time = "14:00".into();
        let (application, second) = schedule_interview(&store, "a1", second_draft).await.unwrap();

        assert_eq!(application.interview_schedule.unwrap().interview_id, second.id);
        let old = store.get(Collection::Interviews, &first.id).await.unwrap().unwrap();
        assert_eq!(old["status"], "cancelled");
    }

    #[actix_web::test]
    async fn video_interview_without_a_link_is_scheduled() {
        let store = MemoryStore::new();
        seed_application(&store, "a1", "shortlisted").await;

        let mut d = draft();
        d.kind = InterviewType::Video;
        let (application, interview) = schedule_interview(&store, "a1", d).await.unwrap();

        assert_eq!(application.status, "interview-scheduled");
        assert_eq!(interview.meeting_link, None);
    }

    #[test]
    fn meeting_link_is_optional_for_video_interviews() {
        let mut d = draft();
        d.kind = InterviewType::Video;
        assert!(d.validate().is_ok());
        d.meeting_link = Some("https://meet.example/abc".into());
        assert!(d.validate().is_ok());

        let mut d = draft();
        d.time = "half ten".into();
        assert!(d.validate().is_err());
    }
}
