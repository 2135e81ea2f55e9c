use std::fmt;

use chrono::Utc;
use entity::{activity, completion_report, contract, documentation, documentation_photo, proposal, team_member};
use entity::activity::{FinalStatus, Stage};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    TransactionTrait,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::{CurrentUser, UserRole};
use crate::storage::{
    FilePayload, FileStore, StoreError, PDF_RULE, PHOTO_RULE, REPORT_RULE, SKTL_RULE,
};

pub const SKTL_DIR: &str = "sktl";
pub const HANDOVER_SKTL_DIR: &str = "handover-sktl";
pub const CONTRACT_DIR: &str = "contracts";
pub const REPORT_DIR: &str = "reports";
pub const PHOTO_DIR: &str = "photos";

/// The distinct operations that move an activity forward. Each action is
/// applicable at exactly one stage and yields exactly one successor.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Action {
    ConfirmAttendance,
    SubmitObservationDocs,
    ApproveObservation,
    SubmitHandoverDocs,
    ProcessHandover,
    SubmitCompletionReport,
}

impl Action {
    pub fn expected_stage(self) -> Stage {
        match self {
            Action::ConfirmAttendance => Stage::AwaitingConfirmation,
            Action::SubmitObservationDocs => Stage::ObservationDocs,
            Action::ApproveObservation => Stage::AwaitingSupervisorReview,
            Action::SubmitHandoverDocs | Action::ProcessHandover => Stage::HandoverDocs,
            Action::SubmitCompletionReport => Stage::Completion,
        }
    }

    pub fn successor(self) -> Stage {
        match self {
            Action::ConfirmAttendance => Stage::ObservationDocs,
            Action::SubmitObservationDocs => Stage::AwaitingSupervisorReview,
            Action::ApproveObservation => Stage::HandoverDocs,
            Action::SubmitHandoverDocs | Action::ProcessHandover => Stage::Completion,
            Action::SubmitCompletionReport => Stage::Done,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ConfirmAttendance => "confirmAttendance",
            Action::SubmitObservationDocs => "submitObservationDocs",
            Action::ApproveObservation => "approveObservation",
            Action::SubmitHandoverDocs => "submitHandoverDocs",
            Action::ProcessHandover => "processHandover",
            Action::SubmitCompletionReport => "submitCompletionReport",
        };
        f.write_str(name)
    }
}

pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::AwaitingConfirmation => "AWAITING_CONFIRMATION",
        Stage::ObservationDocs => "OBSERVATION_DOCS",
        Stage::AwaitingSupervisorReview => "AWAITING_SUPERVISOR_REVIEW",
        Stage::HandoverDocs => "HANDOVER_DOCS",
        Stage::Completion => "COMPLETION",
        Stage::Done => "DONE",
    }
}

/// Successor in the fixed linear order; `None` once the activity is done.
pub fn next_stage(stage: Stage) -> Option<Stage> {
    match stage {
        Stage::AwaitingConfirmation => Some(Stage::ObservationDocs),
        Stage::ObservationDocs => Some(Stage::AwaitingSupervisorReview),
        Stage::AwaitingSupervisorReview => Some(Stage::HandoverDocs),
        Stage::HandoverDocs => Some(Stage::Completion),
        Stage::Completion => Some(Stage::Done),
        Stage::Done => None,
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("activity not found")]
    NotFound,
    #[error("proposal not found")]
    ProposalNotFound,
    #[error("activity can only be created from an approved proposal")]
    ProposalNotApproved,
    #[error("{} cannot be applied at stage {}", .action, stage_label(*.current))]
    WrongStage { action: Action, current: Stage },
    #[error("{0}")]
    Validation(String),
    #[error("not a member of the activity's team")]
    NotTeamMember,
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub name: String,
    pub description: Option<String>,
    pub start_date: chrono::NaiveDate,
    pub end_date: Option<chrono::NaiveDate>,
    pub team_id: Uuid,
    pub proposal_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct DocumentationInput {
    pub name: String,
    pub description: Option<String>,
}

impl DocumentationInput {
    fn validated(self) -> Result<Self, WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "name: documentation name is required".into(),
            ));
        }
        Ok(self)
    }
}

/// Creates an activity at the first stage from an approved proposal.
pub async fn create_activity(
    db: &DatabaseConnection,
    input: NewActivity,
    actor: &CurrentUser,
) -> Result<activity::Model, WorkflowError> {
    if input.name.trim().is_empty() {
        return Err(WorkflowError::Validation("name: activity name is required".into()));
    }
    let txn = db.begin().await?;
    if let Some(proposal_id) = input.proposal_id {
        let source = proposal::Entity::find_by_id(proposal_id)
            .one(&txn)
            .await?
            .ok_or(WorkflowError::ProposalNotFound)?;
        if source.status != proposal::Status::Approved {
            return Err(WorkflowError::ProposalNotApproved);
        }
    }
    let now: DateTimeWithTimeZone = Utc::now().into();
    let model = activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        stage: Set(Stage::AwaitingConfirmation),
        final_status: Set(None),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        team_id: Set(input.team_id),
        proposal_id: Set(input.proposal_id),
        sktl_path: Set(None),
        handover_sktl_path: Set(None),
        created_by: Set(Some(actor.user_id)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    Ok(model)
}

/// Employee confirms attendance; no artifact is required.
pub async fn confirm_attendance(
    db: &DatabaseConnection,
    activity_id: Uuid,
    actor: &CurrentUser,
) -> Result<activity::Model, WorkflowError> {
    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::ConfirmAttendance).await?;
    ensure_team_access(&txn, model.team_id, actor).await?;
    let updated = advance(&txn, model, Action::ConfirmAttendance, |_| {}).await?;
    txn.commit().await?;
    Ok(updated)
}

/// Stores an observation documentation bundle (photos optional) and hands the
/// activity to the supervisor.
pub async fn submit_observation_docs(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    input: DocumentationInput,
    photos: Vec<FilePayload>,
    actor: &CurrentUser,
) -> Result<activity::Model, WorkflowError> {
    let input = input.validated()?;
    check_all(&PHOTO_RULE, "photos", &photos)?;

    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::SubmitObservationDocs).await?;
    ensure_team_access(&txn, model.team_id, actor).await?;
    insert_documentation(&txn, store, &model, documentation::Kind::Observation, input, photos)
        .await?;
    let updated = advance(&txn, model, Action::SubmitObservationDocs, |_| {}).await?;
    txn.commit().await?;
    Ok(updated)
}

/// Supervisor approval after observation: a required SKTL document advances
/// the activity to the handover stage.
pub async fn approve_observation(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    sktl: FilePayload,
) -> Result<activity::Model, WorkflowError> {
    SKTL_RULE
        .check("file_sktl", &sktl)
        .map_err(WorkflowError::Validation)?;

    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::ApproveObservation).await?;
    let stored = store.store(SKTL_DIR, &sktl.file_name, &sktl.bytes).await?;
    let updated = advance(&txn, model, Action::ApproveObservation, |active| {
        active.sktl_path = Set(Some(stored.clone()));
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Employee handover documentation, optionally with a third-party contract.
pub async fn submit_handover_docs(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    input: DocumentationInput,
    photos: Vec<FilePayload>,
    contract_file: Option<FilePayload>,
    actor: &CurrentUser,
) -> Result<activity::Model, WorkflowError> {
    let input = input.validated()?;
    check_all(&PHOTO_RULE, "photos", &photos)?;
    if let Some(file) = &contract_file {
        PDF_RULE
            .check("file_pihak_ketiga", file)
            .map_err(WorkflowError::Validation)?;
    }

    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::SubmitHandoverDocs).await?;
    ensure_team_access(&txn, model.team_id, actor).await?;
    insert_documentation(&txn, store, &model, documentation::Kind::Handover, input, photos)
        .await?;
    if let Some(file) = contract_file {
        put_contract(&txn, store, &model, None, &file).await?;
    }
    let updated = advance(&txn, model, Action::SubmitHandoverDocs, |_| {}).await?;
    txn.commit().await?;
    Ok(updated)
}

/// Supervisor's handover form: optional handover SKTL and optional contract,
/// then the activity moves to completion.
pub async fn process_handover(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    handover_sktl: Option<FilePayload>,
    contract_file: Option<FilePayload>,
) -> Result<activity::Model, WorkflowError> {
    if let Some(file) = &handover_sktl {
        PDF_RULE
            .check("sktl_penyerahan", file)
            .map_err(WorkflowError::Validation)?;
    }
    if let Some(file) = &contract_file {
        PDF_RULE
            .check("file_pihak_ketiga", file)
            .map_err(WorkflowError::Validation)?;
    }

    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::ProcessHandover).await?;
    let sktl_path = match handover_sktl {
        Some(file) => Some(
            store
                .store(HANDOVER_SKTL_DIR, &file.file_name, &file.bytes)
                .await?,
        ),
        None => None,
    };
    if let Some(file) = contract_file {
        put_contract(&txn, store, &model, None, &file).await?;
    }
    let updated = advance(&txn, model, Action::ProcessHandover, |active| {
        if let Some(path) = sktl_path.clone() {
            active.handover_sktl_path = Set(Some(path));
        }
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Standalone third-party contract upload. Replaces any previous contract and
/// leaves the stage untouched.
pub async fn upload_contract(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    name: Option<String>,
    file: FilePayload,
) -> Result<contract::Model, WorkflowError> {
    PDF_RULE
        .check("file_pihak_ketiga", &file)
        .map_err(WorkflowError::Validation)?;

    let txn = db.begin().await?;
    let model = activity::Entity::find_by_id(activity_id)
        .one(&txn)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    put_contract(&txn, store, &model, name, &file).await?;
    let stored = contract::Entity::find_by_id(activity_id)
        .one(&txn)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    txn.commit().await?;
    Ok(stored)
}

/// Final step: the completion report (berita acara) plus the outcome status
/// close the activity. The report row is an upsert keyed by activity.
pub async fn submit_completion_report(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    activity_id: Uuid,
    report: FilePayload,
    final_status: FinalStatus,
    note: Option<String>,
    actor: &CurrentUser,
) -> Result<activity::Model, WorkflowError> {
    REPORT_RULE
        .check("berita_acara", &report)
        .map_err(WorkflowError::Validation)?;

    let txn = db.begin().await?;
    let model = load_for_action(&txn, activity_id, Action::SubmitCompletionReport).await?;
    ensure_team_access(&txn, model.team_id, actor).await?;

    let existing = completion_report::Entity::find_by_id(activity_id)
        .one(&txn)
        .await?;
    let stored = store
        .store(REPORT_DIR, &report.file_name, &report.bytes)
        .await?;
    if let Some(prev) = existing {
        // Best-effort removal of the replaced artifact; the upsert below is
        // what guarantees the singleton.
        let _ = store.delete(&prev.file_path).await;
    }
    let now: DateTimeWithTimeZone = Utc::now().into();
    let row = completion_report::ActiveModel {
        activity_id: Set(activity_id),
        file_path: Set(stored),
        note: Set(note),
        updated_at: Set(now),
    };
    completion_report::Entity::insert(row)
        .on_conflict(
            OnConflict::column(completion_report::Column::ActivityId)
                .update_columns([
                    completion_report::Column::FilePath,
                    completion_report::Column::Note,
                    completion_report::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    let updated = advance(&txn, model, Action::SubmitCompletionReport, |active| {
        active.final_status = Set(Some(final_status));
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

async fn load_for_action<C: ConnectionTrait>(
    conn: &C,
    activity_id: Uuid,
    action: Action,
) -> Result<activity::Model, WorkflowError> {
    let model = activity::Entity::find_by_id(activity_id)
        .one(conn)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    if model.stage != action.expected_stage() {
        return Err(WorkflowError::WrongStage {
            action,
            current: model.stage,
        });
    }
    Ok(model)
}

/// Supervisors and admins may act on any activity; employees only on
/// activities whose team they belong to.
async fn ensure_team_access<C: ConnectionTrait>(
    conn: &C,
    team_id: Uuid,
    actor: &CurrentUser,
) -> Result<(), WorkflowError> {
    if actor.has_role(UserRole::Supervisor) {
        return Ok(());
    }
    let membership = team_member::Entity::find_by_id((team_id, actor.user_id))
        .one(conn)
        .await?;
    if membership.is_none() {
        return Err(WorkflowError::NotTeamMember);
    }
    Ok(())
}

async fn advance<C: ConnectionTrait>(
    conn: &C,
    model: activity::Model,
    action: Action,
    mutate: impl FnOnce(&mut activity::ActiveModel),
) -> Result<activity::Model, WorkflowError> {
    let activity_id = model.id;
    let from = model.stage;
    let to = action.successor();
    let mut active: activity::ActiveModel = model.into();
    active.stage = Set(to);
    active.updated_at = Set(Utc::now().into());
    mutate(&mut active);
    let updated = active.update(conn).await?;
    info!(
        activity = %activity_id,
        from = stage_label(from),
        to = stage_label(to),
        %action,
        "activity stage advanced"
    );
    Ok(updated)
}

async fn insert_documentation<C: ConnectionTrait>(
    conn: &C,
    store: &dyn FileStore,
    activity: &activity::Model,
    kind: documentation::Kind,
    input: DocumentationInput,
    photos: Vec<FilePayload>,
) -> Result<documentation::Model, WorkflowError> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let bundle = documentation::ActiveModel {
        id: Set(Uuid::new_v4()),
        activity_id: Set(activity.id),
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        kind: Set(kind),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;
    for photo in photos {
        let stored = store.store(PHOTO_DIR, &photo.file_name, &photo.bytes).await?;
        documentation_photo::ActiveModel {
            id: Set(Uuid::new_v4()),
            documentation_id: Set(bundle.id),
            file_path: Set(stored),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;
    }
    Ok(bundle)
}

async fn put_contract<C: ConnectionTrait>(
    conn: &C,
    store: &dyn FileStore,
    activity: &activity::Model,
    name: Option<String>,
    file: &FilePayload,
) -> Result<(), WorkflowError> {
    let existing = contract::Entity::find_by_id(activity.id).one(conn).await?;
    let stored = store
        .store(CONTRACT_DIR, &file.file_name, &file.bytes)
        .await?;
    if let Some(prev) = existing {
        let _ = store.delete(&prev.file_path).await;
    }
    let now: DateTimeWithTimeZone = Utc::now().into();
    let row = contract::ActiveModel {
        activity_id: Set(activity.id),
        name: Set(name.unwrap_or_else(|| format!("Third-party contract for {}", activity.name))),
        file_path: Set(stored),
        updated_at: Set(now),
    };
    contract::Entity::insert(row)
        .on_conflict(
            OnConflict::column(contract::Column::ActivityId)
                .update_columns([
                    contract::Column::Name,
                    contract::Column::FilePath,
                    contract::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

fn check_all(
    rule: &crate::storage::UploadRule,
    field: &str,
    files: &[FilePayload],
) -> Result<(), WorkflowError> {
    for file in files {
        rule.check(field, file).map_err(WorkflowError::Validation)?;
    }
    Ok(())
}
