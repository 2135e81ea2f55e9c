use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use async_graphql::{
    Context, EmptySubscription, Enum, Error, ErrorExtensions, InputObject, Object, Schema,
    SimpleObject, Upload, ID,
};
use chrono::{DateTime, NaiveDate, Utc};
use entity::{
    activity, completion_report, contract, documentation, documentation_photo, proposal, team,
    team_member, user, user_role, user_secret,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::info_span;
use uuid::Uuid;

use crate::auth::{issue_token, AuthConfig, CurrentUser, UserRole, SESSION_COOKIE};
use crate::storage::{public_url, FilePayload, FileStore};
use crate::workflow::{self, DocumentationInput, NewActivity, WorkflowError};

pub struct AppSchema(pub Schema<QueryRoot, MutationRoot, EmptySubscription>);

/// File-store handle plus the public base under which stored paths are served.
pub struct Uploads {
    pub store: Arc<dyn FileStore>,
    pub public_base: String,
}

pub fn build_schema(
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthConfig>,
    uploads: Arc<Uploads>,
) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(auth)
        .data(uploads)
        .finish();
    AppSchema(schema)
}

pub struct QueryRoot;
pub struct MutationRoot;

const MAX_LIST_PAGE: i32 = 100;

/// Stages a supervisor works through on the review desk.
const SUPERVISOR_STAGES: [activity::Stage; 3] = [
    activity::Stage::AwaitingSupervisorReview,
    activity::Stage::HandoverDocs,
    activity::Stage::Completion,
];

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum ActivityStage {
    AwaitingConfirmation,
    ObservationDocs,
    AwaitingSupervisorReview,
    HandoverDocs,
    Completion,
    Done,
}

impl From<activity::Stage> for ActivityStage {
    fn from(value: activity::Stage) -> Self {
        match value {
            activity::Stage::AwaitingConfirmation => ActivityStage::AwaitingConfirmation,
            activity::Stage::ObservationDocs => ActivityStage::ObservationDocs,
            activity::Stage::AwaitingSupervisorReview => ActivityStage::AwaitingSupervisorReview,
            activity::Stage::HandoverDocs => ActivityStage::HandoverDocs,
            activity::Stage::Completion => ActivityStage::Completion,
            activity::Stage::Done => ActivityStage::Done,
        }
    }
}

impl From<ActivityStage> for activity::Stage {
    fn from(value: ActivityStage) -> Self {
        match value {
            ActivityStage::AwaitingConfirmation => activity::Stage::AwaitingConfirmation,
            ActivityStage::ObservationDocs => activity::Stage::ObservationDocs,
            ActivityStage::AwaitingSupervisorReview => activity::Stage::AwaitingSupervisorReview,
            ActivityStage::HandoverDocs => activity::Stage::HandoverDocs,
            ActivityStage::Completion => activity::Stage::Completion,
            ActivityStage::Done => activity::Stage::Done,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum FinalStatus {
    Completed,
    Rejected,
    Other,
}

impl From<activity::FinalStatus> for FinalStatus {
    fn from(value: activity::FinalStatus) -> Self {
        match value {
            activity::FinalStatus::Completed => FinalStatus::Completed,
            activity::FinalStatus::Rejected => FinalStatus::Rejected,
            activity::FinalStatus::Other => FinalStatus::Other,
        }
    }
}

impl From<FinalStatus> for activity::FinalStatus {
    fn from(value: FinalStatus) -> Self {
        match value {
            FinalStatus::Completed => activity::FinalStatus::Completed,
            FinalStatus::Rejected => activity::FinalStatus::Rejected,
            FinalStatus::Other => activity::FinalStatus::Other,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DocumentationKind {
    Observation,
    Handover,
}

impl From<documentation::Kind> for DocumentationKind {
    fn from(value: documentation::Kind) -> Self {
        match value {
            documentation::Kind::Observation => DocumentationKind::Observation,
            documentation::Kind::Handover => DocumentationKind::Handover,
        }
    }
}

#[Object]
impl QueryRoot {
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<MePayload> {
        let viewer = require_viewer(ctx)?;
        let db = database(ctx)?;
        let model = user::Entity::find_by_id(viewer.user_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "User not found"))?;
        Ok(MePayload {
            user: UserNode::from(model),
            roles: viewer.roles.iter().map(|r| r.as_str().to_string()).collect(),
        })
    }

    /// Activities of the signed-in employee's teams. Without a stage filter,
    /// finished activities are excluded; asking for DONE explicitly is allowed.
    #[graphql(name = "myActivities")]
    async fn my_activities(
        &self,
        ctx: &Context<'_>,
        stage: Option<ActivityStage>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ActivityNode>> {
        let viewer = require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let (limit, skip) = page(first, offset);
        let span = info_span!(
            "kegiatan.myActivities",
            has_stage = stage.is_some(),
            first = limit
        );
        let _guard = span.enter();

        let team_ids: Vec<Uuid> = team_member::Entity::find()
            .filter(team_member::Column::UserId.eq(viewer.user_id))
            .all(db.as_ref())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| row.team_id)
            .collect();
        if team_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut query = activity::Entity::find()
            .filter(activity::Column::TeamId.is_in(team_ids));
        query = match stage {
            Some(stage) => query.filter(activity::Column::Stage.eq(activity::Stage::from(stage))),
            None => query.filter(activity::Column::Stage.ne(activity::Stage::Done)),
        };
        let rows = query
            .order_by_desc(activity::Column::CreatedAt)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        load_activity_nodes(db.as_ref(), rows, &uploads.public_base).await
    }

    /// Activities awaiting supervisor action, newest field date first.
    #[graphql(name = "pendingReview")]
    async fn pending_review(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ActivityNode>> {
        require_role(ctx, UserRole::Supervisor)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let (limit, skip) = page(first, offset);
        let span = info_span!("kegiatan.pendingReview", first = limit);
        let _guard = span.enter();

        let rows = activity::Entity::find()
            .filter(activity::Column::Stage.is_in(SUPERVISOR_STAGES))
            .order_by_desc(activity::Column::StartDate)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        load_activity_nodes(db.as_ref(), rows, &uploads.public_base).await
    }

    /// Finished activities, most recently updated first.
    async fn archive(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<ActivityNode>> {
        require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let (limit, skip) = page(first, offset);
        let span = info_span!("kegiatan.archive", first = limit);
        let _guard = span.enter();

        let rows = activity::Entity::find()
            .filter(activity::Column::Stage.eq(activity::Stage::Done))
            .order_by_desc(activity::Column::UpdatedAt)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        load_activity_nodes(db.as_ref(), rows, &uploads.public_base).await
    }

    /// Full related-entity graph for one activity; serves both the in-flight
    /// detail page and the archive view.
    async fn activity(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Option<ActivityDetail>> {
        require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let activity_id = parse_uuid(&id)?;
        let Some(model) = activity::Entity::find_by_id(activity_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
        else {
            return Ok(None);
        };
        Ok(Some(
            load_activity_detail(db.as_ref(), model, &uploads.public_base).await?,
        ))
    }
}

#[Object]
impl MutationRoot {
    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> async_graphql::Result<AuthPayload> {
        let auth = auth_config(ctx)?;
        let db = database(ctx)?;
        let normalized = normalize_email(&email)?;
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(normalized))
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        let Some(record) = record else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        if !record.is_active {
            return Ok(AuthPayload::failed("Account disabled"));
        }
        let secret = user_secret::Entity::find_by_id(record.id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        let Some(secret) = secret else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        let parsed_hash = PasswordHash::new(&secret.password_hash)
            .map_err(|_| error_with_code("INTERNAL", "Invalid password hash"))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Ok(AuthPayload::failed("Invalid credentials"));
        }
        let roles = load_roles(db.as_ref(), record.id).await?;
        let token = issue_token(record.id, &roles, &auth)
            .map_err(|_| error_with_code("INTERNAL", "Failed to issue session token"))?;
        append_session_cookie(ctx, &token, auth.session_ttl_minutes);
        Ok(AuthPayload {
            ok: true,
            token: Some(token),
            user: Some(UserNode::from(record)),
            error: None,
        })
    }

    async fn logout(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        append_session_cookie(ctx, "", -1);
        Ok(true)
    }

    /// Creates an activity from an approved proposal; it starts at
    /// AWAITING_CONFIRMATION.
    #[graphql(name = "createActivity")]
    async fn create_activity(
        &self,
        ctx: &Context<'_>,
        input: NewActivityInput,
    ) -> async_graphql::Result<ActivityNode> {
        let current = require_role(ctx, UserRole::Supervisor)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let new_activity = NewActivity {
            name: input.name,
            description: input.description,
            start_date: input.start_date,
            end_date: input.end_date,
            team_id: parse_uuid(&input.team_id)?,
            proposal_id: match &input.proposal_id {
                Some(id) => Some(parse_uuid(id)?),
                None => None,
            },
        };
        let model = workflow::create_activity(db.as_ref(), new_activity, &current)
            .await
            .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Employee confirms attendance and the field work begins.
    #[graphql(name = "confirmAttendance")]
    async fn confirm_attendance(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
    ) -> async_graphql::Result<ActivityNode> {
        let current = require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let model = workflow::confirm_attendance(db.as_ref(), parse_uuid(&activity_id)?, &current)
            .await
            .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Uploads the observation documentation bundle with optional photos.
    #[graphql(name = "submitObservationDocs")]
    async fn submit_observation_docs(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        input: DocumentationInputGql,
        photos: Option<Vec<Upload>>,
    ) -> async_graphql::Result<ActivityNode> {
        let current = require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let photos = read_uploads(ctx, photos.unwrap_or_default())?;
        let model = workflow::submit_observation_docs(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            input.into(),
            photos,
            &current,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Supervisor approval: stores the SKTL document and moves the activity
    /// on to handover documentation.
    #[graphql(name = "approveObservation")]
    async fn approve_observation(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        sktl: Upload,
    ) -> async_graphql::Result<ActivityNode> {
        require_role(ctx, UserRole::Supervisor)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let sktl = read_upload(ctx, sktl)?;
        let model = workflow::approve_observation(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            sktl,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Employee handover documentation, optionally carrying the third-party
    /// contract.
    #[graphql(name = "submitHandoverDocs")]
    async fn submit_handover_docs(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        input: DocumentationInputGql,
        photos: Option<Vec<Upload>>,
        contract: Option<Upload>,
    ) -> async_graphql::Result<ActivityNode> {
        let current = require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let photos = read_uploads(ctx, photos.unwrap_or_default())?;
        let contract = contract.map(|file| read_upload(ctx, file)).transpose()?;
        let model = workflow::submit_handover_docs(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            input.into(),
            photos,
            contract,
            &current,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Supervisor's handover form: optional handover SKTL plus optional
    /// contract.
    #[graphql(name = "processHandover")]
    async fn process_handover(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        #[graphql(name = "handoverSktl")] handover_sktl: Option<Upload>,
        contract: Option<Upload>,
    ) -> async_graphql::Result<ActivityNode> {
        require_role(ctx, UserRole::Supervisor)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let handover_sktl = handover_sktl.map(|f| read_upload(ctx, f)).transpose()?;
        let contract = contract.map(|f| read_upload(ctx, f)).transpose()?;
        let model = workflow::process_handover(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            handover_sktl,
            contract,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }

    /// Replaces the activity's third-party contract without touching the
    /// stage.
    #[graphql(name = "uploadContract")]
    async fn upload_contract(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        name: Option<String>,
        file: Upload,
    ) -> async_graphql::Result<ContractNode> {
        require_role(ctx, UserRole::Supervisor)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let file = read_upload(ctx, file)?;
        let model = workflow::upload_contract(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            name,
            file,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ContractNode::from_model(model, &uploads.public_base))
    }

    /// Closes the activity: completion report plus the final outcome status.
    #[graphql(name = "submitCompletionReport")]
    async fn submit_completion_report(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activityId")] activity_id: ID,
        report: Upload,
        #[graphql(name = "finalStatus")] final_status: FinalStatus,
        note: Option<String>,
    ) -> async_graphql::Result<ActivityNode> {
        let current = require_viewer(ctx)?;
        let db = database(ctx)?;
        let uploads = uploads(ctx)?;
        let report = read_upload(ctx, report)?;
        let model = workflow::submit_completion_report(
            db.as_ref(),
            uploads.store.as_ref(),
            parse_uuid(&activity_id)?,
            report,
            final_status.into(),
            note,
            &current,
        )
        .await
        .map_err(workflow_error)?;
        Ok(ActivityNode::from_model(model, &uploads.public_base))
    }
}

#[derive(InputObject, Clone)]
#[graphql(name = "NewActivityInput")]
pub struct NewActivityInput {
    pub name: String,
    pub description: Option<String>,
    #[graphql(name = "startDate")]
    pub start_date: NaiveDate,
    #[graphql(name = "endDate")]
    pub end_date: Option<NaiveDate>,
    #[graphql(name = "teamId")]
    pub team_id: ID,
    #[graphql(name = "proposalId")]
    pub proposal_id: Option<ID>,
}

#[derive(InputObject, Clone)]
#[graphql(name = "DocumentationInput")]
pub struct DocumentationInputGql {
    pub name: String,
    pub description: Option<String>,
}

impl From<DocumentationInputGql> for DocumentationInput {
    fn from(value: DocumentationInputGql) -> Self {
        DocumentationInput {
            name: value.name,
            description: value.description,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserNode {
    fn from(model: user::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            email: model.email,
            display_name: model.display_name,
            is_active: model.is_active,
            created_at: model.created_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub user: UserNode,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, SimpleObject, Default)]
pub struct AuthPayload {
    pub ok: bool,
    pub token: Option<String>,
    pub user: Option<UserNode>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn failed(message: &str) -> Self {
        Self {
            ok: false,
            token: None,
            user: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Team")]
pub struct TeamNode {
    pub id: ID,
    pub name: String,
    pub members: Vec<UserNode>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Proposal")]
pub struct ProposalNode {
    pub id: ID,
    pub title: String,
    #[graphql(name = "proposerName")]
    pub proposer_name: String,
    pub status: String,
}

impl From<proposal::Model> for ProposalNode {
    fn from(model: proposal::Model) -> Self {
        let status = match model.status {
            proposal::Status::Submitted => "SUBMITTED",
            proposal::Status::Approved => "APPROVED",
            proposal::Status::Rejected => "REJECTED",
        };
        Self {
            id: ID::from(model.id.to_string()),
            title: model.title,
            proposer_name: model.proposer_name,
            status: status.to_string(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Activity")]
pub struct ActivityNode {
    pub id: ID,
    pub name: String,
    pub description: Option<String>,
    pub stage: ActivityStage,
    #[graphql(name = "finalStatus")]
    pub final_status: Option<FinalStatus>,
    #[graphql(name = "startDate")]
    pub start_date: NaiveDate,
    #[graphql(name = "endDate")]
    pub end_date: Option<NaiveDate>,
    #[graphql(name = "teamId")]
    pub team_id: ID,
    #[graphql(name = "proposalId")]
    pub proposal_id: Option<ID>,
    #[graphql(name = "sktlUrl")]
    pub sktl_url: Option<String>,
    #[graphql(name = "handoverSktlUrl")]
    pub handover_sktl_url: Option<String>,
    pub team: Option<TeamNode>,
    pub proposal: Option<ProposalNode>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ActivityNode {
    fn from_model(model: activity::Model, base: &str) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            name: model.name,
            description: model.description,
            stage: model.stage.into(),
            final_status: model.final_status.map(Into::into),
            start_date: model.start_date,
            end_date: model.end_date,
            team_id: ID::from(model.team_id.to_string()),
            proposal_id: model.proposal_id.map(|id| ID::from(id.to_string())),
            sktl_url: model.sktl_path.as_deref().map(|p| public_url(base, p)),
            handover_sktl_url: model
                .handover_sktl_path
                .as_deref()
                .map(|p| public_url(base, p)),
            team: None,
            proposal: None,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "DocumentationPhoto")]
pub struct PhotoNode {
    pub id: ID,
    pub url: String,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Documentation")]
pub struct DocumentationNode {
    pub id: ID,
    pub name: String,
    pub description: Option<String>,
    pub kind: DocumentationKind,
    pub photos: Vec<PhotoNode>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Contract")]
pub struct ContractNode {
    #[graphql(name = "activityId")]
    pub activity_id: ID,
    pub name: String,
    pub url: String,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ContractNode {
    fn from_model(model: contract::Model, base: &str) -> Self {
        Self {
            activity_id: ID::from(model.activity_id.to_string()),
            name: model.name,
            url: public_url(base, &model.file_path),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "CompletionReport")]
pub struct CompletionReportNode {
    #[graphql(name = "activityId")]
    pub activity_id: ID,
    pub url: String,
    pub note: Option<String>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "ActivityDetail")]
pub struct ActivityDetail {
    pub activity: ActivityNode,
    pub documentation: Vec<DocumentationNode>,
    pub contract: Option<ContractNode>,
    #[graphql(name = "completionReport")]
    pub completion_report: Option<CompletionReportNode>,
    #[graphql(name = "createdBy")]
    pub created_by: Option<UserNode>,
}

/// Batches the team/member/proposal fetches so listings render without
/// per-row queries.
async fn load_activity_nodes(
    db: &DatabaseConnection,
    rows: Vec<activity::Model>,
    base: &str,
) -> async_graphql::Result<Vec<ActivityNode>> {
    let team_ids: HashSet<Uuid> = rows.iter().map(|row| row.team_id).collect();
    let proposal_ids: HashSet<Uuid> = rows.iter().filter_map(|row| row.proposal_id).collect();

    let teams = team::Entity::find()
        .filter(team::Column::Id.is_in(team_ids.iter().copied().collect::<Vec<_>>()))
        .all(db)
        .await
        .map_err(db_error)?;
    let memberships = team_member::Entity::find()
        .filter(team_member::Column::TeamId.is_in(team_ids.iter().copied().collect::<Vec<_>>()))
        .all(db)
        .await
        .map_err(db_error)?;
    let member_user_ids: Vec<Uuid> = memberships.iter().map(|m| m.user_id).collect();
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(member_user_ids))
        .all(db)
        .await
        .map_err(db_error)?;
    let user_map: HashMap<Uuid, user::Model> =
        users.into_iter().map(|u| (u.id, u)).collect();
    let mut members_by_team: HashMap<Uuid, Vec<UserNode>> = HashMap::new();
    for membership in memberships {
        if let Some(found) = user_map.get(&membership.user_id) {
            members_by_team
                .entry(membership.team_id)
                .or_default()
                .push(UserNode::from(found.clone()));
        }
    }
    let team_map: HashMap<Uuid, TeamNode> = teams
        .into_iter()
        .map(|t| {
            let members = members_by_team.remove(&t.id).unwrap_or_default();
            (
                t.id,
                TeamNode {
                    id: ID::from(t.id.to_string()),
                    name: t.name,
                    members,
                },
            )
        })
        .collect();

    let proposals = proposal::Entity::find()
        .filter(proposal::Column::Id.is_in(proposal_ids.iter().copied().collect::<Vec<_>>()))
        .all(db)
        .await
        .map_err(db_error)?;
    let proposal_map: HashMap<Uuid, ProposalNode> = proposals
        .into_iter()
        .map(|p| (p.id, ProposalNode::from(p)))
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| {
            let team = team_map.get(&row.team_id).cloned();
            let proposal = row.proposal_id.and_then(|id| proposal_map.get(&id).cloned());
            let mut node = ActivityNode::from_model(row, base);
            node.team = team;
            node.proposal = proposal;
            node
        })
        .collect())
}

async fn load_activity_detail(
    db: &DatabaseConnection,
    model: activity::Model,
    base: &str,
) -> async_graphql::Result<ActivityDetail> {
    let created_by = match model.created_by {
        Some(user_id) => user::Entity::find_by_id(user_id)
            .one(db)
            .await
            .map_err(db_error)?
            .map(UserNode::from),
        None => None,
    };

    let bundles = documentation::Entity::find()
        .filter(documentation::Column::ActivityId.eq(model.id))
        .order_by_asc(documentation::Column::CreatedAt)
        .all(db)
        .await
        .map_err(db_error)?;
    let bundle_ids: Vec<Uuid> = bundles.iter().map(|b| b.id).collect();
    let photos = documentation_photo::Entity::find()
        .filter(documentation_photo::Column::DocumentationId.is_in(bundle_ids))
        .order_by_asc(documentation_photo::Column::CreatedAt)
        .all(db)
        .await
        .map_err(db_error)?;
    let mut photos_by_bundle: HashMap<Uuid, Vec<PhotoNode>> = HashMap::new();
    for photo in photos {
        photos_by_bundle
            .entry(photo.documentation_id)
            .or_default()
            .push(PhotoNode {
                id: ID::from(photo.id.to_string()),
                url: public_url(base, &photo.file_path),
                created_at: photo.created_at.into(),
            });
    }
    let documentation = bundles
        .into_iter()
        .map(|bundle| DocumentationNode {
            id: ID::from(bundle.id.to_string()),
            name: bundle.name,
            description: bundle.description,
            kind: bundle.kind.into(),
            photos: photos_by_bundle.remove(&bundle.id).unwrap_or_default(),
            created_at: bundle.created_at.into(),
        })
        .collect();

    let contract = contract::Entity::find_by_id(model.id)
        .one(db)
        .await
        .map_err(db_error)?
        .map(|c| ContractNode::from_model(c, base));
    let completion_report = completion_report::Entity::find_by_id(model.id)
        .one(db)
        .await
        .map_err(db_error)?
        .map(|r| CompletionReportNode {
            activity_id: ID::from(r.activity_id.to_string()),
            url: public_url(base, &r.file_path),
            note: r.note,
            updated_at: r.updated_at.into(),
        });

    let nodes = load_activity_nodes(db, vec![model], base).await?;
    let activity = nodes
        .into_iter()
        .next()
        .ok_or_else(|| error_with_code("INTERNAL", "Failed to load activity"))?;

    Ok(ActivityDetail {
        activity,
        documentation,
        contract,
        completion_report,
        created_by,
    })
}

fn page(first: Option<i32>, offset: Option<i32>) -> (u64, u64) {
    let limit = first.unwrap_or(10).clamp(1, MAX_LIST_PAGE) as u64;
    let skip = offset.unwrap_or(0).max(0) as u64;
    (limit, skip)
}

fn read_upload(ctx: &Context<'_>, upload: Upload) -> async_graphql::Result<FilePayload> {
    let value = upload
        .value(ctx)
        .map_err(|_| error_with_code("VALIDATION", "Malformed file upload"))?;
    let file_name = value.filename.clone();
    let mut bytes = Vec::new();
    value
        .into_read()
        .read_to_end(&mut bytes)
        .map_err(|_| error_with_code("VALIDATION", "Failed to read file upload"))?;
    Ok(FilePayload { file_name, bytes })
}

fn read_uploads(
    ctx: &Context<'_>,
    uploads: Vec<Upload>,
) -> async_graphql::Result<Vec<FilePayload>> {
    uploads
        .into_iter()
        .map(|upload| read_upload(ctx, upload))
        .collect()
}

async fn load_roles(db: &DatabaseConnection, user_id: Uuid) -> async_graphql::Result<Vec<UserRole>> {
    let rows = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await
        .map_err(db_error)?;
    Ok(rows
        .into_iter()
        .map(|row| match row.role {
            user_role::Role::Admin => UserRole::Admin,
            user_role::Role::Supervisor => UserRole::Supervisor,
            user_role::Role::Employee => UserRole::Employee,
        })
        .collect())
}

fn normalize_email(email: &str) -> async_graphql::Result<String> {
    let trimmed = email.trim().to_lowercase();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(error_with_code("VALIDATION", "email: invalid address"));
    }
    Ok(trimmed)
}

fn append_session_cookie(ctx: &Context<'_>, token: &str, ttl_minutes: i64) {
    let max_age = (ttl_minutes * 60).max(-1);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    );
    ctx.append_http_header("Set-Cookie", cookie);
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing database connection"))
}

fn auth_config(ctx: &Context<'_>) -> async_graphql::Result<Arc<AuthConfig>> {
    ctx.data::<Arc<AuthConfig>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing auth configuration"))
}

fn uploads(ctx: &Context<'_>) -> async_graphql::Result<Arc<Uploads>> {
    ctx.data::<Arc<Uploads>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing upload store"))
}

fn current_user(ctx: &Context<'_>) -> async_graphql::Result<CurrentUser> {
    ctx.data::<CurrentUser>()
        .cloned()
        .map_err(|_| error_with_code("UNAUTHENTICATED", "Login required"))
}

fn require_role(ctx: &Context<'_>, role: UserRole) -> async_graphql::Result<CurrentUser> {
    let viewer = current_user(ctx)?;
    if viewer.has_role(role) {
        Ok(viewer)
    } else {
        Err(error_with_code("FORBIDDEN", "Insufficient permissions"))
    }
}

fn require_viewer(ctx: &Context<'_>) -> async_graphql::Result<CurrentUser> {
    require_role(ctx, UserRole::Employee)
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| error_with_code("BAD_REQUEST", "Invalid ID"))
}

fn db_error(err: DbErr) -> Error {
    error_with_code("INTERNAL", format!("Database error: {}", err))
}

fn workflow_error(err: WorkflowError) -> Error {
    match &err {
        WorkflowError::NotFound | WorkflowError::ProposalNotFound => {
            error_with_code("NOT_FOUND", err.to_string())
        }
        WorkflowError::WrongStage { .. } => error_with_code("CONFLICT", err.to_string()),
        WorkflowError::Validation(_) | WorkflowError::ProposalNotApproved => {
            error_with_code("VALIDATION", err.to_string())
        }
        WorkflowError::NotTeamMember => error_with_code("FORBIDDEN", err.to_string()),
        WorkflowError::Storage(_) | WorkflowError::Db(_) => {
            error_with_code("INTERNAL", err.to_string())
        }
    }
}

fn error_with_code(code: &'static str, message: impl Into<String>) -> Error {
    Error::new(message).extend_with(|_, e| e.set("code", code))
}

#[derive(Debug, Clone)]
pub struct SeededRecords {
    pub users: Vec<user::Model>,
    pub teams: Vec<team::Model>,
    pub proposals: Vec<proposal::Model>,
    pub activities: Vec<activity::Model>,
}

impl SeededRecords {
    pub fn user_email(&self, email: &str) -> Option<&user::Model> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn team_named(&self, name: &str) -> Option<&team::Model> {
        self.teams.iter().find(|t| t.name == name)
    }

    pub fn activity_named(&self, name: &str) -> Option<&activity::Model> {
        self.activities.iter().find(|a| a.name == name)
    }
}

/// Demo data: one team, users for each role, an approved proposal and
/// activities spread across the workflow stages.
pub async fn seed_demo(db: &DatabaseConnection) -> Result<SeededRecords, DbErr> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    let admin = insert_seed_user(db, "admin@dinas.test", "Admin Utama", &[user_role::Role::Admin], "adminpass").await?;
    let kabid = insert_seed_user(
        db,
        "kabid@dinas.test",
        "Kabid Rahma",
        &[user_role::Role::Supervisor],
        "kabidpass",
    )
    .await?;
    let sari = insert_seed_user(
        db,
        "sari@dinas.test",
        "Sari Pegawai",
        &[user_role::Role::Employee],
        "pegawaipass",
    )
    .await?;
    let budi = insert_seed_user(
        db,
        "budi@dinas.test",
        "Budi Pegawai",
        &[user_role::Role::Employee],
        "pegawaipass",
    )
    .await?;

    let field_team = team::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Tim Lapangan A".into()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    for member in [&sari, &budi] {
        team_member::ActiveModel {
            team_id: Set(field_team.id),
            user_id: Set(member.id),
        }
        .insert(db)
        .await?;
    }

    let approved = proposal::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set("Pengadaan bibit mangrove".into()),
        proposer_name: Set("Kelurahan Pesisir".into()),
        status: Set(proposal::Status::Approved),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    let pending = proposal::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set("Penanaman pohon kota".into()),
        proposer_name: Set("RW 04".into()),
        status: Set(proposal::Status::Submitted),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    let mut activities = Vec::new();
    let specs: [(&str, activity::Stage, Option<activity::FinalStatus>); 5] = [
        ("Survei lokasi mangrove", activity::Stage::AwaitingConfirmation, None),
        ("Observasi kebun bibit", activity::Stage::ObservationDocs, None),
        (
            "Verifikasi lahan tanam",
            activity::Stage::AwaitingSupervisorReview,
            None,
        ),
        ("Penyerahan bantuan alat", activity::Stage::HandoverDocs, None),
        (
            "Penyuluhan kompos selesai",
            activity::Stage::Done,
            Some(activity::FinalStatus::Completed),
        ),
    ];
    for (idx, (name, stage, final_status)) in specs.into_iter().enumerate() {
        let created: DateTimeWithTimeZone =
            (Utc::now() - chrono::Duration::days(30 - idx as i64)).into();
        let model = activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.into()),
            description: Set(Some("Kegiatan lapangan dinas".into())),
            stage: Set(stage),
            final_status: Set(final_status),
            start_date: Set((Utc::now() + chrono::Duration::days(idx as i64)).date_naive()),
            end_date: Set(None),
            team_id: Set(field_team.id),
            proposal_id: Set(Some(approved.id)),
            sktl_path: Set(None),
            handover_sktl_path: Set(None),
            created_by: Set(Some(kabid.id)),
            created_at: Set(created),
            updated_at: Set(created),
        }
        .insert(db)
        .await?;
        activities.push(model);
    }

    Ok(SeededRecords {
        users: vec![admin, kabid, sari, budi],
        teams: vec![field_team],
        proposals: vec![approved, pending],
        activities,
    })
}

async fn insert_seed_user(
    db: &DatabaseConnection,
    email: &str,
    display_name: &str,
    roles: &[user_role::Role],
    password: &str,
) -> Result<user::Model, DbErr> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        display_name: Set(display_name.to_string()),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    user_secret::ActiveModel {
        user_id: Set(model.id),
        password_hash: Set(hash_password(password)?),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    for role in roles {
        user_role::ActiveModel {
            user_id: Set(model.id),
            role: Set(*role),
        }
        .insert(db)
        .await?;
    }
    Ok(model)
}

fn hash_password(password: &str) -> Result<String, DbErr> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| DbErr::Custom(format!("hash error: {}", err)))
}
