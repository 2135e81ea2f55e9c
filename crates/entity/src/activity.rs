use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "activity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub stage: Stage,
    pub final_status: Option<FinalStatus>,
    pub start_date: Date,
    pub end_date: Option<Date>,
    #[sea_orm(indexed)]
    pub team_id: Uuid,
    #[sea_orm(indexed)]
    pub proposal_id: Option<Uuid>,
    /// Stored path of the supervisor's observation approval document (SKTL).
    pub sktl_path: Option<String>,
    pub handover_sktl_path: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::TeamId",
        to = "super::team::Column::Id"
    )]
    Team,
    #[sea_orm(
        belongs_to = "super::proposal::Entity",
        from = "Column::ProposalId",
        to = "super::proposal::Column::Id",
        on_delete = "SetNull"
    )]
    Proposal,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    CreatedByUser,
    #[sea_orm(has_many = "super::documentation::Entity")]
    Documentation,
    #[sea_orm(has_one = "super::contract::Entity")]
    Contract,
    #[sea_orm(has_one = "super::completion_report::Entity")]
    CompletionReport,
}

impl Related<super::team::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

impl Related<super::proposal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Proposal.def()
    }
}

impl Related<super::documentation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documentation.def()
    }
}

impl Related<super::contract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contract.def()
    }
}

impl Related<super::completion_report::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CompletionReport.def()
    }
}

/// Workflow position of an activity. The ordering is fixed; transitions are
/// validated against the table in `api::workflow`.
#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum Stage {
    #[sea_orm(string_value = "AWAITING_CONFIRMATION")]
    AwaitingConfirmation,
    #[sea_orm(string_value = "OBSERVATION_DOCS")]
    ObservationDocs,
    #[sea_orm(string_value = "AWAITING_SUPERVISOR_REVIEW")]
    AwaitingSupervisorReview,
    #[sea_orm(string_value = "HANDOVER_DOCS")]
    HandoverDocs,
    #[sea_orm(string_value = "COMPLETION")]
    Completion,
    #[sea_orm(string_value = "DONE")]
    Done,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum FinalStatus {
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

impl ActiveModelBehavior for ActiveModel {}
