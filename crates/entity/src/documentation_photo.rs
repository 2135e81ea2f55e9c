use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "documentation_photo")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub documentation_id: Uuid,
    pub file_path: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::documentation::Entity",
        from = "Column::DocumentationId",
        to = "super::documentation::Column::Id",
        on_delete = "Cascade"
    )]
    Documentation,
}

impl Related<super::documentation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documentation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
