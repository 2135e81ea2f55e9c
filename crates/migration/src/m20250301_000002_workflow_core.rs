use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Proposal {
    Table,
    Id,
    Title,
    ProposerName,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Activity {
    Table,
    Id,
    Name,
    Description,
    Stage,
    FinalStatus,
    StartDate,
    EndDate,
    TeamId,
    ProposalId,
    SktlPath,
    HandoverSktlPath,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Documentation {
    Table,
    Id,
    ActivityId,
    Name,
    Description,
    Kind,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DocumentationPhoto {
    Table,
    Id,
    DocumentationId,
    FilePath,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Contract {
    Table,
    ActivityId,
    Name,
    FilePath,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CompletionReport {
    Table,
    ActivityId,
    FilePath,
    Note,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Team {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Proposal::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Proposal::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("gen_random_uuid()")),
                    )
                    .col(ColumnDef::new(Proposal::Title).string_len(300).not_null())
                    .col(
                        ColumnDef::new(Proposal::ProposerName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Proposal::Status)
                            .string_len(16)
                            .not_null()
                            .default("SUBMITTED"),
                    )
                    .col(
                        ColumnDef::new(Proposal::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .col(
                        ColumnDef::new(Proposal::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Activity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Activity::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("gen_random_uuid()")),
                    )
                    .col(ColumnDef::new(Activity::Name).string_len(300).not_null())
                    .col(ColumnDef::new(Activity::Description).text())
                    .col(
                        ColumnDef::new(Activity::Stage)
                            .string_len(32)
                            .not_null()
                            .default("AWAITING_CONFIRMATION"),
                    )
                    .col(ColumnDef::new(Activity::FinalStatus).string_len(16))
                    .col(ColumnDef::new(Activity::StartDate).date().not_null())
                    .col(ColumnDef::new(Activity::EndDate).date())
                    .col(ColumnDef::new(Activity::TeamId).uuid().not_null())
                    .col(ColumnDef::new(Activity::ProposalId).uuid())
                    .col(ColumnDef::new(Activity::SktlPath).string_len(512))
                    .col(ColumnDef::new(Activity::HandoverSktlPath).string_len(512))
                    .col(ColumnDef::new(Activity::CreatedBy).uuid())
                    .col(
                        ColumnDef::new(Activity::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .col(
                        ColumnDef::new(Activity::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_team")
                            .from(Activity::Table, Activity::TeamId)
                            .to(Team::Table, Team::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_proposal")
                            .from(Activity::Table, Activity::ProposalId)
                            .to(Proposal::Table, Proposal::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_created_by")
                            .from(Activity::Table, Activity::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_activity_stage")
                    .table(Activity::Table)
                    .col(Activity::Stage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_activity_team")
                    .table(Activity::Table)
                    .col(Activity::TeamId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_activity_updated_at")
                    .table(Activity::Table)
                    .col(Activity::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Documentation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Documentation::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("gen_random_uuid()")),
                    )
                    .col(ColumnDef::new(Documentation::ActivityId).uuid().not_null())
                    .col(
                        ColumnDef::new(Documentation::Name)
                            .string_len(300)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Documentation::Description).text())
                    .col(ColumnDef::new(Documentation::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Documentation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documentation_activity")
                            .from(Documentation::Table, Documentation::ActivityId)
                            .to(Activity::Table, Activity::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_documentation_activity")
                    .table(Documentation::Table)
                    .col(Documentation::ActivityId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DocumentationPhoto::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DocumentationPhoto::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("gen_random_uuid()")),
                    )
                    .col(
                        ColumnDef::new(DocumentationPhoto::DocumentationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DocumentationPhoto::FilePath)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DocumentationPhoto::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documentation_photo_documentation")
                            .from(
                                DocumentationPhoto::Table,
                                DocumentationPhoto::DocumentationId,
                            )
                            .to(Documentation::Table, Documentation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_documentation_photo_documentation")
                    .table(DocumentationPhoto::Table)
                    .col(DocumentationPhoto::DocumentationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contract::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contract::ActivityId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Contract::Name).string_len(300).not_null())
                    .col(ColumnDef::new(Contract::FilePath).string_len(512).not_null())
                    .col(
                        ColumnDef::new(Contract::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contract_activity")
                            .from(Contract::Table, Contract::ActivityId)
                            .to(Activity::Table, Activity::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CompletionReport::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CompletionReport::ActivityId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CompletionReport::FilePath)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CompletionReport::Note).text())
                    .col(
                        ColumnDef::new(CompletionReport::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("now()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_completion_report_activity")
                            .from(CompletionReport::Table, CompletionReport::ActivityId)
                            .to(Activity::Table, Activity::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CompletionReport::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contract::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DocumentationPhoto::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Documentation::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Activity::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Proposal::Table).to_owned())
            .await?;
        Ok(())
    }
}
