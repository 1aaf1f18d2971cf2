//! Create vote table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vote::UserId).integer().not_null())
                    .col(ColumnDef::new(Vote::ShowtimeId).integer().not_null())
                    .col(ColumnDef::new(Vote::Value).integer().not_null())
                    .primary_key(Index::create().col(Vote::UserId).col(Vote::ShowtimeId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_user")
                            .from(Vote::Table, Vote::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_showtime")
                            .from(Vote::Table, Vote::ShowtimeId)
                            .to(Showtime::Table, Showtime::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: showtime_id (tally aggregation)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_showtime_id")
                    .table(Vote::Table)
                    .col(Vote::ShowtimeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Vote {
    Table,
    UserId,
    ShowtimeId,
    Value,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Showtime {
    Table,
    Id,
}
