//! Create rsvp table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rsvp::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rsvp::UserId).integer().not_null())
                    .col(ColumnDef::new(Rsvp::ShowtimeId).integer().not_null())
                    .col(ColumnDef::new(Rsvp::Value).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Rsvp::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(Index::create().col(Rsvp::UserId).col(Rsvp::ShowtimeId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rsvp_user")
                            .from(Rsvp::Table, Rsvp::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rsvp_showtime")
                            .from(Rsvp::Table, Rsvp::ShowtimeId)
                            .to(Showtime::Table, Showtime::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Rsvp::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Rsvp {
    Table,
    UserId,
    ShowtimeId,
    Value,
    UpdatedAt,
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
