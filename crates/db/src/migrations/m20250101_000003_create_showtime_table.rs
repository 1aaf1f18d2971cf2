//! Create showtime table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Showtime::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Showtime::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Showtime::MovieId).integer().not_null())
                    .col(
                        ColumnDef::new(Showtime::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Showtime::Screen).string_len(128).not_null())
                    .col(ColumnDef::new(Showtime::Location).string_len(256).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_showtime_movie")
                            .from(Showtime::Table, Showtime::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: starts_at (window range scans)
        manager
            .create_index(
                Index::create()
                    .name("idx_showtime_starts_at")
                    .table(Showtime::Table)
                    .col(Showtime::StartsAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_showtime_movie_id")
                    .table(Showtime::Table)
                    .col(Showtime::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Showtime::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Showtime {
    Table,
    Id,
    MovieId,
    StartsAt,
    Screen,
    Location,
}

#[derive(Iden)]
enum Movie {
    Table,
    Id,
}
