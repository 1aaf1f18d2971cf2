//! Insert the reserved system user that owns lock votes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Id 0 sits below the serial sequence, so it never collides with a real user.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                INSERT INTO "user" (id, name, email, weekly_notification, lock_notification, activity_notification)
                VALUES (0, 'System', 'system@localhost', false, false, false)
                ON CONFLICT (id) DO NOTHING;
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(r#"DELETE FROM "user" WHERE id = 0;"#)
            .await?;

        Ok(())
    }
}
