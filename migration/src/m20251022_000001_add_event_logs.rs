use sea_orm_migration::prelude::*;

/// 追加写入的业务事件日志（审计）
#[derive(DeriveIden)]
enum EventLogs {
    Table,
    Id,
    Kind,
    Message,
    Metadata,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventLogs::Kind).string_len(64).not_null())
                    .col(ColumnDef::new(EventLogs::Message).text().not_null())
                    .col(ColumnDef::new(EventLogs::Metadata).json().null())
                    .col(
                        ColumnDef::new(EventLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_logs_kind")
                    .table(EventLogs::Table)
                    .col(EventLogs::Kind)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(EventLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}
