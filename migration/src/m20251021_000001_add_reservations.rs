use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Reservations {
    Table,
    Id,
    HostName,
    HostArrivedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tokens {
    Table,
    ReservationId,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 预订（到场事件驱动 token 过期时间重算）
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reservations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Reservations::HostName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::HostArrivedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        if !manager.has_column("tokens", "reservation_id").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tokens::Table)
                        .add_column(ColumnDef::new(Tokens::ReservationId).big_integer().null())
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tokens_reservation")
                    .table(Tokens::Table)
                    .col(Tokens::ReservationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Reservations::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
