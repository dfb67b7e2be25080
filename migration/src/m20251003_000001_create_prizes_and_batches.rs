use sea_orm_migration::prelude::*;

/// Prizes (奖品及库存台账)
#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
    Key,
    Label,
    Color,
    Kind,
    Stock,
    EmittedTotal,
    LastEmittedAt,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// Batches (一次生成事件)
#[derive(DeriveIden)]
enum Batches {
    Table,
    Id,
    Description,
    FunctionalDate,
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
                    .table(Prizes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Prizes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Prizes::Key).string_len(64).not_null())
                    .col(ColumnDef::new(Prizes::Label).string_len(255).not_null())
                    .col(ColumnDef::new(Prizes::Color).string_len(32).null())
                    .col(
                        ColumnDef::new(Prizes::Kind)
                            .string_len(16)
                            .not_null()
                            .default("standard"),
                    )
                    .col(
                        ColumnDef::new(Prizes::Stock)
                            .big_integer()
                            .null(), // NULL = 不受管理（无限）
                    )
                    .col(
                        ColumnDef::new(Prizes::EmittedTotal)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Prizes::LastEmittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Prizes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Prizes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Prizes::UpdatedAt)
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
                    .name("idx_prizes_key_unique")
                    .table(Prizes::Table)
                    .col(Prizes::Key)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Batches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Batches::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Batches::Description).text().null())
                    .col(ColumnDef::new(Batches::FunctionalDate).date().null())
                    .col(
                        ColumnDef::new(Batches::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 日报按 functional_date 聚合
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_batches_functional_date")
                    .table(Batches::Table)
                    .col(Batches::FunctionalDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Batches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Prizes::Table).to_owned())
            .await?;
        Ok(())
    }
}
