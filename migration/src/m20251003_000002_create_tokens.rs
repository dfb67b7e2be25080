use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Tokens {
    Table,
    Id,
    PrizeId,
    BatchId,
    ExpiresAt,
    SignedExpiresAt,
    Signature,
    SignatureVersion,
    Disabled,
    AvailableFrom,
    RedeemedAt,
    PairedNextTokenId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Batches {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Tokens 表（初版：一阶段 redeem）
/// id 为随机不透明字符串，同时也是持有人凭证，不使用自增主键
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tokens::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tokens::PrizeId).big_integer().not_null())
                    .col(ColumnDef::new(Tokens::BatchId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Tokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::SignedExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tokens::Signature).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Tokens::SignatureVersion)
                            .small_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Tokens::Disabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tokens::AvailableFrom)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::RedeemedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::PairedNextTokenId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // 不级联删除：批次删除属于外部管理操作
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tokens_prize")
                            .from(Tokens::Table, Tokens::PrizeId)
                            .to(Prizes::Table, Prizes::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tokens_batch")
                            .from(Tokens::Table, Tokens::BatchId)
                            .to(Batches::Table, Batches::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tokens_batch")
                    .table(Tokens::Table)
                    .col(Tokens::BatchId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tokens_prize")
                    .table(Tokens::Table)
                    .col(Tokens::PrizeId)
                    .to_owned(),
            )
            .await?;

        // 失效扫描按 paired_next_token_id 反查
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tokens_paired_next")
                    .table(Tokens::Table)
                    .col(Tokens::PairedNextTokenId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Tokens::Table).to_owned())
            .await?;
        Ok(())
    }
}
