use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Tokens {
    Table,
    RevealedAt,
    DeliveredAt,
    AssignedPrizeId,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 两阶段兑换：reveal（持有人查看奖品）与 deliver（员工确认交付）分离。
/// 旧的 redeemed_at 保留，历史数据由 backfill 收敛。
/// SQLite 的 ALTER TABLE 每次只能加一列，因此逐列执行。
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if !manager.has_column("tokens", "revealed_at").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tokens::Table)
                        .add_column(
                            ColumnDef::new(Tokens::RevealedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;
        }

        if !manager.has_column("tokens", "delivered_at").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tokens::Table)
                        .add_column(
                            ColumnDef::new(Tokens::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;
        }

        if !manager.has_column("tokens", "assigned_prize_id").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tokens::Table)
                        .add_column(ColumnDef::new(Tokens::AssignedPrizeId).big_integer().null())
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        Ok(())
    }
}
