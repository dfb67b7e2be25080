pub use sea_orm_migration::prelude::*;

mod m20251003_000001_create_prizes_and_batches;
mod m20251003_000002_create_tokens;
mod m20251016_000001_add_two_phase_redemption;
mod m20251021_000001_add_reservations;
mod m20251022_000001_add_event_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251003_000001_create_prizes_and_batches::Migration),
            Box::new(m20251003_000002_create_tokens::Migration),
            Box::new(m20251016_000001_add_two_phase_redemption::Migration),
            Box::new(m20251021_000001_add_reservations::Migration),
            Box::new(m20251022_000001_add_event_logs::Migration),
        ]
    }
}
