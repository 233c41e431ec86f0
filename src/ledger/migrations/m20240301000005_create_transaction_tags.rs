//! Free-form tags attached to transactions

use crate::migration::{Migration, MigrationError, SchemaManager};
use sea_query::{ColumnDef, Expr, ForeignKey, ForeignKeyAction, Index, Table};

pub const ID: &str = "m20240301000005_create_transaction_tags";

const TABLE: &str = "transaction_tags";

pub struct CreateTransactionTags;

impl Migration for CreateTransactionTags {
    fn id(&self) -> &str {
        ID
    }

    fn predecessor(&self) -> Option<&str> {
        Some(super::m20240301000004_create_transactions::ID)
    }

    fn description(&self) -> &str {
        "Create transaction_tags"
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        let table = Table::create()
            .table(TABLE)
            .if_not_exists()
            .col(ColumnDef::new("transaction_id").uuid().not_null())
            .col(ColumnDef::new("tag").string_len(64).not_null())
            .col(
                ColumnDef::new("created_at")
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .primary_key(Index::create().col("transaction_id").col("tag"))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_transaction_tags_transaction_id")
                    .from(TABLE, "transaction_id")
                    .to("transactions", "id")
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table)?;

        let index = Index::create()
            .if_not_exists()
            .name("idx_transaction_tags_tag")
            .table(TABLE)
            .col("tag")
            .to_owned();
        manager.create_index(index)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_table(Table::drop().table(TABLE).if_exists().to_owned())?;
        Ok(())
    }
}
