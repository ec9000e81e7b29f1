use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockLevels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockLevels::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockLevels::AgentId).uuid().not_null())
                    .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(StockLevels::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockLevels::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // One balance row per (agent, product); the ledger relies on it.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_stock_levels_agent_product")
                    .table(StockLevels::Table)
                    .col(StockLevels::AgentId)
                    .col(StockLevels::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::AgentId).uuid().not_null())
                    .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                    .col(ColumnDef::new(StockMovements::Kind).string().not_null())
                    .col(
                        ColumnDef::new(StockMovements::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::ReferenceKind).string().null())
                    .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                    .col(ColumnDef::new(StockMovements::Note).text().null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_movements_agent_product")
                    .table(StockMovements::Table)
                    .col(StockMovements::AgentId)
                    .col(StockMovements::ProductId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(StockLevels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockLevels {
    Table,
    Id,
    AgentId,
    ProductId,
    Quantity,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    Id,
    AgentId,
    ProductId,
    Kind,
    Quantity,
    ReferenceKind,
    ReferenceId,
    Note,
    CreatedAt,
}
