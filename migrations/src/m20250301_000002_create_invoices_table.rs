use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Invoices::AgentId).uuid().not_null())
                    .col(ColumnDef::new(Invoices::Supplier).string().null())
                    .col(ColumnDef::new(Invoices::DocumentType).string().null())
                    .col(ColumnDef::new(Invoices::InvoiceNumber).string().null())
                    .col(ColumnDef::new(Invoices::InvoiceDate).date().null())
                    .col(ColumnDef::new(Invoices::ClientName).string().null())
                    .col(
                        ColumnDef::new(Invoices::TotalExclTax)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(Invoices::TotalTax).decimal_len(16, 4).null())
                    .col(
                        ColumnDef::new(Invoices::TotalInclTax)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(Invoices::DeliveryLocation).string().null())
                    .col(ColumnDef::new(Invoices::RawExtraction).json().null())
                    // Status is first-class and required: every invoice starts pending.
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Invoices::DeliveredAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Invoices::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Invoices::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoices_agent_id")
                    .table(Invoices::Table)
                    .col(Invoices::AgentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoices_status")
                    .table(Invoices::Table)
                    .col(Invoices::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
    AgentId,
    Supplier,
    DocumentType,
    InvoiceNumber,
    InvoiceDate,
    ClientName,
    TotalExclTax,
    TotalTax,
    TotalInclTax,
    DeliveryLocation,
    RawExtraction,
    Status,
    DeliveredAt,
    CreatedAt,
    UpdatedAt,
}
