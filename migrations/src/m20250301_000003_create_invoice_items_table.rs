use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InvoiceItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceItems::InvoiceId).uuid().not_null())
                    .col(ColumnDef::new(InvoiceItems::ProductId).uuid().null())
                    .col(ColumnDef::new(InvoiceItems::Reference).string().not_null())
                    .col(
                        ColumnDef::new(InvoiceItems::Designation)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceItems::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceItems::UnitPrice)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceItems::LineTotal)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(InvoiceItems::Depot).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_items_invoice_id")
                            .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoice_items_invoice_id")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::InvoiceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InvoiceItems {
    Table,
    Id,
    InvoiceId,
    ProductId,
    Reference,
    Designation,
    Quantity,
    UnitPrice,
    LineTotal,
    Depot,
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
}
