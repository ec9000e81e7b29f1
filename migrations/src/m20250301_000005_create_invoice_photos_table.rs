use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InvoicePhotos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoicePhotos::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoicePhotos::AgentId).uuid().not_null())
                    .col(
                        ColumnDef::new(InvoicePhotos::StoragePath)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoicePhotos::ContentHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoicePhotos::OcrStatus)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(InvoicePhotos::InvoiceId).uuid().null())
                    .col(
                        ColumnDef::new(InvoicePhotos::CreatedAt)
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
                    .name("idx_invoice_photos_content_hash")
                    .table(InvoicePhotos::Table)
                    .col(InvoicePhotos::ContentHash)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoicePhotos::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InvoicePhotos {
    Table,
    Id,
    AgentId,
    StoragePath,
    ContentHash,
    OcrStatus,
    InvoiceId,
    CreatedAt,
}
