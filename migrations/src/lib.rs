pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_product_catalog_tables;
mod m20250301_000002_create_invoices_table;
mod m20250301_000003_create_invoice_items_table;
mod m20250301_000004_create_stock_tables;
mod m20250301_000005_create_invoice_photos_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_product_catalog_tables::Migration),
            Box::new(m20250301_000002_create_invoices_table::Migration),
            Box::new(m20250301_000003_create_invoice_items_table::Migration),
            Box::new(m20250301_000004_create_stock_tables::Migration),
            Box::new(m20250301_000005_create_invoice_photos_table::Migration),
        ]
    }
}
