pub mod capture;
pub mod categories;
pub mod classifier;
pub mod invoices;
pub mod products;
pub mod stock;
