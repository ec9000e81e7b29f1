pub mod invoice;
pub mod invoice_item;
pub mod invoice_photo;
pub mod product;
pub mod product_category;
pub mod stock_level;
pub mod stock_movement;
