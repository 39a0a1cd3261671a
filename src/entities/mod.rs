pub mod customer;
pub mod daily_sales_summary;
pub mod order;
pub mod order_item;
pub mod product;
pub mod tenant;
