// Core services
pub mod customers;
pub mod orders;
pub mod products;
pub mod reports;

// Stock ledger helpers shared by the order workflow
pub mod stock;
