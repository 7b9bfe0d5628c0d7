pub mod catalog;
pub mod ledger;
pub mod payment_gateway;
