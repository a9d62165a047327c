pub mod audit;
pub mod booking;
pub mod credit;
pub mod error;
pub mod ledger;
pub mod money;
pub mod ports;
pub mod reference;
pub mod refund;
pub mod store;
