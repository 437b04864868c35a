//! Shared application services used across clients.

mod crm;
mod store;

pub use crm::CrmService;
pub use store::StoreService;
