pub mod netid;
pub mod notify;
pub mod store;
