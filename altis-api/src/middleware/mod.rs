pub mod auth;

pub use auth::{AdminCaller, Caller, CustomerClaims, ServiceCaller};
