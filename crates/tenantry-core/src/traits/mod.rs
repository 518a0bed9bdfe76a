pub mod access;
pub mod publisher;

pub use access::{AccessPolicy, AllowAll, PermissionPolicy};
pub use publisher::FactPublisher;
