mod user;

pub use user::{ProfileRecord, User, UserRole};
