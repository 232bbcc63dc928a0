pub mod application;
pub mod permission;
pub mod token;
pub mod user;

pub use application::Application;
pub use permission::Permission;
pub use token::TokenPair;
pub use user::{User, UserWithGrants};
