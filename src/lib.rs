pub mod config;
pub mod db;
pub mod error;
pub mod users;

pub use error::RepositoryError;
pub use users::{User, UserRepository};
