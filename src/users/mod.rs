pub mod password;
pub mod repo;
pub mod repo_types;
pub mod tokens;

pub use password::{hash_password, Argon2Verifier, PasswordVerifier};
pub use repo::UserRepository;
pub use repo_types::{role, status, User};
pub use tokens::{IssuedToken, TokenPolicy};
