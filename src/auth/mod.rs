//! Upload credentials: argon2 password hashes checked over HTTP Basic auth.

pub mod password;
pub mod users;
