pub mod fs;
pub mod transfer;
pub mod user;
