pub mod client;
pub mod extract;
pub mod media;

pub use extract::AuthUser;
