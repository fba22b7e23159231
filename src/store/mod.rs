pub mod model;
pub mod notifier;
pub mod store;

pub use model::*;
pub use notifier::Notifier;
pub use store::Store;
