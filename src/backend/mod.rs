pub mod events;
pub mod local;
pub mod provider;

pub use events::*;
pub use local::*;
pub use provider::*;
