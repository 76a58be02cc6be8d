pub mod metadata;
pub mod optimizer;
pub mod session;
pub mod sync;
pub mod user;

pub use metadata::MetadataService;
pub use optimizer::StorageOptimizer;
pub use session::SessionFactory;
pub use sync::DeletionSync;
pub use user::UserService;
