pub mod directory;
pub mod driver;
pub mod file;
pub mod flags;
pub mod handle;
pub mod path;

pub use directory::DirectoryHandle;
pub use driver::Driver;
pub use flags::OpenFlags;
pub use handle::{DirectoryListable, Handle, Readable, Writable};
