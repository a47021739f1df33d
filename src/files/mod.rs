// User files: local and cloud references, collections and the file manager

mod collection;
mod manager;
mod user_file;

pub use collection::{FileCollection, DEFAULT_QUERY_BATCH, MAX_UPLOAD_THREADS};
pub use manager::FileManager;
pub use user_file::{UploadOutcome, UserFile};
