pub mod multipart;
pub mod services;

pub use multipart::MultipartForm;
pub use services::{AssetManager, UploadItem};
