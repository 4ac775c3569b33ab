pub mod crypto;
pub mod dirs;
pub mod duration;
pub mod fs;
pub mod http;
pub mod store;
pub mod types;
