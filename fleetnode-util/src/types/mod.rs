mod api_key;
mod udid;

pub use api_key::ApiKey;
pub use udid::Udid;
