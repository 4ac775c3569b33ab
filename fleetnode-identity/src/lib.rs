/*
Everything related to the identity of the device: the fields that authenticate
and label the node with the remote management service, how they are restored
from persistent storage on boot and how updates coming from the remote are
merged into them.
*/

mod identity;
mod medium;
mod store;

pub use identity::{DeviceIdentity, IdentityChanges, IdentityUpdate};
pub use medium::{IdentityRecord, RecordMedium};
pub use store::{IdentityStore, StorageError};
