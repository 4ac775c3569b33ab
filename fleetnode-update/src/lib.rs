/*
Firmware updates triggered by the remote.

The controller decides where the image comes from, first the location named
by the remote and then a fixed secondary provider, while the applier knows how
to fetch an image and hand it over to the system.

Images are neither verified nor rolled back.
*/

mod applier;
mod controller;
mod http;

pub use applier::{ImageApplier, UpdateError, UpdateOutcome, UpdateRequest};
pub use controller::{UpdateConfig, UpdateController};
pub use http::HttpApplier;
