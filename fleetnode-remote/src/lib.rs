/*
Everything related to the remote management service.

The registration client checks the device in with its current identity and
returns the raw answer, the interpreter turns that answer (or any payload
pushed by the remote later on) into the action the agent should take.
*/

mod checkin;
mod config;
mod interpret;
mod transport;

pub use checkin::{RawResponse, RegistrationClient, TransportError};
pub use config::{BuildInfo, RegistrationConfig};
pub use interpret::{Action, Interpreter, ParseError};
pub use transport::{TcpTransport, Transport};
