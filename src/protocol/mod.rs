pub mod ack;
pub mod command;
pub mod frame;
pub mod parse;
pub mod version;

pub use ack::AckError;
pub use command::{filter_and, filter_eq, quote, Command, CommandList, Request};
pub use frame::{Frame, Response, ResponseDecoder};
pub use version::ProtocolVersion;
