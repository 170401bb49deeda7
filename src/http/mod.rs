//! Wire codec: request decoding and response encoding.

mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{ParseError, Request};
pub use response::Response;
