#![warn(unreachable_pub)]
//! Parsing of the small subset of SDP ([RFC8866](https://www.rfc-editor.org/rfc/rfc8866.html))
//! needed to derive a receiver's transport parameters from an uploaded transport file.
//!
//! Only `m=`, `c=` and `a=source-filter` carry meaning here; every other line type is
//! recognised and discarded. This is deliberately not a general purpose SDP library.

mod address;
mod media;
mod parser;
mod source_filter;

pub use media::MediaType;
pub use parser::{ParseSdpError, Source, parse};

fn not_whitespace(c: char) -> bool {
    !c.is_ascii_whitespace()
}
