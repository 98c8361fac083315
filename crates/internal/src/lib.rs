//! Internal parsing utilities shared between the nmoscm crates.

mod error;
mod ws;

pub type IResult<I, O> = nom::IResult<I, O, ParseError>;
pub use error::ParseError;
pub use nom::Finish;
pub use ws::ws;
