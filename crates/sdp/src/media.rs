use crate::not_whitespace;
use internal::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1};
use nom::combinator::{map, map_res, opt, rest, verify};
use nom::error::context;
use nom::sequence::preceded;
use std::fmt;
use std::str::FromStr;

/// The five media types a `m=` line may declare.
///
/// [RFC8866 §8.2.1](https://www.rfc-editor.org/rfc/rfc8866.html#section-8.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    Text,
    Application,
    Message,
}

impl MediaType {
    pub(crate) fn parse(i: &str) -> IResult<&str, Self> {
        context(
            "parsing media type",
            alt((
                map(tag("audio"), |_| MediaType::Audio),
                map(tag("video"), |_| MediaType::Video),
                map(tag("text"), |_| MediaType::Text),
                map(tag("application"), |_| MediaType::Application),
                map(tag("message"), |_| MediaType::Message),
            )),
        )(i)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Text => "text",
            MediaType::Application => "application",
            MediaType::Message => "message",
        })
    }
}

/// The pieces of a `m=` line this crate cares about: the media type, the port and
/// an optional port count. `proto` and `fmt` must be present for the line to be
/// well-formed but their content is discarded — transport parameters are carried
/// by `c=`/`a=source-filter`, not by the format list.
pub(crate) struct MediaLine {
    pub(crate) media_type: MediaType,
    pub(crate) port: u16,
}

pub(crate) fn media_line(i: &str) -> IResult<&str, MediaLine> {
    context("parsing media field", |i| {
        let (i, media_type) = MediaType::parse(i)?;
        let (i, _) = char(' ')(i)?;
        let (i, port) = map_res(digit1, u16::from_str)(i)?;
        let (i, _) = opt(preceded(char('/'), digit1))(i)?;
        let (i, _) = char(' ')(i)?;
        let (i, _proto) = take_while1(not_whitespace)(i)?;
        let (i, _) = char(' ')(i)?;
        let (i, _fmt) = verify(rest, |s: &str| !s.is_empty())(i)?;

        Ok((i, MediaLine { media_type, port }))
    })(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_audio_rtp() {
        let (rem, media) = media_line("audio 5004 RTP/AVP 97").unwrap();
        assert_eq!(media.media_type, MediaType::Audio);
        assert_eq!(media.port, 5004);
        assert!(rem.is_empty());
    }

    #[test]
    fn parses_numports() {
        let (rem, media) = media_line("video 5006/2 RTP/AVP 96").unwrap();
        assert_eq!(media.media_type, MediaType::Video);
        assert_eq!(media.port, 5006);
        assert!(rem.is_empty());
    }

    #[test]
    fn rejects_missing_fmt() {
        assert!(media_line("audio 5004 RTP/AVP ").is_err());
    }
}
