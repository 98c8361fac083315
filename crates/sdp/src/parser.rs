use crate::address::{ip4_literal, ip6_literal};
use crate::media::{media_line, MediaType};
use crate::source_filter::source_filter;
use internal::Finish;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1};
use nom::combinator::{map, opt};
use nom::sequence::preceded;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// The transport parameters recovered from one `m=` section of a transport file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub media_type: MediaType,
    pub port: u16,
    pub dest: Option<IpAddr>,
    pub source: Option<IpAddr>,
}

/// A `c=` or `m=` line that could not be parsed, tagged with the offending line.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse SDP line: {line}")]
pub struct ParseSdpError {
    pub line: String,
}

impl ParseSdpError {
    fn new(line: &str) -> Self {
        Self {
            line: line.to_owned(),
        }
    }
}

/// Holds the in-progress list of [`Source`]s while a transport file is fed in line by line.
///
/// Mirrors the original implementation's behaviour: `m=` opens a new source, `c=` and
/// `a=source-filter` fill in the most recently opened one. Lines that carry no useful
/// information (`v=`, `o=`, `s=`, `t=`, `b=`, `r=`, `z=`, `k=` and any `a=` other than
/// `source-filter`) are recognised and silently discarded rather than rejected.
#[derive(Debug, Default)]
struct Parser {
    sources: Vec<Source>,
}

impl Parser {
    fn parse_line(&mut self, line: &str) -> Result<(), ParseSdpError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            return Ok(());
        }

        let Some((kind, value)) = line.split_once('=') else {
            return Ok(());
        };

        match kind {
            "m" => {
                let (_, media) = media_line(value)
                    .finish()
                    .map_err(|_| ParseSdpError::new(line))?;

                self.sources.push(Source {
                    media_type: media.media_type,
                    port: media.port,
                    dest: None,
                    source: None,
                });
            }
            "c" => {
                let (_, dest) = connection_address(value)
                    .finish()
                    .map_err(|_| ParseSdpError::new(line))?;

                let source = self
                    .sources
                    .last_mut()
                    .ok_or_else(|| ParseSdpError::new(line))?;
                source.dest = Some(dest);
            }
            "a" => {
                // Unrecognised attributes, or a `source-filter` that doesn't parse, are
                // tolerated: only `c=`/`m=` failures are fatal.
                if let Ok((_, filter)) = source_filter(value).finish() {
                    if let Some(source) = self.sources.last_mut() {
                        source.source = Some(filter.source);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn finish(self) -> Vec<Source> {
        self.sources
    }
}

/// `IN IP4 <addr>[/<ttl>[/<groupsize>]]` or `IN IP6 <addr>`.
///
/// The ttl/groupsize suffix only ever appears on IPv4 connection lines and is discarded;
/// it has no bearing on where the destination address points.
fn connection_address(i: &str) -> internal::IResult<&str, IpAddr> {
    alt((
        map(
            preceded(
                tag("IN IP4 "),
                nom::sequence::terminated(
                    ip4_literal,
                    opt(preceded(char('/'), nom::sequence::pair(digit1, opt(preceded(char('/'), digit1))))),
                ),
            ),
            IpAddr::V4,
        ),
        map(preceded(tag("IN IP6 "), ip6_literal), IpAddr::V6),
    ))(i)
}

/// Parses a complete SDP transport file down to the list of sources it describes.
///
/// Returns one [`Source`] per `m=` line, in file order, with `dest`/`source` filled in
/// from any `c=`/`a=source-filter` lines that followed it before the next `m=`.
pub fn parse(text: &str) -> Result<Vec<Source>, ParseSdpError> {
    let mut parser = Parser::default();

    for line in text.lines() {
        parser.parse_line(line)?;
    }

    Ok(parser.finish())
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} port={}", self.media_type, self.port)?;
        if let Some(dest) = self.dest {
            write!(f, " dest={dest}")?;
        }
        if let Some(source) = self.source {
            write!(f, " source={source}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TRANSPORT_FILE: &str = "v=0\r\n\
o=- 1 1 IN IP4 192.168.1.10\r\n\
s=SDP Example\r\n\
t=0 0\r\n\
m=video 5004 RTP/AVP 96\r\n\
c=IN IP4 232.1.1.1/127/1\r\n\
a=source-filter: incl IN IP4 232.1.1.1 192.168.1.10\r\n\
a=rtpmap:96 raw/90000\r\n";

    #[test]
    fn parses_single_source() {
        let sources = parse(TRANSPORT_FILE).unwrap();
        assert_eq!(sources.len(), 1);

        let source = &sources[0];
        assert_eq!(source.media_type, MediaType::Video);
        assert_eq!(source.port, 5004);
        assert_eq!(source.dest, Some("232.1.1.1".parse().unwrap()));
        assert_eq!(source.source, Some("192.168.1.10".parse().unwrap()));
    }

    #[test]
    fn tolerates_blank_lines_and_unknown_attributes() {
        let sources = parse("m=audio 5004 RTP/AVP 97\r\n\r\na=recvonly\r\nc=IN IP4 239.1.1.1\r\n")
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].dest, Some("239.1.1.1".parse().unwrap()));
    }

    #[test]
    fn multiple_media_sections_are_kept_separate() {
        let sources = parse(
            "m=audio 5004 RTP/AVP 97\r\nc=IN IP4 239.1.1.1\r\nm=video 5006 RTP/AVP 96\r\nc=IN IP4 239.1.1.2\r\n",
        )
        .unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].dest, Some("239.1.1.1".parse().unwrap()));
        assert_eq!(sources[1].dest, Some("239.1.1.2".parse().unwrap()));
    }

    #[test]
    fn malformed_media_line_is_a_hard_error() {
        let err = parse("m=audio notaport RTP/AVP 97\r\n").unwrap_err();
        assert!(err.line.starts_with("m="));
    }

    #[test]
    fn malformed_connection_line_is_a_hard_error() {
        let err = parse("m=audio 5004 RTP/AVP 97\r\nc=IN IP4\r\n").unwrap_err();
        assert!(err.line.starts_with("c="));
    }
}
