use crate::address::{ip4_literal, ip6_literal};
use internal::{ws, IResult};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::space1;
use nom::combinator::map;
use nom::error::context;
use nom::sequence::preceded;
use std::net::IpAddr;

/// `a=source-filter: incl IN IP4 <dest-address> <src-address> ...`
///
/// [RFC4570](https://www.rfc-editor.org/rfc/rfc4570.html). Only the first address of the
/// src-list is kept; a description only ever has one source address in this model.
pub(crate) struct SourceFilter {
    pub(crate) source: IpAddr,
}

fn addr(i: &str) -> IResult<&str, IpAddr> {
    alt((map(ip4_literal, IpAddr::V4), map(ip6_literal, IpAddr::V6)))(i)
}

pub(crate) fn source_filter(i: &str) -> IResult<&str, SourceFilter> {
    context(
        "parsing source-filter attribute",
        preceded(ws((tag("source-filter:"), tag("incl"), tag("IN"))), |i| {
            let (i, _) = space1(i)?;
            let (i, _dest) = alt((preceded(tag("IP4 "), addr), preceded(tag("IP6 "), addr)))(i)?;
            let (i, _) = space1(i)?;
            let (i, source) = addr(i)?;

            Ok((i, SourceFilter { source }))
        }),
    )(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ip4_source_filter() {
        let (rem, filter) =
            source_filter("source-filter: incl IN IP4 232.1.1.1 192.168.1.10").unwrap();
        assert_eq!(filter.source, "192.168.1.10".parse::<IpAddr>().unwrap());
        assert!(rem.is_empty());
    }

    #[test]
    fn parses_ip6_source_filter() {
        let (rem, filter) =
            source_filter("source-filter: incl IN IP6 ff0e::1 2001:db8::10").unwrap();
        assert_eq!(filter.source, "2001:db8::10".parse::<IpAddr>().unwrap());
        assert!(rem.is_empty());
    }
}
