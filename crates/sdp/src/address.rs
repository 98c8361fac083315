use internal::IResult;
use nom::bytes::complete::take_while1;
use nom::combinator::map_res;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

fn ip4_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn ip6_char(c: char) -> bool {
    c.is_ascii_hexdigit() || c == ':'
}

pub(crate) fn ip4_literal(i: &str) -> IResult<&str, Ipv4Addr> {
    map_res(take_while1(ip4_char), Ipv4Addr::from_str)(i)
}

pub(crate) fn ip6_literal(i: &str) -> IResult<&str, Ipv6Addr> {
    map_res(take_while1(ip6_char), Ipv6Addr::from_str)(i)
}
