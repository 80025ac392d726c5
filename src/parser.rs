//! Tag-value list parser shared by `DKIM-Signature` header parsing and DNS
//! TXT key-record parsing (RFC 6376 section 3.2).

use crate::hash::HashAlgo;
use crate::{canonicalization, DKIMError};
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::alpha1;
use nom::combinator::opt;
use nom::multi::fold_many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

#[derive(Clone, Debug, PartialEq)]
/// A single `name=value` tag out of a tag-value list.
pub struct Tag {
    /// Name of the tag (v, i, a, h, ...)
    pub name: String,
    /// Value of the tag with folding whitespace removed
    pub value: String,
    /// Value of the tag as it appeared in the source text, folding
    /// whitespace included. Needed to reproduce the exact bytes that were
    /// hashed when the signature header itself is canonicalized.
    pub raw_value: String,
}

/// tag-list  =  tag-spec *( ";" tag-spec ) [ ";" ]
pub fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, start) = tag_spec(input)?;

    terminated(
        fold_many0(
            preceded(tag(";"), tag_spec),
            move || vec![start.clone()],
            |mut acc: Vec<Tag>, item| {
                acc.push(item);
                acc
            },
        ),
        opt(tag(";")),
    )(input)
}

/// tag-spec  =  [FWS] tag-name [FWS] "=" [FWS] tag-value [FWS]
fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, name) = delimited(opt(fws), tag_name, opt(fws))(input)?;
    let (input, _) = tag("=")(input)?;

    let value_input = input;
    let (_, raw_value) = delimited(opt(fws), raw_tag_value, opt(fws))(value_input)?;
    let (input, value) = delimited(opt(fws), tag_value, opt(fws))(value_input)?;

    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value,
            raw_value,
        },
    ))
}

/// tag-name  =  ALPHA *ALNUMPUNC
fn tag_name(input: &str) -> IResult<&str, &str> {
    alpha1(input)
}

/// tag-value =  [ tval *( 1*(WSP / FWS) tval ) ]
/// tval      =  1*VALCHAR
/// VALCHAR   =  %x21-3A / %x3C-7E
fn tag_value(input: &str) -> IResult<&str, String> {
    let is_valchar = |c| ('!'..=':').contains(&c) || ('<'..='~').contains(&c);
    match opt(take_while1(is_valchar))(input)? {
        (input, Some(start)) => fold_many0(
            preceded(fws, take_while1(is_valchar)),
            || start.to_owned(),
            |mut acc: String, item| {
                acc += item;
                acc
            },
        )(input),
        (input, None) => Ok((input, "".to_string())),
    }
}

fn raw_tag_value(input: &str) -> IResult<&str, String> {
    let is_valchar = |c| ('!'..=':').contains(&c) || ('<'..='~').contains(&c);
    match opt(take_while1(is_valchar))(input)? {
        (input, Some(start)) => fold_many0(
            pair(fws, take_while1(is_valchar)),
            || start.to_owned(),
            |mut acc: String, item| {
                acc += &(item.0.to_owned() + item.1);
                acc
            },
        )(input),
        (input, None) => Ok((input, "".to_string())),
    }
}

/// FWS is folding whitespace: a run of SP/HTAB/CR/LF joining wrapped lines.
fn fws(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')(input)
}

pub(crate) fn parse_hash_algo(value: &str) -> Result<HashAlgo, DKIMError> {
    match value {
        "rsa-sha1" => Ok(HashAlgo::RsaSha1),
        "rsa-sha256" => Ok(HashAlgo::RsaSha256),
        "ed25519-sha256" => Ok(HashAlgo::Ed25519Sha256),
        e => Err(DKIMError::UnsupportedHashAlgorithm(e.to_string())),
    }
}

/// Parses the `c=` value into (header canonicalization, body canonicalization).
pub(crate) fn parse_canonicalization(
    value: Option<&str>,
) -> Result<(canonicalization::Type, canonicalization::Type), DKIMError> {
    use canonicalization::Type::{Relaxed, Simple};
    match value {
        None => Ok((Simple, Simple)),
        Some(s) => match s {
            "simple/simple" => Ok((Simple, Simple)),
            "relaxed/simple" => Ok((Relaxed, Simple)),
            "simple/relaxed" => Ok((Simple, Relaxed)),
            "relaxed/relaxed" => Ok((Relaxed, Relaxed)),
            "relaxed" => Ok((Relaxed, Simple)),
            "simple" => Ok((Simple, Simple)),
            v => Err(DKIMError::UnsupportedCanonicalizationType(v.to_owned())),
        },
    }
}
