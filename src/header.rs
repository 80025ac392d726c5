//! Raw message headers and the parsed `DKIM-Signature` tag set, RFC 6376
//! sections 3.5 (header fields) and 3.6.1 (tag=value syntax), including the
//! builder used on the signing path.

use crate::parser;
use crate::DKIMError;
use indexmap::map::IndexMap;

pub(crate) const DKIM_SIGNATURE_HEADER_NAME: &str = "DKIM-Signature";
const SIGN_EXPIRATION_DRIFT_MINS: i64 = 15;

/// One header field as handed to [`crate::context::Context::header`]:
/// its name, its unfolded value (as used for canonicalization), and the
/// exact bytes the caller supplied (kept for header-hash input assembly).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
    pub raw: Vec<u8>,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        Header {
            name: name.into(),
            raw: value.clone(),
            value,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct TaggedHeader {
    pub(crate) tags: IndexMap<String, parser::Tag>,
    pub(crate) raw_bytes: String,
}

impl TaggedHeader {
    pub fn parse(value: &str) -> Result<Self, DKIMError> {
        let (_, tags) =
            parser::tag_list(value).map_err(|err| DKIMError::SignatureSyntaxError(err.to_string()))?;

        let mut tags_map = IndexMap::new();
        for tag in &tags {
            if tags_map.insert(tag.name.clone(), tag.clone()).is_some() {
                return Err(DKIMError::SignatureSyntaxError(format!(
                    "duplicate tag {}",
                    tag.name
                )));
            }
        }
        Ok(Self {
            tags: tags_map,
            raw_bytes: value.to_owned(),
        })
    }

    pub fn get_tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.value.as_str())
    }

    pub fn get_raw_tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.raw_value.as_str())
    }

    pub fn get_required_tag(&self, name: &str) -> &str {
        // Required tags are guaranteed by `DKIMHeader::parse` to be present
        // by the time this is called.
        match self.get_tag(name) {
            Some(value) => value,
            None => panic!("required tag {name} is not present"),
        }
    }

    pub fn get_required_raw_tag(&self, name: &str) -> &str {
        match self.get_raw_tag(name) {
            Some(value) => value,
            None => panic!("required tag {name} is not present"),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw_bytes
    }

    /// Check things required of a `DKIM-Signature` header once its tags
    /// parse successfully.
    fn check_common_tags(&self) -> Result<(), DKIMError> {
        if !self
            .get_required_tag("h")
            .split(':')
            .any(|h| h.eq_ignore_ascii_case("from"))
        {
            return Err(DKIMError::FromFieldNotSigned);
        }

        if let Some(query_method) = self.get_tag("q") {
            if query_method != "dns/txt" {
                return Err(DKIMError::UnsupportedQueryMethod);
            }
        }

        if let Some(expiration) = self.get_tag("x") {
            let mut expiration =
                chrono::DateTime::from_timestamp(expiration.parse::<i64>().unwrap_or_default(), 0)
                    .ok_or(DKIMError::SignatureExpired)?;
            expiration += chrono::Duration::try_minutes(SIGN_EXPIRATION_DRIFT_MINS)
                .expect("drift to be in-range");
            let now = chrono::Utc::now();
            if now > expiration {
                return Err(DKIMError::SignatureExpired);
            }
        }

        Ok(())
    }
}

/// Returns true if `parent` is `child` or a parent zone of `child`, e.g.
/// `zone_of("example.com", "mail.example.com")` and
/// `zone_of("example.com", "example.com")` are both true. Comparison is
/// case-insensitive and trailing dots are ignored.
fn zone_of(parent: &str, child: &str) -> bool {
    let parent = parent.trim_end_matches('.').to_ascii_lowercase();
    let child = child.trim_end_matches('.').to_ascii_lowercase();
    if parent == child {
        return true;
    }
    child.ends_with(&format!(".{parent}"))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DKIMHeader {
    tagged: TaggedHeader,
}

impl std::ops::Deref for DKIMHeader {
    type Target = TaggedHeader;
    fn deref(&self) -> &TaggedHeader {
        &self.tagged
    }
}
impl std::ops::DerefMut for DKIMHeader {
    fn deref_mut(&mut self) -> &mut TaggedHeader {
        &mut self.tagged
    }
}

impl DKIMHeader {
    /// <https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.1>
    pub fn parse(value: &str) -> Result<Self, DKIMError> {
        let tagged = TaggedHeader::parse(value)?;
        let header = DKIMHeader { tagged };

        header.validate_required_tags()?;

        if header.get_required_tag("v") != "1" {
            return Err(DKIMError::IncompatibleVersion);
        }

        if let Some(user) = header.get_tag("i") {
            let signing_domain = header.get_required_tag("d");
            let Some((_local, domain)) = user.split_once('@') else {
                return Err(DKIMError::DomainMismatch);
            };

            if !zone_of(signing_domain, domain) {
                return Err(DKIMError::DomainMismatch);
            }
        }

        header.check_common_tags()?;

        Ok(header)
    }

    fn validate_required_tags(&self) -> Result<(), DKIMError> {
        const REQUIRED_TAGS: &[&str] = &["v", "a", "b", "bh", "d", "h", "s"];
        for required in REQUIRED_TAGS {
            if self.get_tag(required).is_none() {
                return Err(DKIMError::SignatureMissingRequiredTag(required));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct DKIMHeaderBuilder {
    header: TaggedHeader,
    time: Option<chrono::DateTime<chrono::offset::Utc>>,
}

impl DKIMHeaderBuilder {
    pub(crate) fn new() -> Self {
        DKIMHeaderBuilder {
            header: TaggedHeader::default(),
            time: None,
        }
    }

    pub(crate) fn add_tag(mut self, name: &str, value: &str) -> Self {
        let tag = parser::Tag {
            name: name.to_owned(),
            value: value.to_owned(),
            raw_value: value.to_owned(),
        };
        self.header.tags.insert(name.to_owned(), tag);
        self
    }

    pub(crate) fn set_signed_headers(self, names: &[String]) -> Self {
        let value = names
            .iter()
            .map(|n| n.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(" : ");
        self.add_tag("h", &value)
    }

    pub(crate) fn set_expiry(self, duration: chrono::Duration) -> Result<Self, DKIMError> {
        let time = self.time.ok_or(DKIMError::BuilderError(
            "DKIMHeaderBuilder: set_time must be called prior to calling set_expiry",
        ))?;
        let expiry = (time + duration).timestamp();
        Ok(self.add_tag("x", &expiry.to_string()))
    }

    pub(crate) fn set_time(mut self, time: chrono::DateTime<chrono::offset::Utc>) -> Self {
        self.time = Some(time);
        self.add_tag("t", &time.timestamp().to_string())
    }

    pub(crate) fn build(mut self) -> TaggedHeader {
        self.header.raw_bytes = self.header.serialize();
        self.header
    }
}

impl TaggedHeader {
    /// Generate the `DKIM-Signature` header value from the tags, folded at
    /// RFC 6376 section 3.5's recommended width.
    fn serialize(&self) -> String {
        let mut lines = vec![];
        let mut line = String::new();

        const WIDTH: usize = 75;

        for (key, tag) in &self.tags {
            let value = &tag.value;

            // Always emit b and h on a fresh line: the header hash is
            // computed in two passes (once with b empty, once populated),
            // and keeping these tags' line placement stable regardless of
            // their value length keeps both passes wrapping identically.
            let always_new_line = key == "b" || key == "h";

            if always_new_line || (line.len() + key.len() + 2 + value.len() >= WIDTH) {
                if !line.is_empty() {
                    lines.push(line.clone());
                    line.clear();
                }
            }

            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(key);
            line.push('=');

            if line.len() + value.len() < WIDTH {
                line.push_str(value);
            } else if key == "h" {
                for (idx, name) in value.split(':').map(|n| n.trim()).enumerate() {
                    if idx > 0 {
                        line.push_str(" : ");
                    }
                    if line.len() + name.len() < WIDTH {
                        line.push_str(name);
                        continue;
                    }
                    lines.push(line);
                    line = format!("\t{name}");
                }
            } else if value.len() >= WIDTH {
                for c in value.chars() {
                    line.push(c);
                    if line.len() >= WIDTH {
                        lines.push(line.clone());
                        line.clear();
                    }
                }
            } else {
                lines.push(line);
                line = format!("\t{value}");
            }
            line.push(';');
        }

        if !line.is_empty() {
            lines.push(line);
        }

        lines.join("\r\n\t")
    }
}
