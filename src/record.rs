/* src/record.rs */

use crate::error::Error;
use crate::svcb;
use fancy_log::{LogLevel, log};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, NS};
use hickory_proto::rr::{Name, RData, Record};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// The closed set of record types this client manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    SVCB,
    NS,
}

impl RecordType {
    pub const ALL: [RecordType; 5] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::SVCB,
        RecordType::NS,
    ];

    /// Wire type code (RFC 1035, RFC 3596, RFC 9460).
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::AAAA => 28,
            RecordType::SVCB => 64,
        }
    }

    pub fn to_wire(self) -> hickory_proto::rr::RecordType {
        hickory_proto::rr::RecordType::from(self.code())
    }

    pub fn from_wire(rtype: hickory_proto::rr::RecordType) -> Option<Self> {
        let code = u16::from(rtype);
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Checks `value` against this type's grammar and returns its canonical text form.
    pub fn validate_value(self, value: &str) -> Result<String, Error> {
        let value = value.trim();
        match self {
            RecordType::A => parse_ipv4(value).map(|ip| ip.to_string()),
            RecordType::AAAA => value
                .parse::<Ipv6Addr>()
                .map(|ip| ip.to_string())
                .map_err(|_| Error::validation("value", format!("'{}' is not an IPv6 address", value))),
            RecordType::CNAME | RecordType::NS => {
                parse_absolute_name("value", value).map(|name| name.to_string())
            }
            RecordType::SVCB => svcb::parse(value).map(|params| params.to_string()),
        }
    }

    /// Builds the rdata for an already validated value.
    pub(crate) fn rdata(self, value: &str) -> Result<RData, Error> {
        Ok(match self {
            RecordType::A => RData::A(A::from(parse_ipv4(value)?)),
            RecordType::AAAA => RData::AAAA(AAAA::from(value.parse::<Ipv6Addr>().map_err(
                |_| Error::validation("value", format!("'{}' is not an IPv6 address", value)),
            )?)),
            RecordType::CNAME => RData::CNAME(CNAME(parse_absolute_name("value", value)?)),
            RecordType::NS => RData::NS(NS(parse_absolute_name("value", value)?)),
            RecordType::SVCB => RData::SVCB(svcb::parse(value)?.to_rdata()),
        })
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::SVCB => "SVCB",
            RecordType::NS => "NS",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "SVCB" | "SVC" => Ok(RecordType::SVCB),
            "NS" => Ok(RecordType::NS),
            other => Err(Error::validation(
                "type",
                format!("unsupported record type '{}'", other),
            )),
        }
    }
}

/// A resource record relative to a zone. Only constructible through validation,
/// so every instance carries a canonical, grammar-checked value.
#[derive(Debug, Clone, Serialize)]
pub struct DnsRecord {
    name: String,
    #[serde(rename = "type")]
    rtype: RecordType,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
}

impl DnsRecord {
    /// Validates and normalizes a record. `ttl` of `None` means the zone default.
    pub fn new(name: &str, rtype: RecordType, value: &str, ttl: Option<u32>) -> Result<Self, Error> {
        let name = validate_name(name)?;
        let value = rtype.validate_value(value)?;
        Ok(Self {
            name,
            rtype,
            value,
            ttl,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> RecordType {
        self.rtype
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    /// Fully-qualified owner name inside `zone`.
    pub fn fqdn(&self, zone: &Name) -> Result<Name, Error> {
        owner_name(&self.name, zone)
    }

    pub(crate) fn rdata(&self) -> Result<RData, Error> {
        self.rtype.rdata(&self.value)
    }

    /// Converts a record received from the server. Returns `None` for types or
    /// rdata this client does not model, or for owners outside `zone`.
    pub fn from_wire(record: &Record, zone: &Name) -> Option<Self> {
        let rtype = RecordType::from_wire(record.record_type())?;
        let owner = record.name().to_lowercase();
        if !zone.zone_of(&owner) {
            return None;
        }
        let name = relative_name(&owner, zone);

        let value = match record.data() {
            RData::A(a) => a.0.to_string(),
            RData::AAAA(aaaa) => aaaa.0.to_string(),
            RData::CNAME(cname) => cname.0.to_lowercase().to_string(),
            RData::NS(ns) => ns.0.to_lowercase().to_string(),
            RData::SVCB(svcb) => match svcb::SvcbValue::from_rdata(svcb) {
                Some(v) => v.to_string(),
                None => {
                    log(
                        LogLevel::Debug,
                        &format!("Skipping SVCB record at {} with unsupported parameters", owner),
                    );
                    return None;
                }
            },
            _ => return None,
        };

        Some(Self {
            name,
            rtype,
            value,
            ttl: Some(record.ttl()),
        })
    }
}

impl PartialEq for DnsRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.rtype == other.rtype && self.value == other.value
    }
}

impl Eq for DnsRecord {}

impl Hash for DnsRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.rtype.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ttl {
            Some(ttl) => write!(f, "{} {} {} {}", self.name, ttl, self.rtype, self.value),
            None => write!(f, "{} {} {}", self.name, self.rtype, self.value),
        }
    }
}

/// Checks a relative owner name and returns it lowercased. `@` is the zone apex.
pub fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if name == "@" {
        return Ok(name.to_string());
    }
    if name.ends_with('.') {
        return Err(Error::validation(
            "name",
            format!("'{}' must be relative to the zone (no trailing dot)", name),
        ));
    }
    check_labels("name", name)?;
    Ok(name.to_ascii_lowercase())
}

/// Joins a relative name onto the zone, enforcing the total length limit.
pub fn owner_name(relative: &str, zone: &Name) -> Result<Name, Error> {
    if relative == "@" {
        return Ok(zone.clone());
    }
    let fqdn = format!("{}.{}", relative, zone);
    parse_absolute_name("name", &fqdn)
}

fn relative_name(owner: &Name, zone: &Name) -> String {
    if owner == zone {
        return "@".to_string();
    }
    let owner = owner.to_string();
    let suffix = format!(".{}", zone.to_lowercase());
    owner
        .strip_suffix(suffix.as_str())
        .unwrap_or(owner.as_str())
        .to_string()
}

fn parse_ipv4(value: &str) -> Result<Ipv4Addr, Error> {
    let octets: Vec<&str> = value.split('.').collect();
    if octets.len() != 4 {
        return Err(Error::validation(
            "value",
            format!("'{}' must have four dot-separated octets", value),
        ));
    }
    let mut parsed = [0u8; 4];
    for (slot, octet) in parsed.iter_mut().zip(&octets) {
        if octet.is_empty() || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::validation(
                "value",
                format!("octet '{}' in '{}' is not numeric", octet, value),
            ));
        }
        *slot = octet.parse::<u8>().map_err(|_| {
            Error::validation(
                "value",
                format!("octet '{}' in '{}' is out of range 0-255", octet, value),
            )
        })?;
    }
    Ok(Ipv4Addr::from(parsed))
}

/// Parses a domain name and makes it absolute (trailing dot), lowercased.
/// Only an explicit `.` names the root; blank input is rejected.
pub(crate) fn parse_absolute_name(field: &'static str, value: &str) -> Result<Name, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if value == "." {
        return Ok(Name::root());
    }
    let trimmed = value.strip_suffix('.').unwrap_or(value);
    check_labels(field, trimmed)?;
    if trimmed.len() + 2 > MAX_NAME_LEN {
        return Err(Error::validation(
            field,
            format!("'{}' exceeds {} bytes", value, MAX_NAME_LEN),
        ));
    }
    let mut name = Name::from_ascii(trimmed)
        .map_err(|e| Error::validation(field, format!("'{}': {}", value, e)))?;
    name.set_fqdn(true);
    Ok(name.to_lowercase())
}

fn check_labels(field: &'static str, name: &str) -> Result<(), Error> {
    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::validation(
                field,
                format!("'{}' contains an empty label", name),
            ));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::validation(
                field,
                format!("label '{}' exceeds {} bytes", label, MAX_LABEL_LEN),
            ));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'*')
        {
            return Err(Error::validation(
                field,
                format!("label '{}' contains invalid characters", label),
            ));
        }
    }
    Ok(())
}
