/* src/svcb.rs */

//! Presentation grammar for SVCB records: `<priority> <target> [key=value ...]`.

use crate::error::Error;
use crate::record::parse_absolute_name;
use hickory_proto::rr::Name;
use hickory_proto::rr::rdata::svcb::{Alpn, IpHint, Mandatory, SVCB, SvcParamKey, SvcParamValue};
use hickory_proto::rr::rdata::{A, AAAA};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Keys this client understands, with their IANA codes.
const KEYS: [(&str, u16); 6] = [
    ("mandatory", 0),
    ("alpn", 1),
    ("no-default-alpn", 2),
    ("port", 3),
    ("ipv4hint", 4),
    ("ipv6hint", 6),
];

fn key_code(name: &str) -> Option<u16> {
    KEYS.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
}

fn key_name(code: u16) -> Option<&'static str> {
    KEYS.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvcParam {
    Mandatory(Vec<u16>),
    Alpn(Vec<String>),
    NoDefaultAlpn,
    Port(u16),
    Ipv4Hint(Vec<Ipv4Addr>),
    Ipv6Hint(Vec<Ipv6Addr>),
}

impl SvcParam {
    fn code(&self) -> u16 {
        match self {
            SvcParam::Mandatory(_) => 0,
            SvcParam::Alpn(_) => 1,
            SvcParam::NoDefaultAlpn => 2,
            SvcParam::Port(_) => 3,
            SvcParam::Ipv4Hint(_) => 4,
            SvcParam::Ipv6Hint(_) => 6,
        }
    }

    fn to_wire(&self) -> (SvcParamKey, SvcParamValue) {
        let value = match self {
            SvcParam::Mandatory(codes) => SvcParamValue::Mandatory(Mandatory(
                codes.iter().map(|c| SvcParamKey::from(*c)).collect(),
            )),
            SvcParam::Alpn(ids) => SvcParamValue::Alpn(Alpn(ids.clone())),
            SvcParam::NoDefaultAlpn => SvcParamValue::NoDefaultAlpn,
            SvcParam::Port(port) => SvcParamValue::Port(*port),
            SvcParam::Ipv4Hint(ips) => {
                SvcParamValue::Ipv4Hint(IpHint(ips.iter().map(|ip| A::from(*ip)).collect()))
            }
            SvcParam::Ipv6Hint(ips) => {
                SvcParamValue::Ipv6Hint(IpHint(ips.iter().map(|ip| AAAA::from(*ip)).collect()))
            }
        };
        (SvcParamKey::from(self.code()), value)
    }

    fn from_wire(value: &SvcParamValue) -> Option<Self> {
        Some(match value {
            SvcParamValue::Mandatory(m) => {
                let codes: Vec<u16> = m.0.iter().map(|k| u16::from(*k)).collect();
                if codes.iter().any(|c| key_name(*c).is_none()) {
                    return None;
                }
                SvcParam::Mandatory(codes)
            }
            SvcParamValue::Alpn(alpn) => SvcParam::Alpn(alpn.0.clone()),
            SvcParamValue::NoDefaultAlpn => SvcParam::NoDefaultAlpn,
            SvcParamValue::Port(port) => SvcParam::Port(*port),
            SvcParamValue::Ipv4Hint(hint) => SvcParam::Ipv4Hint(hint.0.iter().map(|a| a.0).collect()),
            SvcParamValue::Ipv6Hint(hint) => SvcParam::Ipv6Hint(hint.0.iter().map(|a| a.0).collect()),
            _ => return None,
        })
    }
}

impl fmt::Display for SvcParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = key_name(self.code()).unwrap_or("unknown");
        match self {
            SvcParam::Mandatory(codes) => {
                let keys: Vec<&str> = codes.iter().filter_map(|c| key_name(*c)).collect();
                write!(f, "{}={}", name, keys.join(","))
            }
            SvcParam::Alpn(ids) => write!(f, "{}={}", name, ids.join(",")),
            SvcParam::NoDefaultAlpn => f.write_str(name),
            SvcParam::Port(port) => write!(f, "{}={}", name, port),
            SvcParam::Ipv4Hint(ips) => {
                let ips: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
                write!(f, "{}={}", name, ips.join(","))
            }
            SvcParam::Ipv6Hint(ips) => {
                let ips: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
                write!(f, "{}={}", name, ips.join(","))
            }
        }
    }
}

/// A parsed SVCB value. Parameters are kept sorted by key code, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcbValue {
    pub priority: u16,
    pub target: Name,
    pub params: Vec<SvcParam>,
}

impl SvcbValue {
    pub fn to_rdata(&self) -> SVCB {
        SVCB::new(
            self.priority,
            self.target.clone(),
            self.params.iter().map(SvcParam::to_wire).collect(),
        )
    }

    /// Returns `None` when the rdata carries parameters this client does not model.
    pub fn from_rdata(svcb: &SVCB) -> Option<Self> {
        let params = svcb
            .svc_params()
            .iter()
            .map(|(_, value)| SvcParam::from_wire(value))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            priority: svcb.svc_priority(),
            target: svcb.target_name().to_lowercase(),
            params,
        })
    }
}

impl fmt::Display for SvcbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.priority, self.target)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}

pub fn parse(value: &str) -> Result<SvcbValue, Error> {
    let mut tokens = value.split_whitespace();

    let priority = tokens
        .next()
        .ok_or_else(|| Error::validation("value", "SVCB value is empty"))?;
    let priority: u16 = priority.parse().map_err(|_| {
        Error::validation("value", format!("SVCB priority '{}' is not a 16-bit integer", priority))
    })?;

    let target = tokens
        .next()
        .ok_or_else(|| Error::validation("value", "SVCB value is missing its target name"))?;
    let target = parse_absolute_name("value", target)?;

    let mut params: Vec<SvcParam> = Vec::new();
    for token in tokens {
        let param = parse_param(token)?;
        if params.iter().any(|p| p.code() == param.code()) {
            return Err(Error::validation(
                "value",
                format!("SVCB parameter '{}' given twice", key_name(param.code()).unwrap_or(token)),
            ));
        }
        params.push(param);
    }
    params.sort_by_key(SvcParam::code);

    if priority == 0 && !params.is_empty() {
        return Err(Error::validation(
            "value",
            "SVCB alias form (priority 0) takes no parameters",
        ));
    }
    check_mandatory(&params)?;
    if params.contains(&SvcParam::NoDefaultAlpn)
        && !params.iter().any(|p| matches!(p, SvcParam::Alpn(_)))
    {
        return Err(Error::validation(
            "value",
            "SVCB no-default-alpn requires an alpn parameter",
        ));
    }

    Ok(SvcbValue {
        priority,
        target,
        params,
    })
}

fn parse_param(token: &str) -> Result<SvcParam, Error> {
    let (key, raw) = match token.split_once('=') {
        Some((k, v)) => (k, Some(v.trim_matches('"'))),
        None => (token, None),
    };
    let key = key.to_ascii_lowercase();
    let code = key_code(&key)
        .ok_or_else(|| Error::validation("value", format!("unknown SVCB parameter '{}'", key)))?;

    if code == 2 {
        return match raw {
            None => Ok(SvcParam::NoDefaultAlpn),
            Some(_) => Err(Error::validation("value", "SVCB no-default-alpn takes no value")),
        };
    }

    let raw = raw
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation("value", format!("SVCB parameter '{}' needs a value", key)))?;
    let list = raw.split(',');

    match code {
        0 => {
            let codes = list
                .map(|name| {
                    let name = name.to_ascii_lowercase();
                    match key_code(&name) {
                        Some(0) | None => Err(Error::validation(
                            "value",
                            format!("SVCB mandatory lists invalid key '{}'", name),
                        )),
                        Some(c) => Ok(c),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut sorted = codes.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != codes.len() {
                return Err(Error::validation("value", "SVCB mandatory repeats a key"));
            }
            Ok(SvcParam::Mandatory(sorted))
        }
        1 => {
            let ids: Vec<String> = list.map(str::to_string).collect();
            if ids.iter().any(|id| id.is_empty() || id.len() > 255) {
                return Err(Error::validation("value", "SVCB alpn ids must be 1-255 bytes"));
            }
            Ok(SvcParam::Alpn(ids))
        }
        3 => raw
            .parse::<u16>()
            .map(SvcParam::Port)
            .map_err(|_| Error::validation("value", format!("SVCB port '{}' is invalid", raw))),
        4 => list
            .map(|ip| {
                ip.parse::<Ipv4Addr>()
                    .map_err(|_| Error::validation("value", format!("SVCB ipv4hint '{}' is invalid", ip)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SvcParam::Ipv4Hint),
        _ => list
            .map(|ip| {
                ip.parse::<Ipv6Addr>()
                    .map_err(|_| Error::validation("value", format!("SVCB ipv6hint '{}' is invalid", ip)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SvcParam::Ipv6Hint),
    }
}

fn check_mandatory(params: &[SvcParam]) -> Result<(), Error> {
    let Some(SvcParam::Mandatory(codes)) = params.iter().find(|p| p.code() == 0) else {
        return Ok(());
    };
    for code in codes {
        if !params.iter().any(|p| p.code() == *code) {
            return Err(Error::validation(
                "value",
                format!(
                    "SVCB mandatory key '{}' is not present",
                    key_name(*code).unwrap_or("unknown")
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_params() {
        let value = parse("1 svc.example.com port=8443 alpn=h2,h3 ipv4hint=192.0.2.1").unwrap();
        assert_eq!(value.priority, 1);
        assert_eq!(value.target.to_string(), "svc.example.com.");
        assert_eq!(
            value.to_string(),
            "1 svc.example.com. alpn=h2,h3 port=8443 ipv4hint=192.0.2.1"
        );
    }

    #[test]
    fn alias_form_has_no_params() {
        let value = parse("0 pool.example.net").unwrap();
        assert!(value.params.is_empty());
        assert!(parse("0 pool.example.net alpn=h2").is_err());
    }

    #[test]
    fn rejects_unknown_and_duplicate_keys() {
        assert!(parse("1 . foo=bar").is_err());
        assert!(parse("1 . ech=AAAA").is_err());
        assert!(parse("1 . port=1 port=2").is_err());
        assert!(parse("1 . port=99999").is_err());
        assert!(parse("1").is_err());
        assert!(parse("x .").is_err());
    }

    #[test]
    fn mandatory_keys_must_be_present() {
        assert!(parse("1 . mandatory=port alpn=h2").is_err());
        let value = parse("1 . mandatory=alpn,port alpn=h2 port=443").unwrap();
        assert_eq!(value.to_string(), "1 . mandatory=alpn,port alpn=h2 port=443");
    }

    #[test]
    fn no_default_alpn_needs_alpn() {
        assert!(parse("1 . no-default-alpn").is_err());
        assert!(parse("1 . alpn=h3 no-default-alpn").is_ok());
    }

    #[test]
    fn survives_conversion_through_rdata() {
        let value = parse("16 svc.example.com alpn=h2 ipv6hint=2001:db8::1").unwrap();
        let back = SvcbValue::from_rdata(&value.to_rdata()).unwrap();
        assert_eq!(back, value);
    }
}
