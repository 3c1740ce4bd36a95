/* src/tsig.rs */

//! TSIG (RFC 8945) signing and verification. Records and digest input are
//! encoded by hickory; the HMAC itself runs on `ring`.

use crate::error::Error;
use crate::record::parse_absolute_name;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hickory_proto::dnssec::rdata::DNSSECRData;
use hickory_proto::dnssec::rdata::tsig::{
    TSIG, TsigAlgorithm as WireAlgorithm, make_tsig_record, message_tbs, signed_bitmessage_to_buf,
};
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RData};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};
use ring::hmac;
use std::fmt;
use std::str::FromStr;

/// Allowed clock skew, in seconds, for a signature's time.
pub const DEFAULT_FUDGE: u16 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TsigAlgorithm {
    HmacSha1,
    HmacSha256,
    HmacSha384,
    #[default]
    HmacSha512,
}

impl TsigAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha1 => "hmac-sha1",
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha384 => "hmac-sha384",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    fn ring(self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha384 => hmac::HMAC_SHA384,
            TsigAlgorithm::HmacSha512 => hmac::HMAC_SHA512,
        }
    }

    pub fn to_wire(self) -> WireAlgorithm {
        match self {
            TsigAlgorithm::HmacSha1 => WireAlgorithm::HmacSha1,
            TsigAlgorithm::HmacSha256 => WireAlgorithm::HmacSha256,
            TsigAlgorithm::HmacSha384 => WireAlgorithm::HmacSha384,
            TsigAlgorithm::HmacSha512 => WireAlgorithm::HmacSha512,
        }
    }
}

impl fmt::Display for TsigAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsigAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('.').to_ascii_lowercase();
        [
            TsigAlgorithm::HmacSha1,
            TsigAlgorithm::HmacSha256,
            TsigAlgorithm::HmacSha384,
            TsigAlgorithm::HmacSha512,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
        .ok_or_else(|| Error::InvalidKey(format!("unsupported TSIG algorithm '{}'", s)))
    }
}

/// Named shared secret. The secret is never exposed through `Debug` or errors.
#[derive(Clone)]
pub struct TsigKey {
    name: Name,
    algorithm: TsigAlgorithm,
    key: hmac::Key,
}

impl fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TsigKey {
    /// `secret` is the base64 text found in BIND `key` statements.
    pub fn new(name: &str, secret: &str, algorithm: TsigAlgorithm) -> Result<Self, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidKey("key name is empty".into()));
        }
        let name = parse_absolute_name("key name", name.trim())
            .map_err(|_| Error::InvalidKey(format!("key name '{}' is not a domain name", name)))?;

        let secret = BASE64
            .decode(secret.trim())
            .map_err(|_| Error::InvalidKey("secret is not valid base64".into()))?;
        if secret.is_empty() {
            return Err(Error::InvalidKey("secret is empty".into()));
        }

        Ok(Self {
            name,
            algorithm,
            key: hmac::Key::new(algorithm.ring(), &secret),
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn algorithm(&self) -> TsigAlgorithm {
        self.algorithm
    }

    /// Serializes `message` with a TSIG record signed at the current time.
    pub fn sign(&self, message: &Message) -> Result<SignedMessage, Error> {
        self.sign_at(message, None, now())
    }

    /// Signs `message` as of `time_signed`. `request_mac` is set when signing a
    /// reply, which chains the digest to the request's MAC.
    pub fn sign_at(
        &self,
        message: &Message,
        request_mac: Option<&[u8]>,
        time_signed: u64,
    ) -> Result<SignedMessage, Error> {
        let additional = message.additionals().len() + usize::from(message.extensions().is_some());
        if additional >= usize::from(u16::MAX) {
            return Err(Error::protocol("additional section has no room for a TSIG record"));
        }

        let pre_tsig = TSIG::new(
            self.algorithm.to_wire(),
            time_signed,
            DEFAULT_FUDGE,
            Vec::new(),
            message.id(),
            0,
            Vec::new(),
        );
        let tbs = message_tbs(request_mac, message, &pre_tsig, &self.name)
            .map_err(|e| Error::protocol(format!("failed to encode message: {}", e)))?;
        let mac = hmac::sign(&self.key, &tbs).as_ref().to_vec();

        let mut signed = message.clone();
        signed.add_tsig(make_tsig_record(self.name.clone(), pre_tsig.set_mac(mac.clone())));
        let wire = signed
            .to_bytes()
            .map_err(|e| Error::protocol(format!("failed to encode message: {}", e)))?;

        Ok(SignedMessage {
            wire,
            id: message.id(),
            mac,
            time_signed,
        })
    }

    /// Decodes a received message and checks its TSIG record.
    ///
    /// `request_mac` is the MAC of the request this message answers, or `None`
    /// when verifying a request. Messages without a TSIG record come back as
    /// [`TsigStatus::Unsigned`]; the caller decides whether that is acceptable.
    pub fn verify(&self, wire: &[u8], request_mac: Option<&[u8]>, now: u64) -> Result<Checked, Error> {
        let mut message = Message::from_bytes(wire)
            .map_err(|e| Error::protocol(format!("malformed message: {}", e)))?;
        let Some(record) = message.take_signature().pop() else {
            return Ok(Checked {
                message,
                status: TsigStatus::Unsigned,
            });
        };
        let RData::DNSSEC(DNSSECRData::TSIG(tsig)) = record.data() else {
            return Err(Error::protocol("message is signed with SIG(0), not TSIG"));
        };

        let error = tsig_error(tsig)?;
        if error != 0 {
            return Ok(Checked {
                message,
                status: TsigStatus::Rejected { error },
            });
        }
        if record.name() != &self.name {
            return Err(Error::Authentication("signed with an unknown key".into()));
        }
        if *tsig.algorithm() != self.algorithm.to_wire() {
            return Err(Error::Authentication("signed with an unexpected algorithm".into()));
        }

        let (tbv, _) = signed_bitmessage_to_buf(request_mac, wire, true)
            .map_err(|e| Error::protocol(format!("malformed TSIG record: {}", e)))?;
        hmac::verify(&self.key, &tbv, tsig.mac())
            .map_err(|_| Error::Authentication("MAC does not match".into()))?;

        if now.abs_diff(tsig.time()) > u64::from(tsig.fudge()) {
            return Err(Error::Authentication("time signed is outside the fudge window".into()));
        }

        Ok(Checked {
            message,
            status: TsigStatus::Verified {
                mac: tsig.mac().to_vec(),
            },
        })
    }
}

/// A serialized message carrying its TSIG record.
#[derive(Debug, Clone)]
pub struct SignedMessage {
    wire: Vec<u8>,
    id: u16,
    mac: Vec<u8>,
    time_signed: u64,
}

impl SignedMessage {
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn mac(&self) -> &[u8] {
        &self.mac
    }

    pub fn time_signed(&self) -> u64 {
        self.time_signed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsigStatus {
    Verified { mac: Vec<u8> },
    Unsigned,
    /// The peer answered with a TSIG error (BADSIG, BADKEY, BADTIME...).
    Rejected { error: u16 },
}

/// A received message, decoded, with its TSIG record removed.
#[derive(Debug, Clone)]
pub struct Checked {
    pub message: Message,
    pub status: TsigStatus,
}

pub(crate) fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// The error field follows the algorithm name, time (6), fudge (2), MAC size (2),
/// MAC and original id (2) in the encoded rdata.
fn tsig_error(tsig: &TSIG) -> Result<u16, Error> {
    let encode = |e: hickory_proto::ProtoError| Error::protocol(format!("malformed TSIG record: {}", e));
    let rdata = tsig.to_bytes().map_err(encode)?;
    let mut algorithm = Vec::new();
    tsig.algorithm()
        .emit(&mut BinEncoder::new(&mut algorithm))
        .map_err(encode)?;

    let at = algorithm.len() + 10 + tsig.mac().len() + 2;
    rdata
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::protocol("truncated TSIG record"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Record, RecordType};

    const SECRET: &str = "c2VjcmV0LXNoYXJlZC1ieS1jbGllbnQtYW5kLXNlcnZlcg==";
    const BADSIG: u16 = 16;

    fn key() -> TsigKey {
        TsigKey::new("update-key", SECRET, TsigAlgorithm::HmacSha512).unwrap()
    }

    fn message() -> Message {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update);
        message.add_query(Query::query(
            Name::from_ascii("example.com.").unwrap(),
            RecordType::SOA,
        ));
        message
    }

    #[test]
    fn rejects_bad_secrets() {
        let err = TsigKey::new("k", "not base64!!", TsigAlgorithm::HmacSha256).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        let err = TsigKey::new("k", "", TsigAlgorithm::HmacSha256).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert!(!err.to_string().contains(SECRET));
    }

    #[test]
    fn debug_redacts_secret() {
        let printed = format!("{:?}", key());
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(SECRET));
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("HMAC-SHA256.".parse::<TsigAlgorithm>().unwrap(), TsigAlgorithm::HmacSha256);
        assert_eq!(TsigAlgorithm::default(), TsigAlgorithm::HmacSha512);
        assert!("hmac-md5".parse::<TsigAlgorithm>().is_err());
    }

    #[test]
    fn signed_request_verifies_on_the_other_side() {
        let signed = key().sign(&message()).unwrap();
        assert_eq!(signed.id(), 4242);
        assert_eq!(signed.mac().len(), 64);
        let decoded = Message::from_bytes(signed.wire()).unwrap();
        assert_eq!(decoded.signature().len(), 1);
        assert!(decoded.additionals().is_empty());

        let checked = key().verify(signed.wire(), None, signed.time_signed()).unwrap();
        assert_eq!(checked.status, TsigStatus::Verified { mac: signed.mac().to_vec() });
        assert_eq!(checked.message.to_bytes().unwrap(), message().to_bytes().unwrap());
    }

    #[test]
    fn sha1_keys_sign_and_verify() {
        let key = TsigKey::new("legacy-key", SECRET, TsigAlgorithm::HmacSha1).unwrap();
        let signed = key.sign(&message()).unwrap();
        assert_eq!(signed.mac().len(), 20);
        assert!(key.verify(signed.wire(), None, signed.time_signed()).is_ok());
    }

    #[test]
    fn tampering_breaks_verification() {
        let signed = key().sign(&message()).unwrap();
        let mut wire = signed.wire().to_vec();
        wire[3] ^= 0x01;
        let err = key().verify(&wire, None, signed.time_signed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn wrong_key_or_stale_time_fails() {
        let signed = key().sign(&message()).unwrap();
        let other = TsigKey::new("update-key", "b3RoZXItc2VjcmV0", TsigAlgorithm::HmacSha512).unwrap();
        assert!(other.verify(signed.wire(), None, signed.time_signed()).is_err());

        let renamed = TsigKey::new("other-key", SECRET, TsigAlgorithm::HmacSha512).unwrap();
        let err = renamed.verify(signed.wire(), None, signed.time_signed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let late = signed.time_signed() + u64::from(DEFAULT_FUDGE) + 1;
        let err = key().verify(signed.wire(), None, late).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn reply_mac_is_chained_to_request() {
        let request = key().sign(&message()).unwrap();
        let mut reply = message();
        reply.set_message_type(MessageType::Response);

        let signed_reply = key()
            .sign_at(&reply, Some(request.mac()), request.time_signed())
            .unwrap();
        let ok = key().verify(signed_reply.wire(), Some(request.mac()), request.time_signed());
        assert!(ok.is_ok());

        let wrong_chain = key().verify(signed_reply.wire(), Some(&[0u8; 64]), request.time_signed());
        assert!(wrong_chain.is_err());
    }

    #[test]
    fn tsig_error_field_is_reported() {
        let mut reply = message();
        reply.set_message_type(MessageType::Response);
        let tsig = TSIG::new(
            WireAlgorithm::HmacSha512,
            now(),
            DEFAULT_FUDGE,
            Vec::new(),
            reply.id(),
            BADSIG,
            Vec::new(),
        );
        reply.add_tsig(make_tsig_record(key().name().clone(), tsig));

        let checked = key().verify(&reply.to_bytes().unwrap(), None, now()).unwrap();
        assert_eq!(checked.status, TsigStatus::Rejected { error: BADSIG });
    }

    #[test]
    fn full_additional_section_cannot_be_signed() {
        let mut crowded = message();
        let filler = Record::from_rdata(Name::root(), 0, RData::A(A::new(127, 0, 0, 1)));
        crowded
            .additionals_mut()
            .extend(std::iter::repeat_n(filler, usize::from(u16::MAX)));

        let err = key().sign(&crowded).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn unsigned_messages_pass_through() {
        let wire = message().to_bytes().unwrap();
        let checked = key().verify(&wire, None, now()).unwrap();
        assert_eq!(checked.status, TsigStatus::Unsigned);
        assert_eq!(checked.message.to_bytes().unwrap(), wire);
    }
}
