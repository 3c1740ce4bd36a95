/* src/response.rs */

use crate::error::{Error, UpdateResult};
use crate::record::DnsRecord;
use crate::tsig::{self, SignedMessage, TsigKey, TsigStatus};
use crate::update::Request;
use fancy_log::{LogLevel, log};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::Name;

/// Verifies and decodes a reply to `request`, mapping its response code to an outcome.
/// Query replies yield the matching records (possibly none); update replies yield an
/// empty list on success.
pub fn interpret(
    raw: &[u8],
    request: &Request,
    signed: &SignedMessage,
    key: &TsigKey,
    zone: &Name,
) -> UpdateResult<Vec<DnsRecord>> {
    let checked = key.verify(raw, Some(signed.mac()), tsig::now())?;
    let message = checked.message;

    if message.id() != signed.id() {
        return Err(Error::protocol(format!(
            "response id {} does not match request id {}",
            message.id(),
            signed.id()
        )));
    }
    if message.message_type() != MessageType::Response {
        return Err(Error::protocol("server sent a query instead of a response"));
    }

    let rcode = message.response_code();
    match checked.status {
        TsigStatus::Verified { .. } => {}
        TsigStatus::Rejected { error } => {
            log(
                LogLevel::Warn,
                &format!("Server rejected our TSIG signature (error {}, rcode {})", error, rcode),
            );
            return Err(Error::Authorization { rcode });
        }
        // Servers answer some failures unsigned; anything else must carry a signature.
        TsigStatus::Unsigned if unsigned_failure(rcode) => log(
            LogLevel::Warn,
            &format!("Server reply ({}) carries no TSIG signature", rcode),
        ),
        TsigStatus::Unsigned => {
            return Err(Error::Authentication(format!(
                "unsigned {} reply to a signed request",
                rcode
            )));
        }
    }

    match request {
        Request::Query(lookup) => match rcode {
            ResponseCode::NoError => Ok(extract(&message, &lookup.fqdn, lookup.rtype, zone)),
            ResponseCode::NXDomain => Ok(Vec::new()),
            other => Err(failure(other)),
        },
        Request::Update(transaction) => match rcode {
            ResponseCode::NoError => Ok(Vec::new()),
            ResponseCode::NXRRSet if transaction.is_delete_only() => {
                log(
                    LogLevel::Debug,
                    "Record to delete was already absent, treating as success",
                );
                Ok(Vec::new())
            }
            other => Err(failure(other)),
        },
    }
}

fn unsigned_failure(rcode: ResponseCode) -> bool {
    matches!(
        rcode,
        ResponseCode::Refused
            | ResponseCode::NotAuth
            | ResponseCode::FormErr
            | ResponseCode::ServFail
            | ResponseCode::NotImp
    )
}

fn failure(rcode: ResponseCode) -> Error {
    match rcode {
        ResponseCode::YXRRSet
        | ResponseCode::NXRRSet
        | ResponseCode::YXDomain
        | ResponseCode::NXDomain => Error::Conflict { rcode },
        ResponseCode::Refused | ResponseCode::NotAuth => Error::Authorization { rcode },
        other => Error::Protocol {
            reason: format!("server answered {}", other),
            rcode: Some(other),
        },
    }
}

fn extract(
    message: &Message,
    fqdn: &Name,
    rtype: crate::record::RecordType,
    zone: &Name,
) -> Vec<DnsRecord> {
    let wanted = rtype.to_wire();
    let mut records: Vec<DnsRecord> = Vec::new();
    for answer in message.answers() {
        if answer.record_type() != wanted || answer.name().to_lowercase() != fqdn.to_lowercase() {
            continue;
        }
        if let Some(record) = DnsRecord::from_wire(answer, zone) {
            if !records.contains(&record) {
                records.push(record);
            }
        }
    }
    records
}
