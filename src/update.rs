/* src/update.rs */

//! RFC 2136 message construction.

use crate::config::ZoneContext;
use crate::error::Error;
use crate::record::{DnsRecord, RecordType, owner_name, validate_name};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, Record};

/// High-level intent of a single-record call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
    Get,
}

/// How one entry of an update transaction is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Update section, class IN: add the RR to its RRset.
    Add,
    /// Update section, class NONE: remove exactly this RR, leaving siblings alone.
    Delete,
    /// Prerequisite, class IN: this exact RR must exist.
    AssertExists,
    /// Prerequisite, class NONE with empty rdata: the RRset must not exist.
    AssertAbsent,
}

/// Entries for one zone, sent as a single atomic update.
#[derive(Debug, Clone)]
pub struct UpdateTransaction {
    zone: Name,
    entries: Vec<(OperationKind, DnsRecord)>,
}

impl UpdateTransaction {
    pub fn new(context: &ZoneContext) -> Self {
        Self {
            zone: context.zone().clone(),
            entries: Vec::new(),
        }
    }

    pub fn add(self, record: DnsRecord) -> Self {
        self.push(OperationKind::Add, record)
    }

    pub fn delete(self, record: DnsRecord) -> Self {
        self.push(OperationKind::Delete, record)
    }

    pub fn assert_exists(self, record: DnsRecord) -> Self {
        self.push(OperationKind::AssertExists, record)
    }

    /// Only the record's name and type matter for this prerequisite.
    pub fn assert_absent(self, record: DnsRecord) -> Self {
        self.push(OperationKind::AssertAbsent, record)
    }

    pub fn push(mut self, kind: OperationKind, record: DnsRecord) -> Self {
        self.entries.push((kind, record));
        self
    }

    pub fn zone(&self) -> &Name {
        &self.zone
    }

    pub fn entries(&self) -> &[(OperationKind, DnsRecord)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A transaction made only of deletes, for which a missing RRset is not a failure.
    pub fn is_delete_only(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|(kind, _)| *kind == OperationKind::Delete)
    }

    pub fn to_message(&self, id: u16, default_ttl: u32) -> Result<Message, Error> {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update)
            .set_recursion_desired(false);
        message.add_query(Query::query(self.zone.clone(), hickory_proto::rr::RecordType::SOA));

        for (kind, record) in &self.entries {
            let owner = record.fqdn(&self.zone)?;
            match kind {
                OperationKind::Add => {
                    let ttl = record.ttl().unwrap_or(default_ttl);
                    let mut rr = Record::from_rdata(owner, ttl, record.rdata()?);
                    rr.set_dns_class(DNSClass::IN);
                    message.add_name_server(rr);
                }
                OperationKind::Delete => {
                    let mut rr = Record::from_rdata(owner, 0, record.rdata()?);
                    rr.set_dns_class(DNSClass::NONE);
                    message.add_name_server(rr);
                }
                OperationKind::AssertExists => {
                    let mut rr = Record::from_rdata(owner, 0, record.rdata()?);
                    rr.set_dns_class(DNSClass::IN);
                    message.add_answer(rr);
                }
                OperationKind::AssertAbsent => {
                    let mut rr = Record::update0(owner, 0, record.record_type().to_wire());
                    rr.set_dns_class(DNSClass::NONE);
                    message.add_answer(rr);
                }
            }
        }
        Ok(message)
    }
}

/// A read-only lookup of one RRset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub name: String,
    pub rtype: RecordType,
    pub fqdn: Name,
}

impl Lookup {
    pub fn to_message(&self, id: u16) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(false);
        message.add_query(Query::query(self.fqdn.clone(), self.rtype.to_wire()));
        message
    }
}

/// What actually goes to the server: a modifying transaction or a plain query.
#[derive(Debug, Clone)]
pub enum Request {
    Update(UpdateTransaction),
    Query(Lookup),
}

impl Request {
    pub fn to_message(&self, id: u16, default_ttl: u32) -> Result<Message, Error> {
        match self {
            Request::Update(transaction) => transaction.to_message(id, default_ttl),
            Request::Query(lookup) => Ok(lookup.to_message(id)),
        }
    }
}

/// Turns a single-record intent into a request for `context`'s zone.
pub fn build(context: &ZoneContext, operation: Operation, record: &DnsRecord) -> Result<Request, Error> {
    zone_of(context)?;
    // resolve the owner now so an oversized name fails before anything is sent
    record.fqdn(context.zone())?;

    Ok(match operation {
        Operation::Create => Request::Update(UpdateTransaction::new(context).add(record.clone())),
        Operation::Delete => Request::Update(UpdateTransaction::new(context).delete(record.clone())),
        Operation::Get => lookup(context, record.name(), record.record_type())?,
    })
}

pub fn lookup(context: &ZoneContext, name: &str, rtype: RecordType) -> Result<Request, Error> {
    let zone = zone_of(context)?;
    let name = validate_name(name)?;
    let fqdn = owner_name(&name, zone)?;
    Ok(Request::Query(Lookup { name, rtype, fqdn }))
}

fn zone_of(context: &ZoneContext) -> Result<&Name, Error> {
    let zone = context.zone();
    if zone.is_root() {
        return Err(Error::Configuration("zone name is missing".into()));
    }
    Ok(zone)
}
