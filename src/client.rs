/* src/client.rs */

use crate::config::ZoneContext;
use crate::error::{Error, UpdateResult};
use crate::record::{DnsRecord, RecordType};
use crate::response;
use crate::transport::{DnsTransport, Transport};
use crate::update::{self, Operation, Request, UpdateTransaction};
use fancy_log::{LogLevel, log};

/// Dynamic update client bound to one zone. Holds no mutable state, so a shared
/// reference can serve any number of concurrent calls.
#[derive(Debug)]
pub struct NsUpdater<T = DnsTransport> {
    context: ZoneContext,
    transport: T,
}

impl NsUpdater<DnsTransport> {
    pub fn new(context: ZoneContext) -> Self {
        let transport = DnsTransport::new(context.protocol());
        Self { context, transport }
    }
}

impl<T: Transport> NsUpdater<T> {
    pub fn with_transport(context: ZoneContext, transport: T) -> Self {
        Self { context, transport }
    }

    pub fn context(&self) -> &ZoneContext {
        &self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Records of `rtype` at `name`. An empty list means nothing is there.
    pub async fn get(&self, name: &str, rtype: RecordType) -> UpdateResult<Vec<DnsRecord>> {
        let request = update::lookup(&self.context, name, rtype)?;
        let records = self.execute(&request).await?;
        log(
            LogLevel::Debug,
            &format!("{} {} has {} record(s)", name, rtype, records.len()),
        );
        Ok(records)
    }

    /// Adds `record` to its RRset. Adding a record that already exists is a no-op.
    pub async fn create(&self, record: &DnsRecord) -> UpdateResult {
        let request = update::build(&self.context, Operation::Create, record)?;
        self.run(&request, "created", record).await
    }

    /// Adds `record` only if no record of its name and type exists yet.
    pub async fn create_absent(&self, record: &DnsRecord) -> UpdateResult {
        let transaction = UpdateTransaction::new(&self.context)
            .assert_absent(record.clone())
            .add(record.clone());
        self.run(&Request::Update(transaction), "created", record).await
    }

    /// Removes exactly `record`, leaving other values of the same RRset in place.
    /// Deleting something that is not there succeeds.
    pub async fn delete(&self, record: &DnsRecord) -> UpdateResult {
        let request = update::build(&self.context, Operation::Delete, record)?;
        self.run(&request, "deleted", record).await
    }

    /// Swaps `old` for `new` atomically; fails with a conflict if `old` is gone.
    pub async fn replace(&self, old: &DnsRecord, new: &DnsRecord) -> UpdateResult {
        let transaction = UpdateTransaction::new(&self.context)
            .assert_exists(old.clone())
            .delete(old.clone())
            .add(new.clone());
        self.run(&Request::Update(transaction), "replaced", new).await
    }

    /// Sends a caller-assembled transaction as one update.
    pub async fn submit(&self, transaction: UpdateTransaction) -> UpdateResult {
        if transaction.is_empty() {
            return Ok(());
        }
        if transaction.zone() != self.context.zone() {
            return Err(Error::Configuration(format!(
                "transaction targets zone {} but this client manages {}",
                transaction.zone(),
                self.context.zone()
            )));
        }
        let entries = transaction.entries().len();
        self.execute(&Request::Update(transaction)).await?;
        log(
            LogLevel::Info,
            &format!(
                "Applied update with {} entries to {}",
                entries,
                self.context.zone()
            ),
        );
        Ok(())
    }

    async fn run(&self, request: &Request, verb: &str, record: &DnsRecord) -> UpdateResult {
        let fqdn = record.fqdn(self.context.zone())?;
        match self.execute(request).await {
            Ok(_) => {
                log(
                    LogLevel::Info,
                    &format!("Successfully {} DNS record {} {} {}", verb, fqdn, record.record_type(), record.value()),
                );
                Ok(())
            }
            Err(e) => {
                log(
                    LogLevel::Error,
                    &format!("Failed to update DNS record for {}: {}", fqdn, e),
                );
                Err(e)
            }
        }
    }

    /// One signed round trip: encode, sign, send, verify, interpret.
    async fn execute(&self, request: &Request) -> UpdateResult<Vec<DnsRecord>> {
        let message = request.to_message(rand::random::<u16>(), self.context.default_ttl())?;
        let signed = self.context.key().sign(&message)?;
        log(
            LogLevel::Debug,
            &format!(
                "Sending {} byte message {} to {}",
                signed.wire().len(),
                signed.id(),
                self.context.server()
            ),
        );

        let raw = self
            .transport
            .exchange(signed.wire(), self.context.server(), self.context.timeout())
            .await?;
        response::interpret(&raw, request, &signed, self.context.key(), self.context.zone())
    }
}
