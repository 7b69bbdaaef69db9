//! DNS message encoding and decoding.
//!
//! Queries are single-question recursive queries with a random ID. Padded
//! queries carry an EDNS0 OPT record (4096-byte payload, DO bit set) with a
//! padding option that rounds the message up to a multiple of 128 bytes, the
//! block size RFC 8467 recommends for clients.

use crate::base::neterror::NetError;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::{Name, RData, RecordType};
use std::fmt;

/// EDNS0 padding option code (RFC 7830).
const EDNS_PADDING: u16 = 12;

/// Padding block size for queries.
const PADDING_BLOCK: usize = 128;

/// Size of an option header (code + length).
const OPTION_HEADER: usize = 4;

const MAX_PAYLOAD: u16 = 4096;

/// The address families the resolvers ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    A,
    Aaaa,
}

impl QueryType {
    pub fn record_type(self) -> RecordType {
        match self {
            QueryType::A => RecordType::A,
            QueryType::Aaaa => RecordType::AAAA,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::A => f.write_str("A"),
            QueryType::Aaaa => f.write_str("AAAA"),
        }
    }
}

/// Encodes lookup queries and decodes their replies.
pub trait DnsCodec: Send + Sync {
    /// Encodes a query for `domain`, optionally padded.
    fn encode(&self, domain: &str, qtype: QueryType, padding: bool) -> Result<Vec<u8>, NetError>;

    /// Extracts the addresses matching `qtype` from a reply.
    fn decode(&self, qtype: QueryType, reply: &[u8]) -> Result<Vec<String>, NetError>;
}

impl<C: DnsCodec + ?Sized> DnsCodec for std::sync::Arc<C> {
    fn encode(&self, domain: &str, qtype: QueryType, padding: bool) -> Result<Vec<u8>, NetError> {
        (**self).encode(domain, qtype, padding)
    }

    fn decode(&self, qtype: QueryType, reply: &[u8]) -> Result<Vec<String>, NetError> {
        (**self).decode(qtype, reply)
    }
}

/// The default codec, backed by `hickory-proto`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HickoryCodec;

impl HickoryCodec {
    fn build_query(domain: &str, qtype: QueryType) -> Result<Message, NetError> {
        let mut fqdn = domain.to_string();
        if !fqdn.ends_with('.') {
            fqdn.push('.');
        }
        let name = Name::from_ascii(&fqdn)?;

        let mut message = Message::new();
        message
            .set_id(fastrand::u16(..))
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name, qtype.record_type()));
        Ok(message)
    }
}

/// Number of zero bytes that make a message of `len` bytes (already holding
/// an empty OPT record) a multiple of the padding block once the padding
/// option header is added.
pub fn padding_len(len: usize) -> usize {
    (PADDING_BLOCK - (len + OPTION_HEADER) % PADDING_BLOCK) % PADDING_BLOCK
}

impl DnsCodec for HickoryCodec {
    fn encode(&self, domain: &str, qtype: QueryType, padding: bool) -> Result<Vec<u8>, NetError> {
        let mut message = Self::build_query(domain, qtype)?;
        if !padding {
            return Ok(message.to_vec()?);
        }

        let mut edns = Edns::new();
        edns.set_max_payload(MAX_PAYLOAD).set_dnssec_ok(true);
        *message.extensions_mut() = Some(edns.clone());
        let unpadded = message.to_vec()?.len();

        edns.options_mut()
            .insert(EdnsOption::Unknown(EDNS_PADDING, vec![0; padding_len(unpadded)]));
        *message.extensions_mut() = Some(edns);
        Ok(message.to_vec()?)
    }

    fn decode(&self, qtype: QueryType, reply: &[u8]) -> Result<Vec<String>, NetError> {
        let message = Message::from_vec(reply)?;
        match message.response_code() {
            ResponseCode::NoError => {}
            ResponseCode::NXDomain => return Err(NetError::DnsNoSuchHost),
            ResponseCode::ServFail => return Err(NetError::DnsServerTemporarilyMisbehaving),
            _ => return Err(NetError::DnsServerMisbehaving),
        }

        let addrs: Vec<String> = message
            .answers()
            .iter()
            .filter_map(|record| match (qtype, record.data()) {
                (QueryType::A, RData::A(a)) => Some(a.0.to_string()),
                (QueryType::Aaaa, RData::AAAA(aaaa)) => Some(aaaa.0.to_string()),
                _ => None,
            })
            .collect();
        if addrs.is_empty() {
            return Err(NetError::DnsNoAnswer);
        }
        Ok(addrs)
    }
}
