use crate::error::Error;
use crate::event::{DnsQueryEvent, DynQueryObserver};
use std::net::Ipv4Addr;
use time::OffsetDateTime;
use tracing::{debug, error};
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, LowerQuery, OpCode, ResponseCode};
use trust_dns_server::client::rr::{RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// TTL of every synthesized `A` record.
const ANSWER_TTL: u32 = 3600;

#[derive(Clone)]
pub struct Handler {
    answer_addr: Ipv4Addr,
    observer: DynQueryObserver,
}

impl Handler {
    pub(super) fn new(answer_addr: Ipv4Addr, observer: DynQueryObserver) -> Self {
        Handler {
            answer_addr,
            observer,
        }
    }

    /// The answer section for a question. Only `A` questions of a `Query` message are answered,
    /// and each one is reported to the observer before its record is built.
    fn answers(&self, op_code: OpCode, query: &LowerQuery) -> Vec<Record> {
        if op_code != OpCode::Query || query.query_type() != RecordType::A {
            return Vec::new();
        }

        let name = query.name();
        debug!("query for {name}");
        self.observer.on_query(DnsQueryEvent {
            domain: name.to_string(),
            received: OffsetDateTime::now_utc(),
        });
        vec![Record::from_rdata(
            name.into(),
            ANSWER_TTL,
            RData::A(self.answer_addr),
        )]
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let records = self.answers(request.op_code(), request.query());
        let header = Header::response_from_request(request.header());
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, records.iter(), &[], &[], &[]);
        Ok(response_handle.send_response(response).await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
