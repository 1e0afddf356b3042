use crate::{
    address::Address,
    error::{ResolveError, ValidationError},
    page::{FieldMask, PageRequest, DEFAULT_LIMIT, MAX_LIMIT},
    resolver::{Consistency, History, HistoryQuery, Resolvers},
};

use std::{future, io};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// One line of JSON on the wire.
#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub address: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Opaque to us, handed to the assembler
    #[serde(default)]
    pub fields: String,
    pub consistency: Option<Consistency>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Result(History),
    Error { message: String, retryable: bool },
}

impl From<ResolveError> for Response {
    fn from(e: ResolveError) -> Self {
        Response::Error {
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

pub struct RequestProcessor {
    resolvers: Resolvers,
    network_prefix: String,
}

impl RequestProcessor {
    pub fn new(resolvers: Resolvers, network_prefix: String) -> Self {
        Self {
            resolvers,
            network_prefix,
        }
    }

    /// Check a request before it gets anywhere near the store. Without a limit, the
    /// canonical path gives the most recent entries up to the maximum and the indexed one
    /// a default-sized page.
    pub fn validate(
        &self,
        req: Request,
    ) -> Result<(Consistency, HistoryQuery), ValidationError> {
        let address = Address::parse_with_prefix(&req.address, &self.network_prefix)?;
        let consistency = req
            .consistency
            .unwrap_or(self.resolvers.default_consistency);
        let limit = req.limit.unwrap_or(match consistency {
            Consistency::Canonical => MAX_LIMIT,
            Consistency::Indexed => DEFAULT_LIMIT,
        });
        let page = PageRequest::new(limit, req.offset.unwrap_or(0))?;

        Ok((
            consistency,
            HistoryQuery {
                address,
                page,
                fields: FieldMask::parse(&req.fields),
            },
        ))
    }

    pub async fn process(&self, req: Request) -> Response {
        let (consistency, query) = match self.validate(req) {
            Ok(v) => v,
            Err(e) => return ResolveError::from(e).into(),
        };

        match self.resolvers.resolve(Some(consistency), &query).await {
            Ok(history) => {
                log::debug!(
                    "Resolved {} entries for '{}' ({})",
                    history.len(),
                    query.address,
                    consistency
                );
                Response::Result(history)
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!("Resolving history of '{}': {}", query.address, e);
                }
                e.into()
            }
        }
    }

    /// Read a single request line and write back the response line. Returns `false` once
    /// the other end is done sending, or gave up on the request being processed.
    pub async fn read_req<R, W>(&self, reader: &mut R, writer: &mut W) -> io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(false);
        }
        if line.trim().is_empty() {
            return Ok(true);
        }

        let response = match serde_json::from_str::<Request>(&line) {
            // Nobody to answer once the other end hung up: drop the request, along with
            // what it holds of the pool.
            Ok(req) => tokio::select! {
                biased;
                response = self.process(req) => response,
                _ = hang_up(reader) => return Ok(false),
            },
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
                retryable: false,
            },
        };

        let mut resp = serde_json::to_vec(&response)?;
        resp.push(b'\n');
        writer.write_all(&resp).await?;
        writer.flush().await?;

        Ok(true)
    }
}

// Resolves once the peer closed its end or the connection broke. A pipelined request is
// left in the buffer for the next read.
async fn hang_up<R: AsyncBufRead + Unpin>(reader: &mut R) {
    if let Ok(buf) = reader.fill_buf().await {
        if !buf.is_empty() {
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StoreError,
        ledger::TransactionId,
        memory::MemoryLedger,
        resolver::{tests::*, IndexResolver, JoinResolver},
        store::{AddressIndex, LedgerStore, SpendRow},
    };
    use async_trait::async_trait;
    use serde_json::Value as Json;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };
    use tokio::io::BufReader;

    fn processor(default_consistency: Consistency) -> RequestProcessor {
        let ledger = Arc::new(sample_ledger());
        let resolvers = Resolvers::new(
            Arc::new(JoinResolver::new(ledger.clone())),
            Arc::new(IndexResolver::new(ledger.clone(), ledger)),
            default_consistency,
        );
        RequestProcessor::new(resolvers, "kaspa".to_string())
    }

    fn request(address: &str) -> Request {
        Request {
            address: address.to_string(),
            limit: None,
            offset: None,
            fields: String::new(),
            consistency: None,
        }
    }

    #[test]
    fn request_validation() {
        let processor = processor(Consistency::Indexed);

        let (consistency, query) = processor.validate(request(ADDR)).unwrap();
        assert_eq!(consistency, Consistency::Indexed);
        assert_eq!(query.page, PageRequest::default());

        let mut req = request(ADDR);
        req.consistency = Some(Consistency::Canonical);
        let (_, query) = processor.validate(req).unwrap();
        assert_eq!(query.page.limit(), MAX_LIMIT);

        let mut req = request(ADDR);
        req.limit = Some(501);
        assert_eq!(
            processor.validate(req).unwrap_err(),
            ValidationError::Limit(501)
        );
        let mut req = request(ADDR);
        req.limit = Some(0);
        assert_eq!(
            processor.validate(req).unwrap_err(),
            ValidationError::Limit(0)
        );

        assert!(matches!(
            processor.validate(request("kaspa:tooshort")),
            Err(ValidationError::Address(_))
        ));
    }

    #[tokio::test]
    async fn json_lines() {
        let processor = processor(Consistency::Canonical);
        let input = format!(
            "{}\n\nnot json\n{}\n",
            serde_json::to_string(&request(ADDR)).unwrap(),
            serde_json::json!({ "address": ADDR, "offset": 3 }),
        );
        let mut reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();

        while processor.read_req(&mut reader, &mut output).await.unwrap() {}

        let lines: Vec<Json> = output
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);

        let result = lines[0]["result"].as_array().unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[1]["received"], "tx1");
        assert_eq!(result[1]["spent"], "tx2");
        assert_eq!(result[2]["received"], "tx1");
        assert!(result[2]["spent"].is_null());

        assert_eq!(lines[1]["error"]["retryable"], false);
        // No offset on the canonical path
        assert_eq!(lines[2]["error"]["retryable"], false);
    }

    struct DownIndex;

    #[async_trait]
    impl AddressIndex for DownIndex {
        async fn transaction_page(
            &self,
            _: &Address,
            _: PageRequest,
        ) -> Result<Vec<TransactionId>, StoreError> {
            Err(StoreError::PoolClosed)
        }
    }

    #[tokio::test]
    async fn infrastructure_errors_are_retryable() {
        let ledger = Arc::new(MemoryLedger::new());
        let resolvers = Resolvers::new(
            Arc::new(JoinResolver::new(ledger.clone())),
            Arc::new(IndexResolver::new(Arc::new(DownIndex), ledger)),
            Consistency::Indexed,
        );
        let processor = RequestProcessor::new(resolvers, "kaspa".to_string());

        match processor.process(request(ADDR)).await {
            Response::Error { message, retryable } => {
                assert!(retryable);
                assert!(message.contains("address index lookup"));
            }
            r => panic!("Unexpected response {:?}", r),
        }

        // The canonical path is still fine, and empty
        let mut req = request(ADDR);
        req.consistency = Some(Consistency::Canonical);
        match processor.process(req).await {
            Response::Result(history) => assert!(history.is_empty()),
            r => panic!("Unexpected response {:?}", r),
        }
    }

    // Takes its time, and notes whether it got to the end
    struct SlowLedger {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LedgerStore for SlowLedger {
        async fn address_spends(&self, _: &Address, _: u32) -> Result<Vec<SpendRow>, StoreError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn slow_processor(finished: Arc<AtomicBool>) -> RequestProcessor {
        let ledger = Arc::new(MemoryLedger::new());
        let resolvers = Resolvers::new(
            Arc::new(JoinResolver::new(Arc::new(SlowLedger { finished }))),
            Arc::new(IndexResolver::new(ledger.clone(), ledger)),
            Consistency::Canonical,
        );
        RequestProcessor::new(resolvers, "kaspa".to_string())
    }

    fn request_line() -> Vec<u8> {
        let mut line = serde_json::to_vec(&request(ADDR)).unwrap();
        line.push(b'\n');
        line
    }

    #[tokio::test]
    async fn slow_request_is_answered() {
        let finished = Arc::new(AtomicBool::new(false));
        let processor = slow_processor(finished.clone());
        let (client, server) = tokio::io::duplex(1024);
        let (reader, mut writer) = tokio::io::split(server);
        let mut reader = BufReader::new(reader);
        let mut client = BufReader::new(client);

        client.write_all(&request_line()).await.unwrap();
        assert!(processor.read_req(&mut reader, &mut writer).await.unwrap());
        assert!(finished.load(Ordering::SeqCst));

        let mut response = String::new();
        client.read_line(&mut response).await.unwrap();
        let response: Json = serde_json::from_str(&response).unwrap();
        assert!(response["result"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hang_up_drops_the_request() {
        let finished = Arc::new(AtomicBool::new(false));
        let processor = slow_processor(finished.clone());
        let (mut client, server) = tokio::io::duplex(1024);
        let (reader, mut writer) = tokio::io::split(server);
        let mut reader = BufReader::new(reader);

        client.write_all(&request_line()).await.unwrap();
        drop(client);

        let start = Instant::now();
        assert!(!processor.read_req(&mut reader, &mut writer).await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(300));

        // The store access was dropped, not left running in the background
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
