use log::debug;
use shared::{PlainStatus, RanksReport, Request, StatusReport};
use std::error::Error;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub type ClientResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Upper bound on a response we are willing to buffer
const MAX_RESPONSE_BYTES: u64 = 1 << 20;

/// One-shot query client. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct QueryClient {
    addr: String,
    timeout: Duration,
}

impl QueryClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `line` (a newline is appended) and returns everything the
    /// server wrote before closing.
    pub async fn send_line(&self, line: &str) -> ClientResult<String> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(format!("{}\n", line).as_bytes()).await?;
            // Half-close so the server sees the end of our request
            stream.shutdown().await?;

            let mut response = String::new();
            stream
                .take(MAX_RESPONSE_BYTES)
                .read_to_string(&mut response)
                .await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| format!("no response from {} within {:?}", self.addr, self.timeout))??;

        debug!("{} answered {:?} with {} bytes", self.addr, line, response.len());
        Ok(response)
    }

    pub async fn send(&self, request: &Request) -> ClientResult<String> {
        self.send_line(&request.to_string()).await
    }

    /// `QUERY`, decoded.
    pub async fn status(&self) -> ClientResult<PlainStatus> {
        let response = self.send(&Request::Query).await?;
        Ok(response.parse()?)
    }

    /// `QUERY_JSON`, decoded.
    pub async fn status_json(&self) -> ClientResult<StatusReport> {
        let response = self.send(&Request::QueryJson).await?;
        Ok(serde_json::from_str(response.trim_end())?)
    }

    /// `QUERY_RANKS:<player>`, decoded.
    pub async fn ranks(&self, player: &str) -> ClientResult<RanksReport> {
        let request = Request::QueryRanks {
            player: player.to_string(),
        };
        let response = self.send(&request).await?;
        Ok(serde_json::from_str(response.trim_end())?)
    }
}
