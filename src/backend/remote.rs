//! TCP client backend speaking the framed wire protocol
//!
//! One long-lived connection per backend node, shared by all concurrent
//! operations through a mutex. The connection is (re)established lazily;
//! every round-trip carries a bounded deadline, and a failed round-trip
//! drops the connection so the next call reconnects.

use crate::backend::protocol::{Frame, WireCodec};
use crate::backend::Backend;
use crate::error::BackendError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

type Connection = Framed<TcpStream, WireCodec>;

/// Client for a single remote backend node.
pub struct RemoteBackend {
    addr: String,
    request_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl RemoteBackend {
    /// Connect to a backend node, verifying reachability with a ping.
    pub async fn connect(
        host: &str,
        port: u16,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let backend = Self {
            addr: format!("{}:{}", host, port),
            request_timeout,
            conn: Mutex::new(None),
        };
        backend.ping().await?;
        Ok(backend)
    }

    async fn roundtrip(&self, request: Frame) -> Result<Frame, BackendError> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            let stream = tokio::time::timeout(self.request_timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| BackendError::Timeout(self.request_timeout))??;
            *guard = Some(Framed::new(stream, WireCodec));
        }
        let framed = match guard.as_mut() {
            Some(framed) => framed,
            None => return Err(BackendError::NotConnected),
        };

        let exchange = async {
            framed.send(request).await?;
            match framed.next().await {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(e)) => Err(BackendError::from(e)),
                None => Err(BackendError::Unreachable("connection closed".to_string())),
            }
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(BackendError::Timeout(self.request_timeout))
            }
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.roundtrip(Frame::command(&["GET", key])).await? {
            Frame::Bulk(value) => Ok(value),
            Frame::Error(e) => Err(BackendError::Protocol(e)),
            other => Err(BackendError::Protocol(format!(
                "unexpected GET response: {:?}",
                other
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), BackendError> {
        let ttl = ttl_seconds.to_string();
        match self
            .roundtrip(Frame::command(&["SET", key, value, &ttl]))
            .await?
        {
            Frame::Simple(_) => Ok(()),
            Frame::Error(e) => Err(BackendError::Protocol(e)),
            other => Err(BackendError::Protocol(format!(
                "unexpected SET response: {:?}",
                other
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<u64, BackendError> {
        match self.roundtrip(Frame::command(&["DEL", key])).await? {
            Frame::Integer(n) => Ok(n.max(0) as u64),
            Frame::Error(e) => Err(BackendError::Protocol(e)),
            other => Err(BackendError::Protocol(format!(
                "unexpected DEL response: {:?}",
                other
            ))),
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        match self.roundtrip(Frame::command(&["DELPAT", pattern])).await? {
            Frame::Integer(n) => Ok(n.max(0) as u64),
            Frame::Error(e) => Err(BackendError::Protocol(e)),
            other => Err(BackendError::Protocol(format!(
                "unexpected DELPAT response: {:?}",
                other
            ))),
        }
    }

    async fn ping(&self) -> Result<(), BackendError> {
        match self.roundtrip(Frame::command(&["PING"])).await? {
            Frame::Simple(_) => Ok(()),
            Frame::Error(e) => Err(BackendError::Protocol(e)),
            other => Err(BackendError::Protocol(format!(
                "unexpected PING response: {:?}",
                other
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("remote({})", self.addr)
    }
}
