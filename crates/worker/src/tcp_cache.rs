//! The TCP Cache Server (§4.5, §6 "TCP Cache Server frame") — the fast path
//! for `active_pull` reads when `tcp_direct` is set.
//!
//! Grounded on `cache_server.py`'s `CacheServer`/`Reply`: one accept loop,
//! a bounded pool of concurrently-serviced connections, one request per
//! connection, a hard cap on request size, and a two-variant frame
//! (`===msg: <text>` for errors, `===obj: <bytes>` for a hit).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::cache::WorkerCache;

const MAX_REQUEST_BYTES: usize = 512;
const MAX_CONNECTIONS: usize = 10;
const PER_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A framed reply: `===msg: <text>` or `===obj: <raw bytes>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Msg(String),
    Obj(Vec<u8>),
}

impl Reply {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Reply::Msg(text) => [b"===msg: ".as_slice(), text.as_bytes()].concat(),
            Reply::Obj(bytes) => [b"===obj: ".as_slice(), bytes.as_slice()].concat(),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Option<Reply> {
        if let Some(rest) = data.strip_prefix(b"===msg: ") {
            Some(Reply::Msg(String::from_utf8_lossy(rest).into_owned()))
        } else if let Some(rest) = data.strip_prefix(b"===obj: ") {
            Some(Reply::Obj(rest.to_vec()))
        } else {
            None
        }
    }
}

/// Raw-socket cache server bound to a worker's `cache_port`.
pub struct CacheServer {
    cache: Arc<WorkerCache>,
    shutdown: Notify,
}

impl CacheServer {
    pub fn new(cache: Arc<WorkerCache>) -> Self {
        Self { cache, shutdown: Notify::new() }
    }

    /// Run the accept loop until [`CacheServer::stop`] is called.
    pub async fn serve(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "cache server listening");
        let semaphore = Arc::new(Semaphore::new(MAX_CONNECTIONS));

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("cache server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    let cache = self.cache.clone();
                    let permit = semaphore.clone();
                    tokio::spawn(async move {
                        let _permit = permit.acquire_owned().await;
                        if let Err(err) = handle_connection(stream, &cache).await {
                            warn!(%addr, %err, "cache server connection error");
                        }
                    });
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

async fn handle_connection(mut stream: TcpStream, cache: &WorkerCache) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES + 1];
    let read = tokio::time::timeout(PER_CONNECTION_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))??;

    if read == 0 {
        return Ok(());
    }
    if read > MAX_REQUEST_BYTES {
        let reply = Reply::Msg("Request too long.".to_string());
        stream.write_all(&reply.to_bytes()).await?;
        return Ok(());
    }

    let key = String::from_utf8_lossy(&buf[..read]).to_string();
    debug!(key, "cache server handling request");

    let reply = match cache.get(&key) {
        Some(value) => match serde_json::to_vec(&value) {
            Ok(bytes) => Reply::Obj(bytes),
            Err(_) => Reply::Msg("Failed to encode value.".to_string()),
        },
        None => Reply::Msg("Key not found.".to_string()),
    };
    stream.write_all(&reply.to_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_frame_roundtrips() {
        let reply = Reply::Msg("Key not found.".to_string());
        let bytes = reply.to_bytes();
        assert_eq!(Reply::from_bytes(&bytes), Some(reply));
    }

    #[test]
    fn obj_frame_roundtrips() {
        let reply = Reply::Obj(vec![1, 2, 3, 4]);
        let bytes = reply.to_bytes();
        assert_eq!(Reply::from_bytes(&bytes), Some(reply));
    }

    #[test]
    fn unframed_bytes_do_not_parse() {
        assert_eq!(Reply::from_bytes(b"garbage"), None);
    }

    #[tokio::test]
    async fn serve_answers_a_cached_key_over_the_wire() {
        let cache = Arc::new(WorkerCache::with_capacity(8));
        cache.put("k", serde_json::json!({"v": 1}));
        let server = Arc::new(CacheServer::new(cache));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server_handle = server.clone();
        let task = tokio::spawn(async move { server_handle.serve(port).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"k").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();

        let reply = Reply::from_bytes(&buf).unwrap();
        assert_eq!(reply, Reply::Obj(serde_json::to_vec(&serde_json::json!({"v": 1})).unwrap()));

        server.stop();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
