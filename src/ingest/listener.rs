//! TCP ingestion listener.
//!
//! Accepts connections and spawns one handler task per connection. Each
//! handler decodes newline-framed text into commands and submits them to
//! the relay engine. Malformed input is logged and skipped; overflow
//! backpressure is reported back to the sender as an `ERR` line so the
//! upstream can slow down or reject.

use crate::ingest::codec::CommandCodec;
use crate::ingest::parser::{parse_line, ParseError};
use crate::relay::engine::{RelayEngine, RelayError};
use crate::store::StoreClient;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

pub struct RelayListener<C: StoreClient> {
    listener: TcpListener,
    engine: RelayEngine<C>,
    local_addr: SocketAddr,
}

impl<C: StoreClient> RelayListener<C> {
    /// Bind the ingestion socket. Tests bind port 0 and read the
    /// ephemeral port back with `local_addr`.
    pub async fn bind(addr: &str, engine: RelayEngine<C>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("relay listening on {}", local_addr);
        Ok(RelayListener {
            listener,
            engine,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = ConnectionHandler::new(stream, self.engine.clone(), addr);
                    tokio::spawn(async move {
                        handler.run().await;
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}

struct ConnectionHandler<C: StoreClient> {
    framed: Framed<TcpStream, CommandCodec>,
    engine: RelayEngine<C>,
    peer: SocketAddr,
}

impl<C: StoreClient> ConnectionHandler<C> {
    fn new(stream: TcpStream, engine: RelayEngine<C>, peer: SocketAddr) -> Self {
        ConnectionHandler {
            framed: Framed::new(stream, CommandCodec::new()),
            engine,
            peer,
        }
    }

    async fn run(mut self) {
        info!("ingest connection from {}", self.peer);

        while let Some(frame) = self.framed.next().await {
            let line = match frame {
                Ok(line) => line,
                Err(e) => {
                    error!("read error from {}: {}", self.peer, e);
                    break;
                }
            };
            self.handle_line(&line).await;
        }

        info!("ingest connection closed: {}", self.peer);
    }

    async fn handle_line(&mut self, line: &str) {
        let commands = match parse_line(line) {
            Ok(commands) => commands,
            Err(ParseError::Empty) | Err(ParseError::NotInsert) => {
                debug!("ignoring non-insert input from {}", self.peer);
                return;
            }
            Err(e) => {
                warn!("malformed command from {}: {}", self.peer, e);
                let _ = self.framed.send(format!("ERR {}", e)).await;
                return;
            }
        };

        for cmd in commands {
            match self.engine.submit(cmd).await {
                Ok(()) => {}
                Err(e @ RelayError::BufferFull { .. }) => {
                    // Backpressure: tell the sender instead of buffering
                    // without bound.
                    warn!("rejecting write from {}: {}", self.peer, e);
                    let _ = self.framed.send(format!("ERR {}", e)).await;
                }
                Err(e) => {
                    warn!("rejecting write from {}: {}", self.peer, e);
                }
            }
        }
    }
}
