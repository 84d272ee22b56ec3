//! Transport layer abstraction.
//!
//! A transport moves whole tokens in order between two endpoints. Sending
//! and receiving take independent locks, so a blocked write never stalls
//! delivery of incoming tokens.

use crate::codec::{BinaryCodec, Codec, Frame, TextCodec};
use crate::error::{ProtocolError, ProtocolResult};
use crate::token::{ClientToken, ServerToken};
use crate::url::{AetherUrl, WireFormat};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An ordered, bidirectional token pipe.
pub trait Transport<Out, In>: Send + Sync {
    /// Sends one token.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the token cannot be
    /// encoded.
    fn send(&self, token: Out) -> ProtocolResult<()>;

    /// Blocks for the next token. Returns `None` once the peer has gone
    /// away or the transport was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the incoming bytes cannot be decoded.
    fn recv(&self) -> ProtocolResult<Option<In>>;

    /// Closes the transport and unblocks a pending `recv`.
    fn close(&self);

    /// Returns true until `close` is called or the peer goes away.
    fn is_open(&self) -> bool;
}

/// The client end: sends server tokens, receives client tokens.
pub type ClientLink = dyn Transport<ServerToken, ClientToken>;

/// The server end: sends client tokens, receives server tokens.
pub type ServerLink = dyn Transport<ClientToken, ServerToken>;

/// A transport over a TCP stream with a pluggable codec.
pub struct StreamTransport<C> {
    codec: C,
    stream: TcpStream,
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    open: AtomicBool,
}

impl<C: Codec> StreamTransport<C> {
    /// Wraps a connected stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream handle cannot be duplicated.
    pub fn new(stream: TcpStream, codec: C) -> ProtocolResult<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            codec,
            stream,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            open: AtomicBool::new(true),
        })
    }
}

impl<C, Out, In> Transport<Out, In> for StreamTransport<C>
where
    C: Codec,
    Out: Frame,
    In: Frame,
{
    fn send(&self, token: Out) -> ProtocolResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(ProtocolError::Closed);
        }
        let mut writer = self.writer.lock();
        self.codec.write_frame(&mut *writer, &token)
    }

    fn recv(&self) -> ProtocolResult<Option<In>> {
        let mut reader = self.reader.lock();
        match self.codec.read_frame(&mut *reader) {
            Ok(None) => {
                self.open.store(false, Ordering::SeqCst);
                Ok(None)
            }
            Err(_) if !self.open.load(Ordering::SeqCst) => Ok(None),
            other => other,
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.stream.shutdown(Shutdown::Both) {
                debug!(error = %e, "stream shutdown failed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Wraps a connected stream in the transport for `format`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedScheme`] for the external format.
pub fn stream_transport<Out, In>(
    stream: TcpStream,
    format: WireFormat,
) -> ProtocolResult<Arc<dyn Transport<Out, In>>>
where
    Out: Frame + 'static,
    In: Frame + 'static,
{
    let link: Arc<dyn Transport<Out, In>> = match format {
        WireFormat::Binary => Arc::new(StreamTransport::new(stream, BinaryCodec)?),
        WireFormat::Text => Arc::new(StreamTransport::new(stream, TextCodec)?),
        WireFormat::External => {
            return Err(ProtocolError::UnsupportedScheme(
                WireFormat::External.scheme().to_string(),
            ))
        }
    };
    Ok(link)
}

/// Opens a client link to the server named by `url`.
///
/// # Errors
///
/// Returns an error if the scheme has no codec or the connection fails.
pub fn connect(url: &AetherUrl) -> ProtocolResult<Arc<ClientLink>> {
    if url.format == WireFormat::External {
        return Err(ProtocolError::UnsupportedScheme(url.format.scheme().to_string()));
    }
    let stream = TcpStream::connect(url.authority())?;
    debug!(url = %url, "connected");
    stream_transport(stream, url.format)
}

/// One direction of an in-process link.
struct Queue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Queue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, item: T) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        while !state.closed && state.items.len() >= self.capacity {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(ProtocolError::Closed);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Queued items are still handed out after close.
    fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// One end of an in-process link.
///
/// Each direction is a bounded queue. A sender blocks while the peer's queue
/// is full and is woken as soon as the peer takes a token or either end
/// closes. Dropping an end closes the link.
pub struct MemoryTransport<Out, In> {
    outgoing: Arc<Queue<Out>>,
    incoming: Arc<Queue<In>>,
}

/// Creates both ends of an in-process link with `capacity` slots per
/// direction. A capacity of zero is treated as one.
pub fn memory_pair<A, B>(capacity: usize) -> (MemoryTransport<A, B>, MemoryTransport<B, A>) {
    let forward = Arc::new(Queue::new(capacity));
    let backward = Arc::new(Queue::new(capacity));
    (
        MemoryTransport {
            outgoing: Arc::clone(&forward),
            incoming: Arc::clone(&backward),
        },
        MemoryTransport {
            outgoing: backward,
            incoming: forward,
        },
    )
}

impl<Out: Send, In: Send> Transport<Out, In> for MemoryTransport<Out, In> {
    fn send(&self, token: Out) -> ProtocolResult<()> {
        self.outgoing.push(token)
    }

    fn recv(&self) -> ProtocolResult<Option<In>> {
        Ok(self.incoming.pop())
    }

    fn close(&self) {
        self.outgoing.close();
        self.incoming.close();
    }

    fn is_open(&self) -> bool {
        !self.outgoing.is_closed()
    }
}

impl<Out, In> Drop for MemoryTransport<Out, In> {
    fn drop(&mut self) {
        self.outgoing.close();
        self.incoming.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Ack, SynchToken};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn memory_pair_delivers_in_order() {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(4);
        for sequence in 1..=3 {
            client.send(ServerToken::Synch(SynchToken { sequence })).unwrap();
        }
        for sequence in 1..=3 {
            assert_eq!(
                server.recv().unwrap(),
                Some(ServerToken::Synch(SynchToken { sequence }))
            );
        }
    }

    #[test]
    fn memory_close_unblocks_both_sides() {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(1);
        let server = Arc::new(server);
        let reader = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.recv())
        };
        client.close();
        assert!(reader.join().unwrap().unwrap().is_none());
        assert!(!server.is_open());
        assert!(matches!(
            server.send(ClientToken::ServerDisconnect),
            Err(ProtocolError::Closed)
        ));
    }

    #[test]
    fn memory_backpressure_blocks_until_drained() {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(1);
        client.send(ServerToken::Synch(SynchToken { sequence: 1 })).unwrap();
        let writer = thread::spawn(move || {
            client.send(ServerToken::Synch(SynchToken { sequence: 2 })).unwrap();
            client
        });
        thread::sleep(Duration::from_millis(60));
        assert!(!writer.is_finished());
        assert!(server.recv().unwrap().is_some());
        let _client = writer.join().unwrap();
        assert_eq!(server.recv().unwrap().map(|t| t.sequence()), Some(2));
    }

    #[test]
    fn memory_close_wakes_a_blocked_sender() {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(1);
        let client = Arc::new(client);
        client.send(ServerToken::Synch(SynchToken { sequence: 1 })).unwrap();
        let writer = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.send(ServerToken::Synch(SynchToken { sequence: 2 })))
        };
        thread::sleep(Duration::from_millis(60));
        assert!(!writer.is_finished());
        server.close();
        assert!(matches!(writer.join().unwrap(), Err(ProtocolError::Closed)));
    }

    #[test]
    fn memory_drop_disconnects_after_draining() {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(2);
        client.send(ServerToken::Synch(SynchToken { sequence: 1 })).unwrap();
        drop(client);
        assert_eq!(server.recv().unwrap().map(|t| t.sequence()), Some(1));
        assert!(server.recv().unwrap().is_none());
        assert!(!server.is_open());
    }

    #[test]
    fn tcp_round_trip_in_both_formats() {
        for format in [WireFormat::Binary, WireFormat::Text] {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let server = thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let link: Arc<ServerLink> = stream_transport(stream, format).unwrap();
                let token = link.recv().unwrap().unwrap();
                link.send(ClientToken::Ack(Ack {
                    sequence: token.sequence(),
                    global_sequence: 0,
                    participant: None,
                }))
                .unwrap();
                link.close();
            });

            let stream = TcpStream::connect(addr).unwrap();
            let link: Arc<ClientLink> = stream_transport(stream, format).unwrap();
            link.send(ServerToken::Synch(SynchToken { sequence: 11 })).unwrap();
            let reply = link.recv().unwrap().unwrap();
            assert_eq!(reply.reply_sequence(), Some(11));
            assert!(link.recv().unwrap().is_none());
            server.join().unwrap();
        }
    }

    #[test]
    fn external_scheme_cannot_connect() {
        let url = AetherUrl::parse("aexp://127.0.0.1:1").unwrap();
        assert!(matches!(connect(&url), Err(ProtocolError::UnsupportedScheme(_))));
    }
}
