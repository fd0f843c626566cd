//! Transport connecting separate processes over TCP.
//!
//! Every pair of ranks shares one stream. Rank `r` connects to all ranks
//! below it and accepts connections from all ranks above it; the connecting
//! side introduces itself with a [`Handshake`]. Each stream is then read by a
//! dedicated receiver thread that decodes frames and pushes them into the
//! rank's inbox, so writes never wait for the peer to call a receive.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    thread::JoinHandle,
    time::Instant,
};

use crossbeam::channel::Sender;
use socket2::{Domain, Protocol, Socket, Type};
use zerocopy::{AsBytes, FromBytes};

use crate::{
    config::TcpConfig,
    error::{Error, Result},
    mailbox::Mailbox,
    protocol::{kind, Envelope, FrameHeader, Handshake, Matcher, Ticket, FRAME_HEADER_SIZE, MAGIC},
    transport::Transport,
    utils::{sleep_until, ExponentialBackoff},
};

pub struct TcpTransport {
    rank: usize,
    size: usize,
    streams: Vec<Option<TcpStream>>,
    loopback: Sender<Envelope>,
    mailbox: Mailbox,
    receivers: Vec<JoinHandle<()>>,
}

impl TcpTransport {
    /// Connects to all peers listed in `config`.
    ///
    /// Blocks until every rank is connected or the connect timeout expires.
    #[tracing::instrument(skip(config), fields(rank = config.rank, size = config.peers.len()))]
    pub fn connect(config: &TcpConfig) -> Result<Self> {
        config.validate()?;

        let rank = config.rank;
        let size = config.peers.len();
        let deadline = Instant::now() + config.connect_timeout;
        let listener = bind(config.peers[rank])?;

        let mut streams: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
        for (peer, addr) in config.peers.iter().enumerate().take(rank) {
            streams[peer] = Some(connect_to(*addr, rank, size, deadline)?);
            tracing::debug!(peer, %addr, "connected");
        }
        for (peer, stream) in accept_from(&listener, rank, size, deadline)? {
            streams[peer] = Some(stream);
        }

        let (loopback, inbox) = crossbeam::channel::unbounded();
        let mut receivers = Vec::with_capacity(size.saturating_sub(1));
        for (peer, stream) in streams.iter().enumerate() {
            let Some(stream) = stream else { continue };
            let reader = stream.try_clone()?;
            let sender = loopback.clone();
            receivers.push(
                std::thread::Builder::new()
                    .name(format!("parcomm-recv-{peer}"))
                    .spawn(move || receiver_thread(reader, peer, sender))?,
            );
        }
        tracing::info!("connected to {} peers", receivers.len());

        Ok(Self {
            rank,
            size,
            streams,
            loopback,
            mailbox: Mailbox::new(inbox, size),
            receivers,
        })
    }
}

fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("timed out while {what}"))
}

fn connect_to(addr: SocketAddr, rank: usize, size: usize, deadline: Instant) -> Result<TcpStream> {
    let mut backoff = ExponentialBackoff::new();
    let socket = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out("connecting to peers").into());
        }

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        match socket.connect_timeout(&addr.into(), remaining) {
            Ok(()) => break socket,
            Err(err) => {
                tracing::trace!(%addr, "connect failed: {}", err);
                if let Some(retry) = backoff.next() {
                    sleep_until(retry.min(deadline));
                }
            }
        }
    };
    socket.set_nodelay(true)?;

    let mut stream: TcpStream = socket.into();
    stream.write_all(Handshake::new(rank, size).as_bytes())?;
    Ok(stream)
}

fn accept_from(
    listener: &TcpListener,
    rank: usize,
    size: usize,
    deadline: Instant,
) -> Result<ahash::HashMap<usize, TcpStream>> {
    let expected = size - rank - 1;
    let mut accepted = ahash::HashMap::default();
    let mut backoff = ExponentialBackoff::new();

    while accepted.len() < expected {
        let mut stream = match listener.accept() {
            Ok((stream, addr)) => {
                tracing::trace!(%addr, "accepted connection");
                stream
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(timed_out("waiting for peers").into());
                }
                if let Some(retry) = backoff.next() {
                    sleep_until(retry.min(deadline));
                }
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        let mut bytes = [0u8; std::mem::size_of::<Handshake>()];
        stream.read_exact(&mut bytes)?;
        let handshake = Handshake::read_from(&bytes[..]).ok_or(Error::MalformedFrame)?;
        let peer = handshake.rank.get() as usize;

        if handshake.magic != MAGIC {
            return Err(Error::Handshake("unknown protocol".into()));
        }
        if handshake.size.get() as usize != size {
            return Err(Error::Handshake(format!(
                "rank {peer} expects {} ranks instead of {size}",
                handshake.size.get()
            )));
        }
        if peer <= rank || peer >= size {
            return Err(Error::Handshake(format!("unexpected rank {peer}")));
        }
        if accepted.insert(peer, stream).is_some() {
            return Err(Error::Handshake(format!("rank {peer} connected twice")));
        }
        tracing::debug!(peer, "accepted");
    }
    Ok(accepted)
}

fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Envelope>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let header = FrameHeader::read_from(&header[..]).ok_or(io::ErrorKind::InvalidData)?;

    let mut payload = vec![0u8; header.len.get() as usize];
    stream.read_exact(&mut payload)?;
    Ok(Some(header.into_envelope(payload)))
}

/// Forwards the frames of `peer` into the inbox until the stream ends, then
/// reports the hangup so that receives waiting on `peer` fail.
fn receiver_thread(mut stream: TcpStream, peer: usize, inbox: Sender<Envelope>) {
    loop {
        match read_frame(&mut stream) {
            Ok(Some(envelope)) if envelope.kind == kind::HANGUP => {
                tracing::error!(peer, "peer sent a reserved channel kind");
                break;
            }
            Ok(Some(envelope)) => {
                if envelope.source != peer {
                    tracing::warn!(peer, source = envelope.source, "frame with foreign source");
                }
                if inbox.send(envelope).is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!(peer, "connection closed");
                break;
            }
            Err(err) => {
                tracing::error!(peer, "failed to read from stream: {}", err);
                break;
            }
        }
    }
    let _ = inbox.send(Envelope::hangup(peer));
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn post(&self, dest: usize, envelope: Envelope) -> Result<()> {
        if dest == self.rank {
            return self.loopback.send(envelope).map_err(|_| Error::Disconnected);
        }

        let stream = self
            .streams
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidRank {
                rank: dest,
                size: self.size,
            })?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + envelope.payload.len());
        frame.extend_from_slice(FrameHeader::for_envelope(&envelope).as_bytes());
        frame.extend_from_slice(&envelope.payload);
        let mut writer: &TcpStream = stream;
        writer.write_all(&frame)?;
        Ok(())
    }

    fn take(&self, matcher: Matcher) -> Result<Envelope> {
        self.mailbox.take(matcher)
    }

    fn reserve(&self, matcher: Matcher) -> Result<Ticket> {
        Ok(self.mailbox.reserve(matcher))
    }

    fn claim(&self, ticket: Ticket) -> Result<Envelope> {
        self.mailbox.claim(ticket)
    }
}

impl Drop for TcpTransport {
    /// Closes the sending half of every stream and waits for all peers to do
    /// the same.
    fn drop(&mut self) {
        for stream in self.streams.iter().flatten() {
            if let Err(err) = stream.shutdown(Shutdown::Write) {
                tracing::warn!("failed to shut down stream: {}", err);
            }
        }
        for receiver in self.receivers.drain(..) {
            if receiver.join().is_err() {
                tracing::error!("receiver thread panicked");
            }
        }
    }
}
