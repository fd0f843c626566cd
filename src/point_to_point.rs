//! Point-to-point communication.
//!
//! Blocking and non-blocking sends and receives of typed slices, plus
//! paired [`send_receive`](Communicator::send_receive) exchanges of values
//! whose size the receiver does not know in advance.

use crate::{
    communicator::Communicator,
    datatype::{decode_into, encode, Equivalence},
    error::{Error, Result},
    protocol::{kind, Envelope, Matcher, Tag, ANY_SOURCE},
    request::Request,
    status::Status,
};

/// Copies a received payload into the front of `buf`.
fn fill<T: Equivalence>(envelope: Envelope, buf: &mut [T]) -> Result<Status> {
    let payload = envelope.payload;
    if payload.len() % T::SIZE != 0 {
        return Err(Error::MalformedFrame);
    }
    let count = payload.len() / T::SIZE;
    if count > buf.len() {
        return Err(Error::Truncated {
            capacity: buf.len() * T::SIZE,
            count: payload.len(),
        });
    }
    T::read_bytes(&payload, &mut buf[..count]);
    Ok(Status::new(envelope.source, envelope.tag, count))
}

impl Communicator {
    /// Sends `buf` to `dest` with the given tag.
    ///
    /// The send is buffered and returns without waiting for the receiver.
    /// Fails with [`Error::NoPeer`] on a single-process communicator and
    /// with [`Error::InvalidTag`] for a negative tag.
    pub fn send<T: Equivalence>(&self, dest: usize, buf: &[T], tag: Tag) -> Result<()> {
        let _guard = tracing::trace_span!("send", dest, tag, len = buf.len()).entered();
        if self.size() == 1 {
            return Err(Error::NoPeer("send"));
        }
        self.check_rank(dest)?;
        self.transport().send(dest, tag, encode(buf))
    }

    /// Receives a message from `source` into `buf`.
    ///
    /// `source` may be [`ANY_SOURCE`] and `tag` may be
    /// [`ANY_TAG`](crate::ANY_TAG). The message may be shorter than `buf`,
    /// in which case only the front of `buf` is written; the returned
    /// [`Status`] tells how many elements arrived. A message longer than
    /// `buf` fails with [`Error::Truncated`].
    pub fn recv<T: Equivalence>(&self, source: usize, buf: &mut [T], tag: Tag) -> Result<Status> {
        let _guard = tracing::trace_span!("recv", source, tag).entered();
        if self.size() == 1 {
            return Err(Error::NoPeer("receive"));
        }
        if source != ANY_SOURCE {
            self.check_rank(source)?;
        }
        fill(self.transport().recv(source, tag)?, buf)
    }

    /// Receives a message of unknown length from `source`.
    pub fn recv_vec<T: Equivalence>(&self, source: usize, tag: Tag) -> Result<(Vec<T>, Status)> {
        let _guard = tracing::trace_span!("recv_vec", source, tag).entered();
        if self.size() == 1 {
            return Err(Error::NoPeer("receive"));
        }
        if source != ANY_SOURCE {
            self.check_rank(source)?;
        }
        let envelope = self.transport().recv(source, tag)?;
        let mut buf = vec![T::default(); envelope.payload.len() / T::SIZE];
        let status = fill(envelope, &mut buf)?;
        Ok((buf, status))
    }

    /// Starts a non-blocking send.
    ///
    /// On a single-process communicator this is a no-op.
    pub fn isend<'a, T: Equivalence>(
        &'a self,
        dest: usize,
        buf: &'a [T],
        tag: Tag,
    ) -> Result<Request<'a>> {
        if self.size() == 1 {
            return Ok(Request::completed(None));
        }
        self.send(dest, buf, tag)?;
        Ok(Request::completed(None))
    }

    /// Starts a non-blocking receive into `buf`.
    ///
    /// The receive is matched in posting order: it gets the next message
    /// from `source` with `tag` that no earlier receive claimed, no matter
    /// when the request is waited on. `buf` is filled on completion. On a
    /// single-process communicator this is a no-op and `buf` is left
    /// untouched.
    pub fn irecv<'a, T: Equivalence>(
        &'a self,
        source: usize,
        buf: &'a mut [T],
        tag: Tag,
    ) -> Result<Request<'a>> {
        if self.size() == 1 {
            return Ok(Request::completed(None));
        }
        if source != ANY_SOURCE {
            self.check_rank(source)?;
        }
        let ticket = self.transport().reserve(Matcher::point_to_point(source, tag))?;
        Ok(Request::deferred(move || {
            let envelope = self.transport().claim(ticket)?;
            fill(envelope, buf).map(Some)
        }))
    }

    /// Blocks until `request` has completed.
    pub fn wait(&self, request: Request<'_>) -> Result<Option<Status>> {
        let _guard = tracing::trace_span!("wait").entered();
        request.wait()
    }

    /// Blocks until all `requests` have completed.
    pub fn wait_all<'a>(&self, requests: Vec<Request<'a>>) -> Result<Vec<Option<Status>>> {
        let _guard = tracing::trace_span!("wait_all", count = requests.len()).entered();
        Request::wait_all(requests)
    }

    /// Sends `send` to `dest` and receives `recv` from `source`.
    ///
    /// `recv` is resized to whatever `source` sends. If `dest` and `source`
    /// are both this process, `send` is copied into `recv` locally.
    pub fn send_receive<V: Exchange>(
        &self,
        dest: usize,
        send: &V,
        source: usize,
        recv: &mut V,
    ) -> Result<()> {
        let _guard = tracing::trace_span!("send_receive", dest, source).entered();
        if dest == self.rank() && source == self.rank() {
            recv.clone_from(send);
            return Ok(());
        }
        debug_assert!(self.size() > 1, "send_receive with a peer in a single-process communicator");
        self.check_rank(dest)?;
        self.check_rank(source)?;
        V::exchange(self, dest, send, source, recv)
    }

    /// One phase of an exchange: sends `send` and receives exactly
    /// `recv.len()` elements.
    fn exchange_slice<T: Equivalence>(
        &self,
        dest: usize,
        send: &[T],
        source: usize,
        recv: &mut [T],
    ) -> Result<()> {
        self.transport().post(
            dest,
            Envelope {
                source: self.rank(),
                tag: 0,
                kind: kind::EXCHANGE,
                payload: encode(send),
            },
        )?;
        let envelope = self.transport().take(Matcher::exchange(source))?;
        decode_into(&envelope.payload, recv)
    }

    fn exchange_len(&self, dest: usize, len: usize, source: usize) -> Result<usize> {
        let mut recv = [0u64];
        self.exchange_slice(dest, &[len as u64], source, &mut recv)?;
        Ok(recv[0] as usize)
    }
}

/// Values that can be exchanged with [`Communicator::send_receive`].
///
/// Scalars are exchanged in one phase. Vectors first exchange their length
/// so that the receiver can be resized, and vectors of vectors additionally
/// exchange all inner lengths before the data is sent as one flattened
/// block.
pub trait Exchange: Clone {
    #[doc(hidden)]
    fn exchange(
        comm: &Communicator,
        dest: usize,
        send: &Self,
        source: usize,
        recv: &mut Self,
    ) -> Result<()>;
}

impl<T: Equivalence> Exchange for T {
    fn exchange(comm: &Communicator, dest: usize, send: &T, source: usize, recv: &mut T) -> Result<()> {
        comm.exchange_slice(dest, std::slice::from_ref(send), source, std::slice::from_mut(recv))
    }
}

impl<T: Equivalence> Exchange for Vec<T> {
    fn exchange(
        comm: &Communicator,
        dest: usize,
        send: &Vec<T>,
        source: usize,
        recv: &mut Vec<T>,
    ) -> Result<()> {
        let len = comm.exchange_len(dest, send.len(), source)?;
        recv.resize(len, T::default());
        comm.exchange_slice(dest, send, source, recv)
    }
}

impl<T: Equivalence> Exchange for Vec<Vec<T>> {
    fn exchange(
        comm: &Communicator,
        dest: usize,
        send: &Vec<Vec<T>>,
        source: usize,
        recv: &mut Vec<Vec<T>>,
    ) -> Result<()> {
        let outer = comm.exchange_len(dest, send.len(), source)?;

        let send_lens: Vec<u64> = send.iter().map(|inner| inner.len() as u64).collect();
        let mut recv_lens = vec![0u64; outer];
        comm.exchange_slice(dest, &send_lens, source, &mut recv_lens)?;

        let flat: Vec<T> = send.iter().flatten().copied().collect();
        let total = recv_lens.iter().sum::<u64>() as usize;
        let mut recv_flat = vec![T::default(); total];
        comm.exchange_slice(dest, &flat, source, &mut recv_flat)?;

        recv.resize_with(outer, Vec::new);
        let mut offset = 0;
        for (inner, len) in recv.iter_mut().zip(recv_lens) {
            let len = len as usize;
            inner.clear();
            inner.extend_from_slice(&recv_flat[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }
}
