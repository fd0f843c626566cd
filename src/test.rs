use std::sync::{
    atomic::{AtomicU16, AtomicUsize, Ordering},
    Arc,
};

use crate::{
    channel::ChannelTransport,
    datatype::{DatatypeTag, ReduceOp},
    protocol::{Envelope, Matcher, Tag, Ticket},
    transport::Transport,
    Communicator,
};

static NEXT_PORT: AtomicU16 = AtomicU16::new(55555);
pub fn get_port() -> u16 {
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
    if port == 0 {
        panic!("No more ports available");
    }
    port
}

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub fn init_logger() {
    use tracing_subscriber::layer::SubscriberExt;
    let subscriber = tracing_subscriber::Registry::default().with(tracing_subscriber::fmt::layer());
    // Another test may have installed the subscriber already.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Runs `f` once per rank of a channel universe, each rank on its own
/// thread, and returns the results in rank order.
pub fn run_universe<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ChannelTransport) -> R + Sync,
{
    let universe = ChannelTransport::universe(size);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = universe
            .into_iter()
            .map(|t| s.spawn(move || f(t)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Like [`run_universe`], with a communicator per rank.
pub fn run_world<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&Communicator) -> R + Sync,
{
    run_universe(size, |t| f(&Communicator::new(t)))
}

/// Runs `f` on every rank and returns how often each rank called into its
/// transport.
pub fn run_counted<F>(size: usize, f: F) -> Vec<usize>
where
    F: Fn(&Communicator) + Sync,
{
    let counters: Vec<Arc<AtomicUsize>> = (0..size).map(|_| Arc::default()).collect();
    let universe = ChannelTransport::universe(size);
    std::thread::scope(|s| {
        let f = &f;
        for (inner, calls) in universe.into_iter().zip(&counters) {
            let calls = calls.clone();
            s.spawn(move || f(&Communicator::new(CountingTransport { inner, calls })));
        }
    });
    counters.iter().map(|c| c.load(Ordering::Relaxed)).collect()
}

/// Counts every message that is posted or taken.
pub struct CountingTransport {
    inner: ChannelTransport,
    calls: Arc<AtomicUsize>,
}

impl Transport for CountingTransport {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn post(&self, dest: usize, envelope: Envelope) -> crate::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.post(dest, envelope)
    }

    fn take(&self, matcher: Matcher) -> crate::Result<Envelope> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.take(matcher)
    }

    fn reserve(&self, matcher: Matcher) -> crate::Result<Ticket> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.reserve(matcher)
    }

    fn claim(&self, ticket: Ticket) -> crate::Result<Envelope> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.claim(ticket)
    }
}

/// Single-process transport that panics when used for anything but its
/// rank and size.
pub struct ForbiddenTransport;

fn forbidden() -> ! {
    panic!("single-process operation reached the transport")
}

impl Transport for ForbiddenTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn post(&self, _: usize, _: Envelope) -> crate::Result<()> {
        forbidden()
    }

    fn take(&self, _: Matcher) -> crate::Result<Envelope> {
        forbidden()
    }

    fn reserve(&self, _: Matcher) -> crate::Result<Ticket> {
        forbidden()
    }

    fn claim(&self, _: Ticket) -> crate::Result<Envelope> {
        forbidden()
    }

    fn send(&self, _: usize, _: Tag, _: Vec<u8>) -> crate::Result<()> {
        forbidden()
    }

    fn recv(&self, _: usize, _: Tag) -> crate::Result<Envelope> {
        forbidden()
    }

    fn barrier(&self) -> crate::Result<()> {
        forbidden()
    }

    fn broadcast(&self, _: &mut [u8], _: usize) -> crate::Result<()> {
        forbidden()
    }

    fn gather(&self, _: &[u8], _: &mut [u8], _: usize) -> crate::Result<()> {
        forbidden()
    }

    fn gatherv(&self, _: &[u8], _: &mut [u8], _: &[usize], _: &[usize], _: usize) -> crate::Result<()> {
        forbidden()
    }

    fn allgather(&self, _: &[u8], _: &mut [u8]) -> crate::Result<()> {
        forbidden()
    }

    fn allgatherv(&self, _: &[u8], _: &mut [u8], _: &[usize], _: &[usize]) -> crate::Result<()> {
        forbidden()
    }

    fn alltoall(&self, _: &[u8], _: &mut [u8]) -> crate::Result<()> {
        forbidden()
    }

    fn allreduce(&self, _: &mut [u8], _: DatatypeTag, _: ReduceOp) -> crate::Result<()> {
        forbidden()
    }
}
