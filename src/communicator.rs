use crate::{
    config::LaunchConfig,
    error::Result,
    local::LocalTransport,
    tcp::TcpTransport,
    transport::Transport,
};

/// Entry point for all typed communication.
///
/// A communicator owns the transport selected at process start and a
/// snapshot of this process's rank and of the number of processes. The
/// snapshot never changes. Collective operations must be called by every
/// process in the same order.
///
/// With a single process, every operation completes locally without calling
/// into the transport.
///
/// # Example
///
/// ```
/// use parcomm::Communicator;
///
/// let comm = Communicator::serial();
/// let mut value = 3.5f64;
/// comm.sum(&mut value).unwrap();
/// assert_eq!(value, 3.5);
/// assert!(comm.verify(&value).unwrap());
/// ```
pub struct Communicator {
    transport: Box<dyn Transport>,
    rank: usize,
    size: usize,
}

impl Communicator {
    /// Creates a communicator on top of `transport`.
    pub fn new(transport: impl Transport + 'static) -> Self {
        let rank = transport.rank();
        let size = transport.size();
        debug_assert!(rank < size, "rank {rank} out of range for size {size}");
        tracing::debug!(rank, size, "communicator created");
        Self {
            transport: Box::new(transport),
            rank,
            size,
        }
    }

    /// Creates a single-process communicator.
    pub fn serial() -> Self {
        Self::new(LocalTransport::new())
    }

    /// Creates a communicator for the given launch configuration.
    ///
    /// A TCP configuration with a single peer runs serially.
    pub fn from_config(config: &LaunchConfig) -> Result<Self> {
        match config {
            LaunchConfig::Tcp(tcp) if tcp.peers.len() > 1 => Ok(Self::new(TcpTransport::connect(tcp)?)),
            LaunchConfig::Tcp(tcp) => {
                tcp.validate()?;
                Ok(Self::serial())
            }
            LaunchConfig::Serial => Ok(Self::serial()),
        }
    }

    /// Creates a communicator configured by the process environment.
    ///
    /// See [`config`](crate::config) for the variables that are read.
    pub fn from_env() -> Result<Self> {
        let config = LaunchConfig::from_env()?;
        Self::from_config(&config)
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of processes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The underlying transport.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Blocks until every process has entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        if self.size == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("barrier").entered();
        self.transport.barrier()
    }

    pub(crate) fn check_rank(&self, rank: usize) -> Result<()> {
        crate::error::Error::check_rank(rank, self.size)
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}
