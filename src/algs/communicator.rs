//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: `collective.rs` calls
//! `.wait()` on every receive before it trusts the data, and drains every send
//! handle before it returns.
//!
//! Messages sent from `src` to `dst` with the same tag are delivered in FIFO order.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`. The bytes are copied before returning.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Rank of this process in the communicator.
    fn rank(&self) -> usize;
    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    /// True for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Typed message tag. Collectives use `base()` for the size header and
/// `offset(1)` for the payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        Self(base)
    }
    pub const fn base(self) -> u16 {
        self.0
    }
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Compile-time no-op comm for pure serial runs: rank 0 of 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process / one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    slots: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").finish_non_exhaustive()
    }
}

/// Receive handle of [`RayonComm`]; blocks in `wait` until the message arrives.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut slots = self.mailbox.slots.lock();
        loop {
            if let Some(bytes) = slots.get_mut(&self.key).and_then(VecDeque::pop_front) {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            self.mailbox.arrived.wait(&mut slots);
        }
    }
}

/// In-process communicator: every rank is a thread sharing one mailbox.
///
/// Ranks created by different calls to [`RayonComm::world`] never see each other's
/// messages, so independent worlds can run side by side (e.g. in parallel tests).
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// Create `size` connected ranks; hand element `r` to the thread playing rank `r`.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        let mut slots = self.mailbox.slots.lock();
        slots
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.mailbox.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    struct MpiInner {
        world: SimpleCommunicator,
        // Dropping the universe finalizes MPI; keep it alive as long as any handle.
        _universe: Universe,
    }

    // SAFETY: the library drives MPI from one thread per process (SPMD), and MPI is
    // initialized by `mpi::initialize`, which requests the funneled threading level.
    unsafe impl Send for MpiInner {}
    unsafe impl Sync for MpiInner {}

    #[derive(Clone)]
    pub struct MpiComm {
        inner: Arc<MpiInner>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI. Returns `None` when MPI was already initialized.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                inner: Arc::new(MpiInner {
                    world,
                    _universe: universe,
                }),
                rank,
                size,
            })
        }
    }

    /// Send handle owning the leaked send buffer until the request completes.
    pub struct MpiSendHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // SAFETY: `buf` came from `Box::into_raw` in `isend` and the request that
            // borrowed it has completed.
            unsafe { drop(Box::from_raw(self.buf)) };
            None
        }
    }

    /// Receive handle; the blocking receive happens in `wait`, after all sends of the
    /// collective step have been posted.
    pub struct MpiRecvHandle {
        inner: Arc<MpiInner>,
        peer: usize,
        tag: u16,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .inner
                .world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(self.tag));
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: the allocation stays alive until `MpiSendHandle::wait` frees it.
            let leaked: &'static [u8] = unsafe { &*raw };
            let req = self
                .inner
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, leaked, i32::from(tag));
            MpiSendHandle { req, buf: raw }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecvHandle {
            MpiRecvHandle {
                inner: Arc::clone(&self.inner),
                peer,
                tag,
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
