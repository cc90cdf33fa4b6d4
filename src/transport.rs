//! The stream abstraction [`ConnState`](crate::conn::ConnState) reads from
//! and writes to. A small trait stands in for the source's dyn-dispatch
//! "generic connection", letting the same state machine drive either a real
//! socket or an in-process test pipe (spec Design Notes, "Type-erased
//! connection").

use std::io;

/// A non-blocking byte stream.
pub trait Transport {
    /// Reads into `buf`, returning `Ok(0)` on EOF and
    /// `Err(WouldBlock)` when no data is currently available.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes from `buf`, returning the number of bytes accepted.
    /// `Err(WouldBlock)` means none could be written right now.
    fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for mio::net::TcpStream {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        self.read(buf)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        self.write(buf)
    }
}

/// An in-process, in-memory duplex pipe used to exercise [`ConnState`](crate::conn::ConnState)
/// without a real socket.
pub mod pipe {
    use super::Transport;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// One end of a [`duplex_pipe`].
    #[derive(Debug)]
    pub struct PipeEnd {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        outbound: Arc<Mutex<VecDeque<u8>>>,
        peer_closed: Arc<AtomicBool>,
    }

    /// Creates a connected pair of pipe ends: bytes written to one are read
    /// from the other.
    pub fn duplex_pipe() -> (PipeEnd, PipeEnd) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
        let closed = Arc::new(AtomicBool::new(false));

        (
            PipeEnd {
                inbound: b_to_a.clone(),
                outbound: a_to_b.clone(),
                peer_closed: closed.clone(),
            },
            PipeEnd {
                inbound: a_to_b,
                outbound: b_to_a,
                peer_closed: closed,
            },
        )
    }

    impl PipeEnd {
        /// Marks this end as closed; the peer's next read once drained sees EOF.
        pub fn close(&self) {
            self.peer_closed.store(true, Ordering::SeqCst);
        }
    }

    impl Transport for PipeEnd {
        fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut q = self.inbound.lock().unwrap();
            if q.is_empty() {
                return if self.peer_closed.load(Ordering::SeqCst) {
                    Ok(0)
                } else {
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                };
            }

            let n = buf.len().min(q.len());
            for slot in buf.iter_mut().take(n) {
                *slot = q.pop_front().expect("checked non-empty above");
            }
            Ok(n)
        }

        fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.lock().unwrap().extend(buf.iter().copied());
            Ok(buf.len())
        }
    }
}
