//! Per-connection read/write buffering and the REQ/RES/END state machine
//! (spec §3 ConnState, §4.5).

use std::io;

use crate::handlers;
use crate::map::Map;
use crate::transport::Transport;
use crate::wire::{self, FrameError, Response};

/// Buffers are sized for one maximum message: a 4-byte header plus
/// [`wire::MAX_MESSAGE_LEN`] payload bytes.
const BUF_CAP: usize = wire::HEADER_LEN + wire::MAX_MESSAGE_LEN;

/// A connection's place in the read/write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Draining input, parsing requests as they complete.
    Req,
    /// Draining a pending response.
    Res,
    /// Terminal. The connection is torn down on the event loop's next pass.
    End,
}

/// Per-connection state: buffers plus the REQ/RES/END mode.
pub struct ConnState {
    mode: Mode,
    read_buf: Box<[u8; BUF_CAP]>,
    read_len: usize,
    read_cursor: usize,
    write_buf: Box<[u8; BUF_CAP]>,
    write_len: usize,
    write_sent: usize,
}

impl std::fmt::Debug for ConnState {
    /// Reports the bookkeeping fields; the buffers themselves are omitted
    /// since dumping `BUF_CAP` raw bytes wouldn't be useful to a reader.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnState")
            .field("mode", &self.mode)
            .field("read_len", &self.read_len)
            .field("read_cursor", &self.read_cursor)
            .field("write_len", &self.write_len)
            .field("write_sent", &self.write_sent)
            .finish()
    }
}

impl ConnState {
    pub fn new() -> Self {
        ConnState {
            mode: Mode::Req,
            read_buf: Box::new([0u8; BUF_CAP]),
            read_len: 0,
            read_cursor: 0,
            write_buf: Box::new([0u8; BUF_CAP]),
            write_len: 0,
            write_sent: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_done(&self) -> bool {
        self.mode == Mode::End
    }

    /// Runs one state-machine step appropriate to the connection's current
    /// mode. Call this when the event loop reports readiness.
    pub fn step<T: Transport>(&mut self, transport: &mut T, map: &mut Map) {
        match self.mode {
            Mode::Req => self.fill_buffer(transport, map),
            Mode::Res => self.flush_buffer(transport),
            Mode::End => {}
        }
    }

    fn compact(&mut self) {
        if self.read_cursor == 0 {
            return;
        }
        self.read_buf.copy_within(self.read_cursor..self.read_len, 0);
        self.read_len -= self.read_cursor;
        self.read_cursor = 0;
    }

    /// Reads until the socket reports `WouldBlock`, processing every
    /// complete frame along the way. mio's epoll backend is edge-triggered,
    /// so a single readiness notification means "go read until empty" --
    /// stopping after one `read` call can strand bytes the kernel already
    /// has buffered, since no further readable event fires for them until
    /// more data arrives.
    fn fill_buffer<T: Transport>(&mut self, transport: &mut T, map: &mut Map) {
        loop {
            self.compact();

            if self.read_len == self.read_buf.len() {
                // No room for more bytes; whatever's buffered isn't yet a
                // complete frame (a too-long frame is caught in
                // `process_one_request` before this can happen). Wait for
                // the next readiness notification.
                return;
            }

            match transport.read_nonblocking(&mut self.read_buf[self.read_len..]) {
                Ok(0) => {
                    self.mode = Mode::End;
                    return;
                }
                Ok(n) => self.read_len += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("connection read error, closing: {e}");
                    self.mode = Mode::End;
                    return;
                }
            }

            while self.mode == Mode::Req {
                match self.process_one_request(map) {
                    ProcessOutcome::Processed => {
                        // Synchronously attempt to flush the response before
                        // looking for the next pipelined request.
                        self.flush_buffer(transport);
                    }
                    ProcessOutcome::Incomplete => break,
                }
            }

            if self.mode != Mode::Req {
                return;
            }
        }
    }

    /// Parses and dispatches a single framed request, if one is fully
    /// buffered. On success, transitions to `RES` with the encoded
    /// response staged in the write buffer.
    fn process_one_request(&mut self, map: &mut Map) -> ProcessOutcome {
        let available = &self.read_buf[self.read_cursor..self.read_len];

        let payload_len = match wire::read_frame_header(available) {
            Ok(Some(len)) => len as usize,
            Ok(None) => return ProcessOutcome::Incomplete,
            Err(FrameError::MessageTooLong(..)) => {
                log::debug!("message exceeds the frame limit, closing connection");
                self.mode = Mode::End;
                return ProcessOutcome::Incomplete;
            }
            Err(FrameError::Incomplete) => return ProcessOutcome::Incomplete,
        };

        let total = wire::HEADER_LEN + payload_len;
        if available.len() < total {
            return ProcessOutcome::Incomplete;
        }

        let payload = &available[wire::HEADER_LEN..total];
        let request = wire::decode_request(payload);
        let response = handlers::handle_request(&request, map);

        self.read_cursor += total;
        self.begin_response(&response);

        ProcessOutcome::Processed
    }

    fn begin_response(&mut self, response: &Response) {
        let payload_len = handlers::encode_response_with_fallback(
            &mut self.write_buf[wire::HEADER_LEN..],
            response,
        );
        wire::write_frame_header(&mut self.write_buf[..wire::HEADER_LEN], payload_len as u32)
            .expect("frame header always fits in HEADER_LEN bytes");

        self.write_len = wire::HEADER_LEN + payload_len;
        self.write_sent = 0;
        self.mode = Mode::Res;
    }

    fn flush_buffer<T: Transport>(&mut self, transport: &mut T) {
        loop {
            if self.write_sent >= self.write_len {
                self.write_len = 0;
                self.write_sent = 0;
                self.mode = Mode::Req;
                return;
            }

            match transport.write_nonblocking(&self.write_buf[self.write_sent..self.write_len]) {
                Ok(0) => {
                    self.mode = Mode::End;
                    return;
                }
                Ok(n) => self.write_sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("connection write error, closing: {e}");
                    self.mode = Mode::End;
                    return;
                }
            }
        }
    }
}

impl Default for ConnState {
    fn default() -> Self {
        Self::new()
    }
}

enum ProcessOutcome {
    Processed,
    Incomplete,
}
