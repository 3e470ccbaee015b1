use embedded_dma::ReadBuffer;

use crate::hal_ext::dma::{InterruptResult, TransferError, TxStream};
use super::lock::TransferLock;

/// Error returned from [`TxChannel::send`], gives the buffer back
#[derive(Debug, PartialEq, Eq)]
pub enum SendError<B> {
    /// A transfer is already in flight
    ChannelBusy(B),
    /// Requested length exceeds the buffer or the maximum transfer size
    TooLarge(B),
}

impl<B> SendError<B> {
    /// Retrieve the buffer that could not be sent
    pub fn into_inner(self) -> B {
        match self {
            Self::ChannelBusy(b) | Self::TooLarge(b) => b,
        }
    }
}

impl<B> defmt::Format for SendError<B> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ChannelBusy(_) => defmt::write!(f, "ChannelBusy"),
            Self::TooLarge(_) => defmt::write!(f, "TooLarge"),
        }
    }
}

/// Longest stall watchdog timeout in ticks, deadlines are compared with wrapping arithmetic
pub const MAX_TIMEOUT: u32 = i32::MAX as u32;

/// Observable state of a [`TxChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TxState {
    /// No transfer and no buffer waiting to be reclaimed
    Idle,
    /// DMA owns the buffer
    InFlight,
    /// Transfer finished, buffer can be reclaimed
    Completed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, defmt::Format)]
pub struct TxStats {
    pub started: u32,
    pub busy: u32,
    pub completed: u32,
    pub dma_errors: u32,
    pub stalls: u32,
    pub spurious: u32,
}

/// Single-flight asynchronous transmit channel
///
/// Streams a buffer to the peripheral behind `S` using DMA. At most one
/// transfer can be in flight: [`Self::send`] either starts the transfer
/// immediately and returns, or rejects the buffer with
/// [`SendError::ChannelBusy`]. Nothing is queued.
///
/// The buffer is moved into the channel for the duration of the transfer and
/// can be taken back with [`Self::reclaim`] once the transfer has finished.
/// Completion must be signalled by calling [`Self::on_interrupt`] from the DMA
/// stream interrupt service routine. Optionally [`Self::check_timeout`] can be
/// called periodically to abort transfers that never complete.
pub struct TxChannel<S, B> {
    stream: S,
    lock: TransferLock,
    buf: Option<B>,
    timeout: Option<u32>,
    deadline: Option<u32>,
    stats: TxStats,
}

impl<S, B> TxChannel<S, B>
where
    S: TxStream,
    B: ReadBuffer<Word = u8>,
{
    /// Create channel, `timeout` is the number of ticks of [`Self::check_timeout`]
    /// after which a transfer is considered stalled
    ///
    /// Timeouts longer than [`MAX_TIMEOUT`] are limited to it.
    pub fn new(stream: S, timeout: Option<u32>) -> Self {
        Self {
            stream,
            lock: TransferLock::new(),
            buf: None,
            timeout: timeout.map(|t| t.min(MAX_TIMEOUT)),
            deadline: None,
            stats: TxStats::default(),
        }
    }

    /// Start sending the first `len` bytes of `buf`
    ///
    /// Returns without waiting for the transfer. Zero-length transfers don't
    /// touch the hardware and complete immediately. If a previous buffer has
    /// not been reclaimed it is dropped.
    pub fn send(&mut self, buf: B, len: usize) -> Result<(), SendError<B>> {
        if !self.lock.try_acquire() {
            self.stats.busy = self.stats.busy.wrapping_add(1);
            return Err(SendError::ChannelBusy(buf));
        }

        // Safety: buffer is 'static and has a stable address so the pointer is
        // valid as long as we hold `buf`, which we do until the stream is stopped
        let (ptr, capacity) = unsafe { buf.read_buffer() };
        if len > capacity || len > S::MAX_TRANSFER {
            self.lock.release();
            return Err(SendError::TooLarge(buf));
        }

        self.buf = Some(buf);
        self.deadline = None;
        self.stats.started = self.stats.started.wrapping_add(1);

        if len == 0 {
            self.stats.completed = self.stats.completed.wrapping_add(1);
            self.lock.release();
            return Ok(());
        }

        // Safety: the buffer stays in self.buf until stream.stop() in finish()
        unsafe { self.stream.start(ptr, len as u16) };
        defmt::trace!("TX start: {=usize} bytes", len);

        Ok(())
    }

    /// Handle DMA stream interrupt
    ///
    /// Must be called from the interrupt service routine of the DMA stream.
    /// Releases the channel when the transfer has finished. Calling it when no
    /// transfer is in flight just makes sure that the stream is disabled.
    pub fn on_interrupt(&mut self) -> InterruptResult {
        let status = self.stream.take_status();

        if !self.lock.is_held() {
            self.stream.stop();
            self.stats.spurious = self.stats.spurious.wrapping_add(1);
            defmt::warn!("TX interrupt without transfer");
            return InterruptResult::Spurious;
        }

        if status.error() {
            self.stats.dma_errors = self.stats.dma_errors.wrapping_add(1);
            self.finish();
            defmt::error!("TX DMA error");
            InterruptResult::Error(TransferError::Dma)
        } else if status.complete() {
            self.stats.completed = self.stats.completed.wrapping_add(1);
            self.finish();
            defmt::trace!("TX done");
            InterruptResult::Complete
        } else {
            // e.g. FIFO error flag, transfer continues
            InterruptResult::NotOurs
        }
    }

    /// Abort a transfer that has been in flight for too long
    ///
    /// Should be called periodically with current time in ticks. The first call
    /// that sees a transfer in flight arms the deadline.
    pub fn check_timeout(&mut self, now: u32) -> Result<(), TransferError> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return Ok(()),
        };

        if !self.lock.is_held() {
            self.deadline = None;
            return Ok(());
        }

        match self.deadline {
            None => {
                self.deadline = Some(now.wrapping_add(timeout));
                Ok(())
            },
            // Wrapping comparison, timeout <= MAX_TIMEOUT
            Some(deadline) if (now.wrapping_sub(deadline) as i32) >= 0 => {
                // Clear any late flags so that the ISR won't see them
                self.stream.take_status();
                self.stats.stalls = self.stats.stalls.wrapping_add(1);
                self.finish();
                defmt::error!("TX stalled, transfer aborted");
                Err(TransferError::Stalled)
            },
            Some(_) => Ok(()),
        }
    }

    /// Stop the stream and release the lock, the buffer becomes reclaimable
    fn finish(&mut self) {
        self.stream.stop();
        self.deadline = None;
        self.lock.release();
    }

    /// Take back the buffer of a finished transfer
    ///
    /// Returns `None` while a transfer is in flight or if there is no buffer.
    pub fn reclaim(&mut self) -> Option<B> {
        if self.lock.is_held() {
            None
        } else {
            self.buf.take()
        }
    }

    pub fn state(&self) -> TxState {
        match (self.lock.is_held(), self.buf.is_some()) {
            (true, _) => TxState::InFlight,
            (false, true) => TxState::Completed,
            (false, false) => TxState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock.is_held()
    }

    pub fn stats(&self) -> &TxStats {
        &self.stats
    }
}
