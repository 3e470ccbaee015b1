use crate::hal;

/// Extension trait to split DMA into separate streams
pub trait DmaSplit {
    /// Structure holding DMA streams
    type Streams;

    /// Split DMA into independent streams
    fn split(self) -> Self::Streams;
}

/// Single stream of DMA2
pub struct DmaStream<const S: u8>;
pub struct InterruptStatus(u8);
pub struct InterruptClear(u8);

pub struct Dma2 {
    pub st0: DmaStream<0>,
    pub st1: DmaStream<1>,
    pub st2: DmaStream<2>,
    pub st3: DmaStream<3>,
    pub st4: DmaStream<4>,
    pub st5: DmaStream<5>,
    pub st6: DmaStream<6>,
    pub st7: DmaStream<7>,
}

impl DmaSplit for hal::pac::DMA2 {
    type Streams = Dma2;

    fn split(self) -> Self::Streams {
        // Need to access some registers outside of HAL type system
        let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };

        // Enable DMA clock
        rcc_regs.ahb1enr.modify(|_, w| w.dma2en().set_bit());

        Dma2 {
            st0: DmaStream,
            st1: DmaStream,
            st2: DmaStream,
            st3: DmaStream,
            st4: DmaStream,
            st5: DmaStream,
            st6: DmaStream,
            st7: DmaStream,
        }
    }
}

macro_rules! dma_streams {
    ($($S:literal => ($isr:ident, $ifcr:ident, $offset:literal)),+ $(,)?) => {
        $(
            impl DmaStream<$S> {
                // Safety: takes &mut, so it's not possible to use stream in multiple places
                pub fn st(&mut self) -> &hal::pac::dma2::ST {
                    unsafe { &(*hal::pac::DMA2::ptr()).st[$S] }
                }

                const OFFSET: usize = $offset;
                const MASK: u32 = 0b11_1101;

                pub fn isr(&self) -> InterruptStatus {
                    let dma = unsafe { &*hal::pac::DMA2::ptr() };
                    InterruptStatus(((dma.$isr.read().bits() >> Self::OFFSET) & Self::MASK) as u8)
                }

                pub fn ifcr<F>(&mut self, f: F)
                where
                    F: FnOnce(&mut InterruptClear) -> &mut InterruptClear
                {
                    let dma = unsafe { &*hal::pac::DMA2::ptr() };
                    let mut ifcr = InterruptClear(0);
                    let ifcr = f(&mut ifcr);
                    let mask = (ifcr.0 as u32 & Self::MASK) << Self::OFFSET;
                    unsafe { dma.$ifcr.write(|w| w.bits(mask)); }
                }
            }
        )+
    }
}

// Flags of streams 0-3 live in LISR/LIFCR, 4-7 in HISR/HIFCR, at the same offsets
dma_streams!(
    0 => (lisr, lifcr, 0),
    1 => (lisr, lifcr, 6),
    2 => (lisr, lifcr, 16),
    3 => (lisr, lifcr, 22),
    4 => (hisr, hifcr, 0),
    5 => (hisr, hifcr, 6),
    6 => (hisr, hifcr, 16),
    7 => (hisr, hifcr, 22),
);

impl InterruptStatus {
    const FEIF: u8 = 0b00_0001;
    const DMEIF: u8 = 0b00_0100;
    const TEIF: u8 = 0b00_1000;
    const HTIF: u8 = 0b01_0000;
    const TCIF: u8 = 0b10_0000;

    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Any flag of this stream
    pub fn any(&self) -> bool {
        self.0 != 0
    }

    /// TCIFx flag
    pub fn complete(&self) -> bool {
        (self.0 & Self::TCIF) != 0
    }

    /// HTIFx flag
    pub fn half_complete(&self) -> bool {
        (self.0 & Self::HTIF) != 0
    }

    /// TEIFx or DMEIFx flag, the stream has been disabled by hardware
    pub fn error(&self) -> bool {
        (self.0 & (Self::TEIF | Self::DMEIF)) != 0
    }

    /// FEIFx flag, informational in direct mode
    pub fn fifo_error(&self) -> bool {
        (self.0 & Self::FEIF) != 0
    }
}

impl InterruptClear {
    pub fn all(&mut self) -> &mut Self {
        self.0 |= InterruptStatus::FEIF
            | InterruptStatus::DMEIF
            | InterruptStatus::TEIF
            | InterruptStatus::HTIF
            | InterruptStatus::TCIF;
        self
    }

    pub fn complete(&mut self) -> &mut Self {
        self.0 |= InterruptStatus::TCIF;
        self
    }

    pub fn half_complete(&mut self) -> &mut Self {
        self.0 |= InterruptStatus::HTIF;
        self
    }

    pub fn error(&mut self) -> &mut Self {
        self.0 |= InterruptStatus::TEIF | InterruptStatus::DMEIF | InterruptStatus::FEIF;
        self
    }

    /// Clear exactly the flags reported in `status`
    pub fn flags(&mut self, status: &InterruptStatus) -> &mut Self {
        self.0 |= status.0;
        self
    }
}

/// Memory-to-peripheral DMA stream that feeds a transmitter
///
/// This is the seam between the transmit channel logic and the hardware,
/// implemented for the UART in [`super::uart::UartTx`] and by a mock in tests.
pub trait TxStream {
    /// Maximum number of bytes in a single transfer (16-bit NDTR)
    const MAX_TRANSFER: usize = u16::MAX as usize;

    /// Program a transfer of `len` bytes from `src` to the peripheral and start it
    ///
    /// Enables the transfer complete interrupt of the stream.
    ///
    /// # Safety
    ///
    /// Memory at `src..src + len` must stay valid and must not be modified
    /// until [`TxStream::stop`] has returned.
    unsafe fn start(&mut self, src: *const u8, len: u16);

    /// Read interrupt flags of the stream and clear the ones that are set
    ///
    /// Safe to call when no flags are set.
    fn take_status(&mut self) -> InterruptStatus;

    /// Disable stream interrupts, peripheral DMA requests and the stream itself
    ///
    /// Returns only after the stream has actually been disabled, so that the
    /// memory is not accessed anymore.
    fn stop(&mut self);
}

/// Fault of a DMA transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TransferError {
    /// DMA reported a transfer or direct mode error
    Dma,
    /// Transfer has not completed before its deadline and has been aborted
    Stalled,
}

/// Result of handling a DMA interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum InterruptResult {
    /// Transfer finished successfully
    Complete,
    /// Transfer finished with an error
    Error(TransferError),
    /// Transfer is ongoing and no completion/error flag has been set
    NotOurs,
    /// Interrupt while no transfer has been started
    Spurious,
}

impl InterruptResult {
    /// Get Some(result) if a transfer has been finished
    pub fn as_option(self) -> Option<Result<(), TransferError>> {
        match self {
            Self::Complete => Some(Ok(())),
            Self::Error(e) => Some(Err(e)),
            Self::NotOurs | Self::Spurious => None,
        }
    }
}

#[cfg(test)]
pub mod mock {
    use core::cell::RefCell;
    use std::vec::Vec;

    use super::*;

    /// Operations performed on the mock, in order
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Op {
        Start(usize),
        ClearFlags(u8),
        Stop,
    }

    /// Simulated state of a DMA stream and its peripheral
    ///
    /// Data is "transmitted" only when calling [`MockStream::run`] so tests can
    /// interleave engine progress with other operations.
    pub struct MockStream {
        src: *const u8,
        len: usize,
        pos: usize,
        enabled: bool,
        flags: u8,
        sent: Vec<u8>,
        pub ops: Vec<Op>,
    }

    impl Default for MockStream {
        fn default() -> Self {
            Self {
                src: core::ptr::null(),
                len: 0,
                pos: 0,
                enabled: false,
                flags: 0,
                sent: Vec::new(),
                ops: Vec::new(),
            }
        }
    }

    impl MockStream {
        pub fn is_enabled(&self) -> bool {
            self.enabled
        }

        pub fn remaining(&self) -> usize {
            self.len - self.pos
        }

        /// Transfer up to `n` bytes, sets transfer complete flag after the last one
        pub fn run(&mut self, n: usize) -> usize {
            if !self.enabled {
                return 0;
            }
            let n = n.min(self.remaining());
            for _ in 0..n {
                // Safety: TxStream::start contract keeps the memory valid while enabled
                let byte = unsafe { *self.src.add(self.pos) };
                self.sent.push(byte);
                self.pos += 1;
            }
            if self.pos == self.len {
                self.enabled = false;
                self.flags |= InterruptStatus::TCIF;
            }
            n
        }

        /// Finish the whole transfer
        pub fn run_to_end(&mut self) -> usize {
            self.run(usize::MAX)
        }

        /// Simulate a bus error, hardware disables the stream
        pub fn raise_error(&mut self) {
            self.enabled = false;
            self.flags |= InterruptStatus::TEIF;
        }

        /// Set arbitrary flags, e.g. to simulate half transfer interrupt
        pub fn raise_flags(&mut self, flags: u8) {
            self.flags |= flags;
        }

        /// Take all bytes transmitted so far
        pub fn take_sent(&mut self) -> Vec<u8> {
            core::mem::take(&mut self.sent)
        }

        pub fn starts(&self) -> usize {
            self.ops.iter().filter(|op| matches!(op, Op::Start(_))).count()
        }
    }

    pub const HTIF: u8 = InterruptStatus::HTIF;

    /// [`TxStream`] that operates on a shared [`MockStream`]
    pub struct DmaTxMock<'a> {
        state: &'a RefCell<MockStream>,
    }

    impl<'a> DmaTxMock<'a> {
        pub fn new(state: &'a RefCell<MockStream>) -> Self {
            Self { state }
        }
    }

    impl<'a> TxStream for DmaTxMock<'a> {
        unsafe fn start(&mut self, src: *const u8, len: u16) {
            let mut s = self.state.borrow_mut();
            assert!(!s.enabled, "Stream started while enabled");
            s.ops.push(Op::Start(len as usize));
            s.src = src;
            s.len = len as usize;
            s.pos = 0;
            s.enabled = true;
        }

        fn take_status(&mut self) -> InterruptStatus {
            let mut s = self.state.borrow_mut();
            let flags = s.flags;
            if flags != 0 {
                s.ops.push(Op::ClearFlags(flags));
                s.flags = 0;
            }
            InterruptStatus(flags)
        }

        fn stop(&mut self) {
            let mut s = self.state.borrow_mut();
            s.ops.push(Op::Stop);
            s.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags() {
        let st = InterruptStatus(0b10_0000);
        assert!(st.any());
        assert!(st.complete());
        assert!(!st.error());
        assert!(!st.half_complete());

        let st = InterruptStatus(0b00_0100);
        assert!(st.error());
        assert!(!st.complete());

        let st = InterruptStatus(0b00_0001);
        assert!(st.fifo_error());
        assert!(!st.error());

        assert!(!InterruptStatus::empty().any());
    }

    #[test]
    fn clear_flags() {
        let mut clr = InterruptClear(0);
        clr.complete().half_complete();
        assert_eq!(clr.0, 0b11_0000);

        let mut clr = InterruptClear(0);
        clr.all();
        assert_eq!(clr.0 as u32, DmaStream::<7>::MASK);

        let mut clr = InterruptClear(0);
        clr.flags(&InterruptStatus(0b10_1000));
        assert_eq!(clr.0, 0b10_1000);
    }

    #[test]
    fn stream_offsets() {
        assert_eq!(DmaStream::<4>::OFFSET, 0);
        assert_eq!(DmaStream::<7>::OFFSET, 22);
        assert_eq!(DmaStream::<3>::OFFSET, DmaStream::<7>::OFFSET);
        // TCIF7 is bit 27 of HISR
        assert_eq!((InterruptStatus::TCIF as u32) << DmaStream::<7>::OFFSET, 1 << 27);
    }

    #[test]
    fn interrupt_result_option() {
        assert_eq!(InterruptResult::Complete.as_option(), Some(Ok(())));
        assert_eq!(InterruptResult::Error(TransferError::Dma).as_option(), Some(Err(TransferError::Dma)));
        assert_eq!(InterruptResult::NotOurs.as_option(), None);
        assert_eq!(InterruptResult::Spurious.as_option(), None);
    }
}
