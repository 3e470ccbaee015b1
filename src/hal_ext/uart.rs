use core::sync::atomic;

use crate::hal;
use super::dma::{self, InterruptStatus, TxStream};

type UartRegs = hal::pac::USART1;
type UartRegisterBlock = hal::pac::usart1::RegisterBlock;
type TxDma = dma::DmaStream<7>;

/// DMA request mapping: USART1_TX is channel 4 of DMA2 stream 7
const TX_DMA_CHANNEL: u8 = 4;

/// DMA UART TX engine
///
/// Drives USART1 transmission from DMA2 stream 7. This only handles the
/// hardware side of a transfer, use [`crate::serial::TxChannel`] to get
/// single-flight transfers with buffer ownership tracking.
///
/// The TX pin (PA9 in AF7) must be configured by the caller.
pub struct UartTx {
    uart: UartRegs,
    dma: TxDma,
}

impl UartTx {
    pub fn new(
        uart: UartRegs,
        mut dma: TxDma,
        baud_rate: u32,
        pclk2_hz: u32,
    ) -> Self
    {
        // Need to access some registers outside of HAL type system
        let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };

        // Enable UART clock and reset peripheral
        rcc_regs.apb2enr.modify(|_, w| w.usart1en().set_bit());
        rcc_regs.apb2rstr.modify(|_, w| w.usart1rst().set_bit());
        rcc_regs.apb2rstr.modify(|_, w| w.usart1rst().clear_bit());

        // 16x oversampling, BRR holds the 12.4 fixed-point divisor
        let brr = Self::baudrate_divisor(pclk2_hz, baud_rate);
        uart.brr.write(|w| unsafe { w.bits(brr) });

        // Transmitter only, DMA requests are enabled per transfer
        uart.cr1.write(|w| w.ue().set_bit().te().set_bit());

        // Make sure the stream is idle before first use
        dma.st().cr.modify(|_, w| w.en().clear_bit());
        while dma.st().cr.read().en().bit_is_set() {}
        dma.ifcr(|w| w.all());

        Self { uart, dma }
    }

    /// Rounded USART_BRR value for 16x oversampling
    fn baudrate_divisor(pclk: u32, baud_rate: u32) -> u32 {
        (pclk + baud_rate / 2) / baud_rate
    }

    fn uart() -> &'static UartRegisterBlock {
        unsafe { &*UartRegs::ptr() }
    }

    /// Release the peripherals
    pub fn free(mut self) -> (UartRegs, TxDma) {
        self.stop();
        (self.uart, self.dma)
    }
}

impl TxStream for UartTx {
    unsafe fn start(&mut self, src: *const u8, len: u16) {
        let dst = Self::uart().dr.as_ptr() as u32;

        // Flags from previous transfer must be cleared before enabling the stream
        self.dma.ifcr(|w| w.all());

        let st = self.dma.st();
        st.par.write(|w| w.bits(dst));
        st.m0ar.write(|w| w.bits(src as u32));
        st.ndtr.write(|w| w.bits(len as u32));
        st.cr.write(|w| {
            w
                .chsel().bits(TX_DMA_CHANNEL)
                .pl().bits(0b11) // very high
                .msize().bits(0b00) // 8-bit
                .psize().bits(0b00) // 8-bit
                .minc().set_bit()
                .pinc().clear_bit()
                .circ().clear_bit()
                .dir().bits(0b01) // memory to peripheral
                .tcie().set_bit()
                .teie().set_bit()
                .dmeie().set_bit()
        });

        // "Preceding reads and writes cannot be moved past subsequent writes"
        atomic::compiler_fence(atomic::Ordering::Release);

        // Enable stream, then trigger DMA requests
        self.dma.st().cr.modify(|_, w| w.en().set_bit());
        Self::uart().cr3.modify(|_, w| w.dmat().set_bit());
    }

    fn take_status(&mut self) -> InterruptStatus {
        let status = self.dma.isr();
        if status.any() {
            self.dma.ifcr(|w| w.flags(&status));
        }
        status
    }

    fn stop(&mut self) {
        let st = self.dma.st();
        st.cr.modify(|_, w| w.tcie().clear_bit().teie().clear_bit().dmeie().clear_bit());
        Self::uart().cr3.modify(|_, w| w.dmat().clear_bit());
        self.dma.st().cr.modify(|_, w| w.en().clear_bit());

        // EN reads as 1 until the current data item has been transferred
        while self.dma.st().cr.read().en().bit_is_set() {}

        // "Subsequent reads and writes cannot be moved ahead of preceding reads"
        atomic::compiler_fence(atomic::Ordering::Acquire);
    }
}
