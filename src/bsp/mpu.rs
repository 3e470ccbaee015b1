use core::convert::Infallible;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use crate::utils::InfallibleResult;

/// Register address flag selecting a read access
pub const READ: u8 = 0x80;

/// Identity register of the inertial measurement unit
pub const WHO_AM_I: u8 = 0x75;

/// Register access to the SPI inertial measurement unit
///
/// Every access is a two-byte frame with chip select held low: the register
/// address (with [`READ`] set for reads), followed by the value to write or a
/// dummy byte clocking out the register contents.
pub struct Mpu<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Mpu<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin<Error = Infallible>,
{
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        cs.set_high().infallible();
        Self { spi, cs }
    }

    fn frame(&mut self, address: u8, data: u8) -> Result<u8, SPI::Error> {
        let mut frame = [address, data];
        self.cs.set_low().infallible();
        let result = self.spi.transfer(&mut frame).map(|rx| rx[1]);
        self.cs.set_high().infallible();
        result
    }

    pub fn read_register(&mut self, address: u8) -> Result<u8, SPI::Error> {
        self.frame(READ | address, 0x00)
    }

    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), SPI::Error> {
        self.frame(address & !READ, value).map(|_| ())
    }

    pub fn who_am_i(&mut self) -> Result<u8, SPI::Error> {
        self.read_register(WHO_AM_I)
    }

    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{rc::Rc, cell::RefCell, vec::Vec};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        CsLow,
        CsHigh,
        Frame([u8; 2]),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    /// Device with 128 registers, replies with the register value on the second byte
    struct MockSpi {
        log: Log,
        regs: [u8; 128],
        fail: bool,
    }

    struct MockCs(Log);

    impl OutputPin for MockCs {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Event::CsLow);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Event::CsHigh);
            Ok(())
        }
    }

    impl Transfer<u8> for MockSpi {
        type Error = ();

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], ()> {
            assert_eq!(words.len(), 2);
            self.log.borrow_mut().push(Event::Frame([words[0], words[1]]));
            if self.fail {
                return Err(());
            }
            let reg = (words[0] & !READ) as usize;
            if words[0] & READ != 0 {
                words[1] = self.regs[reg];
            } else {
                self.regs[reg] = words[1];
            }
            words[0] = 0;
            Ok(words)
        }
    }

    fn mpu(fail: bool) -> (Mpu<MockSpi, MockCs>, Log) {
        let log = Log::default();
        let mut regs = [0; 128];
        regs[WHO_AM_I as usize] = 0x70;
        let spi = MockSpi { log: log.clone(), regs, fail };
        let mpu = Mpu::new(spi, MockCs(log.clone()));
        log.borrow_mut().clear();
        (mpu, log)
    }

    #[test]
    fn read_sets_read_bit() {
        let (mut mpu, log) = mpu(false);
        assert_eq!(mpu.who_am_i(), Ok(0x70));
        assert_eq!(*log.borrow(), [Event::CsLow, Event::Frame([0xf5, 0x00]), Event::CsHigh]);
    }

    #[test]
    fn write_then_read() {
        let (mut mpu, log) = mpu(false);
        assert_eq!(mpu.write_register(0x6b, 0x80), Ok(()));
        assert_eq!(mpu.read_register(0x6b), Ok(0x80));
        assert_eq!(*log.borrow(), [
            Event::CsLow, Event::Frame([0x6b, 0x80]), Event::CsHigh,
            Event::CsLow, Event::Frame([0xeb, 0x00]), Event::CsHigh,
        ]);
    }

    #[test]
    fn write_clears_read_bit() {
        let (mut mpu, log) = mpu(false);
        mpu.write_register(0x80 | 0x1a, 3).unwrap();
        assert_eq!(log.borrow()[1], Event::Frame([0x1a, 3]));
        let (spi, _) = mpu.free();
        assert_eq!(spi.regs[0x1a], 3);
    }

    #[test]
    fn chip_select_released_on_error() {
        let (mut mpu, log) = mpu(true);
        assert_eq!(mpu.read_register(0x3b), Err(()));
        assert_eq!(*log.borrow(), [Event::CsLow, Event::Frame([0xbb, 0x00]), Event::CsHigh]);
    }

    #[test]
    fn starts_deselected() {
        let log = Log::default();
        let spi = MockSpi { log: log.clone(), regs: [0; 128], fail: false };
        let _mpu = Mpu::new(spi, MockCs(log.clone()));
        assert_eq!(*log.borrow(), [Event::CsHigh]);
    }
}
