#![no_main]
#![no_std]

use panic_probe as _;
use defmt_rtt as _;
use stm32f4xx_hal as hal;
use meiga as lib;

#[rtic::app(device = crate::hal::pac, dispatchers = [EXTI0, EXTI1])]
mod app {
    use super::hal;
    use hal::prelude::*;
    use hal::gpio::{self, Analog, Output, PushPull};
    use systick_monotonic::ExtU64;
    use static_assertions::const_assert;

    use super::lib;
    use lib::bsp::{self, battery::Battery, clock::Clock, encoders::Encoders, leds::Leds, motors::MotorPwm, mpu::Mpu, speaker::Speaker};
    use lib::config::CONFIG;
    use lib::hal_ext::{dma::DmaSplit, uart::UartTx};
    use lib::serial::{TxChannel, TxStats};
    use lib::telemetry::{Report, TelemetryStats, LINE_LEN};

    const TX_BUF_LEN: usize = 64;
    const BEEP_MS: u64 = 100;
    const BEEP_HZ: f32 = 2000.0;

    const_assert!(TX_BUF_LEN <= u16::MAX as usize);
    const_assert!(LINE_LEN <= TX_BUF_LEN);

    type TxBuf = &'static mut [u8; TX_BUF_LEN];
    type SerialTx = TxChannel<UartTx, TxBuf>;
    type BatteryAdc = Battery<hal::pac::ADC2, hal::adc::Adc<hal::pac::ADC2>, gpio::gpiob::PB1<Analog>>;
    type StatusLeds = Leds<gpio::ErasedPin<Output<PushPull>>>;
    type Motors = MotorPwm<hal::timer::PwmChannel<hal::pac::TIM8, 0>, hal::timer::PwmChannel<hal::pac::TIM8, 1>>;

    static CLOCK: Clock = Clock::new();

    #[shared]
    struct Shared {
        serial: SerialTx,
        speaker: Speaker,
    }

    #[local]
    struct Local {
        timer: hal::timer::CounterHz<hal::pac::TIM2>,
        leds: StatusLeds,
        encoders: Encoders,
        battery: BatteryAdc,
        tx_buf: Option<TxBuf>,
        motors: Motors,
    }

    #[monotonic(binds = SysTick, default = true)]
    type Mono = systick_monotonic::Systick<MONO_HZ>;
    pub const MONO_HZ: u32 = 1000;

    #[init(local = [
        tx_buf: [u8; TX_BUF_LEN] = [0; TX_BUF_LEN],
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut core = cx.core;
        let dev = cx.device;

        // Automatically enter sleep mode when leaving an ISR
        if cfg!(feature = "idle-sleep") {
            core.SCB.set_sleeponexit();
        }

        // Clock configuration: HSI with PLL, APB1 at 42 MHz, APB2 at 84 MHz
        let rcc = dev.RCC.constrain();
        let clocks = rcc.cfgr
            .sysclk(CONFIG.clocks.sysclk_hz.Hz())
            .pclk1(42.MHz())
            .pclk2(84.MHz())
            .freeze();

        bsp::enable_cycle_counter(&mut core.DCB, &mut core.DWT);

        // Pinout
        let gpioa = dev.GPIOA.split();
        let gpiob = dev.GPIOB.split();
        let gpioc = dev.GPIOC.split();

        let leds = Leds::new([
            gpioa.pa0.into_push_pull_output().erase(),
            gpioa.pa1.into_push_pull_output().erase(),
            gpioa.pa2.into_push_pull_output().erase(),
            gpioa.pa3.into_push_pull_output().erase(),
        ]);

        // UART TX with DMA
        let _uart_tx = gpioa.pa9.into_alternate::<7>();
        let dma = dev.DMA2.split();
        let uart = UartTx::new(dev.USART1, dma.st7, CONFIG.serial.baud_rate, clocks.pclk2().raw());
        let serial = TxChannel::new(uart, CONFIG.tx_timeout_ticks());

        // Wheel encoders
        let _enc_left = (gpiob.pb4.into_alternate::<2>(), gpiob.pb5.into_alternate::<2>());
        let _enc_right = (gpiob.pb6.into_alternate::<2>(), gpiob.pb7.into_alternate::<2>());
        let encoders = Encoders::new(dev.TIM3, dev.TIM4);

        // Battery voltage divider on ADC2_IN9
        let adc = hal::adc::Adc::adc2(dev.ADC2, true, hal::adc::config::AdcConfig::default());
        let battery = Battery::new(adc, gpiob.pb1.into_analog(), &CONFIG.battery);

        // Motor PWM, kept stopped until a controller takes over
        let channels = (hal::timer::Channel1::new(gpioc.pc6), hal::timer::Channel2::new(gpioc.pc7));
        let (left, right) = dev.TIM8.pwm_hz(channels, 20.kHz(), &clocks).split();
        let motors = MotorPwm::new(left, right);

        // Inertial measurement unit on SPI3, chip select on PA15
        let mpu_pins = (
            gpioc.pc10.into_alternate::<6>(),
            gpioc.pc11.into_alternate::<6>(),
            gpioc.pc12.into_alternate::<6>(),
        );
        let mpu_spi = hal::spi::Spi::new(dev.SPI3, mpu_pins, embedded_hal::spi::MODE_3, 1.MHz(), &clocks);
        let mut mpu = Mpu::new(mpu_spi, gpioa.pa15.into_push_pull_output().erase());
        match mpu.who_am_i() {
            Ok(id) => defmt::info!("IMU WHO_AM_I: {=u8:#x}", id),
            Err(_) => defmt::warn!("IMU not responding"),
        }

        // Speaker
        let _speaker_pin = gpiob.pb9.into_alternate::<3>();
        let speaker = Speaker::new(dev.TIM11, clocks.timclk2().raw(), CONFIG.speaker.base_frequency_hz);

        // System tick
        let mut timer = dev.TIM2.counter_hz(&clocks);
        timer.start(CONFIG.clocks.tick_hz.Hz()).unwrap();
        timer.listen(hal::timer::Event::Update);

        defmt::info!("Liftoff! meiga {=str} ({=str})", lib::build_info::PKG_VERSION, lib::build_info::PROFILE);
        defmt::info!("Config: {=str}", lib::config::SOURCE);
        defmt::debug!("Clocks: sysclk={=u32} pclk2={=u32}", clocks.sysclk().raw(), clocks.pclk2().raw());

        if beep::spawn().is_err() {
            defmt::warn!("Spawn failed: beep");
        }

        let shared = Shared {
            serial,
            speaker,
        };

        let local = Local {
            timer,
            leds,
            encoders,
            battery,
            tx_buf: Some(cx.local.tx_buf),
            motors,
        };

        let mono = systick_monotonic::Systick::new(core.SYST, clocks.sysclk().raw());

        (shared, local, init::Monotonics(mono))
    }

    #[task(binds = TIM2, priority = 3, shared = [serial], local = [timer, leds])]
    fn tick(mut cx: tick::Context) {
        // Clears interrupt flag
        if cx.local.timer.wait().is_err() {
            return;
        }

        let now = CLOCK.tick();

        let (timeout, busy) = cx.shared.serial.lock(|tx| (tx.check_timeout(now), tx.is_busy()));
        if let Err(e) = timeout {
            defmt::error!("UART TX aborted: {}", e);
        }

        let leds = cx.local.leds;
        leds.set(1, busy);
        if now % (CONFIG.clocks.tick_hz / 2).max(1) == 0 {
            leds.toggle(0);
        }

        if now % CONFIG.telemetry_period_ticks().max(1) == 0 {
            // Skip a report if we're too slow
            if telemetry::spawn(now).is_err() {
                defmt::warn!("Spawn failed: telemetry");
            }
        }

        if now % CONFIG.clocks.tick_hz == 0 {
            if debug_report::spawn().is_err() {
                defmt::warn!("Spawn failed: debug_report");
            }
        }
    }

    /// DMA transfer complete/error for UART TX
    #[task(binds = DMA2_STREAM7, priority = 4, shared = [serial])]
    fn dma_uart_callback(mut cx: dma_uart_callback::Context) {
        let result = cx.shared.serial.lock(|tx| tx.on_interrupt());
        match result.as_option().transpose() {
            Ok(Some(())) => defmt::trace!("UART TX done"),
            Ok(None) => {},
            Err(e) => defmt::error!("UART TX failed: {}", e),
        }
    }

    /// Format and send the telemetry line
    ///
    /// The report is dropped if the previous transfer is still in flight.
    #[task(priority = 1, capacity = 1, shared = [serial], local = [
        encoders,
        battery,
        tx_buf,
        stats: TelemetryStats = TelemetryStats { sent: 0, dropped: 0 },
    ])]
    fn telemetry(cx: telemetry::Context, ticks: u32) {
        let telemetry::LocalResources { encoders, battery, tx_buf, stats } = cx.local;
        let mut serial = cx.shared.serial;

        let buf = match tx_buf.take().or_else(|| serial.lock(|tx| tx.reclaim())) {
            Some(buf) => buf,
            None => {
                stats.record(false);
                defmt::warn!("Telemetry dropped: channel busy");
                return;
            },
        };

        let battery_mv = battery.millivolts().unwrap_or_else(|_| {
            defmt::warn!("Battery read failed");
            0
        });
        let (left, right) = encoders.read();
        let report = Report {
            ticks,
            cycles: bsp::read_cycle_counter(),
            left,
            right,
            battery_mv,
        };

        let len = report.write_to(&mut buf[..]);
        match serial.lock(|tx| tx.send(buf, len)) {
            Ok(()) => stats.record(true),
            Err(e) => {
                defmt::warn!("Telemetry dropped: {}", e);
                stats.record(false);
                *tx_buf = Some(e.into_inner());
            },
        }
    }

    #[task(priority = 1, shared = [serial], local = [last: Option<TxStats> = None])]
    fn debug_report(mut cx: debug_report::Context) {
        let new = cx.shared.serial.lock(|tx| tx.stats().clone());
        let old = cx.local.last.get_or_insert_with(Default::default);
        if &new != old {
            defmt::debug!("TX stats: {}", new);
            *old = new;
        }
    }

    #[task(priority = 2, shared = [speaker])]
    fn beep(mut cx: beep::Context) {
        cx.shared.speaker.lock(|s| s.on(BEEP_HZ));
        if beep_off::spawn_after(BEEP_MS.millis()).is_err() {
            defmt::warn!("Spawn failed: beep_off");
        }
    }

    #[task(priority = 2, shared = [speaker])]
    fn beep_off(mut cx: beep_off::Context) {
        cx.shared.speaker.lock(|s| s.off());
    }

    #[idle(local = [motors])]
    fn idle(cx: idle::Context) -> ! {
        // Nothing drives the motors yet
        cx.local.motors.stop();
        loop {
            if cfg!(feature = "idle-sleep") {
                rtic::export::wfi();
            } else {
                rtic::export::nop();
            }
        }
    }
}
