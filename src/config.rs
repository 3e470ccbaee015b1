//! Robot configuration
//!
//! [`CONFIG`] holds the board constants. By default it is defined in code
//! below, with the `json-config` feature it is generated by the build script
//! from a JSON file (see `meiga-config`).

#[cfg(feature = "json-config")]
pub use generated::CONFIG;

#[cfg(not(feature = "json-config"))]
pub use code::CONFIG;

/// Where [`CONFIG`] came from: the JSON path it was generated from, or `built-in`
pub const SOURCE: &str = env!("MEIGA_CONFIG_SOURCE");

#[cfg(feature = "json-config")]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobotConfig {
    pub clocks: ClockConfig,
    pub serial: SerialConfig,
    pub battery: BatteryConfig,
    pub speaker: SpeakerConfig,
    pub telemetry_period_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockConfig {
    pub sysclk_hz: u32,
    pub tick_hz: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// 0 disables the stall watchdog
    pub tx_timeout_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryConfig {
    pub adc_reference_volts: f32,
    pub adc_resolution_bits: u8,
    pub divider_factor: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerConfig {
    pub base_frequency_hz: u32,
}

impl ClockConfig {
    /// Convert milliseconds to system ticks, rounding down but never below 1 tick
    pub const fn ms_to_ticks(&self, ms: u32) -> u32 {
        let ticks = (ms as u64 * self.tick_hz as u64) / 1000;
        if ticks == 0 && ms != 0 {
            1
        } else if ticks > u32::MAX as u64 {
            u32::MAX
        } else {
            ticks as u32
        }
    }
}

impl RobotConfig {
    /// Stall watchdog timeout in ticks
    pub const fn tx_timeout_ticks(&self) -> Option<u32> {
        match self.serial.tx_timeout_ms {
            0 => None,
            ms => Some(self.clocks.ms_to_ticks(ms)),
        }
    }

    pub const fn telemetry_period_ticks(&self) -> u32 {
        self.clocks.ms_to_ticks(self.telemetry_period_ms)
    }
}

impl BatteryConfig {
    /// Voltage corresponding to a single ADC bit
    pub fn volts_per_bit(&self) -> f32 {
        self.adc_reference_volts / (1u32 << self.adc_resolution_bits) as f32
    }

    /// Battery voltage from a raw ADC reading, accounting for the voltage divider
    pub fn bits_to_volts(&self, bits: u16) -> f32 {
        bits as f32 * self.volts_per_bit() * self.divider_factor
    }
}

#[cfg(not(feature = "json-config"))]
mod code {
    use super::*;

    pub static CONFIG: RobotConfig = DEFAULT;

    const DEFAULT: RobotConfig = RobotConfig {
        clocks: ClockConfig {
            sysclk_hz: 168_000_000,
            tick_hz: 1000,
        },
        serial: SerialConfig {
            baud_rate: 921_600,
            tx_timeout_ms: 100,
        },
        battery: BatteryConfig {
            adc_reference_volts: 3.3,
            adc_resolution_bits: 12,
            divider_factor: 2.0,
        },
        speaker: SpeakerConfig {
            base_frequency_hz: 1_000_000,
        },
        telemetry_period_ms: 100,
    };

    const _: () = {
        assert!(DEFAULT.clocks.tick_hz > 0);
        assert!(DEFAULT.clocks.sysclk_hz >= DEFAULT.clocks.tick_hz);
        assert!(DEFAULT.telemetry_period_ms > 0);
        assert!(match DEFAULT.tx_timeout_ticks() {
            Some(ticks) => ticks <= crate::serial::MAX_TIMEOUT,
            None => true,
        });
        assert!(DEFAULT.battery.adc_resolution_bits >= 1 && DEFAULT.battery.adc_resolution_bits <= 16);
    };
}
