//! Build-time robot configuration
//!
//! Robot constants can be described in a JSON file which is parsed by the
//! firmware build script. [`RobotConfig`] is then turned into Rust code that
//! initializes `crate::config::CONFIG` in the firmware crate.

pub mod format;

use std::{path::Path, fs::File, io::{Write, BufReader}};

use anyhow::Context;
use proc_macro2::TokenStream;
use quote::{quote, ToTokens, TokenStreamExt};
use serde::{Serialize, Deserialize};
use schemars::{JsonSchema, schema_for, schema::RootSchema};

/// Implement ToTokens for a regular struct
///
/// Generates implementations of ToTokens for a list of structs. Will use $path
/// as the name of struct in generated tokens. Current limitation is that each
/// field in struct def has to end with a comma (even the last one).
#[macro_export]
macro_rules! impl_struct_to_tokens {
    // Main entry point, accept a list of struct definitions
    ( $( struct $struct:ident: $path:path { $($field_defs:tt)* } )* ) => {
        $(
            impl_struct_to_tokens! { @struct $struct: $path { $($field_defs)* } }
        )*
    };

    // Generate ToTokens for a single struct
    ( @struct $struct:ident: $path:path { $($field_defs:tt)* } ) => {
        impl ToTokens for $struct {
            fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
                impl_struct_to_tokens! { @vars self $($field_defs)* }
                tokens.append_all( quote! { $path } );
                let mut fields = proc_macro2::TokenStream::new();
                impl_struct_to_tokens! { @tokens fields $($field_defs)* }
                tokens.append(proc_macro2::Group::new(proc_macro2::Delimiter::Brace, fields));
            }
        }
    };

    // Extract struct field to local variable so that we can use it in quote! later
    // e.g. `let field_a = &self.field_a;`
    ( @vars $self:ident $field:ident, $($field_defs:tt)* ) => {
        let $field = &$self.$field;
        impl_struct_to_tokens! { @vars $self $($field_defs)* }
    };
    ( @vars $self:ident ) => {};

    // Add tokens for field assignment inside struct initializer
    // e.g. `Struct { field_a: field_a }`
    ( @tokens $tokens:ident $field:ident, $($field_defs:tt)* ) => {
        $tokens.append_all(quote! {
            $field: #$field,
        });
        impl_struct_to_tokens! { @tokens $tokens $($field_defs)* }
    };
    ( @tokens $tokens:ident ) => {};
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
pub struct RobotConfig {
    clocks: ClockConfig,
    serial: SerialConfig,
    battery: BatteryConfig,
    speaker: SpeakerConfig,
    /// Period of the telemetry report sent over serial
    telemetry_period_ms: u32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
pub struct ClockConfig {
    /// System clock frequency, the cycle counter increments at this rate
    sysclk_hz: u32,
    /// Frequency of the system tick interrupt
    tick_hz: u32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
pub struct SerialConfig {
    baud_rate: u32,
    /// Time after which a transfer without completion interrupt is aborted, 0 disables it
    tx_timeout_ms: u32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
pub struct BatteryConfig {
    /// ADC reference voltage
    adc_reference_volts: f32,
    /// ADC resolution in bits
    adc_resolution_bits: u8,
    /// Ratio of the battery voltage to the voltage measured by the ADC
    divider_factor: f32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
pub struct SpeakerConfig {
    /// Speaker PWM timer counter frequency
    base_frequency_hz: u32,
}

impl_struct_to_tokens! {
    struct RobotConfig: crate::config::RobotConfig {
        clocks,
        serial,
        battery,
        speaker,
        telemetry_period_ms,
    }
    struct ClockConfig: crate::config::ClockConfig {
        sysclk_hz,
        tick_hz,
    }
    struct SerialConfig: crate::config::SerialConfig {
        baud_rate,
        tx_timeout_ms,
    }
    struct BatteryConfig: crate::config::BatteryConfig {
        adc_reference_volts,
        adc_resolution_bits,
        divider_factor,
    }
    struct SpeakerConfig: crate::config::SpeakerConfig {
        base_frequency_hz,
    }
}

impl RobotConfig {
    fn file_tokens(&self) -> TokenStream {
        quote! {
            pub static CONFIG: crate::config::RobotConfig = #self;
        }
    }

    fn to_string_pretty(&self) -> anyhow::Result<String> {
        let tokens = self.file_tokens();
        format::pretty_items(&tokens)
            .with_context(|| format!("Failed to parse:\n{}", tokens))
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        let code = self.to_string_pretty()?;
        file.write_all(code.as_bytes())?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(&mut reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the firmware misbehave at runtime
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.clocks.tick_hz > 0, "clocks.tick_hz must be non-zero");
        anyhow::ensure!(self.clocks.sysclk_hz >= self.clocks.tick_hz, "clocks.sysclk_hz lower than tick_hz");
        anyhow::ensure!(self.serial.baud_rate > 0, "serial.baud_rate must be non-zero");
        // Watchdog deadlines are compared with wrapping tick arithmetic
        let timeout_ticks = self.serial.tx_timeout_ms as u64 * self.clocks.tick_hz as u64 / 1000;
        anyhow::ensure!(timeout_ticks <= i32::MAX as u64,
            "serial.tx_timeout_ms too long: {} ticks, max {}", timeout_ticks, i32::MAX);
        anyhow::ensure!((1..=16).contains(&self.battery.adc_resolution_bits),
            "battery.adc_resolution_bits out of range: {}", self.battery.adc_resolution_bits);
        anyhow::ensure!(self.battery.divider_factor > 0.0, "battery.divider_factor must be positive");
        anyhow::ensure!(self.speaker.base_frequency_hz > 0, "speaker.base_frequency_hz must be non-zero");
        anyhow::ensure!(self.telemetry_period_ms > 0, "telemetry_period_ms must be non-zero");
        Ok(())
    }

    pub fn schema() -> RootSchema {
        schema_for!(Self)
    }

    pub fn schema_to_file(path: &Path) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        let schema = Self::schema();
        let string = serde_json::to_string_pretty(&schema)?;
        file.write_all(string.as_bytes())?;
        Ok(())
    }
}
