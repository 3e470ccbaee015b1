//! Hardware Abstraction Layer
//!
//! This module is an extension to `stm32f4xx_hal` that covers some more
//! project-specific hardware - mainly DMA abstractions.

pub mod dma;
pub mod uart;
