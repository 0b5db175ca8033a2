//! Machine configuration.
//!
//! Hierarchical, serde-deserializable configuration for the reference
//! platform: memory placement, device base addresses, and core count.
//! `MachineConfig::default()` matches the wiring the CLI builds; JSON
//! overrides come in through `serde_json`.

use serde::Deserialize;

/// Default configuration constants for the reference platform.
pub mod defaults {
    /// Base address of guest RAM.
    pub const MEM_BASE: u64 = 0x10000;
    /// Guest RAM size (5 MiB).
    pub const MEM_SIZE: u64 = 5 * 1024 * 1024;
    /// UART MMIO base.
    pub const UART_BASE: u64 = 0x500_0000;
    /// Interrupt controller MMIO base.
    pub const INTC_BASE: u64 = 0x501_0000;
    /// Real-time clock MMIO base.
    pub const RTC_BASE: u64 = 0x502_0000;
    /// Countdown timer MMIO base.
    pub const TIMER_BASE: u64 = 0x503_0000;
    /// MPU MMIO base.
    pub const MPU_BASE: u64 = 0x504_0000;
    /// INTC input line assigned to the timer block.
    pub const TIMER_IRQ_LINE: u32 = 0;
    /// Default instruction dispatch bound (0 means unbounded).
    pub const STEP_LIMIT: u64 = 1_000_000;
}

/// Memory and MMIO placement of the reference platform.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Guest RAM base address.
    pub mem_base: u64,
    /// Guest RAM size in bytes.
    pub mem_size: u64,
    /// UART base address.
    pub uart_base: u64,
    /// Interrupt controller base address.
    pub intc_base: u64,
    /// Real-time clock base address.
    pub rtc_base: u64,
    /// Countdown timer base address.
    pub timer_base: u64,
    /// MPU base address.
    pub mpu_base: u64,
    /// INTC input line the timer block drives.
    pub timer_irq_line: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            mem_base: defaults::MEM_BASE,
            mem_size: defaults::MEM_SIZE,
            uart_base: defaults::UART_BASE,
            intc_base: defaults::INTC_BASE,
            rtc_base: defaults::RTC_BASE,
            timer_base: defaults::TIMER_BASE,
            mpu_base: defaults::MPU_BASE,
            timer_irq_line: defaults::TIMER_IRQ_LINE,
        }
    }
}

/// Whole-machine configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Platform placement.
    pub platform: PlatformConfig,
    /// Number of cores to instantiate.
    pub cores: u32,
    /// Instruction dispatch bound (0 means unbounded).
    pub step_limit: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            cores: 1,
            step_limit: defaults::STEP_LIMIT,
        }
    }
}

impl MachineConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
