//! Root board trait
//!
//! Aggregates the peripheral types of one concrete board so the application
//! layer can be written once against associated types, enabling zero-cost
//! compile-time dispatch. The mock board (`platform::mock::MockBoard`) is the
//! host-test instantiation.

use super::{
    AdcInterface, DacInterface, FlashInterface, GpioBankInterface, GpioInterface, RtcInterface,
    TimerInterface, UartInterface,
};

/// Root board trait
///
/// Peripheral construction and pin muxing are board bring-up concerns and
/// happen outside this crate; the application receives already-constructed
/// peripheral values whose types are named here.
pub trait Board {
    /// Parameter storage flash
    type Flash: FlashInterface;
    /// Feedback ADC
    type Adc: AdcInterface;
    /// Delay / time source for task context
    type Timer: TimerInterface;
    /// BiDi threshold DAC
    type Dac: DacInterface;
    /// Numbered test I/O bank
    type GpioBank: GpioBankInterface;
    /// Board RTC
    type Rtc: RtcInterface;
    /// Dedicated UART the decoder transmits BiDi datagrams on
    type BidiUart: UartInterface;
    /// BR_ENABLE sense input used as the quiet-track proxy
    type QuietSense: GpioInterface;

    /// Reset the MCU. Must not return.
    ///
    /// Called by the RPC service loop after the `system_reboot` response has
    /// been flushed. Mock implementations record the request instead of
    /// resetting.
    fn system_reset(&mut self);
}
