//! Application aggregate
//!
//! [`TestStand`] owns every resource the RPC surface can touch: the command
//! station and decoder controllers, the parameter manager, analog feedback,
//! the test I/O bank, the RTC and the board handle used for the final reboot.
//! The waveform engine and the capture unit are deliberately absent; they
//! belong to the timer interrupts and only share the lock-free state and the
//! packet queues with the controllers held here.

use crate::analog::AnalogFeedback;
use crate::decoder::{DecoderCallbacks, DecoderController};
use crate::parameters::ParameterManager;
use crate::platform::traits::Board;
use crate::rpc::server::RpcServer;
use crate::rpc::transport::RpcTransport;
use crate::station::CsController;

/// Everything the RPC dispatcher operates on.
pub struct TestStand<'q, B: Board, C: DecoderCallbacks> {
    /// Board handle (system reset)
    pub board: B,
    /// Persistent parameters
    pub params: ParameterManager<B::Flash>,
    /// Averaged voltage/current feedback
    pub analog: AnalogFeedback<B::Adc, B::Timer>,
    /// Numbered test I/O bank
    pub gpio: B::GpioBank,
    /// Board RTC
    pub rtc: B::Rtc,
    /// Command station controller
    pub cs: CsController<'q, B::Dac>,
    /// Decoder controller
    pub decoder: DecoderController<'q, B::BidiUart, B::QuietSense, C>,
    /// Raised by the `system_reboot` handler; honored after the response is
    /// on the wire
    pub reboot_pending: bool,
}

impl<'q, B: Board, C: DecoderCallbacks> TestStand<'q, B, C> {
    /// Assemble the stand from its already-constructed parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        board: B,
        params: ParameterManager<B::Flash>,
        analog: AnalogFeedback<B::Adc, B::Timer>,
        gpio: B::GpioBank,
        rtc: B::Rtc,
        cs: CsController<'q, B::Dac>,
        decoder: DecoderController<'q, B::BidiUart, B::QuietSense, C>,
    ) -> Self {
        Self {
            board,
            params,
            analog,
            gpio,
            rtc,
            cs,
            decoder,
            reboot_pending: false,
        }
    }

    /// Periodic service point for both controllers; `now_ms` is a monotonic
    /// millisecond clock.
    pub fn service(&mut self, now_ms: u64) {
        self.cs.service(now_ms);
        self.decoder.service();
    }

    /// Serve pending RPC requests from `transport`, then honor a reboot
    /// request once its response has been written. Returns the number of
    /// requests served.
    pub fn poll_rpc<U>(
        &mut self,
        transport: &mut RpcTransport<U>,
        server: &RpcServer<Self>,
    ) -> crate::platform::Result<u32>
    where
        U: crate::platform::traits::UartInterface,
    {
        let served = transport.poll(server, self)?;
        if self.reboot_pending {
            self.board.system_reset();
        }
        Ok(served)
    }
}
