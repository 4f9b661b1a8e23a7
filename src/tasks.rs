//! On-target task loops
//!
//! Generic async service loops for the Embassy executor. The board crate
//! wraps these in concrete `#[embassy_executor::task]` functions (task
//! functions cannot be generic), owning the `'static` stand behind a
//! [`SharedState`] so the RPC loop and the controller service loop interleave
//! safely with the waveform interrupts.

use embassy_time::{Duration, Instant, Ticker, Timer};

use crate::app::TestStand;
use crate::decoder::DecoderCallbacks;
use crate::platform::traits::{Board, UartInterface};
use crate::rpc::server::RpcServer;
use crate::rpc::transport::RpcTransport;
use crate::sync::SharedState;
use crate::log_warn;

/// Controller service period.
const SERVICE_PERIOD_MS: u64 = 10;
/// RPC poll period while the line is idle.
const RPC_POLL_MS: u64 = 2;

/// Drive both controllers' service points forever.
pub async fn service_loop<'q, B, C, S>(stand: &S) -> !
where
    B: Board,
    C: DecoderCallbacks,
    S: SharedState<TestStand<'q, B, C>>,
{
    let mut ticker = Ticker::every(Duration::from_millis(SERVICE_PERIOD_MS));
    loop {
        ticker.next().await;
        let now_ms = Instant::now().as_millis();
        stand.with_mut(|stand| stand.service(now_ms));
    }
}

/// Serve RPC requests from the host link forever.
pub async fn rpc_loop<'q, B, C, S, U>(stand: &S, transport: &mut RpcTransport<U>) -> !
where
    B: Board,
    C: DecoderCallbacks,
    S: SharedState<TestStand<'q, B, C>>,
    U: UartInterface,
{
    let mut server = RpcServer::new();
    crate::rpc::handlers::register_all(&mut server);

    loop {
        let result = stand.with_mut(|stand| stand.poll_rpc(transport, &server));
        if result.is_err() {
            log_warn!("RPC transport poll failed");
        }
        Timer::after(Duration::from_millis(RPC_POLL_MS)).await;
    }
}
