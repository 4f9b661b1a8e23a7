//! Command station controller
//!
//! Task-context half of the command station: life-cycle, configuration
//! activation, the BiDi threshold DAC, the custom-packet slot and the built-in
//! test loops. Produces packets into the spsc queue the timing engine
//! consumes; everything else crosses the ISR boundary through [`CsShared`].

use crate::dcc::packet::{self, FunctionGroup};
use crate::dcc::{Packet, PacketError, PacketProducer};
use crate::platform::traits::DacInterface;
use crate::platform::PlatformError;
use crate::sync::TaskState;
use crate::{log_info, log_warn};

use super::{ConfigError, CsShared, OverrideMap, TimingConfig};

/// Loco address the built-in test loops talk to.
pub const TEST_LOOP_ADDRESS: u16 = 3;

/// Hold time per step of the basic loop (mode 1), milliseconds.
const BASIC_STEP_MS: u64 = 2000;
/// Hold time per step of the emergency-stop loop (mode 2), milliseconds.
const ESTOP_STEP_MS: u64 = 1000;
/// Hold time per step of the speed ramp (mode 3), milliseconds.
const RAMP_STEP_MS: u64 = 500;

/// Test-loop selector as exposed on the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// No auto-generation; packets arrive via the custom slot
    Custom,
    /// F0 on/off plus forward/reverse ramp to step 42, 2 s per step
    Basic,
    /// Headlight on, speed 60, broadcast emergency stop, repeat
    EmergencyStop,
    /// Speed ramp 0 -> 126 -> 0, forward then reverse, 500 ms per step
    SpeedRamp,
}

impl LoopMode {
    /// Parse the RPC integer selector.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(LoopMode::Custom),
            1 => Some(LoopMode::Basic),
            2 => Some(LoopMode::EmergencyStop),
            3 => Some(LoopMode::SpeedRamp),
            _ => None,
        }
    }

    /// The RPC integer selector.
    pub fn index(self) -> u8 {
        match self {
            LoopMode::Custom => 0,
            LoopMode::Basic => 1,
            LoopMode::EmergencyStop => 2,
            LoopMode::SpeedRamp => 3,
        }
    }
}

/// Command station controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsError {
    /// Start requested while already running
    AlreadyRunning,
    /// Stop or transmit requested while not running
    NotRunning,
    /// Configuration rejected at activation
    InvalidConfig(ConfigError),
    /// Custom slot operation with malformed packet bytes
    InvalidPacket(PacketError),
    /// Transmit requested with an empty custom slot
    NoPacketLoaded,
    /// Transmit requested while a transmission is still in flight
    TransmissionInProgress,
    /// Transmit requested outside custom-packet mode
    NotInCustomMode,
    /// Peripheral failure (DAC)
    Hardware(PlatformError),
}

impl From<ConfigError> for CsError {
    fn from(err: ConfigError) -> Self {
        CsError::InvalidConfig(err)
    }
}

impl From<PacketError> for CsError {
    fn from(err: PacketError) -> Self {
        CsError::InvalidPacket(err)
    }
}

impl From<PlatformError> for CsError {
    fn from(err: PlatformError) -> Self {
        CsError::Hardware(err)
    }
}

/// Single-buffer custom packet slot, filled by `command_station_load_packet`
/// and fired by `command_station_transmit_packet`.
#[derive(Debug, Clone, Copy)]
struct CustomSlot {
    packet: Packet,
    loaded: bool,
    remaining: u32,
    delay_ms: u32,
    next_due_ms: u64,
}

impl CustomSlot {
    const fn empty() -> Self {
        Self {
            packet: Packet::idle(),
            loaded: false,
            remaining: 0,
            delay_ms: 0,
            next_due_ms: 0,
        }
    }
}

/// Ramp generator state for loop mode 3.
#[derive(Debug, Clone, Copy)]
struct RampState {
    forward: bool,
    rising: bool,
    value: u8,
}

impl RampState {
    const fn start() -> Self {
        Self {
            forward: true,
            rising: true,
            value: 0,
        }
    }

    fn advance(&mut self) {
        if self.rising {
            if self.value == 126 {
                self.rising = false;
            } else {
                self.value += 1;
            }
        } else if self.value == 0 {
            self.rising = true;
            self.forward = !self.forward;
        } else {
            self.value -= 1;
        }
    }
}

/// Command station controller (task context).
pub struct CsController<'q, D: DacInterface> {
    shared: &'q CsShared,
    producer: PacketProducer<'q>,
    dac: D,
    state: TaskState,
    mode: LoopMode,
    slot: CustomSlot,
    step: u32,
    step_deadline_ms: u64,
    ramp: RampState,
}

impl<'q, D: DacInterface> CsController<'q, D> {
    /// Create a stopped controller. `producer` is the producer half of the
    /// queue whose consumer was handed to the timing engine; `dac` drives the
    /// BiDi comparator threshold.
    pub fn new(shared: &'q CsShared, producer: PacketProducer<'q>, dac: D) -> Self {
        Self {
            shared,
            producer,
            dac,
            state: TaskState::Stopped,
            mode: LoopMode::Custom,
            slot: CustomSlot::empty(),
            step: 0,
            step_deadline_ms: 0,
            ramp: RampState::start(),
        }
    }

    /// Current life-cycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// True between a successful start and the completion of a stop.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Selected loop mode.
    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    /// Packets completed by the engine since the last start.
    pub fn packets_sent(&self) -> u32 {
        self.shared.packets_sent()
    }

    /// Start waveform generation.
    ///
    /// Validates the configuration, programs the BiDi DAC when the cutout is
    /// enabled and hands the engine a start request. The engine picks it up
    /// on its first timer update.
    pub fn start(&mut self, mode: LoopMode, cfg: TimingConfig) -> Result<(), CsError> {
        if self.state != TaskState::Stopped {
            return Err(CsError::AlreadyRunning);
        }
        cfg.validate()?;

        if cfg.bidi_enable {
            self.dac.start()?;
            self.dac.set_value(cfg.bidi_dac)?;
        }

        self.mode = mode;
        self.step = 0;
        self.step_deadline_ms = 0;
        self.ramp = RampState::start();
        self.shared.request_start(cfg);
        self.state = TaskState::Starting;
        log_info!("Command station started (loop={})", mode.index());
        Ok(())
    }

    /// Stop waveform generation.
    ///
    /// The engine completes the packet in flight (plus a final cutout when
    /// configured) before halting; [`CsController::service`] finishes the
    /// teardown once the engine reports idle. The override map and the custom
    /// slot are cleared so a subsequent start sees fresh-boot state.
    pub fn stop(&mut self) -> Result<(), CsError> {
        match self.state {
            TaskState::Stopped | TaskState::Stopping => Err(CsError::NotRunning),
            TaskState::Starting | TaskState::Running => {
                self.shared.clear_override();
                self.slot = CustomSlot::empty();
                if self.shared.cancel_start() && !self.shared.is_running() {
                    // The engine never consumed the start request.
                    self.dac.stop()?;
                    self.state = TaskState::Stopped;
                } else {
                    self.shared.request_stop();
                    self.state = TaskState::Stopping;
                }
                log_info!("Command station stopping");
                Ok(())
            }
        }
    }

    /// Publish a new timing configuration.
    ///
    /// Takes effect at the engine's next inter-packet boundary. The BiDi DAC
    /// follows immediately when the station is active, mirroring the direct
    /// threshold update the hardware supports while running.
    pub fn publish_config(&mut self, cfg: TimingConfig) -> Result<(), CsError> {
        self.shared.publish_config(cfg);
        if self.state.is_active() {
            if cfg.bidi_enable {
                self.dac.start()?;
                self.dac.set_value(cfg.bidi_dac)?;
            } else {
                self.dac.stop()?;
            }
        }
        Ok(())
    }

    /// Install a per-bit timing override; visible from the next bit boundary.
    pub fn set_override(&mut self, map: OverrideMap) {
        self.shared.set_override(map);
    }

    /// Clear the per-bit timing override.
    pub fn reset_override(&mut self) {
        self.shared.clear_override();
    }

    /// Current override map.
    pub fn override_map(&self) -> OverrideMap {
        self.shared.override_map()
    }

    /// Fill the custom packet slot. Allowed in any state; transmission is
    /// armed separately.
    pub fn load_packet(&mut self, bytes: &[u8]) -> Result<usize, CsError> {
        let packet = Packet::from_bytes(bytes)?;
        self.slot.packet = packet;
        self.slot.loaded = true;
        self.slot.remaining = 0;
        Ok(packet.len())
    }

    /// Arm the custom slot for `count` transmissions spaced `delay_ms` apart.
    ///
    /// Fails when nothing is loaded, the station is not running in custom
    /// mode, or a previous transmission is still draining.
    pub fn transmit_packet(&mut self, count: u32, delay_ms: u32) -> Result<(), CsError> {
        if !self.slot.loaded {
            return Err(CsError::NoPacketLoaded);
        }
        if self.state != TaskState::Running && self.state != TaskState::Starting {
            return Err(CsError::NotRunning);
        }
        if self.mode != LoopMode::Custom {
            return Err(CsError::NotInCustomMode);
        }
        if self.slot.remaining > 0 {
            return Err(CsError::TransmissionInProgress);
        }
        self.slot.remaining = count;
        self.slot.delay_ms = delay_ms;
        self.slot.next_due_ms = 0;
        Ok(())
    }

    /// Periodic service point; `now_ms` is a monotonic millisecond clock.
    ///
    /// Completes life-cycle transitions the ISR side has acknowledged and
    /// advances the active packet schedule.
    pub fn service(&mut self, now_ms: u64) {
        match self.state {
            TaskState::Stopped => {}
            TaskState::Starting => {
                if self.shared.is_running() {
                    self.state = TaskState::Running;
                    self.step = 0;
                    self.step_deadline_ms = now_ms;
                }
            }
            TaskState::Stopping => {
                if !self.shared.is_running() {
                    if self.dac.stop().is_err() {
                        log_warn!("BiDi DAC stop failed");
                    }
                    self.state = TaskState::Stopped;
                    log_info!("Command station stopped");
                }
            }
            TaskState::Running => match self.mode {
                LoopMode::Custom => self.service_custom(now_ms),
                _ => self.service_loop(now_ms),
            },
        }
    }

    fn service_custom(&mut self, now_ms: u64) {
        if self.slot.remaining == 0 || now_ms < self.slot.next_due_ms {
            return;
        }
        // A full queue is retried on the next service tick; the engine drains
        // one packet per frame so the slot never deadlocks.
        if self.producer.enqueue(self.slot.packet).is_ok() {
            self.slot.remaining -= 1;
            self.slot.next_due_ms = now_ms + self.slot.delay_ms as u64;
        }
    }

    fn service_loop(&mut self, now_ms: u64) {
        if now_ms < self.step_deadline_ms {
            return;
        }
        let (packet, hold_ms) = match self.mode {
            LoopMode::Basic => (self.basic_step_packet(), BASIC_STEP_MS),
            LoopMode::EmergencyStop => (self.estop_step_packet(), ESTOP_STEP_MS),
            LoopMode::SpeedRamp => (self.ramp_step_packet(), RAMP_STEP_MS),
            LoopMode::Custom => return,
        };
        // Loop mode drops the newest packet when the queue is full.
        let _ = self.producer.enqueue(packet);
        self.step = self.step.wrapping_add(1);
        self.step_deadline_ms = now_ms + hold_ms;
    }

    fn basic_step_packet(&self) -> Packet {
        let addr = TEST_LOOP_ADDRESS;
        // The builders cannot fail for these fixed in-range arguments.
        match self.step % 6 {
            0 => packet::make_function_group(addr, FunctionGroup::F0F4, 0b1_0000),
            1 => packet::make_speed_dir(addr, true, 42),
            2 => packet::make_speed_dir(addr, true, 0),
            3 => packet::make_function_group(addr, FunctionGroup::F0F4, 0),
            4 => packet::make_speed_dir(addr, false, 42),
            _ => packet::make_speed_dir(addr, false, 0),
        }
        .unwrap_or_else(|_| Packet::idle())
    }

    fn estop_step_packet(&self) -> Packet {
        let addr = TEST_LOOP_ADDRESS;
        match self.step % 3 {
            0 => packet::make_function_group(addr, FunctionGroup::F0F4, 0b1_0000)
                .unwrap_or_else(|_| Packet::idle()),
            1 => packet::make_speed_dir(addr, true, 60).unwrap_or_else(|_| Packet::idle()),
            _ => packet::make_broadcast_emergency_stop(),
        }
    }

    fn ramp_step_packet(&mut self) -> Packet {
        let p = packet::make_speed_dir(TEST_LOOP_ADDRESS, self.ramp.forward, self.ramp.value)
            .unwrap_or_else(|_| Packet::idle());
        self.ramp.advance();
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcc::PacketQueue;
    use crate::platform::mock::MockDac;

    #[test]
    fn start_stop_idempotence() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, _consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        assert!(cs.start(LoopMode::Custom, TimingConfig::nominal()).is_ok());
        assert_eq!(
            cs.start(LoopMode::Custom, TimingConfig::nominal()),
            Err(CsError::AlreadyRunning)
        );
        assert!(cs.stop().is_ok());
        assert_eq!(cs.stop(), Err(CsError::NotRunning));
    }

    #[test]
    fn invalid_config_rejected_at_start() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, _consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        let cfg = TimingConfig {
            num_preamble: 10,
            ..TimingConfig::nominal()
        };
        assert!(matches!(
            cs.start(LoopMode::Custom, cfg),
            Err(CsError::InvalidConfig(ConfigError::PreambleTooShort))
        ));
        assert_eq!(cs.state(), TaskState::Stopped);
    }

    #[test]
    fn bidi_start_programs_dac() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, _consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        let cfg = TimingConfig {
            bidi_enable: true,
            bidi_dac: 1234,
            ..TimingConfig::nominal()
        };
        cs.start(LoopMode::Custom, cfg).unwrap();
        assert!(cs.dac.is_started());
        assert_eq!(cs.dac.last_value(), Some(1234));
    }

    #[test]
    fn stop_clears_override_and_slot() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, _consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        cs.start(LoopMode::Custom, TimingConfig::nominal()).unwrap();
        cs.set_override(OverrideMap {
            mask: 0x10,
            delta_p: 10,
            delta_n: -10,
        });
        cs.load_packet(&[0x03, 0x3F, 0x2A, 0x16]).unwrap();
        cs.stop().unwrap();

        assert_eq!(cs.override_map(), OverrideMap::default());
        assert_eq!(cs.transmit_packet(1, 100), Err(CsError::NoPacketLoaded));
        assert_eq!(cs.state(), TaskState::Stopped);
    }

    #[test]
    fn transmit_requires_loaded_running_custom() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, _consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        assert_eq!(cs.transmit_packet(1, 100), Err(CsError::NoPacketLoaded));
        cs.load_packet(&[0x03, 0x3F, 0x2A, 0x16]).unwrap();
        assert_eq!(cs.transmit_packet(1, 100), Err(CsError::NotRunning));

        cs.start(LoopMode::Basic, TimingConfig::nominal()).unwrap();
        assert_eq!(cs.transmit_packet(1, 100), Err(CsError::NotInCustomMode));
        cs.stop().unwrap();
        cs.service(0);
        assert_eq!(cs.state(), TaskState::Stopped);

        cs.load_packet(&[0x03, 0x3F, 0x2A, 0x16]).unwrap();
        cs.start(LoopMode::Custom, TimingConfig::nominal()).unwrap();
        assert!(cs.transmit_packet(3, 50).is_ok());
        assert_eq!(cs.transmit_packet(1, 50), Err(CsError::TransmissionInProgress));
    }

    #[test]
    fn custom_slot_paces_transmissions() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, mut consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        cs.load_packet(&[0x03, 0x3F, 0x2A, 0x16]).unwrap();
        cs.start(LoopMode::Custom, TimingConfig::nominal()).unwrap();
        cs.transmit_packet(3, 50).unwrap();

        // The engine has not started yet; simulate its pickup.
        shared.take_start_request();
        shared.set_running(true);
        cs.service(0);
        assert_eq!(cs.state(), TaskState::Running);

        cs.service(1);
        assert!(consumer.dequeue().is_some());
        // Second transmission waits for the delay.
        cs.service(10);
        assert!(consumer.dequeue().is_none());
        cs.service(51);
        assert!(consumer.dequeue().is_some());
        cs.service(101);
        assert!(consumer.dequeue().is_some());
        // Count exhausted.
        cs.service(151);
        assert!(consumer.dequeue().is_none());
    }

    #[test]
    fn basic_loop_emits_schedule() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, mut consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        cs.start(LoopMode::Basic, TimingConfig::nominal()).unwrap();
        shared.take_start_request();
        shared.set_running(true);
        cs.service(0);

        cs.service(1);
        let first = consumer.dequeue().expect("step 0 packet");
        assert_eq!(
            first,
            packet::make_function_group(TEST_LOOP_ADDRESS, FunctionGroup::F0F4, 0b1_0000).unwrap()
        );

        // Within the hold time nothing new is produced.
        cs.service(500);
        assert!(consumer.dequeue().is_none());

        cs.service(2001);
        let second = consumer.dequeue().expect("step 1 packet");
        assert_eq!(
            second,
            packet::make_speed_dir(TEST_LOOP_ADDRESS, true, 42).unwrap()
        );
    }

    #[test]
    fn ramp_loop_walks_up_then_down() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (producer, mut consumer) = queue.split();
        let mut cs = CsController::new(&shared, producer, MockDac::new());

        cs.start(LoopMode::SpeedRamp, TimingConfig::nominal()).unwrap();
        shared.take_start_request();
        shared.set_running(true);
        cs.service(0);

        let mut now = 1;
        let mut speeds = Vec::new();
        for _ in 0..4 {
            cs.service(now);
            let p = consumer.dequeue().expect("ramp packet");
            speeds.push(p.bytes()[2]);
            now += RAMP_STEP_MS;
        }
        // Codes: stop, then steps 1..3 encoded as 2..4, all forward.
        assert_eq!(speeds, vec![0x80, 0x80 | 2, 0x80 | 3, 0x80 | 4]);
    }
}
