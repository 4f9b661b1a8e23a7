//! Decoder controller
//!
//! Task-context half of the decoder: life-cycle, the CV model, packet
//! interpretation and the BiDi reply. Packets arrive from the capture
//! interrupt through an spsc consumer; interpretation fires the capability
//! hooks installed at construction time.

use crate::dcc::bidi::{self, Datagram};
use crate::dcc::{Packet, PacketConsumer};
use crate::platform::traits::{GpioInterface, UartInterface};
use crate::sync::TaskState;
use crate::{log_info, log_warn};

use super::{DecoderCallbacks, DecoderShared};

/// Number of configuration variables the decoder models.
pub const CV_TABLE_SIZE: usize = 1024;

/// Decoder controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    /// Start requested while already running
    AlreadyRunning,
    /// Stop requested while not running
    NotRunning,
}

/// Default capability set: reports every event to the logging surface.
#[derive(Debug, Default)]
pub struct LoggingCallbacks;

impl DecoderCallbacks for LoggingCallbacks {
    fn on_direction(&mut self, addr: u16, forward: bool) {
        log_info!("Decoder: addr {} direction {}", addr, if forward { "forward" } else { "reverse" });
    }

    fn on_speed(&mut self, addr: u16, step: u8) {
        if step > 0 {
            log_info!("Decoder: addr {} speed step {}", addr, step);
        } else {
            log_info!("Decoder: addr {} stop", addr);
        }
    }

    fn on_function(&mut self, addr: u16, mask: u32, state: u32) {
        log_info!("Decoder: addr {} functions mask {} state {}", addr, mask, state);
    }

    fn on_cv_read(&mut self, cv: u16, value: u8) {
        log_info!("Decoder: rd cv {} = {}", cv, value);
    }

    fn on_cv_write(&mut self, cv: u16, value: u8) {
        log_info!("Decoder: wr cv {} = {}", cv, value);
    }

    fn on_bidi_tx(&mut self, datagram: &Datagram) {
        log_info!("Decoder: BiDi TX {} bytes", datagram.len());
    }
}

/// Decoder controller (task context).
///
/// `quiet_sense` reads the command station's BR_ENABLE line as a proxy for a
/// quiet track (low while the booster is cut out).
// TODO: replace the BR_ENABLE proxy with real no-voltage-on-track detection;
// an external command station does not expose this line.
pub struct DecoderController<'q, U, Q, C>
where
    U: UartInterface,
    Q: GpioInterface,
    C: DecoderCallbacks,
{
    shared: &'q DecoderShared,
    packets: PacketConsumer<'q>,
    bidi_uart: U,
    quiet_sense: Q,
    callbacks: C,
    state: TaskState,
    cvs: [u8; CV_TABLE_SIZE],
    last_packet: Option<Packet>,
    last_bidi: Option<Datagram>,
    last_speed: u8,
}

impl<'q, U, Q, C> DecoderController<'q, U, Q, C>
where
    U: UartInterface,
    Q: GpioInterface,
    C: DecoderCallbacks,
{
    /// Create a stopped controller. CV 1 (primary address) and CV 8
    /// (manufacturer) are seeded so acceptance scripts have something to
    /// verify against.
    pub fn new(
        shared: &'q DecoderShared,
        packets: PacketConsumer<'q>,
        bidi_uart: U,
        quiet_sense: Q,
        callbacks: C,
    ) -> Self {
        let mut cvs = [0u8; CV_TABLE_SIZE];
        cvs[0] = 3; // CV 1: primary address
        cvs[7] = 13; // CV 8: manufacturer ID (public domain / DIY)
        Self {
            shared,
            packets,
            bidi_uart,
            quiet_sense,
            callbacks,
            state: TaskState::Stopped,
            cvs,
            last_packet: None,
            last_bidi: None,
            last_speed: 0,
        }
    }

    /// Current life-cycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// True between a successful start and stop.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Last packet delivered by the capture unit.
    pub fn last_packet(&self) -> Option<&Packet> {
        self.last_packet.as_ref()
    }

    /// Last BiDi datagram handed to the UART.
    pub fn last_bidi_tx(&self) -> Option<&Datagram> {
        self.last_bidi.as_ref()
    }

    /// The installed capability set.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Mutable access to the installed capability set.
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Read a CV (1-based). Returns zero for out-of-range numbers, matching
    /// decoder hardware that ignores unknown CVs.
    pub fn read_cv(&self, cv: u16) -> u8 {
        if cv == 0 || cv as usize > CV_TABLE_SIZE {
            return 0;
        }
        self.cvs[cv as usize - 1]
    }

    /// Start packet capture. The capture interrupt is enabled by the glue
    /// once this returns.
    pub fn start(&mut self) -> Result<(), DecoderError> {
        if self.state.is_active() {
            return Err(DecoderError::AlreadyRunning);
        }
        self.shared.set_running(true);
        self.state = TaskState::Running;
        log_info!("Decoder started");
        Ok(())
    }

    /// Stop packet capture and drop anything still queued.
    pub fn stop(&mut self) -> Result<(), DecoderError> {
        if !self.state.is_active() {
            return Err(DecoderError::NotRunning);
        }
        self.shared.set_running(false);
        while self.packets.dequeue().is_some() {}
        self.shared.take_packet_end();
        self.state = TaskState::Stopped;
        log_info!("Decoder stopped");
        Ok(())
    }

    /// Periodic service point: drain delivered packets, interpret them, and
    /// answer in the BiDi window when the track is quiet. Returns the number
    /// of packets processed.
    pub fn service(&mut self) -> usize {
        if self.state != TaskState::Running {
            return 0;
        }
        let mut processed = 0;
        while let Some(packet) = self.packets.dequeue() {
            self.last_packet = Some(packet);
            self.interpret(&packet);
            processed += 1;
        }
        if self.shared.take_packet_end() {
            self.try_bidi_reply();
        }
        processed
    }

    /// Transmit a BiDi reply if the track is quiet.
    ///
    /// BR_ENABLE low means the command station is holding the cutout.
    fn try_bidi_reply(&mut self) {
        if self.quiet_sense.read() {
            return;
        }
        let datagram = bidi::dyn_datagram(self.last_speed, 0);
        if self.bidi_uart.write(datagram.bytes()).is_err() {
            log_warn!("BiDi UART write failed");
            return;
        }
        self.last_bidi = Some(datagram);
        self.callbacks.on_bidi_tx(&datagram);
    }

    fn interpret(&mut self, packet: &Packet) {
        let bytes = packet.bytes();
        // Idle packet: no consumer action.
        if bytes[0] == 0xFF {
            return;
        }

        let (addr, instr_at) = match bytes[0] {
            0 => (0u16, 1usize),
            1..=127 => (bytes[0] as u16, 1),
            192..=231 => {
                if bytes.len() < 4 {
                    return;
                }
                ((((bytes[0] & 0x3F) as u16) << 8) | bytes[1] as u16, 2)
            }
            // Accessory decoder space; out of scope.
            _ => return,
        };

        // Address, at least one instruction octet, XOR trailer.
        if bytes.len() < instr_at + 2 {
            return;
        }
        let instr = bytes[instr_at];

        match instr >> 5 {
            // Advanced operations: 128-step speed
            0b001 => {
                if instr == 0b0011_1111 && bytes.len() > instr_at + 2 {
                    let data = bytes[instr_at + 1];
                    let forward = data & 0x80 != 0;
                    let code = data & 0x7F;
                    // Codes 0 and 1 are stop and e-stop, 2..=127 are steps.
                    let step = code.saturating_sub(1);
                    self.last_speed = step;
                    self.callbacks.on_direction(addr, forward);
                    self.callbacks.on_speed(addr, step);
                }
            }
            // Basic speed, reverse / forward
            0b010 | 0b011 => {
                let forward = instr & 0b0010_0000 != 0;
                let code = ((instr & 0x0F) << 1) | ((instr >> 4) & 1);
                // Codes 0..=1 stop, 2..=3 emergency stop, 4..=31 steps 1..=28.
                let step = code.saturating_sub(3);
                self.last_speed = step;
                self.callbacks.on_direction(addr, forward);
                self.callbacks.on_speed(addr, step);
            }
            // Function group one: FL/F0 and F1-F4
            0b100 => {
                let state = (((instr >> 4) & 1) as u32) | (((instr & 0x0F) as u32) << 1);
                self.callbacks.on_function(addr, 0x1F, state);
            }
            // Function group two: F5-F8 or F9-F12
            0b101 => {
                if instr & 0b0001_0000 != 0 {
                    let state = ((instr & 0x0F) as u32) << 5;
                    self.callbacks.on_function(addr, 0x1E0, state);
                } else {
                    let state = ((instr & 0x0F) as u32) << 9;
                    self.callbacks.on_function(addr, 0x1E00, state);
                }
            }
            // Configuration variable access, short form
            0b111 => {
                if bytes.len() <= instr_at + 3 {
                    return;
                }
                let cv = ((((instr & 0x03) as u16) << 8) | bytes[instr_at + 1] as u16) + 1;
                let value = bytes[instr_at + 2];
                match (instr >> 2) & 0x03 {
                    0b11 => self.write_cv(cv, value),
                    0b01 => {
                        let current = self.read_cv(cv);
                        self.callbacks.on_cv_read(cv, current);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn write_cv(&mut self, cv: u16, value: u8) {
        if cv == 0 || cv as usize > CV_TABLE_SIZE {
            return;
        }
        self.cvs[cv as usize - 1] = value;
        self.callbacks.on_cv_write(cv, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcc::{packet, PacketQueue};
    use crate::platform::mock::{MockGpio, MockUart};

    #[derive(Default)]
    struct RecordingCallbacks {
        speeds: Vec<(u16, u8)>,
        directions: Vec<(u16, bool)>,
        functions: Vec<(u16, u32, u32)>,
        cv_writes: Vec<(u16, u8)>,
        cv_reads: Vec<(u16, u8)>,
        bidi: usize,
    }

    impl DecoderCallbacks for RecordingCallbacks {
        fn on_direction(&mut self, addr: u16, forward: bool) {
            self.directions.push((addr, forward));
        }
        fn on_speed(&mut self, addr: u16, step: u8) {
            self.speeds.push((addr, step));
        }
        fn on_function(&mut self, addr: u16, mask: u32, state: u32) {
            self.functions.push((addr, mask, state));
        }
        fn on_cv_read(&mut self, cv: u16, value: u8) {
            self.cv_reads.push((cv, value));
        }
        fn on_cv_write(&mut self, cv: u16, value: u8) {
            self.cv_writes.push((cv, value));
        }
        fn on_bidi_tx(&mut self, _datagram: &Datagram) {
            self.bidi += 1;
        }
    }

    type TestController<'q> = DecoderController<'q, MockUart, MockGpio, RecordingCallbacks>;

    fn controller<'q>(
        shared: &'q DecoderShared,
        queue: &'q mut PacketQueue,
    ) -> (TestController<'q>, crate::dcc::PacketProducer<'q>) {
        let (producer, consumer) = queue.split();
        let ctl = DecoderController::new(
            shared,
            consumer,
            MockUart::new(),
            MockGpio::new_input(),
            RecordingCallbacks::default(),
        );
        (ctl, producer)
    }

    #[test]
    fn start_stop_idempotence() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, _producer) = controller(&shared, &mut queue);

        assert!(dec.start().is_ok());
        assert_eq!(dec.start(), Err(DecoderError::AlreadyRunning));
        assert!(dec.stop().is_ok());
        assert_eq!(dec.stop(), Err(DecoderError::NotRunning));
    }

    #[test]
    fn speed_packet_fires_hooks() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        producer
            .enqueue(packet::make_speed(3, 42).unwrap())
            .unwrap();
        assert_eq!(dec.service(), 1);
        assert_eq!(dec.callbacks.speeds, vec![(3, 42)]);
        assert_eq!(dec.callbacks.directions, vec![(3, true)]);
        assert!(dec.last_packet().is_some());
    }

    #[test]
    fn extended_address_decoded() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        producer
            .enqueue(packet::make_speed(2000, -10).unwrap())
            .unwrap();
        dec.service();
        assert_eq!(dec.callbacks.speeds, vec![(2000, 10)]);
        assert_eq!(dec.callbacks.directions, vec![(2000, false)]);
    }

    #[test]
    fn function_group_mapping() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        // F0 on: instruction bit 4, function bit 0.
        producer
            .enqueue(packet::make_function_group(3, packet::FunctionGroup::F0F4, 0b1_0000).unwrap())
            .unwrap();
        // F5 on: group two, low nibble bit 0, function bit 5.
        producer
            .enqueue(packet::make_function_group(3, packet::FunctionGroup::F5F8, 0b0001).unwrap())
            .unwrap();
        dec.service();
        assert_eq!(
            dec.callbacks.functions,
            vec![(3, 0x1F, 0x01), (3, 0x1E0, 0x20)]
        );
    }

    #[test]
    fn cv_write_and_verify() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        producer
            .enqueue(packet::make_cv_write(3, 17, 0xAB).unwrap())
            .unwrap();
        producer
            .enqueue(packet::make_cv_verify(3, 8, 13).unwrap())
            .unwrap();
        dec.service();

        assert_eq!(dec.read_cv(17), 0xAB);
        assert_eq!(dec.callbacks.cv_writes, vec![(17, 0xAB)]);
        assert_eq!(dec.callbacks.cv_reads, vec![(8, 13)]);
    }

    #[test]
    fn broadcast_emergency_stop_reported() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        producer
            .enqueue(packet::make_broadcast_emergency_stop())
            .unwrap();
        dec.service();
        // Speed code 2 (e-stop) collapses to step 0.
        assert_eq!(dec.callbacks.speeds, vec![(0, 0)]);
    }

    #[test]
    fn bidi_reply_only_when_track_quiet() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        // BR_ENABLE high: booster driving, no reply.
        dec.quiet_sense.set_input_state(true);
        producer.enqueue(packet::make_speed(3, 5).unwrap()).unwrap();
        shared.raise_packet_end();
        dec.service();
        assert!(dec.last_bidi_tx().is_none());

        // BR_ENABLE low: cutout window, reply goes out.
        dec.quiet_sense.set_input_state(false);
        producer.enqueue(packet::make_speed(3, 7).unwrap()).unwrap();
        shared.raise_packet_end();
        dec.service();
        let dg = dec.last_bidi_tx().expect("datagram sent");
        assert_eq!(dec.bidi_uart.tx_data(), dg.bytes());
        assert_eq!(dec.callbacks.bidi, 1);
    }

    #[test]
    fn idle_packets_ignored() {
        let shared = DecoderShared::new();
        let mut queue = PacketQueue::new();
        let (mut dec, mut producer) = controller(&shared, &mut queue);
        dec.start().unwrap();

        producer.enqueue(Packet::idle()).unwrap();
        assert_eq!(dec.service(), 1);
        assert!(dec.callbacks.speeds.is_empty());
        assert!(dec.callbacks.functions.is_empty());
    }
}
