//! RPC method handlers
//!
//! The method set the host test orchestrator depends on. Every handler
//! validates its inputs before touching the stand and answers with the
//! response shapes and error strings the acceptance scripts match on.

use alloc::format;
use serde_json::{json, Value};

use crate::analog::{SampleSpec, MAX_SAMPLES, MAX_SAMPLE_DELAY_MS, MIN_SAMPLES};
use crate::app::TestStand;
use crate::dcc::MAX_PACKET_SIZE;
use crate::decoder::{DecoderCallbacks, DecoderError};
use crate::parameters::ParamError;
use crate::platform::error::AdcError;
use crate::platform::traits::gpio::{IO_BANK_FIRST_PIN, IO_BANK_LAST_PIN};
use crate::platform::traits::{Board, DateTime, GpioBankInterface, RtcInterface};
use crate::platform::PlatformError;
use crate::station::{ConfigError, CsError, LoopMode};

use super::server::{error_response, ok_response, RpcServer};

/// Upper bound on custom packet repetitions per transmit request.
const MAX_TRANSMIT_COUNT: u64 = 1000;
/// Upper bound on the inter-packet delay in milliseconds.
const MAX_TRANSMIT_DELAY_MS: u64 = 60_000;
/// Upper bound on the magnitude of an override delta in microseconds.
const MAX_OVERRIDE_DELTA_US: i64 = 10_000;

/// Register the complete method table on `server`.
pub fn register_all<'q, B: Board, C: DecoderCallbacks>(
    server: &mut RpcServer<TestStand<'q, B, C>>,
) {
    server.register("echo", echo);
    server.register("command_station_start", command_station_start);
    server.register("command_station_stop", command_station_stop);
    server.register("command_station_load_packet", command_station_load_packet);
    server.register(
        "command_station_transmit_packet",
        command_station_transmit_packet,
    );
    server.register("command_station_params", command_station_params);
    server.register("command_station_get_params", command_station_get_params);
    server.register(
        "command_station_packet_override",
        command_station_packet_override,
    );
    server.register(
        "command_station_packet_get_override",
        command_station_packet_get_override,
    );
    server.register(
        "command_station_packet_reset_override",
        command_station_packet_reset_override,
    );
    server.register("decoder_start", decoder_start);
    server.register("decoder_stop", decoder_stop);
    server.register("parameters_save", parameters_save);
    server.register("parameters_restore", parameters_restore);
    server.register("parameters_factory_reset", parameters_factory_reset);
    server.register("get_voltage_feedback_mv", get_voltage_feedback_mv);
    server.register("get_current_feedback_ma", get_current_feedback_ma);
    server.register("get_gpio_input", get_gpio_input);
    server.register("get_gpio_inputs", get_gpio_inputs);
    server.register("configure_gpio_output", configure_gpio_output);
    server.register("set_gpio_output", set_gpio_output);
    server.register("get_rtc_datetime", get_rtc_datetime);
    server.register("set_rtc_datetime", set_rtc_datetime);
    server.register("system_reboot", system_reboot);
}

fn cs_error(err: CsError) -> Value {
    match err {
        CsError::AlreadyRunning => error_response("Command station is already running"),
        CsError::NotRunning => error_response("Command station is not running"),
        CsError::InvalidConfig(ConfigError::PreambleTooShort) => {
            error_response("preamble_bits below NMRA minimum of 14")
        }
        CsError::InvalidConfig(ConfigError::ZeroBitDuration) => {
            error_response("bit durations must be non-zero")
        }
        CsError::InvalidConfig(ConfigError::DacOutOfRange) => {
            error_response("bidi_dac must be between 0 and 4095")
        }
        CsError::InvalidPacket(_) => error_response("invalid packet"),
        CsError::NoPacketLoaded => error_response("No packet loaded"),
        CsError::TransmissionInProgress => {
            error_response("Packet transmission already in progress")
        }
        CsError::NotInCustomMode => error_response("Command station is not in custom packet mode"),
        CsError::Hardware(_) => error_response("Peripheral failure"),
    }
}

fn param_error(err: ParamError) -> Value {
    match err {
        ParamError::NotInitialized => error_response("Parameter manager not initialized"),
        ParamError::MagicMismatch => error_response("Magic mismatch"),
        ParamError::VersionMismatch => error_response("Version mismatch"),
        ParamError::SizeMismatch => error_response("Size mismatch"),
        ParamError::CrcMismatch => error_response("CRC mismatch"),
        ParamError::Flash(_) => error_response("Flash access failed"),
    }
}

fn echo<B: Board, C: DecoderCallbacks>(_stand: &mut TestStand<'_, B, C>, params: &Value) -> Value {
    json!({ "status": "ok", "echo": params })
}

fn command_station_start<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    // Older scripts pass a boolean; map it onto the loop selector.
    let loop_index = match params.get("loop") {
        None => 0,
        Some(Value::Bool(b)) => *b as u64,
        Some(v) => match v.as_u64() {
            Some(n) if n <= 3 => n,
            _ => return error_response("loop must be an integer between 0 and 3"),
        },
    };
    let mode = match LoopMode::from_index(loop_index as u8) {
        Some(mode) => mode,
        None => return error_response("loop must be an integer between 0 and 3"),
    };

    let cfg = stand.params.timing_config();
    match stand.cs.start(mode, cfg) {
        Ok(()) => json!({
            "status": "ok",
            "message": "Command station started",
            "loop": loop_index,
        }),
        Err(err) => cs_error(err),
    }
}

fn command_station_stop<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.cs.stop() {
        Ok(()) => ok_response("Command station stopped"),
        Err(err) => cs_error(err),
    }
}

fn command_station_load_packet<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let Some(list) = params.get("bytes").and_then(Value::as_array) else {
        return error_response("bytes must be an array");
    };
    if list.is_empty() {
        return error_response("packet must not be empty");
    }
    if list.len() > MAX_PACKET_SIZE {
        return error_response("packet too long (max 18 bytes)");
    }

    let mut bytes = [0u8; MAX_PACKET_SIZE];
    for (i, item) in list.iter().enumerate() {
        match item.as_u64() {
            Some(b) if b <= 255 => bytes[i] = b as u8,
            _ => return error_response("all bytes must be unsigned integers (0-255)"),
        }
    }

    match stand.cs.load_packet(&bytes[..list.len()]) {
        Ok(length) => json!({
            "status": "ok",
            "message": "Packet loaded successfully",
            "length": length,
        }),
        Err(err) => cs_error(err),
    }
}

fn command_station_transmit_packet<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let count = match params.get("count") {
        None => 1,
        Some(v) => match v.as_u64() {
            Some(n) if (1..=MAX_TRANSMIT_COUNT).contains(&n) => n,
            _ => return error_response("count must be between 1 and 1000"),
        },
    };
    let delay_ms = match params.get("delay_ms") {
        None => 100,
        Some(v) => match v.as_u64() {
            Some(n) if n <= MAX_TRANSMIT_DELAY_MS => n,
            _ => return error_response("delay_ms must be between 0 and 60000"),
        },
    };

    match stand.cs.transmit_packet(count as u32, delay_ms as u32) {
        Ok(()) => json!({
            "status": "ok",
            "message": "Packet transmission armed",
            "count": count,
            "delay_ms": delay_ms,
        }),
        Err(err) => cs_error(err),
    }
}

fn command_station_params<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    // Integer-valued keys with their accepted ranges.
    const INT_KEYS: [(&str, u64); 5] = [
        ("preamble_bits", 255),
        ("bit1_duration", 255),
        ("bit0_duration", 255),
        ("bidi_dac", 4095),
        ("track_voltage", 65_535),
    ];
    const BOOL_KEYS: [&str; 2] = ["bidi_enable", "trigger_first_bit"];

    for (key, max) in INT_KEYS {
        if let Some(v) = params.get(key) {
            match v.as_u64() {
                Some(n) if n <= max => {}
                Some(_) => return error_response(&format!("{} out of range (0-{})", key, max)),
                None => return error_response(&format!("{} must be a positive integer", key)),
            }
        }
    }
    for key in BOOL_KEYS {
        if let Some(v) = params.get(key) {
            if !v.is_boolean() {
                return error_response(&format!("{} must be a boolean", key));
            }
        }
    }

    if let Some(n) = params.get("preamble_bits").and_then(Value::as_u64) {
        stand.params.set_preamble_bits(n as u8);
    }
    if let Some(n) = params.get("bit1_duration").and_then(Value::as_u64) {
        stand.params.set_bit1_duration_us(n as u8);
    }
    if let Some(n) = params.get("bit0_duration").and_then(Value::as_u64) {
        stand.params.set_bit0_duration_us(n as u8);
    }
    if let Some(n) = params.get("bidi_dac").and_then(Value::as_u64) {
        stand.params.set_bidi_dac(n as u16);
    }
    if let Some(n) = params.get("track_voltage").and_then(Value::as_u64) {
        stand.params.set_track_voltage_mv(n as u16);
    }
    if let Some(b) = params.get("bidi_enable").and_then(Value::as_bool) {
        stand.params.set_bidi_enable(b);
    }
    if let Some(b) = params.get("trigger_first_bit").and_then(Value::as_bool) {
        stand.params.set_trigger_first_bit(b);
    }

    // A running station picks the new configuration up at the next
    // inter-packet boundary.
    if let Err(err) = stand.cs.publish_config(stand.params.timing_config()) {
        return cs_error(err);
    }
    ok_response("Command station parameters updated")
}

fn command_station_get_params<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    let data = stand.params.data();
    let map = stand.cs.override_map();
    json!({
        "status": "ok",
        "parameters": {
            "track_voltage": data.track_voltage_mv,
            "preamble_bits": data.preamble_bits,
            "bit1_duration": data.bit1_duration_us,
            "bit0_duration": data.bit0_duration_us,
            "bidi_enable": data.bidi_enable,
            "bidi_dac": data.bidi_dac,
            "trigger_first_bit": data.trigger_first_bit,
            "zerobit_override_mask": format!("0x{:016X}", map.mask),
            "zerobit_deltaP": map.delta_p,
            "zerobit_deltaN": map.delta_n,
        },
    })
}

fn parse_override_mask(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(s);
            u64::from_str_radix(digits, 16).ok()
        }
        _ => value.as_u64(),
    }
}

fn parse_override_delta(value: &Value) -> Option<i32> {
    let n = value.as_i64()?;
    if n.abs() > MAX_OVERRIDE_DELTA_US {
        return None;
    }
    Some(n as i32)
}

fn command_station_packet_override<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    // Only the supplied keys change; the rest keep their current values.
    let mut map = stand.cs.override_map();

    if let Some(v) = params.get("zerobit_override_mask") {
        match parse_override_mask(v) {
            Some(mask) => map.mask = mask,
            None => {
                return error_response("zerobit_override_mask must be a hex string or integer")
            }
        }
    }
    if let Some(v) = params.get("zerobit_deltaP") {
        match parse_override_delta(v) {
            Some(delta) => map.delta_p = delta,
            None => return error_response("zerobit_deltaP out of range (-10000 to 10000)"),
        }
    }
    if let Some(v) = params.get("zerobit_deltaN") {
        match parse_override_delta(v) {
            Some(delta) => map.delta_n = delta,
            None => return error_response("zerobit_deltaN out of range (-10000 to 10000)"),
        }
    }

    stand.cs.set_override(map);
    ok_response("Packet override parameters updated")
}

fn command_station_packet_get_override<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    let map = stand.cs.override_map();
    json!({
        "status": "ok",
        "zerobit_override_mask": format!("0x{:016X}", map.mask),
        "zerobit_override_mask_decimal": map.mask,
        "zerobit_deltaP": map.delta_p,
        "zerobit_deltaN": map.delta_n,
    })
}

fn command_station_packet_reset_override<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    stand.cs.reset_override();
    ok_response("Packet override parameters reset to 0")
}

fn decoder_start<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.decoder.start() {
        Ok(()) => ok_response("Decoder started"),
        Err(DecoderError::AlreadyRunning) => error_response("Decoder is already running"),
        Err(DecoderError::NotRunning) => error_response("Decoder is not running"),
    }
}

fn decoder_stop<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.decoder.stop() {
        Ok(()) => ok_response("Decoder stopped"),
        Err(DecoderError::NotRunning) => error_response("Decoder is not running"),
        Err(DecoderError::AlreadyRunning) => error_response("Decoder is already running"),
    }
}

fn parameters_save<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.params.save() {
        Ok(()) => ok_response("Parameters saved to flash"),
        Err(err) => param_error(err),
    }
}

fn parameters_restore<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.params.restore() {
        Ok(()) => {
            if let Err(err) = stand.cs.publish_config(stand.params.timing_config()) {
                return cs_error(err);
            }
            ok_response("Parameters restored from flash")
        }
        Err(err) => param_error(err),
    }
}

fn parameters_factory_reset<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.params.factory_reset() {
        Ok(()) => {
            if let Err(err) = stand.cs.publish_config(stand.params.timing_config()) {
                return cs_error(err);
            }
            ok_response("Factory reset completed - all parameters restored to defaults")
        }
        Err(err) => param_error(err),
    }
}

/// Parse the optional averaging arguments shared by both feedback methods.
fn sample_spec(params: &Value) -> Result<(SampleSpec, bool), Value> {
    let num_samples = params.get("num_samples");
    let delay = params.get("sample_delay_ms");

    let n = match num_samples {
        None => MIN_SAMPLES as u64,
        Some(v) => match v.as_u64() {
            Some(n) if (MIN_SAMPLES as u64..=MAX_SAMPLES as u64).contains(&n) => n,
            _ => return Err(error_response("num_samples must be between 1 and 16")),
        },
    };
    let d = match delay {
        None => 0,
        Some(v) => match v.as_u64() {
            Some(d) if d <= MAX_SAMPLE_DELAY_MS as u64 => d,
            _ => return Err(error_response("sample_delay_ms must be between 0 and 1000")),
        },
    };

    let averaged = num_samples.is_some() && delay.is_some();
    Ok((
        SampleSpec {
            num_samples: n as u8,
            sample_delay_ms: d as u16,
        },
        averaged,
    ))
}

fn analog_error(err: PlatformError) -> Value {
    match err {
        PlatformError::Adc(AdcError::Busy) => error_response("ADC busy"),
        _ => error_response("ADC read failed"),
    }
}

fn get_voltage_feedback_mv<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let (spec, averaged) = match sample_spec(params) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };
    match stand.analog.read_voltage_mv(spec) {
        Ok(mv) if averaged => json!({
            "status": "ok",
            "voltage_mv": mv,
            "averaged": true,
            "num_samples": spec.num_samples,
            "sample_delay_ms": spec.sample_delay_ms,
        }),
        Ok(mv) => json!({ "status": "ok", "voltage_mv": mv }),
        Err(err) => analog_error(err),
    }
}

fn get_current_feedback_ma<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let (spec, averaged) = match sample_spec(params) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };
    match stand.analog.read_current_ma(spec) {
        Ok(ma) if averaged => json!({
            "status": "ok",
            "current_ma": ma,
            "averaged": true,
            "num_samples": spec.num_samples,
            "sample_delay_ms": spec.sample_delay_ms,
        }),
        Ok(ma) => json!({ "status": "ok", "current_ma": ma }),
        Err(err) => analog_error(err),
    }
}

fn parse_pin(params: &Value) -> Result<u8, Value> {
    match params.get("pin").and_then(Value::as_u64) {
        Some(pin) if (IO_BANK_FIRST_PIN as u64..=IO_BANK_LAST_PIN as u64).contains(&pin) => {
            Ok(pin as u8)
        }
        _ => Err(error_response("pin must be between 1 and 16")),
    }
}

fn parse_state(params: &Value) -> Result<bool, Value> {
    match params.get("state").and_then(Value::as_u64) {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(error_response("state must be 0 or 1")),
    }
}

fn get_gpio_input<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let pin = match parse_pin(params) {
        Ok(pin) => pin,
        Err(resp) => return resp,
    };
    match stand.gpio.read_input(pin) {
        Ok(high) => json!({ "status": "ok", "pin": pin, "value": high as u8 }),
        Err(_) => error_response("pin must be between 1 and 16"),
    }
}

fn get_gpio_inputs<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    json!({ "status": "ok", "value": stand.gpio.read_all() })
}

fn configure_gpio_output<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let pin = match parse_pin(params) {
        Ok(pin) => pin,
        Err(resp) => return resp,
    };
    let state = match parse_state(params) {
        Ok(state) => state,
        Err(resp) => return resp,
    };
    match stand.gpio.configure_output(pin, state) {
        Ok(()) => json!({ "status": "ok", "pin": pin, "state": state as u8 }),
        Err(_) => error_response("pin must be between 1 and 16"),
    }
}

fn set_gpio_output<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let pin = match parse_pin(params) {
        Ok(pin) => pin,
        Err(resp) => return resp,
    };
    let state = match parse_state(params) {
        Ok(state) => state,
        Err(resp) => return resp,
    };
    match stand.gpio.set_output(pin, state) {
        Ok(()) => json!({ "status": "ok", "pin": pin, "state": state as u8 }),
        Err(_) => error_response("pin is not configured as an output"),
    }
}

fn get_rtc_datetime<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    match stand.rtc.datetime() {
        Ok(dt) => json!({
            "status": "ok",
            "datetime": {
                "year": dt.year,
                "month": dt.month,
                "day": dt.day,
                "hours": dt.hours,
                "minutes": dt.minutes,
                "seconds": dt.seconds,
            },
        }),
        Err(_) => error_response("RTC read failed"),
    }
}

#[derive(serde::Deserialize)]
struct RtcParams {
    year: u16,
    month: u8,
    day: u8,
    hours: u8,
    minutes: u8,
    seconds: u8,
}

fn set_rtc_datetime<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    params: &Value,
) -> Value {
    let Ok(p) = serde_json::from_value::<RtcParams>(params.clone()) else {
        return error_response("year, month, day, hours, minutes and seconds are required");
    };
    let dt = DateTime {
        year: p.year,
        month: p.month,
        day: p.day,
        hours: p.hours,
        minutes: p.minutes,
        seconds: p.seconds,
    };
    if !dt.is_valid() {
        return error_response("Invalid date/time");
    }
    match stand.rtc.set_datetime(&dt) {
        Ok(()) => ok_response("RTC updated"),
        Err(_) => error_response("Invalid date/time"),
    }
}

fn system_reboot<B: Board, C: DecoderCallbacks>(
    stand: &mut TestStand<'_, B, C>,
    _params: &Value,
) -> Value {
    // The response must reach the host before the reset; the service loop
    // acts on the flag after writing it out.
    stand.reboot_pending = true;
    ok_response("System rebooting...")
}
