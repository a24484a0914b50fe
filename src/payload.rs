//! Form-encoded MQTT payload consumed by the home-infra collector.
//!
//! ```text
//! device_id=<guid>&<p>absolute_l=<n>&<p>relative_l=<n>&<p>flow_mlps=<n>
//!     &dbg_uptime=<ms>&dbg_version=<v>
//! ```
//!
//! (one line on the wire) where `<p>` is the sensor prefix (`w_` water, `g_` gas) and an unknown
//! absolute reading is sent as `-1`.

use crate::publish::Reading;
use std::fmt::Write;

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn encode(device_guid: &str, prefix: &str, reading: &Reading) -> String {
    let mut payload = String::with_capacity(160);

    // Writing into a String cannot fail
    let _ = write!(payload, "device_id={}", device_guid);
    match reading.absolute_liters {
        Some(absolute) => {
            let _ = write!(payload, "&{}absolute_l={}", prefix, absolute);
        }
        None => {
            let _ = write!(payload, "&{}absolute_l=-1", prefix);
        }
    }
    let _ = write!(
        payload,
        "&{}relative_l={}&{}flow_mlps={}&dbg_uptime={}&dbg_version={}",
        prefix, reading.liters, prefix, reading.flow_mlps, reading.uptime_ms, FIRMWARE_VERSION
    );

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(absolute_liters: Option<u64>) -> Reading {
        Reading {
            count: 12,
            liters: 120,
            absolute_liters,
            flow_mlps: 33,
            uptime_ms: 4567,
        }
    }

    #[test]
    fn unknown_absolute_reading_is_sent_as_minus_one() {
        assert_eq!(
            encode("EUI48:11:22:33:44:55:66", "g_", &reading(None)),
            format!(
                "device_id=EUI48:11:22:33:44:55:66&g_absolute_l=-1&g_relative_l=120\
                 &g_flow_mlps=33&dbg_uptime=4567&dbg_version={}",
                FIRMWARE_VERSION
            )
        );
    }

    #[test]
    fn dial_reading_is_sent_when_known() {
        let payload = encode("dev", "w_", &reading(Some(100_120)));
        assert!(payload.starts_with("device_id=dev&w_absolute_l=100120&w_relative_l=120&"));
    }
}
