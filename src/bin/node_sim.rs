/// Bench simulator for a sensor node.
///
/// Runs the real acquisition loop and uplink against simulated
/// peripherals, so a gateway can be exercised without hardware.
///
/// Usage: `rivermon_node_sim [config.toml] [--surge]`
///
/// With `--surge` the simulated water level climbs 4 cm per cycle, which
/// trips the dry-weather flood threshold once the window has filled.

use std::env;
use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use rivermon_service::config::{Config, DEFAULT_CONFIG_PATH};
use rivermon_service::logging::{self, init_logger, Component};
use rivermon_service::model::Tick;
use rivermon_service::node::convert::{echo_to_distance_cm, ECHO_US_PER_CM};
use rivermon_service::node::uplink::HttpUplink;
use rivermon_service::node::{
    self, AnalogInput, ClimateReading, ClimateSensor, Clock, DistanceSensor, GpsSource, Hardware,
    SensorNode,
};

struct SimRanger {
    distance_cm: f64,
    step_cm: f64,
}

impl DistanceSensor for SimRanger {
    fn distance_cm(&mut self) -> f64 {
        // Round-trip echo time for the simulated water surface.
        let pulse_us = (self.distance_cm * 2.0 * ECHO_US_PER_CM).round() as u32;
        self.distance_cm = (self.distance_cm - self.step_cm).max(10.0);
        echo_to_distance_cm(Some(pulse_us))
    }
}

struct SimClimate;

impl ClimateSensor for SimClimate {
    fn read(&mut self) -> Option<ClimateReading> {
        Some(ClimateReading {
            temperature: 29.5,
            humidity: 74.0,
        })
    }
}

struct FixedAdc(u16);

impl AnalogInput for FixedAdc {
    fn read_raw(&mut self) -> u16 {
        self.0
    }
}

/// Emits one fix at Keputih, then goes quiet; the node keeps the last fix.
struct SimGps {
    sent: bool,
}

impl GpsSource for SimGps {
    fn read_available(&mut self) -> Option<String> {
        if self.sent {
            return None;
        }
        self.sent = true;
        Some("$GPGGA,040000,0717.436,S,11247.760,E,1,07,1.1,5.0,M,,M,,*00\r\n".to_string())
    }
}

struct UptimeClock(Instant);

impl Clock for UptimeClock {
    fn now(&self) -> Tick {
        // Truncation to 32 bits matches the node's wrapping uptime counter.
        Tick(self.0.elapsed().as_millis() as u32)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let surge = args.iter().any(|a| a == "--surge");
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Config::load(&path)?;
    init_logger(
        config.logging.min_level()?,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );

    let node_config = &config.node;
    let mut uplink = HttpUplink::new(
        node_config.gateway_url.as_str(),
        Duration::from_secs(node_config.request_timeout_secs),
    )?;
    logging::info(
        Component::Node,
        Some(&node_config.node_id),
        &format!("Posting to {}{}", uplink.url(), if surge { " (surge)" } else { "" }),
    );

    let mut hardware = Hardware {
        ranger: Box::new(SimRanger {
            distance_cm: 150.0,
            step_cm: if surge { 4.0 } else { 0.0 },
        }),
        climate: Box::new(SimClimate),
        raindrop: Box::new(FixedAdc(1_000)),
        turbidity: Box::new(FixedAdc(450)),
        gps: Box::new(SimGps { sent: false }),
        clock: Box::new(UptimeClock(Instant::now())),
    };
    let mut sensor = SensorNode::new(node_config.node_id.as_str(), node_config.window_capacity);

    node::run(
        &mut sensor,
        &mut hardware,
        &mut uplink,
        &node_config.reconnect_policy(),
        None,
        thread::sleep,
    );
    Ok(())
}
