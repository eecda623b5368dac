/// Sensor node acquisition loop.
///
/// One `SensorNode` owns one sample window and runs one acquisition cycle
/// per tick of its cadence: read every peripheral, convert raw values,
/// update the window, estimate the rate, classify, and produce the report
/// that is posted to the gateway. Peripherals are reached through the
/// traits below so the loop runs unchanged against real hardware drivers
/// or test doubles.

pub mod backoff;
pub mod convert;
pub mod gps;
pub mod uplink;

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::alert::thresholds::{classify, Classification, ClassifierInput};
use crate::analysis::rate;
use crate::analysis::window::SampleBuffer;
use crate::logging::{self, Component};
use crate::model::{RateResult, Sample, Status, Tick};

use self::backoff::ReconnectPolicy;
use self::convert::{RainIntensity, round_to};
use self::gps::Fix;
use self::uplink::{deliver_with_retry, Uplink};

/// Shortest pause between two cycles, whatever the cadence says.
pub const MIN_CYCLE_SLEEP_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Hardware seams
// ---------------------------------------------------------------------------

/// Ultrasonic ranger. Returns the out-of-range sentinel on timeout or when
/// the echo falls outside the usable band.
pub trait DistanceSensor {
    fn distance_cm(&mut self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature: f64,
    pub humidity: f64,
}

/// Temperature / humidity sensor. `None` when the read failed.
pub trait ClimateSensor {
    fn read(&mut self) -> Option<ClimateReading>;
}

/// One 10-bit ADC channel.
pub trait AnalogInput {
    fn read_raw(&mut self) -> u16;
}

/// GPS UART. Returns whatever text is waiting, or `None` if nothing is.
pub trait GpsSource {
    fn read_available(&mut self) -> Option<String>;
}

/// Millisecond uptime counter.
pub trait Clock {
    fn now(&self) -> Tick;
}

/// Every peripheral a node cycle touches.
pub struct Hardware {
    pub ranger: Box<dyn DistanceSensor + Send>,
    pub climate: Box<dyn ClimateSensor + Send>,
    pub raindrop: Box<dyn AnalogInput + Send>,
    pub turbidity: Box<dyn AnalogInput + Send>,
    pub gps: Box<dyn GpsSource + Send>,
    pub clock: Box<dyn Clock + Send>,
}

/// Attempts per climate read before giving up for the cycle.
pub const CLIMATE_READ_ATTEMPTS: usize = 3;

/// Raw values gathered in one cycle, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub tick: Tick,
    pub distance_cm: f64,
    pub climate: Option<ClimateReading>,
    pub raindrop_raw: u16,
    pub turbidity_raw: u16,
    pub gps_text: Option<String>,
}

impl Hardware {
    pub fn acquire(&mut self) -> Acquisition {
        let distance_cm = self.ranger.distance_cm();
        let climate = (0..CLIMATE_READ_ATTEMPTS)
            .find_map(|_| {
                self.climate
                    .read()
                    .filter(|c| convert::plausible_climate(c.temperature, c.humidity))
            });
        Acquisition {
            tick: self.clock.now(),
            distance_cm,
            climate,
            raindrop_raw: self.raindrop.read_raw(),
            turbidity_raw: self.turbidity.read_raw(),
            gps_text: self.gps.read_available(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report and actuation
// ---------------------------------------------------------------------------

/// The JSON document a node posts to the gateway's `/sensor` endpoint.
///
/// Rounded for the wire: distance and rainfall to 0.1, turbidity and the
/// rate figures to 0.01. `distance` is omitted on a sensor fault and the
/// rate figures are omitted until the window yields a valid rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall_percent: f64,
    pub turbidity_voltage: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_cm_per_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    pub status: Status,
    pub flood_danger: bool,
    pub humidity_danger: bool,
}

/// Buzzer / LED pattern for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    Silent,
    Flood,
    Humidity,
}

impl Alarm {
    /// Flood wins over humidity.
    pub fn from_flags(flood_danger: bool, humidity_danger: bool) -> Self {
        if flood_danger {
            Alarm::Flood
        } else if humidity_danger {
            Alarm::Humidity
        } else {
            Alarm::Silent
        }
    }

    /// Buzzer tone as `(frequency_hz, duty)` on a 10-bit PWM, or `None` when
    /// the buzzer is off.
    pub fn tone(&self) -> Option<(u32, u16)> {
        match self {
            Alarm::Flood => Some((1500, 512)),
            Alarm::Humidity => Some((2000, 300)),
            Alarm::Silent => None,
        }
    }

    pub fn led_on(&self) -> bool {
        matches!(self, Alarm::Flood)
    }
}

/// Everything one cycle decided.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub report: NodeReport,
    pub rate: RateResult,
    pub alarm: Alarm,
    pub rain: RainIntensity,
    pub water_clear: bool,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Lowest and highest valid distance seen since boot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceHistory {
    pub min_cm: Option<f64>,
    pub max_cm: Option<f64>,
}

impl DistanceHistory {
    fn record(&mut self, cm: f64) {
        self.min_cm = Some(self.min_cm.map_or(cm, |m| m.min(cm)));
        self.max_cm = Some(self.max_cm.map_or(cm, |m| m.max(cm)));
    }
}

pub struct SensorNode {
    id: String,
    buffer: SampleBuffer,
    history: DistanceHistory,
    last_fix: Option<Fix>,
}

impl SensorNode {
    pub fn new(id: impl Into<String>, window_capacity: usize) -> Self {
        Self {
            id: id.into(),
            buffer: SampleBuffer::new(window_capacity),
            history: DistanceHistory::default(),
            last_fix: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn history(&self) -> DistanceHistory {
        self.history
    }

    pub fn last_fix(&self) -> Option<Fix> {
        self.last_fix
    }

    /// Reads every peripheral and processes the result.
    pub fn run_cycle(&mut self, hardware: &mut Hardware) -> CycleOutcome {
        let acquisition = hardware.acquire();
        self.process(acquisition)
    }

    /// Turns one cycle's raw values into a report.
    ///
    /// A faulted distance is not appended, so the window only ever holds
    /// real measurements and a fault does not age the window.
    pub fn process(&mut self, acq: Acquisition) -> CycleOutcome {
        let sensor_ok = convert::is_valid_distance(acq.distance_cm);
        if sensor_ok {
            self.history.record(acq.distance_cm);
            self.buffer.append(Sample::new(acq.tick, acq.distance_cm));
        } else {
            logging::warn(Component::Node, Some(&self.id), "Distance sensor out of range");
        }

        if let Some(fix) = acq.gps_text.as_deref().and_then(gps::last_fix) {
            self.last_fix = Some(fix);
        }

        let rainfall_percent = convert::raindrop_percent(acq.raindrop_raw);
        let turbidity_voltage = convert::turbidity_voltage(acq.turbidity_raw);
        let humidity = acq.climate.map(|c| c.humidity);

        let rate = rate::compute(&self.buffer);
        let Classification {
            status,
            flood_danger,
            humidity_danger,
        } = classify(&ClassifierInput {
            rate,
            rainfall_percent,
            humidity,
            buffer_full: self.buffer.is_full(),
            buffer_fill: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            sensor_ok,
        });

        if flood_danger {
            logging::warn(
                Component::Node,
                Some(&self.id),
                &format!("Flood danger: water rising {:.2} cm/min", rate.rate_cm_per_min),
            );
        }

        let report = NodeReport {
            distance: sensor_ok.then(|| round_to(acq.distance_cm, 1)),
            temperature: acq.climate.map(|c| c.temperature),
            humidity,
            rainfall_percent: round_to(rainfall_percent, 1),
            turbidity_voltage: round_to(turbidity_voltage, 2),
            latitude: self.last_fix.map(|f| f.latitude),
            longitude: self.last_fix.map(|f| f.longitude),
            rate_cm_per_min: rate.rate().map(|r| round_to(r, 2)),
            percent_change: rate.percent().map(|p| round_to(p, 2)),
            status,
            flood_danger,
            humidity_danger,
        };

        CycleOutcome {
            report,
            rate,
            alarm: Alarm::from_flags(flood_danger, humidity_danger),
            rain: RainIntensity::from_percent(rainfall_percent),
            water_clear: convert::is_water_clear(turbidity_voltage),
        }
    }
}

// ---------------------------------------------------------------------------
// Cadence and loop
// ---------------------------------------------------------------------------

/// Pause after a cycle so that `capacity` cycles span about one minute.
pub fn cycle_sleep(window_capacity: usize, cycle_elapsed: Duration) -> Duration {
    let period_ms = 60_000 / window_capacity.max(1) as u64;
    let elapsed_ms = cycle_elapsed.as_millis().min(u64::MAX as u128) as u64;
    Duration::from_millis(period_ms.saturating_sub(elapsed_ms).max(MIN_CYCLE_SLEEP_MS))
}

/// Runs `cycles` acquisition cycles (forever when `None`), posting each
/// report through `uplink`. `sleep` is called for the inter-cycle pause and
/// for retry backoff.
pub fn run<U: Uplink>(
    node: &mut SensorNode,
    hardware: &mut Hardware,
    uplink: &mut U,
    policy: &ReconnectPolicy,
    cycles: Option<u64>,
    mut sleep: impl FnMut(Duration),
) {
    logging::info(
        Component::Node,
        Some(node.id()),
        &format!("Starting acquisition, window of {} samples", node.buffer().capacity()),
    );

    let mut done = 0u64;
    while cycles.is_none_or(|n| done < n) {
        let started = Instant::now();
        let outcome = node.run_cycle(hardware);
        logging::debug(
            Component::Node,
            Some(node.id()),
            &format!("Cycle {}: {}", done + 1, outcome.report.status),
        );

        let delivery = deliver_with_retry(uplink, &outcome.report, policy, &mut sleep);
        let reason = delivery.last_error.as_ref().map(|e| e.to_string());
        logging::log_delivery_summary(
            node.id(),
            delivery.attempts,
            delivery.delivered,
            reason.as_deref(),
        );

        done += 1;
        sleep(cycle_sleep(node.buffer().capacity(), started.elapsed()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SENSOR_OUT_OF_RANGE_CM;

    fn acquisition(ms: u32, distance_cm: f64) -> Acquisition {
        Acquisition {
            tick: Tick(ms),
            distance_cm,
            climate: Some(ClimateReading {
                temperature: 28.0,
                humidity: 70.0,
            }),
            raindrop_raw: 1023,
            turbidity_raw: 300,
            gps_text: None,
        }
    }

    #[test]
    fn test_warm_up_reports_collecting_without_rate() {
        let mut node = SensorNode::new("node-test", 5);
        let outcome = node.process(acquisition(0, 100.0));
        assert_eq!(outcome.report.status, Status::Collecting { filled: 1, capacity: 5 });
        assert_eq!(outcome.report.rate_cm_per_min, None);
        assert_eq!(outcome.report.distance, Some(100.0));
        assert_eq!(outcome.alarm, Alarm::Silent);
    }

    #[test]
    fn test_fault_is_not_appended() {
        let mut node = SensorNode::new("node-test", 5);
        node.process(acquisition(0, 100.0));
        let outcome = node.process(acquisition(12_000, SENSOR_OUT_OF_RANGE_CM));
        assert_eq!(outcome.report.status, Status::SensorError);
        assert_eq!(outcome.report.distance, None);
        assert_eq!(node.buffer().len(), 1);
    }

    #[test]
    fn test_full_window_rising_fast_sounds_flood_alarm() {
        let mut node = SensorNode::new("node-test", 5);
        let mut last = None;
        for (i, cm) in [100.0, 95.0, 90.0, 85.0, 80.0].into_iter().enumerate() {
            last = Some(node.process(acquisition(i as u32 * 15_000, cm)));
        }
        let outcome = last.expect("five cycles ran");
        assert_eq!(outcome.report.status, Status::FloodDanger);
        assert_eq!(outcome.report.rate_cm_per_min, Some(20.0));
        assert_eq!(outcome.report.percent_change, Some(20.0));
        assert_eq!(outcome.alarm, Alarm::Flood);
        assert_eq!(outcome.alarm.tone(), Some((1500, 512)));
        assert!(outcome.alarm.led_on());
    }

    #[test]
    fn test_humidity_alarm_without_flood() {
        let alarm = Alarm::from_flags(false, true);
        assert_eq!(alarm, Alarm::Humidity);
        assert_eq!(alarm.tone(), Some((2000, 300)));
        assert!(!alarm.led_on());
        assert_eq!(Alarm::from_flags(true, true), Alarm::Flood);
    }

    #[test]
    fn test_history_tracks_valid_extremes_only() {
        let mut node = SensorNode::new("node-test", 5);
        node.process(acquisition(0, 120.0));
        node.process(acquisition(1_000, SENSOR_OUT_OF_RANGE_CM));
        node.process(acquisition(2_000, 80.5));
        let history = node.history();
        assert_eq!(history.min_cm, Some(80.5));
        assert_eq!(history.max_cm, Some(120.0));
    }

    #[test]
    fn test_gps_fix_is_retained_between_cycles() {
        let mut node = SensorNode::new("node-test", 5);
        let mut acq = acquisition(0, 100.0);
        acq.gps_text = Some("$GPGGA,040000,0717.436,S,11247.760,E,1,07,1.1,5.0,M,,M,,*00".to_string());
        node.process(acq);

        let outcome = node.process(acquisition(12_000, 100.0));
        let lat = outcome.report.latitude.expect("fix retained");
        assert!((lat + 7.2906).abs() < 1e-6);
    }

    #[test]
    fn test_report_rounding_and_probes() {
        let mut node = SensorNode::new("node-test", 5);
        let mut acq = acquisition(0, 123.456);
        acq.raindrop_raw = 400;
        acq.turbidity_raw = 900;
        let outcome = node.process(acq);
        assert_eq!(outcome.report.distance, Some(123.5));
        assert_eq!(outcome.report.rainfall_percent, 60.9);
        assert_eq!(outcome.report.turbidity_voltage, 2.9);
        assert_eq!(outcome.rain, RainIntensity::Raining);
        assert!(!outcome.water_clear);
    }

    #[test]
    fn test_report_serializes_canonical_field_names() {
        let mut node = SensorNode::new("node-test", 5);
        let outcome = node.process(acquisition(0, 100.0));
        let json = serde_json::to_value(&outcome.report).unwrap();
        assert_eq!(json["status"], "Collecting 1/5");
        assert_eq!(json["flood_danger"], false);
        assert!(json["rate_cm_per_min"].is_null());
        assert_eq!(json["distance"], 100.0);
    }

    struct Fixed(f64);
    impl DistanceSensor for Fixed {
        fn distance_cm(&mut self) -> f64 {
            self.0
        }
    }
    impl AnalogInput for Fixed {
        fn read_raw(&mut self) -> u16 {
            self.0 as u16
        }
    }

    struct NoGps;
    impl GpsSource for NoGps {
        fn read_available(&mut self) -> Option<String> {
            None
        }
    }

    struct ZeroClock;
    impl Clock for ZeroClock {
        fn now(&self) -> Tick {
            Tick(0)
        }
    }

    /// Climate sensor that plays back a fixed sequence of reads.
    struct ScriptedClimate(Vec<Option<ClimateReading>>);
    impl ClimateSensor for ScriptedClimate {
        fn read(&mut self) -> Option<ClimateReading> {
            if self.0.is_empty() { None } else { self.0.remove(0) }
        }
    }

    fn hardware(climate: Vec<Option<ClimateReading>>) -> Hardware {
        Hardware {
            ranger: Box::new(Fixed(100.0)),
            climate: Box::new(ScriptedClimate(climate)),
            raindrop: Box::new(Fixed(1023.0)),
            turbidity: Box::new(Fixed(300.0)),
            gps: Box::new(NoGps),
            clock: Box::new(ZeroClock),
        }
    }

    #[test]
    fn test_implausible_climate_read_is_retried() {
        let glitch = ClimateReading { temperature: 250.0, humidity: 70.0 };
        let good = ClimateReading { temperature: 28.0, humidity: 70.0 };
        let mut hw = hardware(vec![Some(glitch), None, Some(good)]);
        assert_eq!(hw.acquire().climate, Some(good));
    }

    #[test]
    fn test_climate_gives_up_after_attempts() {
        let glitch = ClimateReading { temperature: 28.0, humidity: 140.0 };
        let good = ClimateReading { temperature: 28.0, humidity: 70.0 };
        let mut hw = hardware(vec![Some(glitch), Some(glitch), Some(glitch), Some(good)]);
        assert_eq!(hw.acquire().climate, None);
    }

    #[test]
    fn test_cycle_sleep() {
        assert_eq!(cycle_sleep(5, Duration::from_millis(200)), Duration::from_millis(11_800));
        assert_eq!(cycle_sleep(5, Duration::from_secs(30)), Duration::from_millis(100));
        assert_eq!(cycle_sleep(0, Duration::ZERO), Duration::from_secs(60));
    }
}
