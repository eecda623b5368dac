/// Flood detection math and per-station roll-ups.
///
/// Submodules:
/// - `window`: fixed-capacity sliding window of distance samples.
/// - `rate`: rate of water-level change over a full window.
/// - `summary`: recent-history digest per station for operators.

pub mod rate;
pub mod summary;
pub mod window;
