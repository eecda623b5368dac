/// Danger classification and data-health checks.
///
/// Submodules:
/// - `thresholds`: turns a window rate plus climate readings into a status
///   label and the flood / humidity danger flags.
/// - `stalenesses`: flags stations whose latest reading is too old.

pub mod stalenesses;
pub mod thresholds;
