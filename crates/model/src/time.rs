use std::fmt;

/// A point in time expressed as minutes since midnight of the simulated day.
///
/// The simulator works entirely in local minutes; converting to `chrono`
/// types only happens at the transport boundary (`SimulatorClient`).
pub type Minutes = f64;

/// Formats a time-of-day plus a signed delay the way a dispatcher reads it,
/// e.g. `14:05+3` or `08:30-0`.
pub fn format_zeit(minuten: Minutes, verspaetung: i32) -> String {
    let total = minuten.round() as i64;
    let total = total.rem_euclid(24 * 60);
    format!("{:02}:{:02}{:+}", total / 60, total % 60, verspaetung)
}

/// A delay in minutes, positive means late, negative means early.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Verspaetung(pub f64);

impl Verspaetung {
    pub fn minutes(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Verspaetung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0.round() as i64)
    }
}

impl From<f64> for Verspaetung {
    fn from(value: f64) -> Self {
        Verspaetung(value)
    }
}
