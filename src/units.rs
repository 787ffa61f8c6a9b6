use std::fmt;

const STEP: f64 = 1024.0;

/// Byte units in ascending order. `PB` is the ceiling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Unit {
    B,
    KB,
    MB,
    GB,
    TB,
    PB,
}

impl Unit {
    const ALL: [Unit; 6] = [Unit::B, Unit::KB, Unit::MB, Unit::GB, Unit::TB, Unit::PB];

    pub fn label(self) -> &'static str {
        match self {
            Unit::B => "B",
            Unit::KB => "KB",
            Unit::MB => "MB",
            Unit::GB => "GB",
            Unit::TB => "TB",
            Unit::PB => "PB",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn is_last(self) -> bool {
        self.index() == Self::ALL.len() - 1
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A byte count expressed in the largest unit that keeps it below 1024.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Scaled {
    pub value: f64,
    pub unit: Unit,
}

impl Scaled {
    /// Approximate byte count this magnitude stands for.
    #[cfg(test)]
    pub fn bytes(&self) -> f64 {
        self.value * STEP.powi(self.unit.index() as i32)
    }
}

/// Scale a raw byte count to a human-readable magnitude.
///
/// Counts beyond the petabyte range stay in `PB` with a value above 1024.
pub fn scale(count: u64) -> Scaled {
    let mut value = count as f64;
    let mut idx = 0;
    while value >= STEP && !Unit::ALL[idx].is_last() {
        value /= STEP;
        idx += 1;
    }
    Scaled { value, unit: Unit::ALL[idx] }
}
