//! A representation of a stage, with human-friendly `const`s and display names.

use std::fmt::{Display, Formatter};

use factorial::Factorial;

/// The number of bells ringing, as a newtype over [`u8`].
///
/// ```
/// use treble::Stage;
///
/// assert_eq!(Stage::MAJOR.num_bells(), 8);
/// assert_eq!(&Stage::new(8).to_string(), "Major");
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Stage(u8);

impl Stage {
    /// Creates a `Stage` from the number of bells.
    pub fn new(num_bells: u8) -> Self {
        Stage(num_bells)
    }

    /// The number of bells in this `Stage`.
    #[inline]
    pub fn num_bells(self) -> usize {
        self.0 as usize
    }

    /// The number of distinct [`Row`](crate::Row)s on this `Stage` (i.e. `num_bells` factorial).
    pub fn num_rows(self) -> u64 {
        (self.0 as u64).factorial()
    }

    /// The tenor of this `Stage` (the heaviest bell).
    pub fn tenor(self) -> crate::Bell {
        crate::Bell::from_number(self.num_bells()).expect("stage out of nameable range")
    }
}

/// User-friendly constants for commonly used `Stage`s.
impl Stage {
    /// A `Stage` with 4 bells
    pub const MINIMUS: Stage = Stage(4);
    /// A `Stage` with 5 bells
    pub const DOUBLES: Stage = Stage(5);
    /// A `Stage` with 6 bells
    pub const MINOR: Stage = Stage(6);
    /// A `Stage` with 7 bells
    pub const TRIPLES: Stage = Stage(7);
    /// A `Stage` with 8 bells
    pub const MAJOR: Stage = Stage(8);
    /// A `Stage` with 9 bells
    pub const CATERS: Stage = Stage(9);
    /// A `Stage` with 10 bells
    pub const ROYAL: Stage = Stage(10);
    /// A `Stage` with 11 bells
    pub const CINQUES: Stage = Stage(11);
    /// A `Stage` with 12 bells
    pub const MAXIMUS: Stage = Stage(12);
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            4 => "Minimus",
            5 => "Doubles",
            6 => "Minor",
            7 => "Triples",
            8 => "Major",
            9 => "Caters",
            10 => "Royal",
            11 => "Cinques",
            12 => "Maximus",
            n => return write!(f, "{}-bell stage", n),
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::Stage;

    #[test]
    fn num_rows() {
        assert_eq!(Stage::MINIMUS.num_rows(), 24);
        assert_eq!(Stage::MAJOR.num_rows(), 40320);
        assert_eq!(Stage::MAXIMUS.num_rows(), 479_001_600);
    }

    #[test]
    fn tenor() {
        assert_eq!(Stage::MAJOR.tenor().number(), 8);
    }
}
