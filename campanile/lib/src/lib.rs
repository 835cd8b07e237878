//! Core library for Campanile, a search engine for half-lead spliced compositions on eight
//! bells.
//!
//! Given a set of symmetric methods, a music definition and structural constraints, the engine
//! enumerates every valid composition in rotationally sorted order, proves each one true, scores
//! it by music, changes of method and method balance, and streams out the best compositions it
//! has found so far.

#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod composition;
pub mod method;
pub mod music;
pub(crate) mod node;
pub mod parameters;
mod search;

use std::{
    fmt::{Display, Formatter},
    time::Duration,
};

use treble::Stage;

pub use composition::Composition;
pub use method::Call;
pub use parameters::{CallSet, MethodSpec, MusicSpec, Parameters};
pub use search::{Progress, Search, Update};

/// The type of every score the engine computes.  Music definitions and the changes-of-method and
/// balance weights are all integral, so scores need no floating point.
pub type Score = i32;

/// Configuration parameters which **don't** change which compositions are generated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of inner-loop iterations between inspections of the abort and pause flags.
    pub check_freq: usize,
    /// How often the engine publishes progress statistics.
    pub response_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_freq: 2000,
            response_time: Duration::from_millis(500),
        }
    }
}

////////////
// ERRORS //
////////////

/// The different ways that a search can fail before it starts.
#[derive(Debug)]
pub enum Error {
    /// The [`Parameters`] didn't define any methods
    NoMethods,
    /// A method's place notation failed to parse
    PnParse {
        method: String,
        error: treble::place_not::ParseError,
    },
    /// A method is on the wrong stage (only Major is searchable)
    WrongStage { method: String, stage: Stage },
    /// A method's lead isn't an even-length palindrome
    AsymmetricMethod { method: String },
    /// A method's treble doesn't lead at the leadhead
    WrongHuntBell { method: String },
    /// A method's treble isn't in 8ths place at the half-lead
    TrebleAwayFromHalfLead { method: String },
    /// Two methods share a one-letter abbreviation
    DuplicateAbbreviation {
        abbreviation: char,
        method1: String,
        method2: String,
    },
    /// A music pattern failed to parse
    MusicPattern {
        music: String,
        error: treble::music::PatternError,
    },
    /// The leadhead-only variant was requested without enabling calls
    CallsRequired,
    /// `leads_per_part`, `parts` or `num_comps` is zero
    EmptyStructure,
    /// The start composition couldn't be understood
    BadSeed { token: String, message: String },
    /// An internal invariant failed; the engine can't continue
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoMethods => write!(f, "can't search for compositions with no methods"),
            Error::PnParse { method, error } => {
                write!(f, "place notation of {:?} won't parse: {}", method, error)
            }
            Error::WrongStage { method, stage } => write!(
                f,
                "method {:?} seems to be {}; only Major methods are searchable",
                method, stage
            ),
            Error::AsymmetricMethod { method } => write!(
                f,
                "method {:?} isn't a symmetric even-length lead, so its half-leads can't be \
                 spliced",
                method
            ),
            Error::WrongHuntBell { method } => {
                write!(f, "the treble of {:?} doesn't lead at the leadhead", method)
            }
            Error::TrebleAwayFromHalfLead { method } => write!(
                f,
                "the treble of {:?} isn't in 8ths place at the half-lead",
                method
            ),
            Error::DuplicateAbbreviation {
                abbreviation,
                method1,
                method2,
            } => write!(
                f,
                "methods {:?} and {:?} share the abbreviation {:?}",
                method1, method2, abbreviation
            ),
            Error::MusicPattern { music, error } => {
                write!(f, "music {:?} has a bad pattern: {}", music, error)
            }
            Error::CallsRequired => {
                write!(f, "leadhead-only splicing needs calls to be enabled")
            }
            Error::EmptyStructure => write!(
                f,
                "`leads_per_part`, `parts` and `num_comps` must all be at least 1"
            ),
            Error::BadSeed { token, message } => {
                write!(f, "bad start composition at {:?}: {}", token, message)
            }
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
