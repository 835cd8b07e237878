use std::path::PathBuf;

use log::LevelFilter;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "campanile",
    about = "A search engine for half-lead spliced compositions on eight bells"
)]
pub struct CliArgs {
    /// The TOML file describing the search
    #[structopt(parse(from_os_str))]
    pub input_file: PathBuf,

    /// A zipped text method library to resolve method names against (overrides the one named in
    /// the input file)
    #[structopt(short = "l", long = "library", parse(from_os_str))]
    pub library: Option<PathBuf>,

    /// Makes the output more verbose.  `-v` enables debug logging, `-vv` trace logging.
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbosity: usize,

    /// Makes the output quieter.  `-q` suppresses info logging, `-qq` warnings too.
    #[structopt(short = "q", long = "quiet", parse(from_occurrences))]
    pub quietness: usize,
}

impl CliArgs {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity as isize - self.quietness as isize {
            x if x <= -2 => LevelFilter::Error,
            -1 => LevelFilter::Warn,
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
