use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use args::CliArgs;
use campanile::{Config, Search, Update};
use colored::Colorize;
use simple_logger::SimpleLogger;
use structopt::StructOpt;

mod args;
mod spec;

fn main() -> anyhow::Result<()> {
    // Parse CLI args and initialise logging
    let args = CliArgs::from_args();
    SimpleLogger::new()
        .with_level(args.log_level())
        .init()
        .context("couldn't initialise logging")?;

    // Read and lower the TOML file specifying the search
    let search_file = spec::SearchFile::read_from_file(&args.input_file)?;
    let params = search_file.to_parameters(args.library.as_deref())?;

    // Build the search up front so configuration problems surface before any output
    let search = Search::new(params, Config::default())?;

    // Ctrl-C requests a cooperative abort; the worker unwinds at its next suspension point
    let abort_flag = Arc::new(AtomicBool::new(false));
    {
        let abort_flag = abort_flag.clone();
        ctrlc::set_handler(move || abort_flag.store(true, Ordering::SeqCst))
            .context("couldn't install the Ctrl-C handler")?;
    }

    // Run the search on this thread, streaming compositions as they enter the top-K set
    search.run(
        |update| match update {
            Update::Comp(comp) => println!("{}", comp),
            Update::Progress(progress) => log::debug!(
                "{:5.1}% searched, {} iterations, {} comps",
                progress.fraction * 100.0,
                progress.iter_count,
                progress.num_comps
            ),
            Update::Aborting => log::warn!("Abort requested; unwinding"),
            Update::Complete => {}
        },
        &abort_flag,
    );

    // Print the final table, best composition last so it ends up next to the prompt
    let comps = search.compositions();
    println!();
    if comps.is_empty() {
        println!("{}", "No compositions found.".red().bold());
    } else {
        println!("{}", comps[0].title().green().bold());
        for comp in comps.iter().rev() {
            println!("{}", comp);
        }
    }
    if search.aborted() {
        println!(
            "{}",
            "Search aborted; the list above may be incomplete.".yellow()
        );
    }
    Ok(())
}
