//! A query server for Metamath proof databases.

use clap::Parser;
use log::info;
use metamath_parse::FsLoader;
use mmserve::service::Service;
use mmserve::{repl, Error, Opt};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<(), Error> {
    let opt = Opt::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if opt.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let ws = opt.workspace()?;
    info!("Parsing database {}", ws.main_file.display());

    // only unrecoverable startup errors exit non-zero; everything the
    // database itself is unhappy about comes back as diagnostics
    let service = Service::new(ws, Box::new(FsLoader))?;
    let snapshot = service.snapshot_fresh();
    info!("Ready");

    if opt.check {
        let mut total = 0;
        if let Some(snap) = snapshot {
            for (_, file) in snap.sources.files() {
                for d in mmserve::query::db_diagnostics(&snap, &file.path) {
                    println!(
                        "{}:{}:{}: {:?}: {}",
                        file.path.display(),
                        d.line + 1,
                        d.start_col + 1,
                        d.severity,
                        d.message
                    );
                    total += 1;
                }
            }
        }
        info!("{} diagnostics", total);
        return Ok(());
    }

    repl::run(&service)?;
    Ok(())
}
