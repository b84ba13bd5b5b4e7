use adm_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("adm error: {:#}", err);
        std::process::exit(1);
    }
}
