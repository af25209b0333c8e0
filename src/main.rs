use anyhow::Context;
use clap::Parser;

use volunteer_tracker::app;
use volunteer_tracker::cli::{Cli, Command, ServeArgs, run_export};
use volunteer_tracker::config::Config;
use volunteer_tracker::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    let mut config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            args.apply(&mut config);
            config.validate()?;
            app::run(config).await.context("server failed")?;
        }
        Command::Export(args) => {
            run_export(&config, &args).context("export failed")?;
        }
    }

    Ok(())
}
