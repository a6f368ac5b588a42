use clap::Parser;
use std::sync::Arc;
use switchyard::{init_tracing, CliChannel, HttpChannel, Publisher, PublisherArgs};
use switchyard_router::Args;

/// Demo shop published over CLI and HTTP.
///
/// Handler commands and root commands (`/add`, `/list`, ...) follow the
/// options; `shop --help` lists them.
#[derive(Parser)]
#[command(name = "shop", version, disable_help_flag = true)]
struct Cli {
    #[command(flatten)]
    publisher: PublisherArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.publisher.config();
    init_tracing(cli.publisher.log.as_deref());

    let publisher = Arc::new(Publisher::new("shop", shop_example::catalog())?);
    publisher.add_app("shop", "shop", Args::new().kw("populate", true))?;
    publisher.add_app("myshop", "shop:Hierarchical", Args::new())?;

    if config.serve {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(HttpChannel::new(publisher).serve(&config.addr()));
    }

    let outcome = CliChannel::new(publisher)
        .with_format(config.format)
        .with_prog("shop")
        .run(&cli.publisher.command);
    if !outcome.stdout.is_empty() {
        println!("{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        eprintln!("{}", outcome.stderr);
    }
    std::process::exit(outcome.exit_code)
}
