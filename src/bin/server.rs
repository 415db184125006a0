use clap::Parser;
use redstream::config::Config;
use redstream::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    server::run(config).await
}
