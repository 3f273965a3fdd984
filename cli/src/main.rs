mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;

use clap::Parser;
use std::error;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let mut client = ClientCli::connect(&args.server, args.ca_cert.as_deref(), &args.domain).await?;

    match args.sub_command {
        SubCommand::Submit { script } => {
            client.submit(&script).await?;
        }
        SubCommand::Status { job_id } => {
            client.query_status(job_id).await?;
        }
        SubCommand::Download { job_id, output } => {
            client.download(job_id, output).await?;
        }
        SubCommand::Cancel { job_id } => {
            client.cancel(job_id).await?;
        }
        SubCommand::List => {
            client.list().await?;
        }
        SubCommand::Wait {
            job_id,
            interval_ms,
        } => {
            client
                .wait(job_id, Duration::from_millis(interval_ms))
                .await?;
        }
    }

    Ok(())
}
