use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Submit scripts to a sandbox job server and fetch their results
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// The address of the server
    #[clap(
        short = 's',
        long = "server",
        env = "SANDBOX_SERVER",
        default_value = "http://[::1]:50051"
    )]
    pub server: String,
    /// CA certificate (PEM) to verify a TLS server with
    #[clap(long, env = "SANDBOX_CA_CERT")]
    pub ca_cert: Option<PathBuf>,
    /// Domain name expected in the server's TLS certificate
    #[clap(long, default_value = "localhost")]
    pub domain: String,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// submit a script as a new job
    Submit {
        /// path of the script, `-` for stdin
        script: PathBuf,
    },
    /// get a job's status and progress
    Status { job_id: String },
    /// save a completed job's archive
    Download {
        job_id: String,

        #[clap(short, long)]
        /// output file, defaults to <job_id>.zip
        output: Option<PathBuf>,
    },
    /// cancel a pending or running job
    Cancel { job_id: String },
    /// list every job the server knows about
    List,
    /// poll a job until it finishes
    Wait {
        job_id: String,

        #[clap(long, default_value = "1000")]
        /// milliseconds between polls
        interval_ms: u64,
    },
}
