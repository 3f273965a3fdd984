use sandboxlib::Orchestrator;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Scripts larger than this are refused.
const MAX_SCRIPT_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
enum SubmissionError {
    #[error("script exceeds {0} bytes")]
    TooLarge(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Job(#[from] sandboxlib::error::Error),
}

/// Accept raw script submissions: the connection is read to EOF and answered with the job id.
/// Oversized scripts are answered with an `error:` line and never run.
///
/// Works with e.g. `nc -N localhost 8888 < script.py`.
pub async fn serve(listener: TcpListener, orchestrator: Orchestrator) -> io::Result<()> {
    accept(listener, orchestrator, MAX_SCRIPT_BYTES).await
}

async fn accept(listener: TcpListener, orchestrator: Orchestrator, max_bytes: u64) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(err) = handle(stream, &orchestrator, max_bytes).await {
                tracing::warn!(%peer, error = %err, "submission failed");
            }
        });
    }
}

async fn handle(
    mut stream: TcpStream,
    orchestrator: &Orchestrator,
    max_bytes: u64,
) -> Result<(), SubmissionError> {
    let mut script = Vec::new();
    (&mut stream)
        .take(max_bytes + 1)
        .read_to_end(&mut script)
        .await?;
    if script.len() as u64 > max_bytes {
        let err = SubmissionError::TooLarge(max_bytes);
        stream
            .write_all(format!("error: {}\n", err).as_bytes())
            .await?;
        stream.shutdown().await?;
        return Err(err);
    }

    let job_id = orchestrator.submit(script).await?;
    stream
        .write_all(format!("{}\n", job_id).as_bytes())
        .await?;
    stream.shutdown().await?;
    Ok(())
}
