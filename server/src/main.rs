mod config;
mod services;
mod submission;

use clap::Parser;
use config::ServerArgs;
use protobuf::sandbox_jobs_server::SandboxJobsServer;
use sandboxlib::Orchestrator;
use services::jobservice::SandboxJobsService;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sandboxlib=info,sandbox_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ServerArgs::parse();
    let orchestrator = Orchestrator::spawn(&args.engine_config(), args.message_capacity);
    serve(&args, orchestrator).await
}

async fn serve(args: &ServerArgs, orchestrator: Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(args.submit_addr).await?;
    tracing::info!(addr = %args.submit_addr, "accepting raw submissions");
    let submissions = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(err) = submission::serve(listener, submissions).await {
            tracing::error!(error = %err, "submission listener stopped");
        }
    });

    let mut server = Server::builder();
    if let Some(tls) = args.tls_config().await? {
        server = server.tls_config(tls)?;
    }
    let job_service = SandboxJobsServer::new(SandboxJobsService::new(orchestrator.clone()));
    tracing::info!(addr = %args.grpc_addr, "serving gRPC job service");

    server
        .add_service(job_service)
        .serve_with_shutdown(args.grpc_addr, shutdown_signal())
        .await?;

    tracing::info!("shutting down, cancelling running jobs");
    orchestrator.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        futures::future::pending::<()>().await;
    }
}
