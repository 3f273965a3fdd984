use protobuf::{
    sandbox_jobs_client::SandboxJobsClient, CancelRequest, DownloadRequest, DownloadResponse,
    JobState, ListRequest, StatusRequest, StatusResponse, SubmitRequest,
};
use std::error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tonic::Status;

pub struct ClientCli {
    inner: SandboxJobsClient<Channel>,
}

impl ClientCli {
    /// Connect to the server, over TLS when a CA certificate is given.
    pub async fn connect(
        server_addr: &str,
        ca_cert: Option<&Path>,
        domain: &str,
    ) -> Result<Self, Box<dyn error::Error>> {
        let mut endpoint = Channel::from_shared(server_addr.to_string())?;
        if let Some(ca_cert) = ca_cert {
            let ca_cert = Certificate::from_pem(tokio::fs::read(ca_cert).await?);
            let tls = ClientTlsConfig::new()
                .domain_name(domain)
                .ca_certificate(ca_cert);
            endpoint = endpoint.tls_config(tls)?;
        }
        let channel = endpoint.connect().await?;
        Ok(Self {
            inner: SandboxJobsClient::new(channel),
        })
    }

    pub async fn submit(&mut self, script: &Path) -> Result<(), Box<dyn error::Error>> {
        let script = if script == Path::new("-") {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        } else {
            tokio::fs::read(script).await?
        };
        let response = self.inner.submit_job(SubmitRequest { script }).await?;
        println!("Submitted job id: {}", response.into_inner().job_id);
        Ok(())
    }

    pub async fn query_status(&mut self, job_id: String) -> Result<(), Status> {
        let status = self.fetch_status(job_id).await?;
        print_status(&status);
        Ok(())
    }

    pub async fn download(
        &mut self,
        job_id: String,
        output: Option<PathBuf>,
    ) -> Result<(), Box<dyn error::Error>> {
        let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", job_id)));
        let response = self.inner.download(DownloadRequest { job_id }).await?;
        let mut stream = response.into_inner();

        let mut file = tokio::fs::File::create(&output).await?;
        let mut written = 0;
        while let Some(DownloadResponse { data }) = stream.message().await? {
            file.write_all(&data).await?;
            written += data.len();
        }
        file.flush().await?;
        println!("Saved {} bytes to {}", written, output.display());
        Ok(())
    }

    pub async fn cancel(&mut self, job_id: String) -> Result<(), Status> {
        self.inner
            .cancel_job(CancelRequest {
                job_id: job_id.clone(),
            })
            .await?;
        println!("Cancelled job id: {}", job_id);
        Ok(())
    }

    pub async fn list(&mut self) -> Result<(), Status> {
        let jobs = self.inner.list_jobs(ListRequest {}).await?.into_inner().jobs;
        for job in &jobs {
            println!(
                "{}  {:<9}  {}",
                job.job_id,
                state_name(job.state()),
                job.progress
            );
        }
        Ok(())
    }

    /// Poll until the job leaves the pending/running states, then print its final status.
    pub async fn wait(&mut self, job_id: String, interval: Duration) -> Result<(), Status> {
        let mut last_progress = String::new();
        loop {
            let status = self.fetch_status(job_id.clone()).await?;
            if status.progress != last_progress {
                println!("{}", status.progress);
                last_progress = status.progress.clone();
            }
            if !matches!(status.state(), JobState::Pending | JobState::Running) {
                print_status(&status);
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn fetch_status(&mut self, job_id: String) -> Result<StatusResponse, Status> {
        let response = self.inner.query_status(StatusRequest { job_id }).await?;
        Ok(response.into_inner())
    }
}

fn state_name(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Running => "running",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}

fn print_status(status: &StatusResponse) {
    println!("Status: {}", state_name(status.state()));
    if !status.progress.is_empty() {
        println!("Progress: {}", status.progress);
    }
    match status.state() {
        JobState::Completed => {
            println!("Exited with code: {}", status.exit_code);
            println!("Download: {}", status.download_locator);
        }
        JobState::Failed => println!("Reason: {}", status.reason),
        _ => {}
    }
}
