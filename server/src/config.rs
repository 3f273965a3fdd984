use clap::{ArgEnum, Parser};
use sandboxlib::config::DEFAULT_IMAGE;
use sandboxlib::{EngineConfig, RuntimeKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tonic::transport::{Identity, ServerTlsConfig};

/// Run submitted scripts in throwaway containers
#[derive(Debug, Parser)]
#[clap(name = "sandbox-server")]
pub struct ServerArgs {
    /// Address the gRPC job service listens on
    #[clap(long, env = "SANDBOX_GRPC_ADDR", default_value = "[::1]:50051")]
    pub grpc_addr: SocketAddr,

    /// Address of the raw TCP submission listener
    #[clap(long, env = "SANDBOX_SUBMIT_ADDR", default_value = "0.0.0.0:8888")]
    pub submit_addr: SocketAddr,

    /// Where jobs are executed
    #[clap(long, env = "SANDBOX_RUNTIME", arg_enum, default_value = "docker")]
    pub runtime: RuntimeArg,

    /// Container image jobs run in
    #[clap(long, env = "SANDBOX_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Path of the docker CLI
    #[clap(long, env = "SANDBOX_DOCKER", default_value = "docker")]
    pub docker: PathBuf,

    /// Launcher script copied into every job workspace
    #[clap(long, env = "SANDBOX_LAUNCHER", default_value = "run.sh")]
    pub launcher: PathBuf,

    /// Parent directory for job workspaces (defaults to the system temp dir)
    #[clap(long, env = "SANDBOX_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Directory finished job archives are kept in
    #[clap(long, env = "SANDBOX_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// How often a running job is polled, in milliseconds
    #[clap(long, env = "SANDBOX_POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Kill jobs running longer than this many seconds
    #[clap(long, env = "SANDBOX_DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,

    /// Script header options passed on to jobs
    #[clap(
        long = "allow-option",
        env = "SANDBOX_ALLOWED_OPTIONS",
        use_value_delimiter = true,
        default_values = &["REPO_A", "REPO_B", "COMMIT_A", "COMMIT_B"]
    )]
    pub allowed_options: Vec<String>,

    /// PEM certificate for serving gRPC over TLS
    #[clap(long, env = "SANDBOX_TLS_CERT", requires = "tls-key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key matching --tls-cert
    #[clap(long, env = "SANDBOX_TLS_KEY", requires = "tls-cert")]
    pub tls_key: Option<PathBuf>,

    /// Capacity of the orchestrator's message queue
    #[clap(long, default_value = "64")]
    pub message_capacity: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ArgEnum)]
pub enum RuntimeArg {
    /// detached docker containers
    Docker,
    /// local child processes, no isolation
    Process,
}

impl ServerArgs {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            runtime: match self.runtime {
                RuntimeArg::Docker => RuntimeKind::Docker,
                RuntimeArg::Process => RuntimeKind::Process,
            },
            image: self.image.clone(),
            docker_binary: self.docker.clone(),
            launcher: self.launcher.clone(),
            workspace_root: self.workspace_root.clone(),
            archive_dir: self.archive_dir.clone().unwrap_or(defaults.archive_dir),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            deadline: self.deadline_secs.map(Duration::from_secs),
            allowed_options: self.allowed_options.clone(),
        }
    }

    /// Load the TLS identity, if one was configured.
    pub async fn tls_config(&self) -> std::io::Result<Option<ServerTlsConfig>> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => {
                let cert = tokio::fs::read(cert).await?;
                let key = tokio::fs::read(key).await?;
                let identity = Identity::from_pem(cert, key);
                Ok(Some(ServerTlsConfig::new().identity(identity)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let args = ServerArgs::try_parse_from(["sandbox-server"]).unwrap();
        let config = args.engine_config();
        assert_eq!(config.runtime, RuntimeKind::Docker);
        assert_eq!(config.image, DEFAULT_IMAGE);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.deadline, None);
        assert_eq!(
            config.allowed_options,
            vec!["REPO_A", "REPO_B", "COMMIT_A", "COMMIT_B"]
        );
    }

    #[test]
    fn flags_override_defaults() {
        let args = ServerArgs::try_parse_from([
            "sandbox-server",
            "--runtime",
            "process",
            "--deadline-secs",
            "600",
            "--allow-option",
            "BRANCH,TAG",
            "--archive-dir",
            "/var/lib/sandbox",
        ])
        .unwrap();
        let config = args.engine_config();
        assert_eq!(config.runtime, RuntimeKind::Process);
        assert_eq!(config.deadline, Some(Duration::from_secs(600)));
        assert_eq!(config.allowed_options, vec!["BRANCH", "TAG"]);
        assert_eq!(config.archive_dir, PathBuf::from("/var/lib/sandbox"));
    }

    #[test]
    fn tls_cert_needs_a_key() {
        let result = ServerArgs::try_parse_from(["sandbox-server", "--tls-cert", "server.pem"]);
        assert!(result.is_err());
        let result = ServerArgs::try_parse_from(["sandbox-server", "--tls-key", "server.key"]);
        assert!(result.is_err());
    }

    #[test]
    fn tls_pair_is_accepted() {
        let args = ServerArgs::try_parse_from([
            "sandbox-server",
            "--tls-cert",
            "server.pem",
            "--tls-key",
            "server.key",
        ])
        .unwrap();
        assert_eq!(args.tls_cert, Some(PathBuf::from("server.pem")));
        assert_eq!(args.tls_key, Some(PathBuf::from("server.key")));
    }

    #[test]
    fn arguments_are_consistent() {
        use clap::CommandFactory;
        ServerArgs::command().debug_assert();
    }
}
