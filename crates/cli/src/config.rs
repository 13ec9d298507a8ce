//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment variable named in its
//! `env` attribute. List-valued variables are comma separated.

use std::net::SocketAddr;

use clap::Parser;
use listener::pulse::PulseSettings;
use thiserror::Error;
use url::Url;

#[derive(Parser)]
#[command(
    name = "deploy-proxy",
    version,
    about = "Verifies build notifications and triggers Jenkins jobs"
)]
pub struct Config {
    /// Address the webhook server listens on.
    #[arg(long, env = "ADDR", default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// DockerHub namespaces allowed to trigger builds.
    #[arg(
        long = "valid-namespace",
        env = "NAMESPACE",
        value_delimiter = ',',
        default_value = "mozilla"
    )]
    pub valid_namespaces: Vec<String>,

    /// GCR projects allowed to trigger builds. Empty permits any project.
    #[arg(long = "valid-gcr-project", env = "GCR_PROJECT", value_delimiter = ',')]
    pub valid_gcr_projects: Vec<String>,

    /// Path of the GitHub webhook. Unset disables GitHub.
    #[arg(long, env = "GITHUB_PATH")]
    pub github_path: Option<String>,

    /// GitHub organizations allowed to trigger builds.
    #[arg(long = "valid-github-org", env = "GITHUB_ORG", value_delimiter = ',')]
    pub valid_github_orgs: Vec<String>,

    /// Trust the last `X-Forwarded-For` entry for the GitHub origin check.
    #[arg(long, env = "GITHUB_USE_X_FORWARDED_FOR")]
    pub github_use_x_forwarded_for: bool,

    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Origin DockerHub callback URLs must live under.
    #[arg(
        long,
        env = "DOCKERHUB_REGISTRY",
        default_value = "https://registry.hub.docker.com"
    )]
    pub dockerhub_registry: String,

    #[arg(long, env = "JENKINS_BASE_URL")]
    pub jenkins_base_url: Option<String>,

    #[arg(long, env = "JENKINS_USER")]
    pub jenkins_user: Option<String>,

    #[arg(long, env = "JENKINS_PASSWORD", hide_env_values = true)]
    pub jenkins_password: Option<String>,

    #[arg(long, env = "PULSE_USERNAME")]
    pub pulse_username: Option<String>,

    #[arg(long, env = "PULSE_PASSWORD", hide_env_values = true)]
    pub pulse_password: Option<String>,

    #[arg(long, env = "PULSE_HOST", default_value = "amqps://pulse.mozilla.org")]
    pub pulse_host: String,

    /// hg.mozilla.org repository paths to watch.
    #[arg(
        long = "hgmo-repo",
        env = "HGMO_REPO",
        value_delimiter = ',',
        default_values = ["ci/ci-admin", "ci/ci-configuration"]
    )]
    pub hgmo_repos: Vec<String>,

    #[arg(long, env = "HGMO_BASE_URL", default_value = "https://hg.mozilla.org")]
    pub hgmo_base_url: String,

    #[arg(long, env = "HGMO_PULSE_QUEUE", default_value = "hgmo")]
    pub hgmo_pulse_queue: String,

    /// Route prefix of Taskcluster tasks that request deployments.
    #[arg(
        long,
        env = "CLOUDOPS_DEPLOY_PULSE_PREFIX",
        default_value = "cloudops.deploy.v1"
    )]
    pub cloudops_deploy_pulse_prefix: String,

    #[arg(long, env = "CLOUDOPS_DEPLOY_PULSE_QUEUE", default_value = "deploy-proxy")]
    pub cloudops_deploy_pulse_queue: String,

    #[arg(
        long,
        env = "TASKCLUSTER_ROOT_URL",
        default_value = "https://firefox-ci-tc.services.mozilla.com"
    )]
    pub taskcluster_root_url: String,

    /// Timeout for every outbound HTTP call, in seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// OTLP collector endpoint. Unset disables span export.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// One configuration problem.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigProblem {
    #[error("{flag} is required")]
    Missing { flag: &'static str },

    #[error("--jenkins-base-url {url:?} is not an absolute URL: {message}")]
    InvalidJenkinsUrl { url: String, message: String },

    #[error("--pulse-username and --pulse-password must be set together")]
    PartialPulse,

    #[error("--http-timeout-secs must be greater than zero")]
    ZeroTimeout,
}

/// Every problem found in one pass.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", render(.problems))]
pub struct ConfigError {
    pub problems: Vec<ConfigProblem>,
}

fn render(problems: &[ConfigProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Jenkins endpoint and credentials.
pub struct JenkinsSettings {
    pub base_url: String,
    pub user: String,
    pub password: String,
}

/// The parts of [`Config`] that need cross-field checks.
pub struct Validated {
    pub jenkins: JenkinsSettings,
    /// `None` when no Pulse credentials are configured.
    pub pulse: Option<PulseSettings>,
}

impl Config {
    /// Checks the whole configuration, collecting every problem.
    pub fn validate(&self) -> Result<Validated, ConfigError> {
        let mut problems = Vec::new();

        let mut required = |value: &Option<String>, flag: &'static str| match value {
            Some(v) if !v.is_empty() => Some(v.clone()),
            _ => {
                problems.push(ConfigProblem::Missing { flag });
                None
            }
        };
        let base_url = required(&self.jenkins_base_url, "--jenkins-base-url");
        let user = required(&self.jenkins_user, "--jenkins-user");
        let password = required(&self.jenkins_password, "--jenkins-password");

        if let Some(url) = &base_url {
            match Url::parse(url) {
                Ok(parsed) if parsed.has_host() => {}
                Ok(_) => problems.push(ConfigProblem::InvalidJenkinsUrl {
                    url: url.clone(),
                    message: "missing host".to_string(),
                }),
                Err(e) => problems.push(ConfigProblem::InvalidJenkinsUrl {
                    url: url.clone(),
                    message: e.to_string(),
                }),
            }
        }

        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let pulse = match (non_empty(&self.pulse_username), non_empty(&self.pulse_password)) {
            (Some(username), Some(password)) => Some(PulseSettings {
                host: self.pulse_host.clone(),
                username,
                password,
            }),
            (None, None) => None,
            _ => {
                problems.push(ConfigProblem::PartialPulse);
                None
            }
        };

        if self.http_timeout_secs == 0 {
            problems.push(ConfigProblem::ZeroTimeout);
        }

        match (base_url, user, password) {
            (Some(base_url), Some(user), Some(password)) if problems.is_empty() => Ok(Validated {
                jenkins: JenkinsSettings {
                    base_url,
                    user,
                    password,
                },
                pulse,
            }),
            _ => Err(ConfigError { problems }),
        }
    }
}
