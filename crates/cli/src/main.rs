//! `deploy-proxy` entry point.
//!
//! This binary is the composition root. It parses and validates the
//! configuration, installs the tracing subscriber, builds the outbound
//! clients and verifiers, then runs the webhook server alongside the Pulse
//! consumers until one of them stops or the process is interrupted.
//!
//! Sources are enabled by configuration:
//!
//! | Source        | Enabled when                                   |
//! |---------------|------------------------------------------------|
//! | DockerHub     | always                                         |
//! | GCR           | always (empty project list permits any project)|
//! | GitHub        | `--github-path` is set                         |
//! | hg.mozilla.org| Pulse credentials are set                      |
//! | Taskcluster   | Pulse credentials are set                      |

mod config;
mod telemetry;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use jenkins::JenkinsClient;
use listener::pulse::{HgPushHandler, PulseConnection, PulseError, TaskCompletionHandler};
use listener::{build_router, run_consumer, RouterConfig};
use proxy::{
    parse_source_ranges, Dispatcher, DockerHubVerifier, GcrVerifier, GitHubVerifier,
    HgPushVerifier, TaskclusterVerifier, Verifiers,
};
use tokio::task::JoinSet;
use tracing::{error, info};
use upstream::{
    build_http_client, DockerHubCallbackClient, GitHubMetaClient, HgPushlogClient,
    TaskclusterQueueClient,
};

use crate::config::Config;

type ConsumerExit = (&'static str, Result<(), PulseError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let validated = config.validate()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    let http = build_http_client(Duration::from_secs(config.http_timeout_secs))
        .context("could not build HTTP client")?;

    let jenkins = Arc::new(JenkinsClient::new(
        validated.jenkins.base_url,
        validated.jenkins.user,
        validated.jenkins.password,
        http.clone(),
    ));

    let mut verifiers = Verifiers::new()
        .with_dockerhub(DockerHubVerifier::new(
            config.valid_namespaces.iter().collect(),
            &config.dockerhub_registry,
            Arc::new(DockerHubCallbackClient::new(http.clone())),
        ))
        .with_gcr(GcrVerifier::new(config.valid_gcr_projects.iter().collect()));

    if config.github_path.is_some() {
        let ranges = GitHubMetaClient::new(&config.github_api_url, http.clone())
            .fetch_hook_ranges()
            .await
            .context("GitHub meta fetch failed")?;
        let ranges = parse_source_ranges(&ranges)?;
        info!(ranges = ranges.len(), "loaded GitHub hook ranges");
        verifiers = verifiers.with_github(GitHubVerifier::new(
            config.valid_github_orgs.iter().collect(),
            ranges,
        )?);
    }

    if validated.pulse.is_some() {
        verifiers = verifiers
            .with_hgmo(HgPushVerifier::new(
                config.hgmo_repos.iter().collect(),
                &config.hgmo_base_url,
                Arc::new(HgPushlogClient::new(http.clone())),
            ))
            .with_taskcluster(TaskclusterVerifier::new(
                &config.cloudops_deploy_pulse_prefix,
                Arc::new(TaskclusterQueueClient::new(
                    &config.taskcluster_root_url,
                    http.clone(),
                )),
            ));
    }

    let dispatcher = Arc::new(Dispatcher::new(verifiers, jenkins));

    let mut consumers: JoinSet<ConsumerExit> = JoinSet::new();
    // Held until exit; dropping it closes every Pulse channel.
    let _pulse = match validated.pulse {
        Some(settings) => {
            let connection = PulseConnection::connect(settings)
                .await
                .context("could not connect to pulse")?;

            let hgmo = HgPushHandler::new(dispatcher.clone());
            let stream = connection
                .subscribe(&config.hgmo_pulse_queue, &hgmo.bindings())
                .await
                .context("could not subscribe to hg.mozilla.org pushes")?;
            consumers.spawn(async move { ("hgmo", run_consumer(stream, &hgmo).await) });

            let taskcluster = TaskCompletionHandler::new(dispatcher.clone());
            let stream = connection
                .subscribe(&config.cloudops_deploy_pulse_queue, &taskcluster.bindings())
                .await
                .context("could not subscribe to Taskcluster completions")?;
            consumers
                .spawn(async move { ("taskcluster", run_consumer(stream, &taskcluster).await) });

            Some(connection)
        }
        None => None,
    };

    let router = build_router(
        dispatcher,
        RouterConfig {
            github_path: config.github_path.clone(),
            github_use_x_forwarded_for: config.github_use_x_forwarded_for,
        },
    );
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("could not bind {}", config.addr))?;
    info!(addr = %config.addr, github = config.github_path.is_some(), pulse = !consumers.is_empty(), "starting deploy-proxy");

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .into_future();

    tokio::select! {
        result = server => {
            result.context("server crashed")?;
            bail!("server stopped");
        }
        Some(joined) = consumers.join_next(), if !consumers.is_empty() => {
            let (name, result) = joined.context("consumer task panicked")?;
            if let Err(e) = &result {
                error!(consumer = name, error = %e, "consumer failed");
            }
            result.with_context(|| format!("{name} consumer failed"))?;
            bail!("{name} consumer stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
