//! Container-backed BirdBox environments (`docker` mode).

use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt};
use tracing::info;

use crate::config::ContainerConfig;
use crate::error::{Error, Result};
use crate::server_fixture::{wait_http_ready, Backend, BirdBox, BirdBoxConfiguration, READY_TIMEOUT};

/// Port the server binds inside the container
const API_PORT: u16 = 4000;

/// Line the server prints once its HTTP API is accepting requests
const READY_LOG_LINE: &str = "Lattice API is ready";

/// A started server container
#[derive(Debug)]
pub(crate) struct ServerContainer {
    image: String,
    inner: ContainerAsync<GenericImage>,
}

impl ServerContainer {
    pub(crate) async fn stop(self) -> Result<()> {
        self.inner
            .stop()
            .await
            .map_err(|source| Error::Container {
                image: self.image,
                source,
            })
    }
}

/// Start the published server image with the merged environment applied and
/// wait for its API.
///
/// The returned handle's URL is reachable as soon as this resolves; callers
/// need no further readiness wait.
pub async fn start_birdbox_from_container(config: ContainerConfig) -> Result<BirdBox> {
    let image_name = format!("lattice/birdbox-{}", config.name());
    info!(image = %image_name, tag = %config.tag(), "starting server container");

    let image = GenericImage::new(image_name.clone(), config.tag().to_string())
        .with_exposed_port(API_PORT.tcp())
        .with_wait_for(WaitFor::message_on_stdout(READY_LOG_LINE));

    let mut request = ContainerRequest::from(image);
    for (key, value) in config.env() {
        request = request.with_env_var(key.as_str(), value.as_str());
    }

    let container_err = |source| Error::Container {
        image: image_name.clone(),
        source,
    };

    let container = request.start().await.map_err(container_err)?;
    let port = container
        .get_host_port_ipv4(API_PORT)
        .await
        .map_err(container_err)?;
    let api_url = format!("http://127.0.0.1:{port}");

    // The log-line wait gates on the server, not on the mapped port; make
    // sure the URL handed to callers actually answers.
    wait_http_ready(&api_url, READY_TIMEOUT).await?;
    info!(%api_url, "server container is ready");

    Ok(BirdBox::new(
        BirdBoxConfiguration { api_url },
        Backend::Container(ServerContainer {
            image: image_name,
            inner: container,
        }),
    ))
}
