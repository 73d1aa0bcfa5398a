use kube::{Client, Config};
use tracing::debug;

use crate::{discover::client::DiscoverClient, dynamic::DynamicClient, error::Error};

/// The two handles a census needs, sharing one underlying connection pool.
#[derive(Clone)]
pub struct ClientHandles {
    /// Reads the API catalog.
    pub discovery: DiscoverClient,
    /// Lists instances of any discovered resource.
    pub data: DynamicClient,
}

impl ClientHandles {
    /// Builds both handles from resolved connection parameters.
    ///
    /// No request is sent to the cluster here.
    ///
    /// # Errors
    /// Returns [`Error::Construction`] when the client cannot be built from `config`,
    /// for example because of unparseable certificate data.
    pub fn try_from_config(config: Config) -> Result<Self, Error> {
        debug!(cluster_url = %config.cluster_url, "building kubernetes client");
        let client = Client::try_from(config).map_err(Error::Construction)?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            discovery: DiscoverClient::new(client.clone()),
            data: DynamicClient::new(client),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use http::{Request, Response};
    use kube::{Client, Config, client::Body};
    use serde_json::Value;

    use super::ClientHandles;

    pub(crate) type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    /// A client whose requests are answered through the returned handle.
    pub(crate) fn testcontext() -> (Client, ApiServerHandle) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(mock_service, "default"), handle)
    }

    /// Answers the next request with `body` and hands the request back for inspection.
    pub(crate) async fn respond(server: &mut ApiServerHandle, body: Value) -> Request<Body> {
        let (request, send) = server.next_request().await.expect("service not called");
        let response = serde_json::to_vec(&body).unwrap();
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        request
    }

    #[tokio::test]
    async fn builds_handles_without_contacting_the_cluster() {
        let config = Config::new("https://127.0.0.1:6443".parse().unwrap());
        assert!(ClientHandles::try_from_config(config).is_ok());
    }
}
