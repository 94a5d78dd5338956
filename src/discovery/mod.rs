//! Thin client for the discovery service: a key/value store, external to the
//! core, that a named cluster uses to publish and learn engine addresses.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{ClusterError, ClusterResult};

/// One request per call, no retry loop — consistent with the "no retries"
/// posture used by the engine client transport (§6).
pub struct DiscoveryClient {
    base_url: Url,
    user: String,
    cluster: String,
    http: Client,
}

impl DiscoveryClient {
    pub fn new(base_url: Url, user: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            base_url,
            user: user.into(),
            cluster: cluster.into(),
            http: Client::new(),
        }
    }

    fn cluster_url(&self) -> ClusterResult<Url> {
        self.base_url
            .join(&format!("/u/{}/{}", self.user, self.cluster))
            .map_err(|e| ClusterError::Discovery(e.to_string()))
    }

    /// `GET /u/<user>/<cluster>` → the registered engine addresses.
    pub async fn fetch_slaves(&self) -> ClusterResult<Vec<Url>> {
        let response = self
            .http
            .get(self.cluster_url()?)
            .send()
            .await
            .map_err(|e| ClusterError::Discovery(e.to_string()))?
            .error_for_status()
            .map_err(|e| ClusterError::Discovery(e.to_string()))?;

        #[derive(Deserialize)]
        #[serde(transparent)]
        struct Slaves(Vec<Url>);

        let slaves: Slaves = response
            .json()
            .await
            .map_err(|e| ClusterError::Discovery(e.to_string()))?;
        Ok(slaves.0)
    }

    /// `POST /u/<user>/<cluster>/<slave_id>` with the engine's URL as body.
    /// Renewal before the service's TTL expires is the caller's
    /// responsibility — this client performs exactly one request.
    pub async fn register_slave(&self, slave_id: &str, address: &Url) -> ClusterResult<()> {
        let url = self
            .base_url
            .join(&format!("/u/{}/{}/{}", self.user, self.cluster, slave_id))
            .map_err(|e| ClusterError::Discovery(e.to_string()))?;

        self.http
            .post(url)
            .body(address.to_string())
            .send()
            .await
            .map_err(|e| ClusterError::Discovery(e.to_string()))?
            .error_for_status()
            .map_err(|e| ClusterError::Discovery(e.to_string()))?;
        Ok(())
    }

    /// `DELETE /u/<user>/<cluster>`.
    pub async fn delete_cluster(&self) -> ClusterResult<()> {
        self.http
            .delete(self.cluster_url()?)
            .send()
            .await
            .map_err(|e| ClusterError::Discovery(e.to_string()))?
            .error_for_status()
            .map_err(|e| ClusterError::Discovery(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_url_joins_user_and_cluster_path() {
        let client = DiscoveryClient::new(
            Url::parse("http://discovery.internal:4646").unwrap(),
            "acme",
            "prod",
        );
        assert_eq!(
            client.cluster_url().unwrap().as_str(),
            "http://discovery.internal:4646/u/acme/prod"
        );
    }
}
