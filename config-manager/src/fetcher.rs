//! Client for the Service Management control plane.

use crate::errors::FetchCycleError;
use crate::metrics_defs::SERVICE_CONFIG_DOWNLOADS;
use crate::rollout::{self, Rollout};
use crate::transport::HttpFetch;
use bytes::Bytes;
use std::sync::Arc;

/// Issues the two GETs the manager needs: the rollouts list for a service
/// and individual service-config documents.
#[derive(Clone)]
pub struct ServiceManagement {
    transport: Arc<dyn HttpFetch>,
    base_url: String,
    service_name: String,
}

impl ServiceManagement {
    pub fn new(
        transport: Arc<dyn HttpFetch>,
        base_url: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        ServiceManagement {
            transport,
            base_url,
            service_name: service_name.into(),
        }
    }

    pub fn rollouts_url(&self) -> String {
        format!(
            "{}/v1/services/{}/rollouts?filter=status=SUCCESS",
            self.base_url, self.service_name
        )
    }

    pub fn config_url(&self, config_id: &str) -> String {
        format!(
            "{}/v1/services/{}/configs/{}",
            self.base_url, self.service_name, config_id
        )
    }

    /// Fetches the rollouts list and decodes its first entry.
    pub async fn fetch_active_rollout(&self) -> Result<Rollout, FetchCycleError> {
        let response = self.transport.get(&self.rollouts_url()).await?;
        if !response.status.is_success() {
            return Err(FetchCycleError::RolloutStatus(response.status));
        }
        Ok(rollout::decode_first_rollout(&response.body)?)
    }

    /// Downloads one service-config document. The document is opaque to the
    /// manager; it is handed to the install callback as-is.
    pub async fn fetch_service_config(&self, config_id: &str) -> Result<Bytes, FetchCycleError> {
        let response = self.transport.get(&self.config_url(config_id)).await?;
        let outcome = if response.status.is_success() {
            "ok"
        } else {
            "error"
        };
        metrics::counter!(SERVICE_CONFIG_DOWNLOADS.name, "status" => outcome).increment(1);

        if !response.status.is_success() {
            return Err(FetchCycleError::ConfigStatus {
                config_id: config_id.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestFetch;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROLLOUTS_BODY: &str = r#"
    {
      "rollouts": [
        {
          "rolloutId": "2017-05-01r0",
          "status": "SUCCESS",
          "trafficPercentStrategy": {"percentages": {"2017-05-01r0": 100}},
          "serviceName": "bookstore.test.appspot.com"
        }
      ]
    }
    "#;

    fn service_management(base_url: &str) -> ServiceManagement {
        ServiceManagement::new(
            Arc::new(ReqwestFetch::new()),
            base_url,
            "bookstore.test.appspot.com",
        )
    }

    #[test]
    fn urls_are_bit_exact() {
        let sm = ServiceManagement::new(
            Arc::new(ReqwestFetch::new()),
            "https://servicemanagement.googleapis.com",
            "bookstore.test.appspot.com",
        );
        assert_eq!(
            sm.rollouts_url(),
            "https://servicemanagement.googleapis.com/v1/services/bookstore.test.appspot.com/rollouts?filter=status=SUCCESS"
        );
        assert_eq!(
            sm.config_url("2017-05-01r0"),
            "https://servicemanagement.googleapis.com/v1/services/bookstore.test.appspot.com/configs/2017-05-01r0"
        );
    }

    #[test]
    fn trailing_base_url_slash_is_trimmed() {
        let sm = service_management("http://localhost:9000/");
        assert_eq!(
            sm.config_url("c1"),
            "http://localhost:9000/v1/services/bookstore.test.appspot.com/configs/c1"
        );
    }

    #[tokio::test]
    async fn fetches_and_decodes_the_active_rollout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services/bookstore.test.appspot.com/rollouts"))
            .and(query_param("filter", "status=SUCCESS"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROLLOUTS_BODY))
            .mount(&server)
            .await;

        let rollout = service_management(&server.uri())
            .fetch_active_rollout()
            .await
            .unwrap();
        assert_eq!(rollout.rollout_id, "2017-05-01r0");
    }

    #[tokio::test]
    async fn non_ok_rollouts_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services/bookstore.test.appspot.com/rollouts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = service_management(&server.uri()).fetch_active_rollout().await;
        assert!(matches!(result, Err(FetchCycleError::RolloutStatus(_))));
    }

    #[tokio::test]
    async fn downloads_a_service_config_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/v1/services/bookstore.test.appspot.com/configs/2017-05-01r0",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": "2017-05-01r0"}"#))
            .mount(&server)
            .await;

        let body = service_management(&server.uri())
            .fetch_service_config("2017-05-01r0")
            .await
            .unwrap();
        assert_eq!(body.as_ref(), br#"{"id": "2017-05-01r0"}"#);
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/v1/services/bookstore.test.appspot.com/configs/absent",
            ))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = service_management(&server.uri())
            .fetch_service_config("absent")
            .await;
        match result {
            Err(FetchCycleError::ConfigStatus { config_id, status }) => {
                assert_eq!(config_id, "absent");
                assert_eq!(status, http::StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
