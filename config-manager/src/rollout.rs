//! Wire types for the Service Management rollouts resource.
//!
//! A rollout names one or more service configurations and an integer
//! traffic percentage per configuration. The list endpoint is queried with
//! `?filter=status=SUCCESS`, but the filter is advisory: whatever the
//! control plane returns first is used, without re-filtering on `status`.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Deserialize)]
struct RolloutsResponse {
    #[serde(default)]
    rollouts: Vec<Rollout>,
}

/// One rollout as returned by the control plane. Fields the manager does
/// not consume (`createTime`, `createdBy`, `status`, ...) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    pub rollout_id: String,

    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub traffic_percent_strategy: TrafficPercentStrategy,
}

/// Config id to integer percentage. A `BTreeMap` keeps the emitted order
/// stable (config-id order) within one emission; percentages are forwarded
/// exactly as returned and are not validated to sum to 100.
#[derive(Debug, Default, Deserialize)]
pub struct TrafficPercentStrategy {
    #[serde(default)]
    pub percentages: BTreeMap<String, u32>,
}

#[derive(Error, Debug)]
pub enum RolloutDecodeError {
    #[error("could not parse rollouts response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rollouts response contained no rollouts")]
    Empty,
}

/// Decodes the first rollout of a rollouts-list response.
///
/// The control plane may return more than one rollout; only the first entry
/// is consulted.
pub fn decode_first_rollout(body: &[u8]) -> Result<Rollout, RolloutDecodeError> {
    let mut response: RolloutsResponse = serde_json::from_slice(body)?;
    if response.rollouts.is_empty() {
        return Err(RolloutDecodeError::Empty);
    }
    Ok(response.rollouts.swap_remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_CONFIG: &str = r#"
    {
      "rollouts": [
        {
          "rolloutId": "2017-05-01r0",
          "createTime": "2017-05-01T22:40:09.884Z",
          "createdBy": "test_user@google.com",
          "status": "SUCCESS",
          "trafficPercentStrategy": {
            "percentages": {
              "2017-05-01r0": 100
            }
          },
          "serviceName": "bookstore.test.appspot.com"
        }
      ]
    }
    "#;

    const WEIGHTED_SPLIT_FAILED_STATUS: &str = r#"
    {
      "rollouts": [
        {
          "rolloutId": "2017-05-01r0",
          "status": "FAILED",
          "trafficPercentStrategy": {
            "percentages": {
              "2017-05-01r1": 20,
              "2017-05-01r0": 80
            }
          },
          "serviceName": "bookstore.test.appspot.com"
        }
      ]
    }
    "#;

    #[test]
    fn decodes_single_config_rollout() {
        let rollout = decode_first_rollout(SINGLE_CONFIG.as_bytes()).unwrap();
        assert_eq!(rollout.rollout_id, "2017-05-01r0");
        assert_eq!(rollout.service_name, "bookstore.test.appspot.com");
        let percentages: Vec<_> = rollout
            .traffic_percent_strategy
            .percentages
            .into_iter()
            .collect();
        assert_eq!(percentages, vec![("2017-05-01r0".to_string(), 100)]);
    }

    #[test]
    fn weighted_split_is_emitted_in_config_id_order() {
        let rollout = decode_first_rollout(WEIGHTED_SPLIT_FAILED_STATUS.as_bytes()).unwrap();
        let percentages: Vec<_> = rollout
            .traffic_percent_strategy
            .percentages
            .into_iter()
            .collect();
        assert_eq!(
            percentages,
            vec![
                ("2017-05-01r0".to_string(), 80),
                ("2017-05-01r1".to_string(), 20),
            ]
        );
    }

    #[test]
    fn non_success_status_is_not_refiltered() {
        // The URL filter is advisory; a FAILED rollout returned first is
        // still used.
        let rollout = decode_first_rollout(WEIGHTED_SPLIT_FAILED_STATUS.as_bytes()).unwrap();
        assert_eq!(rollout.rollout_id, "2017-05-01r0");
    }

    #[test]
    fn only_the_first_rollout_is_read() {
        let body = r#"
        {
          "rollouts": [
            {"rolloutId": "newer", "trafficPercentStrategy": {"percentages": {"c1": 100}}},
            {"rolloutId": "older", "trafficPercentStrategy": {"percentages": {"c0": 100}}}
          ]
        }
        "#;
        let rollout = decode_first_rollout(body.as_bytes()).unwrap();
        assert_eq!(rollout.rollout_id, "newer");
    }

    #[test]
    fn empty_rollout_list_is_an_error() {
        assert!(matches!(
            decode_first_rollout(br#"{"rollouts": []}"#),
            Err(RolloutDecodeError::Empty)
        ));
        assert!(matches!(
            decode_first_rollout(b"{}"),
            Err(RolloutDecodeError::Empty)
        ));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(
            decode_first_rollout(b"not json"),
            Err(RolloutDecodeError::Json(_))
        ));
    }
}
