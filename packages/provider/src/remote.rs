//! HTTP compute provider.
//!
//! Expression graphs are serialized as JSON and posted to a hosted compute
//! service. Every call is a single `POST {base_url}/v1/{operation}` with a
//! bearer token and the body `{"project": ..., "request": ...}`.

use std::time::Duration;

use land_impact_expr::{
    LinearFit, ReduceOutput, ReduceRequest, Reduction, SampleRequest, SampleRow, TileRequest,
};
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::{ComputeProvider, ProviderError};

const ERROR_BODY_PREVIEW: usize = 512;

/// Hosted compute service client.
pub struct RemoteProvider {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteProvider {
    /// Creates a client for the configured service.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/v1/{operation}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post<T: Serialize + Sync>(
        &self,
        operation: &str,
        request: &T,
    ) -> Result<String, ProviderError> {
        let body = Envelope {
            project: self.config.project.as_deref(),
            request,
        };

        let mut req = self.client.post(self.endpoint(operation)).json(&body);
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }

        log::debug!("POST {operation} to {}", self.config.base_url);
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        Ok(text)
    }
}

#[async_trait::async_trait]
impl ComputeProvider for RemoteProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn reduce_region(&self, request: &ReduceRequest) -> Result<ReduceOutput, ProviderError> {
        let body = self.post("reduce", request).await?;
        parse_reduce(&request.reduction, &body)
    }

    async fn sample(&self, request: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
        let body = self.post("sample", request).await?;
        parse_sample(&body)
    }

    async fn tile_url(&self, request: &TileRequest) -> Result<String, ProviderError> {
        let body = self.post("tiles", request).await?;
        parse_tile(&body)
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    request: &'a T,
}

#[derive(Deserialize)]
struct ValueResponse {
    value: Option<f64>,
}

#[derive(Deserialize)]
struct FitResponse {
    fit: Option<LinearFit>,
}

#[derive(Deserialize)]
struct SampleResponse {
    rows: Vec<SampleRow>,
}

#[derive(Deserialize)]
struct TileResponse {
    url_format: String,
}

/// Parses a reduce response according to the reducer that was requested.
fn parse_reduce(reduction: &Reduction, body: &str) -> Result<ReduceOutput, ProviderError> {
    Ok(match reduction {
        Reduction::Mean { .. } | Reduction::Percentile { .. } => {
            let resp: ValueResponse = serde_json::from_str(body)?;
            ReduceOutput::Value(resp.value)
        }
        Reduction::LinearFit { .. } => {
            let resp: FitResponse = serde_json::from_str(body)?;
            ReduceOutput::Fit(resp.fit)
        }
    })
}

fn parse_sample(body: &str) -> Result<Vec<SampleRow>, ProviderError> {
    let resp: SampleResponse = serde_json::from_str(body)?;
    Ok(resp.rows)
}

fn parse_tile(body: &str) -> Result<String, ProviderError> {
    let resp: TileResponse = serde_json::from_str(body)?;
    if resp.url_format.is_empty() {
        return Err(ProviderError::Evaluation {
            message: "tile service returned an empty URL".to_string(),
        });
    }
    Ok(resp.url_format)
}

fn preview(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use land_impact_expr::{Area, Image, Shape};

    fn mean_reduction() -> Reduction {
        Reduction::Mean {
            image: Image::constant(1.0),
        }
    }

    #[test]
    fn parse_value_and_null() {
        let out = parse_reduce(&mean_reduction(), r#"{"value": 21.5}"#).unwrap();
        assert_eq!(out, ReduceOutput::Value(Some(21.5)));

        let out = parse_reduce(&mean_reduction(), r#"{"value": null}"#).unwrap();
        assert_eq!(out, ReduceOutput::Value(None));
    }

    #[test]
    fn parse_fit() {
        let reduction = Reduction::LinearFit {
            x: Image::constant(0.0),
            y: Image::constant(0.0),
        };
        let out = parse_reduce(&reduction, r#"{"fit": {"scale": -9.5, "offset": 33.0}}"#).unwrap();
        assert_eq!(
            out.fit(),
            Some(LinearFit {
                scale: -9.5,
                offset: 33.0
            })
        );
    }

    #[test]
    fn parse_rejects_malformed_body() {
        let err = parse_reduce(&mean_reduction(), "<html>").unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn parse_sample_rows() {
        let rows = parse_sample(r#"{"rows": [{"ndvi": 0.4, "temp": 27.0}]}"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0]["temp"] - 27.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_tile_url() {
        let url = parse_tile(r#"{"url_format": "https://tiles/x/{z}/{x}/{y}"}"#).unwrap();
        assert_eq!(url, "https://tiles/x/{z}/{x}/{y}");
        assert!(parse_tile(r#"{"url_format": ""}"#).is_err());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let short = preview(&body);
        assert_eq!(short.len(), ERROR_BODY_PREVIEW + 3);
        assert_eq!(preview("oops"), "oops");
    }

    #[test]
    fn envelope_wraps_request() {
        let request = ReduceRequest::mean(
            Image::constant(2.0),
            Area::new(Shape::disc(10.0, 20.0, 100.0)),
            30.0,
        );
        let value = serde_json::to_value(Envelope {
            project: Some("demo"),
            request: &request,
        })
        .unwrap();
        assert_eq!(value["project"], "demo");
        assert_eq!(value["request"]["reduction"]["reducer"], "mean");
        assert_eq!(value["request"]["scale_m"], 30.0);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let provider = RemoteProvider::new(RemoteConfig {
            base_url: "https://compute.example/".to_string(),
            token: None,
            project: None,
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(provider.endpoint("reduce"), "https://compute.example/v1/reduce");
    }
}
