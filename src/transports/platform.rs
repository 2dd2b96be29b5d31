use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde::{Serialize, Serializer};

use super::ratelimit::parse_retry_after;
use crate::config::AgentConfig;
use crate::constants::USER_AGENT as AGENT_USER_AGENT;
use crate::error::DeliveryError;
use crate::metrics::{MetricSnapshot, MetricValue, TimerSnapshot};
use crate::sink::{Report, ReportingSink};

/// Posts reports to the platform plugin API.
///
/// The HTTP client is created on first delivery, on the reporting thread,
/// and reused afterwards. Each delivery is bounded by
/// [`AgentConfig::delivery_timeout`].
pub struct PlatformSink {
    endpoint: String,
    license: String,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl PlatformSink {
    /// Creates a sink for the endpoint and license of `config`.
    pub fn new(config: &AgentConfig) -> Self {
        Self::new_internal(config, None)
    }

    /// Creates a sink that uses the given [`Client`].
    pub fn with_client(config: &AgentConfig, client: Client) -> Self {
        Self::new_internal(config, Some(client))
    }

    fn new_internal(config: &AgentConfig, client: Option<Client>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            license: config.license.clone(),
            timeout: config.delivery_timeout,
            client: Mutex::new(client),
        }
    }

    fn client(&self) -> Result<Client, DeliveryError> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = client.as_ref() {
            return Ok(client.clone());
        }
        let built = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        *client = Some(built.clone());
        Ok(built)
    }
}

impl ReportingSink for PlatformSink {
    fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&Payload::new(report))
            .map_err(|err| DeliveryError::Serialization(err.to_string()))?;

        let response = self
            .client()?
            .post(&self.endpoint)
            .header("X-License-Key", &self.license)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, AGENT_USER_AGENT.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
            let until = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, SystemTime::now()));
            if let Some(until) = until {
                return Err(DeliveryError::RateLimited { until });
            }
        }
        Err(DeliveryError::Status(status.as_u16()))
    }
}

impl fmt::Debug for PlatformSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSink")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A report in the platform's JSON format.
///
/// Metric keys are `Component/{name}[{unit}]`. Gauges and counters are
/// plain numbers; timers are summaries in milliseconds. Non-finite gauges
/// are written as `null`.
#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    agent: AgentPayload<'a>,
    components: Vec<ComponentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct AgentPayload<'a> {
    host: &'a str,
    pid: u32,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct ComponentPayload<'a> {
    name: &'a str,
    guid: &'a str,
    duration: u64,
    metrics: Metrics<'a>,
}

#[derive(Debug)]
struct Metrics<'a>(&'a [MetricSnapshot]);

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MetricPayload {
    Number(f64),
    Count(i64),
    Summary {
        min: f64,
        max: f64,
        total: f64,
        count: u64,
        sum_of_squares: f64,
    },
}

impl<'a> Payload<'a> {
    /// Borrows `report` for encoding.
    pub fn new(report: &'a Report) -> Self {
        Payload {
            agent: AgentPayload {
                host: &report.agent.host,
                pid: report.agent.pid,
                version: &report.agent.version,
            },
            components: report
                .components
                .iter()
                .map(|component| ComponentPayload {
                    name: &component.name,
                    guid: &component.guid,
                    duration: component.duration.as_secs_f64().round() as u64,
                    metrics: Metrics(&component.metrics),
                })
                .collect(),
        }
    }
}

impl Serialize for Metrics<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|metric| (metric_key(metric), MetricPayload::from(&metric.value))),
        )
    }
}

fn metric_key(metric: &MetricSnapshot) -> String {
    let unit = match metric.value {
        MetricValue::Timer(_) => "ms",
        _ => metric.unit.as_str(),
    };
    format!("Component/{}[{}]", metric.name, unit)
}

impl From<&MetricValue> for MetricPayload {
    fn from(value: &MetricValue) -> Self {
        match value {
            MetricValue::Gauge(v) => MetricPayload::Number(*v),
            MetricValue::Counter(v) => MetricPayload::Count(*v),
            MetricValue::Timer(timer) => summary(timer),
        }
    }
}

fn summary(timer: &TimerSnapshot) -> MetricPayload {
    let ms = |d: Duration| d.as_nanos() as f64 / 1e6;
    MetricPayload::Summary {
        min: ms(timer.min),
        max: ms(timer.max),
        total: ms(timer.sum),
        count: timer.count,
        sum_of_squares: timer.sum_of_squares / 1e12,
    }
}
