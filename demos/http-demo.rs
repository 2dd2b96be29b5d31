use std::convert::Infallible;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use relic_agent::{Agent, AgentConfig, DeliveryError, Report, ReportingSink};
use tower::ServiceExt;

/// Prints reports instead of sending them.
struct PrintSink;

impl ReportingSink for PrintSink {
    fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        for component in &report.components {
            println!("{} over {:?}:", component.name, component.duration);
            for metric in &component.metrics {
                println!("  {} [{}] = {:?}", metric.name, metric.unit, metric.value);
            }
        }
        Ok(())
    }
}

async fn handler(req: Request<()>) -> Result<Response<String>, Infallible> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    let status = if req.uri().path() == "/broken" {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok(Response::builder()
        .status(status)
        .body(format!("{}\n", status))
        .unwrap())
}

#[tokio::main]
async fn main() {
    let mut log_builder = pretty_env_logger::formatted_builder();
    log_builder.parse_filters("info");
    log_builder.init();

    let mut config = AgentConfig::from_env()
        .with_name("http-demo")
        .with_http_stats(true)
        .with_report_interval(Duration::from_secs(5))
        .with_gc_poll_interval(Duration::from_secs(1))
        .with_verbose(true);
    if config.license.is_empty() {
        config.license = "demo".into();
        config = config.with_sink(PrintSink);
    }

    let mut agent = Agent::new(config);
    let service = agent.wrap_http_handler_fn(handler);
    agent.run().unwrap();

    for i in 0..300 {
        let path = if i % 10 == 0 { "/broken" } else { "/" };
        let request = Request::get(path).body(()).unwrap();
        let response = service.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        if !status.is_success() {
            agent.debug(format!("request {} failed: {}", i, String::from_utf8_lossy(&body).trim()));
        }
    }

    agent.shutdown();
}
