use std::convert::Infallible;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use relic_agent::test::TestSink;
use relic_agent::{Agent, AgentConfig};
use tower::{ServiceBuilder, ServiceExt};

fn agent(http_stats: bool) -> Agent {
    Agent::new(
        AgentConfig::new("license")
            .with_sink(TestSink::new())
            .with_report_interval(Duration::from_secs(3600))
            .with_gc_stats(false)
            .with_memory_stats(false)
            .with_http_stats(http_stats),
    )
}

async fn unavailable(_req: Request<()>) -> Result<Response<String>, Infallible> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    Ok(Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header("retry-after", "30")
        .body("try later".into())
        .unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_requests_are_counted() {
    let mut agent = agent(true);
    let service = agent.wrap_http_handler_fn(unavailable);
    agent.run().unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.oneshot(Request::new(())).await })
        })
        .collect();
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["retry-after"], "30");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"try later");
    }

    let timer = agent.http_timer().unwrap().snapshot();
    assert_eq!(timer.count, 50);
    assert!(timer.min >= Duration::from_millis(5));
    agent.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_layer_times_requests() {
    let mut agent = agent(true);
    let service = ServiceBuilder::new()
        .layer(agent.http_layer())
        .service_fn(unavailable);
    agent.run().unwrap();

    service.oneshot(Request::new(())).await.unwrap();
    assert_eq!(agent.http_timer().unwrap().count(), 1);
    agent.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_handler_is_observed() {
    let mut agent = agent(true);
    agent.run().unwrap();
    let service = agent.wrap_http_handler_fn(|_req: Request<()>| async {
        if true {
            panic!("handler failed");
        }
        Ok::<_, Infallible>(Response::new(()))
    });

    let result = tokio::spawn(service.oneshot(Request::new(()))).await;
    assert!(result.unwrap_err().is_panic());
    assert_eq!(agent.http_timer().unwrap().count(), 1);
    agent.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_stats_pass_through() {
    let mut agent = agent(false);
    let service = agent.wrap_http_handler_fn(unavailable);
    agent.run().unwrap();

    let response = service.oneshot(Request::new(())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(agent.http_timer().is_none());
    agent.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requests_before_run_are_not_timed() {
    let mut agent = agent(true);
    let service = agent.wrap_http_handler_fn(unavailable);

    service.clone().oneshot(Request::new(())).await.unwrap();
    agent.run().unwrap();
    service.oneshot(Request::new(())).await.unwrap();

    assert_eq!(agent.http_timer().unwrap().count(), 1);
    agent.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_body_time_is_included() {
    let mut agent = agent(true);
    let service = agent.wrap_http_handler_fn(unavailable);
    agent.run().unwrap();

    let response = service.oneshot(Request::new(())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.http_timer().unwrap().count(), 0);
    response.into_body().collect().await.unwrap();

    let timer = agent.http_timer().unwrap().snapshot();
    assert_eq!(timer.count, 1);
    assert!(timer.max >= Duration::from_millis(105));
    agent.shutdown();
}
