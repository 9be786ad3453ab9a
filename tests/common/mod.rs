use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use wherenow_birds::{
    AggregatorConfig, BirdError, Endpoints, HttpRequest, HttpResponse, HttpTransport, RetryPolicy,
    Sighting,
};

pub const STUB_HOST: &str = "http://stub.local";

struct Route {
    pattern: String,
    responses: VecDeque<Result<HttpResponse, BirdError>>,
}

/// Scripted transport. Responses are matched by URL substring; each route
/// replays its queued responses in order and repeats the last one forever.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Option<Arc<Semaphore>>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every request waits for a permit on the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let stub = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (Arc::new(stub), gate)
    }

    /// Every request takes `latency` to answer.
    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn respond(&self, pattern: &str, response: Result<HttpResponse, BirdError>) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                pattern: pattern.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    pub fn respond_ok(&self, pattern: &str, body: &str) {
        self.respond(pattern, Ok(HttpResponse::ok(body)));
    }

    pub fn respond_status(&self, pattern: &str, status: u16) {
        self.respond(
            pattern,
            Ok(HttpResponse {
                status,
                body: "stub error".to_string(),
            }),
        );
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> Result<HttpResponse, BirdError> {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| url.contains(&r.pattern)) {
            Some(route) if route.responses.len() > 1 => route.responses.pop_front().unwrap(),
            Some(route) => route.responses.front().cloned().unwrap(),
            None => Ok(HttpResponse {
                status: 404,
                body: format!("no stub for {}", url),
            }),
        }
    }
}

impl HttpTransport for StubTransport {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, BirdError>> + Send {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.next_response(&request.url);
        let gate = self.gate.clone();
        let latency = self.latency;
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);

        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(gate) = gate {
                gate.acquire_owned().await.unwrap().forget();
            }
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            response
        }
    }
}

/// Config pointed at the stub host with a fast retry.
#[allow(dead_code)]
pub fn test_config() -> AggregatorConfig {
    AggregatorConfig::new("test-token")
        .with_endpoints(Endpoints::with_host(STUB_HOST))
        .with_retry(
            RetryPolicy::default()
                .with_max_retries(3)
                .with_delay(Duration::from_millis(10)),
        )
}

#[allow(dead_code)]
pub fn sighting(species: &str, loc_id: &str, obs_dt: &str) -> Sighting {
    Sighting {
        sub_id: format!("S{}", obs_dt.replace([' ', ':', '-'], "")),
        species_code: species.to_string(),
        com_name: format!("{} common", species),
        sci_name: format!("{} scientific", species),
        loc_id: loc_id.to_string(),
        loc_name: format!("{} name", loc_id),
        obs_dt: obs_dt.to_string(),
        how_many: Some(1),
        lat: 40.7,
        lng: -74.0,
        obs_valid: true,
        obs_reviewed: false,
        location_private: false,
        user_display_name: None,
    }
}

#[allow(dead_code)]
pub fn sightings_json(sightings: &[Sighting]) -> String {
    serde_json::to_string(sightings).unwrap()
}

/// A species page body carrying one asset block per `(id, format, uploader)`.
#[allow(dead_code)]
pub fn species_page(assets: &[(u64, &str, &str)]) -> String {
    let blocks: Vec<String> = assets
        .iter()
        .map(|(id, format, uploader)| {
            format!(
                "{{ \"assetId\" : {id}, \"citationUrl\" : \"https://macaulaylibrary.org/asset/{id}\", \
                 \"assetFormatCode\" : \"{format}\", \"userDisplayName\" : \"{uploader}\", \
                 \"mlBaseDownloadUrl\" : \"https://cdn.example/asset/\", \
                 \"citationName\" : \"{uploader}\" }}"
            )
        })
        .collect();
    format!(
        "<html><head><script>window.assets = [{}];</script></head><body></body></html>",
        blocks.join(", ")
    )
}

/// Wait until `check` holds, polling every few milliseconds.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
