//! Prometheus metrics, mounted at `GET /metrics` via
//! [`poem::endpoint::PrometheusExporter`].

use prometheus::{Gauge, IntCounterVec, IntGauge, Opts, Registry};

/// Process-wide metric handles plus the registry they are bound to.
///
/// Built once at startup and shared behind an `Arc` with the job service,
/// the executor, and the API layer, each of which updates the handles
/// relevant to it.
pub struct Metrics {
    pub registry: Registry,
    admission_outcomes: IntCounterVec,
    in_flight_jobs: IntGauge,
    available_gpu_bytes: Gauge,
    available_cpu_bytes: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let admission_outcomes = IntCounterVec::new(
            Opts::new(
                "build_admission_total",
                "Outcomes of POST /_build admission attempts, by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");

        let in_flight_jobs = IntGauge::new(
            "jobs_in_flight",
            "Number of jobs currently in RUNNING_INDEX_BUILD state",
        )
        .expect("metric can be created");

        let available_gpu_bytes = Gauge::new(
            "available_gpu_memory_bytes",
            "GPU memory available for new index builds",
        )
        .expect("metric can be created");

        let available_cpu_bytes = Gauge::new(
            "available_cpu_memory_bytes",
            "CPU memory available for new index builds",
        )
        .expect("metric can be created");

        registry
            .register(Box::new(admission_outcomes.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(in_flight_jobs.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(available_gpu_bytes.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(available_cpu_bytes.clone()))
            .expect("metric can be registered");

        Metrics {
            registry,
            admission_outcomes,
            in_flight_jobs,
            available_gpu_bytes,
            available_cpu_bytes,
        }
    }

    pub fn record_admitted(&self) {
        self.admission_outcomes.with_label_values(&["admitted"]).inc();
        self.in_flight_jobs.inc();
    }

    pub fn record_hash_collision(&self) {
        self.admission_outcomes
            .with_label_values(&["hash_collision"])
            .inc();
    }

    pub fn record_capacity_rejected(&self) {
        self.admission_outcomes
            .with_label_values(&["capacity_rejected"])
            .inc();
    }

    pub fn record_job_settled(&self) {
        self.in_flight_jobs.dec();
    }

    pub fn set_available_resources(&self, available_gpu: f64, available_cpu: f64) {
        self.available_gpu_bytes.set(available_gpu);
        self.available_cpu_bytes.set(available_cpu);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
