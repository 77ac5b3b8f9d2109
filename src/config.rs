// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Layered configuration: a checked-in TOML file overridden by environment
//! variables, following the same `figment` layering the rest of the
//! workspace uses for its services.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

fn default_request_store_type() -> String {
    "memory".to_string()
}

fn default_request_store_max_size() -> usize {
    10_000
}

fn default_request_store_ttl_seconds() -> Option<i64> {
    Some(1800)
}

fn default_gpu_memory_limit() -> f64 {
    24_000_000_000.0
}

fn default_cpu_memory_limit() -> f64 {
    32_000_000_000.0
}

fn default_max_workers() -> usize {
    2
}

fn default_service_name() -> String {
    "remote-vector-index-builder-api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> u16 {
    8000
}

/// Process-wide settings, loaded once at startup.
///
/// `gpu_memory_limit`/`cpu_memory_limit` are already expressed in bytes, the
/// same unit the resource manager and memory estimator work in -- no unit
/// conversion happens between config and the rest of the service.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_request_store_type")]
    pub request_store_type: String,
    #[serde(default = "default_request_store_max_size")]
    pub request_store_max_size: usize,
    #[serde(default = "default_request_store_ttl_seconds")]
    pub request_store_ttl_seconds: Option<i64>,

    #[serde(default = "default_gpu_memory_limit")]
    pub gpu_memory_limit: f64,
    #[serde(default = "default_cpu_memory_limit")]
    pub cpu_memory_limit: f64,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Self {
        Self::load().expect("Failed to parse config")
    }

    /// Same loading logic as [`Self::new`], but reports failures instead
    /// of panicking. Used by tests that want to assert on malformed
    /// configuration rather than crash the test process.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config/remote-vector-index-builder.toml"))
            .merge(Env::raw())
            .extract()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
