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

//! Remote vector-index build service: admits, deduplicates, and
//! resource-schedules ANN index build requests.

pub mod api;
pub mod blob_store;
pub mod config;
pub mod executor;
pub mod identity;
pub mod index_builder;
pub mod metrics;
pub mod model;
pub mod resource;
pub mod service;
pub mod store;

#[cfg(test)]
test_r::enable!();
