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

//! Thread-safe GPU/CPU memory accounting (C1).

use std::sync::Mutex;

struct Ledger {
    total_gpu: f64,
    total_cpu: f64,
    available_gpu: f64,
    available_cpu: f64,
}

/// Tracks GPU and CPU memory availability across concurrent builds.
///
/// Both counters are guarded by a single mutex: an allocation must check
/// and debit GPU and CPU atomically together, or a build could be admitted
/// on the strength of GPU headroom that a concurrent allocation on CPU then
/// invalidates.
pub struct ResourceManager {
    ledger: Mutex<Ledger>,
}

impl ResourceManager {
    pub fn new(total_gpu_memory: f64, total_cpu_memory: f64) -> Self {
        ResourceManager {
            ledger: Mutex::new(Ledger {
                total_gpu: total_gpu_memory,
                total_cpu: total_cpu_memory,
                available_gpu: total_gpu_memory,
                available_cpu: total_cpu_memory,
            }),
        }
    }

    /// Attempts to reserve `gpu` and `cpu` bytes. All-or-nothing: on
    /// failure the ledger is left untouched.
    pub fn try_allocate(&self, gpu: f64, cpu: f64) -> bool {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.available_gpu >= gpu && ledger.available_cpu >= cpu {
            ledger.available_gpu -= gpu;
            ledger.available_cpu -= cpu;
            true
        } else {
            false
        }
    }

    /// Returns previously allocated memory to the pool. The caller must
    /// only release what it successfully allocated; the manager does not
    /// track outstanding reservations itself.
    pub fn release(&self, gpu: f64, cpu: f64) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.available_gpu += gpu;
        ledger.available_cpu += cpu;
    }

    pub fn available_gpu(&self) -> f64 {
        self.ledger.lock().unwrap().available_gpu
    }

    pub fn available_cpu(&self) -> f64 {
        self.ledger.lock().unwrap().available_cpu
    }

    pub fn total_gpu(&self) -> f64 {
        self.ledger.lock().unwrap().total_gpu
    }

    pub fn total_cpu(&self) -> f64 {
        self.ledger.lock().unwrap().total_cpu
    }
}
