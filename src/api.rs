//! HTTP surface (C6): build / status / jobs / heartbeat, plus the
//! validation-error formatting that feeds `POST /_build`'s 422 responses.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use poem::http::StatusCode;
use poem::web::{Data, Json, Path};
use poem::{get, handler, post, Body, Endpoint, EndpointExt, IntoResponse, Response, Route};
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::model::{IndexBuildParameters, Job};
use crate::service::{JobService, JobServiceError};

lazy_static! {
    static ref VECTOR_PATH_RE: Regex = Regex::new(r".+\.knnvec$").expect("valid regex");
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

fn validation_response(errors: Vec<FieldError>) -> Response {
    Json(json!({ "detail": "Validation Error", "errors": errors }))
        .with_status(StatusCode::UNPROCESSABLE_ENTITY)
        .into_response()
}

/// Checks the constraints a JSON-schema-level deserialize cannot express:
/// the `.knnvec` suffix on `vector_path`, and the `> 0` / `> 1` bounds on
/// `dimension` / `doc_count`.
fn semantic_errors(params: &IndexBuildParameters) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !VECTOR_PATH_RE.is_match(&params.vector_path) {
        errors.push(FieldError {
            field: "vector_path".to_string(),
            message: "string does not match pattern '.+\\.knnvec$'".to_string(),
            error_type: "string_pattern_mismatch".to_string(),
        });
    }
    if params.dimension == 0 {
        errors.push(FieldError {
            field: "dimension".to_string(),
            message: "Input should be greater than 0".to_string(),
            error_type: "greater_than".to_string(),
        });
    }
    if params.doc_count <= 1 {
        errors.push(FieldError {
            field: "doc_count".to_string(),
            message: "Input should be greater than 1".to_string(),
            error_type: "greater_than".to_string(),
        });
    }

    errors
}

/// `serde_path_to_error`'s root path renders as `"."`; a structural failure
/// at the document root (malformed JSON, wrong top-level shape) is reported
/// against `"body"` rather than an empty field name.
fn structural_error_field(path: &serde_path_to_error::Path) -> String {
    let rendered = path.to_string();
    if rendered == "." {
        "body".to_string()
    } else {
        rendered
    }
}

#[handler]
async fn create_job(job_service: Data<&Arc<JobService>>, body: Body) -> Response {
    let bytes = match body.into_bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            return validation_response(vec![FieldError {
                field: "body".to_string(),
                message: err.to_string(),
                error_type: "json_invalid".to_string(),
            }]);
        }
    };

    let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
    let params: IndexBuildParameters = match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(params) => params,
        Err(err) => {
            let field = structural_error_field(err.path());
            let message = err.inner().to_string();
            return validation_response(vec![FieldError {
                field,
                message,
                error_type: "type_error".to_string(),
            }]);
        }
    };

    let errors = semantic_errors(&params);
    if !errors.is_empty() {
        return validation_response(errors);
    }

    match job_service.create_job(params) {
        Ok(job_id) => Json(json!({ "job_id": job_id })).into_response(),
        Err(JobServiceError::HashCollision(_)) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Err(JobServiceError::Capacity(_)) => {
            StatusCode::from_u16(507).expect("507 is a valid status code").into_response()
        }
    }
}

#[handler]
async fn get_status(job_service: Data<&Arc<JobService>>, Path(job_id): Path<String>) -> Response {
    match job_service.get_job(&job_id) {
        Some(job) => {
            let mut body = serde_json::Map::new();
            body.insert(
                "task_status".to_string(),
                serde_json::to_value(job.status).expect("JobStatus serializes"),
            );
            if let Some(file_name) = job.file_name {
                body.insert("file_name".to_string(), json!(file_name));
            }
            if let Some(error_message) = job.error_message {
                body.insert("error_message".to_string(), json!(error_message));
            }
            Json(serde_json::Value::Object(body)).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[handler]
async fn list_jobs(job_service: Data<&Arc<JobService>>) -> Json<HashMap<String, Job>> {
    Json(job_service.list_jobs())
}

#[handler]
async fn heart_beat(service_name: Data<&Arc<String>>) -> String {
    service_name.0.as_ref().clone()
}

pub fn routes(job_service: Arc<JobService>, service_name: Arc<String>) -> impl Endpoint {
    Route::new()
        .at("/_build", post(create_job))
        .at("/_status/:job_id", get(get_status))
        .at("/_jobs", get(list_jobs))
        .at("/_heart_beat", get(heart_beat))
        .data(job_service)
        .data(service_name)
}
