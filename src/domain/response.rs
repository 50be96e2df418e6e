//! Outward response produced when an instance reaches a terminal outcome.

use serde::{Deserialize, Serialize};

use super::instance::Outcome;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// HTTP-analogous result of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    /// 200, 500 or 400
    pub status_code: u16,

    pub body: ResponseBody,
}

/// Response body: the results array or a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ResponseBody {
    Json(Vec<String>),
    Text(String),
}

impl WorkflowResponse {
    /// Map a terminal outcome to its response shape
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Completed { results } => Self {
                status_code: 200,
                body: ResponseBody::Json(results.clone()),
            },
            Outcome::FailedActivity { message } => Self {
                status_code: 500,
                body: ResponseBody::Text(format!("Function execution failed: {}", message)),
            },
            Outcome::FailedInternal { message } => Self {
                status_code: 400,
                body: ResponseBody::Text(format!("An error occurred: {}", message)),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    pub fn content_type(&self) -> &'static str {
        match self.body {
            ResponseBody::Json(_) => CONTENT_TYPE_JSON,
            ResponseBody::Text(_) => CONTENT_TYPE_TEXT,
        }
    }

    /// Body as it goes on the wire
    pub fn body_string(&self) -> String {
        match &self.body {
            ResponseBody::Json(results) => {
                serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string())
            }
            ResponseBody::Text(text) => text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_maps_to_200_json_array() {
        let response = WorkflowResponse::from_outcome(&Outcome::Completed {
            results: vec!["Hello Tokyo!".into(), "Hello Seattle!".into()],
        });

        assert_eq!(response.status_code, 200);
        assert!(response.is_success());
        assert_eq!(response.content_type(), CONTENT_TYPE_JSON);
        assert_eq!(response.body_string(), r#"["Hello Tokyo!","Hello Seattle!"]"#);
    }

    #[test]
    fn test_failures_map_to_distinct_codes() {
        let failed = WorkflowResponse::from_outcome(&Outcome::FailedActivity {
            message: "Random failure occurred".into(),
        });
        let errored = WorkflowResponse::from_outcome(&Outcome::FailedInternal {
            message: "Activity 'x' is not registered".into(),
        });

        assert_eq!(failed.status_code, 500);
        assert_eq!(
            failed.body_string(),
            "Function execution failed: Random failure occurred"
        );
        assert_eq!(errored.status_code, 400);
        assert_eq!(
            errored.body_string(),
            "An error occurred: Activity 'x' is not registered"
        );
        assert_eq!(errored.content_type(), CONTENT_TYPE_TEXT);
    }
}
