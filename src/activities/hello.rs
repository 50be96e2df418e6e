//! The hello activity: greets its input, failing transiently on demand.

use async_trait::async_trait;
use tracing::info;

use super::{Activity, ActivityFailure, FailureInjection};

/// Registered name of the hello activity
pub const HELLO_ACTIVITY: &str = "say_hello";

/// Message carried by injected failures
pub const RANDOM_FAILURE_MESSAGE: &str = "Random failure occurred";

pub struct HelloActivity {
    failure: FailureInjection,
}

impl Default for HelloActivity {
    fn default() -> Self {
        Self::new(FailureInjection::default())
    }
}

impl HelloActivity {
    pub fn new(failure: FailureInjection) -> Self {
        Self { failure }
    }
}

#[async_trait]
impl Activity for HelloActivity {
    fn name(&self) -> &str {
        HELLO_ACTIVITY
    }

    async fn invoke(&self, input: &str) -> Result<String, ActivityFailure> {
        info!(activity = HELLO_ACTIVITY, %input, "Saying hello to {}.", input);

        if self.failure.should_fail() {
            return Err(ActivityFailure::new(RANDOM_FAILURE_MESSAGE));
        }

        Ok(format!("Hello {}!", input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hello_greets_input() {
        let activity = HelloActivity::new(FailureInjection::Never);

        assert_eq!(activity.name(), "say_hello");
        assert_eq!(activity.invoke("Seattle").await.unwrap(), "Hello Seattle!");
        assert_eq!(activity.invoke("").await.unwrap(), "Hello !");
    }

    #[tokio::test]
    async fn test_hello_injected_failure() {
        let activity = HelloActivity::new(FailureInjection::Always);

        let failure = activity.invoke("London").await.unwrap_err();
        assert_eq!(failure, ActivityFailure::new("Random failure occurred"));
    }
}
