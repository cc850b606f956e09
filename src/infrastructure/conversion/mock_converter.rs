use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::ports::{ConvertError, PartConverter};

/// Deterministic converter for tests and scaffold mode: prefixes each part
/// with a marker, and can be scripted to fail the first N attempts per
/// distinct payload to exercise the retry path.
#[derive(Default)]
pub struct MockConverter {
    failures_before_success: u32,
    attempts: Mutex<HashMap<Vec<u8>, u32>>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PartConverter for MockConverter {
    async fn convert(&self, data: &[u8]) -> Result<String, ConvertError> {
        let attempt = {
            let mut attempts = self.attempts.lock().expect("attempts lock poisoned");
            let counter = attempts.entry(data.to_vec()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempt <= self.failures_before_success {
            return Err(ConvertError::Transient(format!(
                "scripted failure {attempt}/{}",
                self.failures_before_success
            )));
        }

        let text = String::from_utf8_lossy(data);
        Ok(format!("converted: {text}"))
    }
}
