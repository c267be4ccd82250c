//! Reporting Layer
//!
//! Deduplicated, fire-and-forget delivery of violations to evidence storage
//! and the backend.

pub mod backend;
pub mod pipeline;

pub use backend::{HttpBackend, ViolationBackend, ViolationRecord};
pub use pipeline::ReportingPipeline;

#[cfg(test)]
pub mod test_support {
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    use super::{ViolationBackend, ViolationRecord};

    /// Backend keeping every submitted record
    #[derive(Default)]
    pub struct RecordingBackend {
        pub submitted: Mutex<Vec<ViolationRecord>>,
        /// Delay before each submission completes
        pub delay: Option<Duration>,
        /// Fail every submission after recording it
        pub fail: bool,
    }

    impl RecordingBackend {
        pub fn records(&self) -> Vec<ViolationRecord> {
            self.submitted.lock().clone()
        }
    }

    #[async_trait]
    impl ViolationBackend for RecordingBackend {
        async fn submit(&self, record: &ViolationRecord) -> Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.submitted.lock().push(record.clone());
            if self.fail {
                anyhow::bail!("backend unreachable");
            }
            Ok(())
        }
    }
}
