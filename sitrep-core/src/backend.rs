//! The seam between the session and whatever produces reports.

use analyst::Analyst;
use async_trait::async_trait;

/// Something that answers an operator message with a raw report body.
///
/// Implementations run on the session's thread, so the returned future
/// need not be `Send`.
#[async_trait(?Send)]
pub trait ReportBackend {
    async fn submit(&self, message: &str) -> Result<String, analyst::Error>;
}

#[async_trait(?Send)]
impl ReportBackend for Analyst {
    async fn submit(&self, message: &str) -> Result<String, analyst::Error> {
        self.chat(message).await
    }
}
