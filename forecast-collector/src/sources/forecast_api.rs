use kma_client::{domain::ForecastSlot, ApiError, ForecastApiClient, ForecastRequest};

use crate::pipeline::ForecastSource;

#[async_trait::async_trait]
impl ForecastSource for ForecastApiClient {
    async fn fetch(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastSlot>, ApiError> {
        tracing::debug!(
            reg_cd = request.reg_cd,
            base_date = %request.base_date,
            url = self.url(),
            "requesting forecast"
        );
        ForecastApiClient::fetch(self, request).await
    }
}
