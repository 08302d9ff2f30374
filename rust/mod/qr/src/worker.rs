use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::QrService;

/// Start the expiry sweeper.
///
/// Every `interval` it persists ACTIVE → EXPIRED for tokens past their
/// expiry. Scans of a lapsed token already resolve as EXPIRED; the sweeper
/// keeps stored status in step for tokens nobody scans.
///
/// Returns a CancellationToken that stops the loop when cancelled.
pub fn start(service: Arc<QrService>, interval: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            info!("token expiry sweeper started (interval={interval:?})");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("token expiry sweeper stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        debug!("expiry sweep");
                        match service.expire_lapsed() {
                            Ok(0) => {}
                            Ok(n) => info!("expiry sweeper: expired {n} tokens"),
                            Err(e) => error!("expiry sweeper error: {e}"),
                        }
                    }
                }
            }
        });
    }

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QrConfig;
    use crate::model::{EntityType, IssueTokenRequest, TokenStatus};
    use plantops_sql::{SQLStore, SqliteStore};

    #[tokio::test]
    async fn sweeper_expires_lapsed_tokens() {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = Arc::new(QrService::new(db, QrConfig::default()).unwrap());
        let token = service
            .issue_token(&IssueTokenRequest {
                entity_type: EntityType::Product,
                entity_id: "p1".into(),
                redirect_url: None,
                version_id: None,
                expires_at: Some("2020-01-01T00:00:00Z".into()),
            })
            .unwrap();

        let cancel = start(service.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert_eq!(
            service.get_token(&token.id).unwrap().status,
            TokenStatus::Expired
        );
    }
}
