use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::Client as LambdaClient;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::lambda::FunctionLister;

/// Source of authenticated Lambda clients.
///
/// `acquire` returning `Ok(None)` means the environment produced no usable
/// session at all, which is reported separately from a credential failure.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: Send + Sync;
    type Client: FunctionLister + 'static;

    async fn acquire(&self) -> Result<Option<Self::Session>, SessionError>;

    fn lambda_client(&self, session: &Self::Session, region: &str) -> Self::Client;
}

/// Default AWS provider chain. Inside the cluster this is where KIAM hands
/// out the pod's role credentials.
#[derive(Debug, Clone, Default)]
pub struct AwsSessionProvider;

#[async_trait]
impl SessionProvider for AwsSessionProvider {
    type Session = SdkConfig;
    type Client = LambdaClient;

    async fn acquire(&self) -> Result<Option<SdkConfig>, SessionError> {
        info!("Building AWS session.");
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let Some(provider) = config.credentials_provider() else {
            return Ok(None);
        };

        // Resolve now so broken credentials fail here, not on the first page.
        provider
            .provide_credentials()
            .await
            .map_err(|e| SessionError::Credentials(DisplayErrorContext(&e).to_string()))?;
        debug!("Resolved AWS credentials.");

        Ok(Some(config))
    }

    fn lambda_client(&self, session: &SdkConfig, region: &str) -> LambdaClient {
        info!("Building Lambda client for {} region.", region);
        let config = aws_sdk_lambda::config::Builder::from(session)
            .region(Region::new(region.to_string()))
            .build();
        LambdaClient::from_conf(config)
    }
}
