use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::types::FunctionConfiguration;
use aws_sdk_lambda::Client as LambdaClient;
use tracing::{debug, info};

use crate::error::{EnumerationError, ListPageError};

/// Number of functions requested per `ListFunctions` call.
pub const PAGE_SIZE: i32 = 100;

/// Upper bound on `ListFunctions` calls in one run.
pub const MAX_PAGES: usize = 1_000;

/// One `ListFunctions` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionPage {
    pub functions: Vec<FunctionConfiguration>,
    pub next_marker: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionLister: Send + Sync {
    async fn list_page(
        &self,
        marker: Option<String>,
        max_items: i32,
    ) -> Result<FunctionPage, ListPageError>;
}

#[async_trait]
impl FunctionLister for LambdaClient {
    async fn list_page(
        &self,
        marker: Option<String>,
        max_items: i32,
    ) -> Result<FunctionPage, ListPageError> {
        let result = self
            .list_functions()
            .max_items(max_items)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| {
                ListPageError::with_source(DisplayErrorContext(&e).to_string(), e)
            })?;

        Ok(FunctionPage {
            functions: result.functions.unwrap_or_default(),
            next_marker: result.next_marker,
        })
    }
}

/// Lists every Lambda function visible to `client`, following markers until
/// the API stops returning one. The first failed request aborts the listing.
pub async fn list_lambdas<L>(client: &L) -> Result<Vec<FunctionConfiguration>, EnumerationError>
where
    L: FunctionLister + ?Sized,
{
    let mut functions = Vec::new();
    let mut marker = None;

    info!("Querying Lambda functions.");

    for page in 1..=MAX_PAGES {
        let result = client
            .list_page(marker, PAGE_SIZE)
            .await
            .map_err(|source| EnumerationError::Request {
                page,
                collected: functions.len(),
                source,
            })?;

        info!("Queried {} Lambdas.", result.functions.len());
        functions.extend(result.functions);

        // An empty marker is treated like a missing one.
        marker = result.next_marker.filter(|m| !m.is_empty());
        if marker.is_none() {
            info!("Found {} Lambdas.", functions.len());
            return Ok(functions);
        }

        debug!("There are more results to be queried.");
    }

    Err(EnumerationError::PageLimitExceeded { pages: MAX_PAGES })
}
