use crate::blueprint::SubrequestsTree;
use crate::error::Result;
use crate::replacer::JsonPathReplacer;
use crate::runtime::executor::RequestExecutor;
use crate::runtime::request::{MasterContext, PreparedRequest};
use crate::runtime::response::SubResponse;
use std::sync::Arc;
use tracing::debug;

/// Walks the execution tree wave by wave and collects the responses.
pub struct SubrequestsManager {
    executor: Arc<dyn RequestExecutor>,
    replacer: JsonPathReplacer,
}

impl SubrequestsManager {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            replacer: JsonPathReplacer::new(),
        }
    }

    /// Processes all the subrequests into a flat, ordered list of responses.
    ///
    /// Waves run strictly in sequence; the members of one wave are
    /// dispatched concurrently and their responses appended to the pool in
    /// declaration order. Any executor failure aborts the remaining waves.
    pub async fn request(
        &self,
        tree: &SubrequestsTree,
        master: &MasterContext,
    ) -> Result<Vec<SubResponse>> {
        let mut responses: Vec<SubResponse> = Vec::new();
        for (sequence, level) in tree.iter().enumerate() {
            // Perform the necessary replacements for the elements in the
            // batch. The pool is read-only until the wave completes.
            let batch = self.replacer.replace_batch(level.clone(), &responses)?;
            let mut prepared = Vec::with_capacity(batch.len());
            for subrequest in &batch {
                prepared.push((
                    subrequest.request_id.clone(),
                    PreparedRequest::from_subrequest(subrequest, master)?,
                ));
            }
            debug!(wave = sequence, size = prepared.len(), "Dispatching wave");
            let results = futures::future::try_join_all(prepared.into_iter().map(
                |(request_id, request)| {
                    let executor = Arc::clone(&self.executor);
                    async move {
                        let response = executor.handle(request).await?;
                        Ok::<_, anyhow::Error>((request_id, response))
                    }
                },
            ))
            .await?;
            for (request_id, mut response) in results {
                response.set_content_id(&request_id)?;
                responses.push(response);
            }
        }
        Ok(responses)
    }
}
