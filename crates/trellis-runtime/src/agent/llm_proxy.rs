//! Event-firing wrapper around a [`PromptExecutor`].

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, instrument};
use trellis_core::ids::SessionId;
use trellis_core::messages::{LlmModel, Message, Prompt, ToolDescriptor};
use trellis_core::now_rfc3339;
use trellis_llm::PromptExecutor;
use trellis_pipeline::{EventContext, PipelineHub};

use crate::errors::RuntimeError;

/// Text chunks from a proxied streaming call.
pub type ProxyChunkStream = Pin<Box<dyn Stream<Item = Result<String, RuntimeError>> + Send>>;

/// Executor proxy that fires `BeforeLlmCall` / `AfterLlmCall` around every
/// call. Nodes only ever see the model through this.
#[derive(Clone)]
pub struct PipelineExecutor {
    inner: Arc<dyn PromptExecutor>,
    pipeline: Arc<PipelineHub>,
    session_id: SessionId,
}

impl PipelineExecutor {
    /// Wrap an executor for one session.
    pub fn new(
        inner: Arc<dyn PromptExecutor>,
        pipeline: Arc<PipelineHub>,
        session_id: SessionId,
    ) -> Self {
        Self {
            inner,
            pipeline,
            session_id,
        }
    }

    /// Run a prompt to completion.
    #[instrument(skip_all, fields(session_id = %self.session_id, model = %model))]
    pub async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, RuntimeError> {
        self.before(prompt, model, tools).await?;
        let responses = self.inner.execute(prompt, model, tools).await?;
        debug!(responses = responses.len(), "model responded");
        self.after(prompt, model, responses.clone()).await?;
        Ok(responses)
    }

    /// Stream a response without tools.
    ///
    /// `AfterLlmCall` fires once the stream is drained, carrying the whole
    /// text as a single assistant message. A stream dropped early never
    /// fires it.
    #[instrument(skip_all, fields(session_id = %self.session_id, model = %model))]
    pub async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
    ) -> Result<ProxyChunkStream, RuntimeError> {
        self.before(prompt, model, &[]).await?;
        let mut chunks = self.inner.execute_streaming(prompt, model).await?;

        let proxy = self.clone();
        let prompt = prompt.clone();
        let model = model.clone();
        Ok(Box::pin(async_stream::stream! {
            let mut text = String::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        text.push_str(&chunk);
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        yield Err(RuntimeError::from(e));
                        return;
                    }
                }
            }
            if let Err(e) = proxy.after(&prompt, &model, vec![Message::assistant(text)]).await {
                yield Err(e);
            }
        }))
    }

    async fn before(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        tools: &[ToolDescriptor],
    ) -> Result<(), RuntimeError> {
        self.pipeline
            .dispatch(&EventContext::BeforeLlmCall {
                session_id: self.session_id.to_string(),
                timestamp: now_rfc3339(),
                prompt: prompt.clone(),
                model: model.clone(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            })
            .await?;
        Ok(())
    }

    async fn after(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        responses: Vec<Message>,
    ) -> Result<(), RuntimeError> {
        self.pipeline
            .dispatch(&EventContext::AfterLlmCall {
                session_id: self.session_id.to_string(),
                timestamp: now_rfc3339(),
                prompt: prompt.clone(),
                model: model.clone(),
                responses,
            })
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
