//! Answer generation.

use super::context::format_context_for_prompt;
use super::{ChatRequest, ContextBuilder, QueryRequest, RagAnswer};
use crate::config::RagSettings;
use crate::llm::{estimate_tokens, ChatMessage, ChatOptions, ClientRegistry};
use crate::rate_limit::RateLimiter;
use crate::tenancy::CallerContext;
use crate::vector_index::VectorFilter;
use crate::{EkkoError, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const NO_SOURCES_ANSWER: &str =
    "I couldn't find any relevant call segments for this question.";

const QUERY_SYSTEM_PROMPT: &str = "You are an assistant answering questions about a customer's \
sales calls. Answer using only the numbered sources provided. Cite sources inline as \
[Source N]. If the sources do not answer the question, say so.";

const CHAT_SYSTEM_PROMPT: &str = "You are an assistant in an ongoing conversation about a \
customer's sales calls. Use the numbered sources provided with each question, and cite them \
inline as [Source N]. If no sources are provided, answer from the conversation so far and \
say that no call context was found.";

/// Question answering over an organization's processed calls.
pub struct RagEngine {
    registry: Arc<ClientRegistry>,
    context_builder: ContextBuilder,
    rate_limiter: Arc<RateLimiter>,
    settings: RagSettings,
}

impl RagEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        context_builder: ContextBuilder,
        rate_limiter: Arc<RateLimiter>,
        settings: RagSettings,
    ) -> Self {
        Self {
            registry,
            context_builder,
            rate_limiter,
            settings,
        }
    }

    /// Reject a payload that claims a different organization than the
    /// authenticated caller. Scoping always comes from the caller context;
    /// the payload echo exists only to catch confused or hostile clients.
    fn verify_tenant(ctx: &CallerContext, claimed: Option<&String>) -> Result<()> {
        if let Some(claimed) = claimed {
            if *claimed != ctx.organization_id {
                return Err(EkkoError::Unauthorized(format!(
                    "payload organization {} does not match caller organization {}",
                    claimed, ctx.organization_id
                )));
            }
        }
        Ok(())
    }

    /// Answer a single question against one account's calls.
    #[instrument(skip(self, ctx, request), fields(organization_id = %ctx.organization_id, account_id = %request.account_id))]
    pub async fn query(&self, ctx: &CallerContext, request: &QueryRequest) -> Result<RagAnswer> {
        Self::verify_tenant(ctx, request.organization_id.as_ref())?;

        let mut filter = VectorFilter::for_organization(&ctx.organization_id)
            .with_account(&request.account_id);
        if let Some(stages) = &request.funnel_stages {
            filter = filter.with_funnel_stages(stages.clone());
        }
        let top_k = request.top_k.unwrap_or(self.settings.top_k);

        let sources = self
            .context_builder
            .build(&request.query, top_k, &filter)
            .await?;

        if sources.is_empty() {
            info!("no sources retrieved, returning fixed answer");
            return Ok(RagAnswer {
                answer: NO_SOURCES_ANSWER.to_string(),
                sources,
                tokens_used: 0,
            });
        }
        debug!(sources = sources.len(), "retrieved context");

        let user_content = format!(
            "Question: {}\n\nSources:\n{}",
            request.query,
            format_context_for_prompt(&sources)
        );
        let messages = vec![
            ChatMessage::system(QUERY_SYSTEM_PROMPT),
            ChatMessage::user(user_content),
        ];

        let completion = self.complete(ctx, &messages).await?;

        Ok(RagAnswer {
            answer: completion.content,
            sources,
            tokens_used: u64::from(completion.total_tokens),
        })
    }

    /// Continue a conversation, retrieving fresh context for the latest
    /// message. History is bounded to the configured window, oldest turns
    /// dropped first.
    #[instrument(skip(self, ctx, request), fields(organization_id = %ctx.organization_id))]
    pub async fn chat(&self, ctx: &CallerContext, request: &ChatRequest) -> Result<RagAnswer> {
        Self::verify_tenant(ctx, request.organization_id.as_ref())?;

        let mut filter = VectorFilter::for_organization(&ctx.organization_id);
        if let Some(account_id) = &request.account_id {
            filter = filter.with_account(account_id);
        }
        if let Some(stages) = &request.funnel_stages {
            filter = filter.with_funnel_stages(stages.clone());
        }

        let sources = self
            .context_builder
            .build(&request.message, self.settings.top_k, &filter)
            .await?;

        let user_content = if sources.is_empty() {
            format!(
                "Question: {}\n\n(No relevant call context found)",
                request.message
            )
        } else {
            format!(
                "Question: {}\n\nSources:\n{}",
                request.message,
                format_context_for_prompt(&sources)
            )
        };

        let mut messages = vec![ChatMessage::system(CHAT_SYSTEM_PROMPT)];
        let history = &request.history;
        let start = history.len().saturating_sub(self.settings.max_history);
        messages.extend_from_slice(&history[start..]);
        messages.push(ChatMessage::user(user_content));

        let completion = self.complete(ctx, &messages).await?;

        Ok(RagAnswer {
            answer: completion.content,
            sources,
            tokens_used: u64::from(completion.total_tokens),
        })
    }

    async fn complete(
        &self,
        ctx: &CallerContext,
        messages: &[ChatMessage],
    ) -> Result<crate::llm::ChatCompletion> {
        let client = self.registry.resolve(&ctx.organization_id);
        let estimated: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();

        self.rate_limiter.acquire(estimated).await;
        let completion = client
            .chat_completion(messages, &ChatOptions::default())
            .await?;
        self.rate_limiter
            .report_usage(u64::from(completion.total_tokens), estimated);
        Ok(completion)
    }
}
