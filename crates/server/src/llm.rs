//! Resolve the LLM client for a request from the active database binding,
//! falling back to environment-level configuration.

use scriberr_domain::Error;
use scriberr_llm::LlmClient;
use scriberr_storage::LlmProvider;

use crate::error::ApiResult;
use crate::state::AppState;

pub struct ResolvedLlm {
    pub client: LlmClient,
    pub provider: &'static str,
    pub default_model: Option<String>,
}

pub async fn resolve_client(state: &AppState) -> ApiResult<ResolvedLlm> {
    let env = &state.config.llm;

    if let Some(binding) = state.repos.llm_configs.find_active().await? {
        let client = match binding.provider {
            LlmProvider::Openai => LlmClient::openai(
                binding.api_key.clone().or_else(|| env.openai_api_key.clone()),
                binding.base_url.as_deref(),
            )?,
            LlmProvider::Ollama => LlmClient::ollama(binding.base_url.as_deref())?,
        };
        return Ok(ResolvedLlm {
            client,
            provider: binding.provider.as_str(),
            default_model: env.default_model.clone(),
        });
    }

    if env.openai_api_key.is_some() {
        return Ok(ResolvedLlm {
            client: LlmClient::openai(env.openai_api_key.clone(), None)?,
            provider: "openai",
            default_model: env.default_model.clone(),
        });
    }
    if env.ollama_base_url.is_some() {
        return Ok(ResolvedLlm {
            client: LlmClient::ollama(env.ollama_base_url.as_deref())?,
            provider: "ollama",
            default_model: env.default_model.clone(),
        });
    }

    Err(Error::Validation(
        "no LLM provider configured; set one via POST /api/v1/llm/config \
         or the OPENAI_API_KEY / OLLAMA_BASE_URL environment"
            .into(),
    )
    .into())
}
