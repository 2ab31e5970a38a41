use super::Config;
use crate::secret::Secret;

fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("REPOSCOPE_OPENAI_API_KEY") {
            self.openai_api_key = Some(Secret::new(v));
        } else if self.openai_api_key.is_none()
            && let Ok(v) = std::env::var("OPENAI_API_KEY")
        {
            self.openai_api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOSCOPE_RATE_LIMIT_MAX_RATE") {
            if let Ok(rate) = v.parse::<u32>() {
                self.rate_limiter.max_rate = rate;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_RATE_LIMIT_MAX_RATE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_RATE_LIMIT_TIME_PERIOD") {
            if let Ok(period) = v.parse::<f64>() {
                self.rate_limiter.time_period = period;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_RATE_LIMIT_TIME_PERIOD value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOSCOPE_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("REPOSCOPE_LLM_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.llm.max_retries = n;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_LLM_MAX_RETRIES value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_ASSISTANT_MODEL") {
            self.assistant.model = v;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("REPOSCOPE_EMBEDDING_DIM") {
            if let Ok(dim) = v.parse::<usize>() {
                self.vector_db.embedding_dim = dim;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_EMBEDDING_DIM value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_CHUNK_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.vector_db.chunk_size = size;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_INDEX_PATH") {
            self.vector_db.index_path = v;
        }
        if let Ok(v) = std::env::var("REPOSCOPE_SEARCH_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.vector_db.top_k = k;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_SEARCH_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOSCOPE_INDEX_EXTENSIONS") {
            self.index.extensions = parse_list(&v);
        }
        if let Ok(v) = std::env::var("REPOSCOPE_REPO_URL") {
            self.repository.url = (!v.trim().is_empty()).then_some(v);
        }
        if let Ok(v) = std::env::var("REPOSCOPE_REPO_PATH") {
            self.repository.path = v;
        }
        if let Ok(v) = std::env::var("REPOSCOPE_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("REPOSCOPE_GATEWAY_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.gateway.port = port;
            } else {
                tracing::warn!("ignoring invalid REPOSCOPE_GATEWAY_PORT value: {v}");
            }
        }
    }
}
